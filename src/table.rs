//! Value string table: global and per-name local partitions.
//!
//! Repeated attribute and character values are replaced by compact
//! partition ids. A value is first looked up in the local partition of
//! the qualified name it appears under, then in the global partition;
//! only a double miss puts the literal on the wire. Additions happen
//! after the value is emitted, keeping the encoder and the rebuilt
//! decoder table in lock step.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::context::QNameId;

/// Outcome of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueHit {
    /// Found in the local partition of the queried name.
    Local(usize),
    /// Found in the global partition.
    Global(usize),
    /// Not in the table; the literal goes on the wire.
    Miss,
}

/// Simple partitions for the common unbounded configuration.
#[derive(Debug, Default)]
struct UnboundedStore {
    global: Vec<String>,
    global_ids: HashMap<String, usize>,
    locals: HashMap<QNameId, Vec<String>>,
}

/// Partitions with FIFO eviction; the capacity counts live entries
/// across the global and all local partitions together.
#[derive(Debug, Default)]
struct BoundedStore {
    global: Vec<String>,
    locals: HashMap<QNameId, Vec<String>>,
    /// Insertion order of live values; the local entry created together
    /// with each global entry is recorded so eviction can drop both.
    order: VecDeque<(String, Option<QNameId>)>,
}

#[derive(Debug)]
enum Store {
    Unbounded(UnboundedStore),
    Bounded(BoundedStore),
}

/// The value string table of one stream.
#[derive(Debug)]
pub struct StringTable {
    store: Store,
    local_enabled: bool,
    value_max_length: Option<usize>,
    value_partition_capacity: Option<usize>,
}

impl StringTable {
    /// Creates a table. `shared_strings` are preloaded into the global
    /// partition in order.
    pub fn new(
        value_max_length: Option<usize>,
        value_partition_capacity: Option<usize>,
        local_value_partitions: bool,
        shared_strings: &[String],
    ) -> Self {
        let store = if value_max_length.is_none() && value_partition_capacity.is_none() {
            Store::Unbounded(UnboundedStore::default())
        } else {
            Store::Bounded(BoundedStore::default())
        };
        let mut table = StringTable {
            store,
            local_enabled: local_value_partitions,
            value_max_length,
            value_partition_capacity,
        };
        for value in shared_strings {
            table.add_global(value);
        }
        table
    }

    /// Looks `value` up under `qname`: local partition first, then
    /// global.
    pub fn lookup(&self, qname: QNameId, value: &str) -> ValueHit {
        if self.local_enabled {
            if let Some(id) = self.local_position(qname, value) {
                return ValueHit::Local(id);
            }
        }
        match self.global_position(value) {
            Some(id) => ValueHit::Global(id),
            None => ValueHit::Miss,
        }
    }

    /// Number of entries in the local partition of `qname`.
    pub fn local_size(&self, qname: QNameId) -> usize {
        if !self.local_enabled {
            return 0;
        }
        match &self.store {
            Store::Unbounded(s) => s.locals.get(&qname).map_or(0, Vec::len),
            Store::Bounded(s) => s.locals.get(&qname).map_or(0, Vec::len),
        }
    }

    /// Number of entries in the global partition.
    pub fn global_size(&self) -> usize {
        match &self.store {
            Store::Unbounded(s) => s.global.len(),
            Store::Bounded(s) => s.global.len(),
        }
    }

    /// Entry of the local partition of `qname` by compact id.
    pub fn local_value(&self, qname: QNameId, id: usize) -> Option<&str> {
        let locals = match &self.store {
            Store::Unbounded(s) => &s.locals,
            Store::Bounded(s) => &s.locals,
        };
        locals.get(&qname).and_then(|p| p.get(id)).map(String::as_str)
    }

    /// Entry of the global partition by compact id.
    pub fn global_value(&self, id: usize) -> Option<&str> {
        match &self.store {
            Store::Unbounded(s) => s.global.get(id),
            Store::Bounded(s) => s.global.get(id),
        }
        .map(String::as_str)
    }

    /// Records a freshly emitted literal under `qname`. Values beyond
    /// `value_max_length` are not recorded; in the bounded configuration
    /// the oldest live entry makes room once the capacity is reached.
    pub fn add(&mut self, qname: QNameId, value: &str) {
        if let Some(max) = self.value_max_length {
            if value.chars().count() > max {
                return;
            }
        }
        let local = self.local_enabled.then(|| qname);
        match &mut self.store {
            Store::Unbounded(s) => {
                s.global_ids.insert(value.to_string(), s.global.len());
                s.global.push(value.to_string());
                if let Some(qname) = local {
                    s.locals.entry(qname).or_default().push(value.to_string());
                }
            }
            Store::Bounded(s) => {
                if let Some(capacity) = self.value_partition_capacity {
                    while live_entries(s) + 1 + local.is_some() as usize > capacity {
                        if s.order.is_empty() {
                            // The entry footprint alone exceeds the
                            // capacity; nothing is recorded.
                            return;
                        }
                        evict_oldest(s);
                    }
                }
                s.global.push(value.to_string());
                if let Some(qname) = local {
                    s.locals.entry(qname).or_default().push(value.to_string());
                }
                s.order.push_back((value.to_string(), local));
            }
        }
    }

    fn add_global(&mut self, value: &str) {
        match &mut self.store {
            Store::Unbounded(s) => {
                s.global_ids.insert(value.to_string(), s.global.len());
                s.global.push(value.to_string());
            }
            Store::Bounded(s) => {
                s.global.push(value.to_string());
                s.order.push_back((value.to_string(), None));
            }
        }
    }

    fn local_position(&self, qname: QNameId, value: &str) -> Option<usize> {
        let locals = match &self.store {
            Store::Unbounded(s) => &s.locals,
            Store::Bounded(s) => &s.locals,
        };
        locals.get(&qname)?.iter().position(|v| v == value)
    }

    fn global_position(&self, value: &str) -> Option<usize> {
        match &self.store {
            Store::Unbounded(s) => s.global_ids.get(value).copied(),
            Store::Bounded(s) => s.global.iter().position(|v| v == value),
        }
    }
}

fn live_entries(store: &BoundedStore) -> usize {
    store.global.len() + store.locals.values().map(Vec::len).sum::<usize>()
}

/// Drops the oldest recorded value from the global partition and from
/// the local partition it was recorded under. Later ids shift down by
/// one, identically on both sides of the stream.
fn evict_oldest(store: &mut BoundedStore) {
    if let Some((value, local)) = store.order.pop_front() {
        trace!(value = %value, "evicting string table entry");
        if let Some(pos) = store.global.iter().position(|v| *v == value) {
            store.global.remove(pos);
        }
        if let Some(qname) = local {
            if let Some(partition) = store.locals.get_mut(&qname) {
                if let Some(pos) = partition.iter().position(|v| *v == value) {
                    partition.remove(pos);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn qname(uri_id: usize, local_name_id: usize) -> QNameId {
        QNameId {
            uri_id,
            local_name_id,
        }
    }

    #[test]
    fn miss_then_local_hit() {
        let mut table = StringTable::new(None, None, true, &[]);
        let q = qname(0, 0);
        assert_eq!(table.lookup(q, "hi"), ValueHit::Miss);
        table.add(q, "hi");
        assert_eq!(table.lookup(q, "hi"), ValueHit::Local(0));
    }

    #[test]
    fn other_names_hit_the_global_partition() {
        let mut table = StringTable::new(None, None, true, &[]);
        let a = qname(0, 0);
        let b = qname(0, 1);
        table.add(a, "hi");
        assert_eq!(table.lookup(b, "hi"), ValueHit::Global(0));
    }

    #[test]
    fn disabled_local_partitions_always_use_global() {
        let mut table = StringTable::new(None, None, false, &[]);
        let q = qname(0, 0);
        table.add(q, "hi");
        assert_eq!(table.lookup(q, "hi"), ValueHit::Global(0));
        assert_eq!(table.local_size(q), 0);
    }

    #[test]
    fn long_values_are_not_recorded() {
        let mut table = StringTable::new(Some(3), None, true, &[]);
        let q = qname(0, 0);
        table.add(q, "long value");
        assert_eq!(table.lookup(q, "long value"), ValueHit::Miss);
        table.add(q, "ok");
        assert_eq!(table.lookup(q, "ok"), ValueHit::Local(0));
    }

    #[test]
    fn capacity_evicts_the_oldest_entry() {
        // Each add creates a global and a local entry, so capacity 4
        // holds two values.
        let mut table = StringTable::new(None, Some(4), true, &[]);
        let q = qname(0, 0);
        table.add(q, "a");
        table.add(q, "b");
        table.add(q, "c");
        assert_eq!(table.lookup(q, "a"), ValueHit::Miss);
        // Ids shifted down after the eviction.
        assert_eq!(table.lookup(q, "b"), ValueHit::Local(0));
        assert_eq!(table.lookup(q, "c"), ValueHit::Local(1));
        assert_eq!(table.global_size(), 2);
    }

    #[test]
    fn shared_strings_preload_the_global_partition() {
        let table = StringTable::new(None, None, true, &["agreed".to_string()]);
        assert_eq!(table.lookup(qname(0, 0), "agreed"), ValueHit::Global(0));
        assert_eq!(table.global_size(), 1);
    }
}
