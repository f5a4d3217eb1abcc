//! Stream header: cookie, distinguishing bits and the options document.
//!
//! Layout: `[$EXI cookie?] [10] [presence bit] [options?] body`. The
//! options document is itself a tiny EXI body driven by the fixed
//! grammar of the options schema; because that grammar is strict and
//! known on both sides, the event codes below are spelled out as n-bit
//! literals with one state per function.

use std::io::{Read, Write};

use tracing::debug;

use crate::channel::{BitDecoderChannel, BitEncoderChannel, DecoderChannel, EncoderChannel};
use crate::options::{CodingMode, DtrMapEntry, Options, DEFAULT_BLOCK_SIZE};
use crate::{Error, Result};

/// The four cookie octets.
const COOKIE: [u8; 4] = [b'$', b'E', b'X', b'I'];

/// Writes cookie, distinguishing bits, presence bit and, when requested,
/// the options document.
pub(crate) fn write_header<W: Write>(
    channel: &mut BitEncoderChannel<W>,
    options: &Options,
) -> Result<()> {
    if options.encoding.include_cookie {
        for byte in COOKIE {
            channel.write_byte(byte)?;
        }
    }
    channel.write_bits(0b10, 2)?;
    channel.write_bit(options.encoding.include_options)?;
    if options.encoding.include_options {
        write_options_document(channel, options)?;
    }
    Ok(())
}

/// Reads the header, merging a decoded options document into `options`.
pub(crate) fn read_header<R: Read>(
    channel: &mut BitDecoderChannel<R>,
    options: &mut Options,
) -> Result<()> {
    // A cookie starts with '$' (0x24): its top two bits are 00, which no
    // distinguishing-bits stream can start with.
    match channel.read_bits(2)? {
        0b10 => {}
        0b00 => {
            if channel.read_bits(6)? as u8 != COOKIE[0] & 0x3f {
                return Err(Error::Protocol("not an EXI stream".to_string()));
            }
            for expected in &COOKIE[1..] {
                if channel.read_byte()? != *expected {
                    return Err(Error::Protocol("malformed EXI cookie".to_string()));
                }
            }
            if channel.read_bits(2)? != 0b10 {
                return Err(Error::Protocol(
                    "missing distinguishing bits after cookie".to_string(),
                ));
            }
        }
        _ => return Err(Error::Protocol("not an EXI stream".to_string())),
    }
    if channel.read_bit()? {
        read_options_document(channel, options)?;
        debug!(?options.coding_mode, "header options decoded");
    }
    Ok(())
}

/// One header field with the event codes of the options grammar states
/// it traverses. Widths shrink as earlier optional siblings become
/// impossible.
fn write_options_document<W: Write>(
    channel: &mut BitEncoderChannel<W>,
    options: &Options,
) -> Result<()> {
    let has_alignment = matches!(
        options.coding_mode,
        CodingMode::BytePacked | CodingMode::PreCompression
    );
    let has_uncommon = has_alignment
        || options.fidelity.self_contained
        || options.value_max_length.is_some()
        || options.value_partition_capacity.is_some()
        || !options.dtr_map.is_empty();
    let f = &options.fidelity;
    let has_preserve = f.dtd || f.prefixes || f.lexical_values || f.comments || f.pis;
    let has_block_size = options.block_size != DEFAULT_BLOCK_SIZE;
    let has_lesscommon = has_uncommon || has_preserve || has_block_size;
    let has_common = options.coding_mode == CodingMode::Compression
        || options.fragment
        || options.encoding.schema_id.is_some();

    // <header> : lesscommon 0, common 1, strict 2, EE 3.
    if has_lesscommon {
        channel.write_bits(0, 2)?;

        // <lesscommon> : uncommon 0, preserve 1, blockSize 2, EE 3.
        if has_uncommon {
            channel.write_bits(0, 2)?;

            // <uncommon> : alignment 0, selfContained 1, valueMaxLength 2,
            // valuePartitionCapacity 3, datatypeRepresentationMap 4, EE 5.
            if has_alignment {
                channel.write_bits(0, 3)?;
                // <alignment> : byte 0, pre-compress 1.
                let code = match options.coding_mode {
                    CodingMode::BytePacked => 0,
                    _ => 1,
                };
                channel.write_bits(code, 1)?;
            }
            if options.fidelity.self_contained {
                let code = if has_alignment { 0 } else { 1 };
                channel.write_bits(code, 3)?;
            }
            if let Some(max) = options.value_max_length {
                match (has_alignment, options.fidelity.self_contained) {
                    (false, false) => channel.write_bits(2, 3)?,
                    (true, false) => channel.write_bits(1, 3)?,
                    (false, true) => channel.write_bits(0, 2)?,
                    (true, true) => channel.write_bits(0, 2)?,
                }
                channel.encode_unsigned_integer(max as u64)?;
            }
            if let Some(capacity) = options.value_partition_capacity {
                let (code, width) = vpc_code(
                    has_alignment,
                    options.fidelity.self_contained,
                    options.value_max_length.is_some(),
                );
                channel.write_bits(code, width)?;
                channel.encode_unsigned_integer(capacity as u64)?;
            }
            for (i, entry) in options.dtr_map.iter().enumerate() {
                if i == 0 {
                    let (code, width) = dtrm_code(
                        has_alignment,
                        options.fidelity.self_contained,
                        options.value_max_length.is_some(),
                        options.value_partition_capacity.is_some(),
                    );
                    channel.write_bits(code, width)?;
                } else {
                    // After one map entry: datatypeRepresentationMap 0, EE 1.
                    channel.write_bits(0, 1)?;
                }
                write_dtr_entry(channel, entry)?;
            }
            // EE of <uncommon>.
            let (code, width) = uncommon_end_code(
                has_alignment,
                options.fidelity.self_contained,
                options.value_max_length.is_some(),
                options.value_partition_capacity.is_some(),
                !options.dtr_map.is_empty(),
            );
            channel.write_bits(code, width)?;
        }

        if has_preserve {
            let code = if has_uncommon { 0 } else { 1 };
            channel.write_bits(code, 2)?;
            // <preserve> : dtd 0, prefixes 1, lexicalValues 2, comments 3,
            // pis 4, EE 5; widths shrink left to right.
            let mut seen = 0u32;
            let flags = [f.dtd, f.prefixes, f.lexical_values, f.comments, f.pis];
            for (index, set) in flags.iter().enumerate() {
                if *set {
                    let remaining = 5 - seen as usize;
                    let width = crate::grammar::code_width(remaining + 1);
                    channel.write_bits(index as u32 - seen, width)?;
                    seen = index as u32 + 1;
                }
            }
            let remaining = 5 - seen as usize;
            let width = crate::grammar::code_width(remaining + 1);
            channel.write_bits(remaining as u32, width)?;
        }

        if has_block_size {
            let code = match (has_uncommon, has_preserve) {
                (false, false) => (2u32, 2usize),
                (true, false) => (1, 2),
                (false, true) => (0, 1),
                (true, true) => (0, 1),
            };
            channel.write_bits(code.0, code.1)?;
            channel.encode_unsigned_integer(options.block_size as u64)?;
        }
        // EE of <lesscommon>.
        let code = match (has_uncommon, has_preserve, has_block_size) {
            (_, _, true) => (0u32, 0usize),
            (true, true, false) => (1, 1),
            (true, false, false) => (2, 2),
            (false, true, false) => (1, 1),
            (false, false, false) => (3, 2),
        };
        channel.write_bits(code.0, code.1)?;
    }

    if has_common {
        let code = if has_lesscommon { 0 } else { 1 };
        channel.write_bits(code, 2)?;
        // <common> : compression 0, fragment 1, schemaId 2, EE 3.
        let has_compression = options.coding_mode == CodingMode::Compression;
        if has_compression {
            channel.write_bits(0, 2)?;
        }
        if options.fragment {
            let code = if has_compression { 0 } else { 1 };
            channel.write_bits(code, 2)?;
        }
        if let Some(schema_id) = &options.encoding.schema_id {
            let code = match (has_compression, options.fragment) {
                (false, false) => (2u32, 2usize),
                (true, false) => (1, 2),
                (false, true) => (0, 1),
                (true, true) => (0, 1),
            };
            channel.write_bits(code.0, code.1)?;
            // <schemaId> : CH 0 or the xsi:nil escape 1.
            match schema_id {
                Some(id) => {
                    channel.write_bits(0, 1)?;
                    channel.encode_string(id)?;
                }
                None => {
                    channel.write_bits(1, 1)?;
                    // xsi:type 0, xsi:nil 1; nil value true.
                    channel.write_bits(1, 1)?;
                    channel.write_bit(true)?;
                }
            }
        }
        // EE of <common>.
        let code = match (
            has_compression,
            options.fragment,
            options.encoding.schema_id.is_some(),
        ) {
            (_, _, true) => (0u32, 0usize),
            (_, true, false) => (1, 1),
            (true, false, false) => (2, 2),
            (false, false, false) => (3, 2),
        };
        channel.write_bits(code.0, code.1)?;
    }

    if options.fidelity.strict {
        let code = match (has_lesscommon, has_common) {
            (false, false) => (2u32, 2usize),
            (true, false) => (1, 2),
            (false, true) => (0, 1),
            (true, true) => (0, 1),
        };
        channel.write_bits(code.0, code.1)?;
        // <strict> is empty.
    }
    // EE of <header>.
    let code = match (has_lesscommon, has_common, options.fidelity.strict) {
        (_, _, true) => (0u32, 0usize),
        (_, true, false) => (1, 1),
        (true, false, false) => (2, 2),
        (false, false, false) => (3, 2),
    };
    channel.write_bits(code.0, code.1)?;
    Ok(())
}

/// First still-possible option index of `<uncommon>` given which of the
/// leading options were written. Option indices: alignment 0,
/// selfContained 1, valueMaxLength 2, valuePartitionCapacity 3,
/// datatypeRepresentationMap 4, EE 5.
fn uncommon_state(alignment: bool, sc: bool, vml: bool, vpc: bool) -> u32 {
    if vpc {
        4
    } else if vml {
        3
    } else if sc {
        2
    } else if alignment {
        1
    } else {
        0
    }
}

fn uncommon_width(next: u32) -> usize {
    crate::grammar::code_width(6 - next as usize)
}

fn vpc_code(alignment: bool, sc: bool, vml: bool) -> (u32, usize) {
    let next = uncommon_state(alignment, sc, vml, false);
    (3 - next, uncommon_width(next))
}

fn dtrm_code(alignment: bool, sc: bool, vml: bool, vpc: bool) -> (u32, usize) {
    let next = uncommon_state(alignment, sc, vml, vpc);
    (4 - next, uncommon_width(next))
}

fn uncommon_end_code(
    alignment: bool,
    sc: bool,
    vml: bool,
    vpc: bool,
    dtrm: bool,
) -> (u32, usize) {
    if dtrm {
        // After a map entry: datatypeRepresentationMap 0, EE 1.
        return (1, 1);
    }
    let next = uncommon_state(alignment, sc, vml, vpc);
    (5 - next, uncommon_width(next))
}

fn write_dtr_entry<W: Write>(
    channel: &mut BitEncoderChannel<W>,
    entry: &DtrMapEntry,
) -> Result<()> {
    channel.encode_string(&entry.type_name.0)?;
    channel.encode_string(&entry.type_name.1)?;
    channel.encode_string(&entry.representation.0)?;
    channel.encode_string(&entry.representation.1)
}

fn read_options_document<R: Read>(
    channel: &mut BitDecoderChannel<R>,
    options: &mut Options,
) -> Result<()> {
    // <header>
    let mut code = channel.read_bits(2)?;
    if code == 0 {
        read_lesscommon(channel, options)?;
        code = channel.read_bits(2)? + 1;
    }
    if code == 1 {
        read_common(channel, options)?;
        code = channel.read_bits(1)? + 2;
    }
    if code == 2 {
        options.fidelity.strict = true;
        // EE of <header> after <strict> takes zero bits.
        return Ok(());
    }
    if code != 3 {
        return Err(Error::Protocol("malformed options document".to_string()));
    }
    Ok(())
}

fn read_lesscommon<R: Read>(
    channel: &mut BitDecoderChannel<R>,
    options: &mut Options,
) -> Result<()> {
    let mut code = channel.read_bits(2)?;
    if code == 0 {
        read_uncommon(channel, options)?;
        code = channel.read_bits(2)? + 1;
    }
    if code == 1 {
        read_preserve(channel, options)?;
        code = channel.read_bits(1)? + 2;
    }
    if code == 2 {
        options.block_size = channel.decode_unsigned_integer()? as usize;
        // EE after <blockSize> takes zero bits.
        return Ok(());
    }
    if code != 3 {
        return Err(Error::Protocol("malformed options document".to_string()));
    }
    Ok(())
}

fn read_uncommon<R: Read>(
    channel: &mut BitDecoderChannel<R>,
    options: &mut Options,
) -> Result<()> {
    // Remaining choice count starts at alignment, selfContained,
    // valueMaxLength, valuePartitionCapacity, datatypeRepresentationMap,
    // EE and shrinks as options are consumed left to right.
    let mut next = 0u32;
    loop {
        let remaining = 4usize.saturating_sub(next as usize);
        let width = crate::grammar::code_width(remaining + 2);
        let code = channel.read_bits(width)? + next;
        match code {
            0 => {
                options.coding_mode = if channel.read_bits(1)? == 0 {
                    CodingMode::BytePacked
                } else {
                    CodingMode::PreCompression
                };
                next = 1;
            }
            1 => {
                options.fidelity.self_contained = true;
                next = 2;
            }
            2 => {
                options.value_max_length =
                    Some(channel.decode_unsigned_integer()? as usize);
                next = 3;
            }
            3 => {
                options.value_partition_capacity =
                    Some(channel.decode_unsigned_integer()? as usize);
                next = 4;
            }
            4 => {
                let entry = DtrMapEntry {
                    type_name: (channel.decode_string()?, channel.decode_string()?),
                    representation: (channel.decode_string()?, channel.decode_string()?),
                };
                options.dtr_map.push(entry);
                // Further entries: datatypeRepresentationMap 0, EE 1.
                while channel.read_bits(1)? == 0 {
                    let entry = DtrMapEntry {
                        type_name: (channel.decode_string()?, channel.decode_string()?),
                        representation: (channel.decode_string()?, channel.decode_string()?),
                    };
                    options.dtr_map.push(entry);
                }
                return Ok(());
            }
            _ => return Ok(()),
        }
    }
}

fn read_preserve<R: Read>(
    channel: &mut BitDecoderChannel<R>,
    options: &mut Options,
) -> Result<()> {
    let mut next = 0u32;
    loop {
        let remaining = 5usize.saturating_sub(next as usize);
        let width = crate::grammar::code_width(remaining + 1);
        let code = channel.read_bits(width)? + next;
        match code {
            0 => options.fidelity.dtd = true,
            1 => options.fidelity.prefixes = true,
            2 => options.fidelity.lexical_values = true,
            3 => options.fidelity.comments = true,
            4 => options.fidelity.pis = true,
            _ => return Ok(()),
        }
        next = code + 1;
        if next == 5 {
            // Only EE remains and it takes zero bits.
            return Ok(());
        }
    }
}

fn read_common<R: Read>(
    channel: &mut BitDecoderChannel<R>,
    options: &mut Options,
) -> Result<()> {
    let mut code = channel.read_bits(2)?;
    if code == 0 {
        options.coding_mode = CodingMode::Compression;
        code = channel.read_bits(2)? + 1;
    }
    if code == 1 {
        options.fragment = true;
        code = channel.read_bits(1)? + 2;
    }
    if code == 2 {
        if channel.read_bits(1)? == 0 {
            options.encoding.schema_id = Some(Some(channel.decode_string()?));
        } else {
            if channel.read_bits(1)? != 1 {
                return Err(Error::Protocol(
                    "unexpected xsi:type in schemaId".to_string(),
                ));
            }
            if !channel.read_bit()? {
                return Err(Error::Protocol("schemaId nil must be true".to_string()));
            }
            options.encoding.schema_id = Some(None);
        }
        // EE after <schemaId> takes zero bits.
        return Ok(());
    }
    if code != 3 {
        return Err(Error::Protocol("malformed options document".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::options::FidelityOptions;
    use pretty_assertions::assert_eq;

    fn round_trip(mut options: Options) -> Options {
        options.encoding.include_options = true;
        let mut buf = Vec::new();
        let mut enc = BitEncoderChannel::new(&mut buf);
        write_header(&mut enc, &options).unwrap();
        enc.flush().unwrap();

        let mut decoded = Options::default();
        let mut dec = BitDecoderChannel::new(buf.as_slice());
        read_header(&mut dec, &mut decoded).unwrap();
        decoded
    }

    #[test]
    fn plain_header_is_three_bits() {
        let mut buf = Vec::new();
        let mut enc = BitEncoderChannel::new(&mut buf);
        write_header(&mut enc, &Options::default()).unwrap();
        enc.flush().unwrap();
        // 10 0 padded to one octet.
        assert_eq!(buf, vec![0b1000_0000]);
    }

    #[test]
    fn cookie_is_recognized() {
        let mut options = Options::default();
        options.encoding.include_cookie = true;
        let mut buf = Vec::new();
        let mut enc = BitEncoderChannel::new(&mut buf);
        write_header(&mut enc, &options).unwrap();
        enc.flush().unwrap();
        assert_eq!(&buf[..4], b"$EXI");

        let mut decoded = Options::default();
        let mut dec = BitDecoderChannel::new(buf.as_slice());
        read_header(&mut dec, &mut decoded).unwrap();
    }

    #[test]
    fn garbage_is_not_an_exi_stream() {
        let mut decoded = Options::default();
        let mut dec = BitDecoderChannel::new([0xffu8, 0x00].as_slice());
        let err = read_header(&mut dec, &mut decoded).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[test]
    fn preserve_flags_round_trip() {
        let mut options = Options::default();
        options.fidelity = FidelityOptions {
            comments: true,
            pis: true,
            prefixes: true,
            ..FidelityOptions::default()
        };
        let decoded = round_trip(options);
        assert!(decoded.fidelity.comments);
        assert!(decoded.fidelity.pis);
        assert!(decoded.fidelity.prefixes);
        assert!(!decoded.fidelity.dtd);
    }

    #[test]
    fn table_limits_round_trip() {
        let mut options = Options::default();
        options.value_max_length = Some(64);
        options.value_partition_capacity = Some(100);
        let decoded = round_trip(options);
        assert_eq!(decoded.value_max_length, Some(64));
        assert_eq!(decoded.value_partition_capacity, Some(100));
    }

    #[test]
    fn alignment_and_fragment_round_trip() {
        let mut options = Options::default();
        options.coding_mode = CodingMode::BytePacked;
        options.fragment = true;
        let decoded = round_trip(options);
        assert_eq!(decoded.coding_mode, CodingMode::BytePacked);
        assert!(decoded.fragment);
    }

    #[test]
    fn schema_id_nil_round_trips() {
        let mut options = Options::default();
        options.encoding.schema_id = Some(None);
        let decoded = round_trip(options);
        assert_eq!(decoded.encoding.schema_id, Some(None));

        let mut options = Options::default();
        options.encoding.schema_id = Some(Some("urn:my-schema".to_string()));
        let decoded = round_trip(options);
        assert_eq!(
            decoded.encoding.schema_id,
            Some(Some("urn:my-schema".to_string()))
        );
    }

    #[test]
    fn strict_and_block_size_round_trip() {
        let mut options = Options::default();
        options.fidelity.strict = true;
        options.block_size = 4096;
        let decoded = round_trip(options);
        assert!(decoded.fidelity.strict);
        assert_eq!(decoded.block_size, 4096);
    }

    #[test]
    fn dtr_map_round_trips() {
        let mut options = Options::default();
        options.dtr_map.push(DtrMapEntry {
            type_name: ("urn:t".to_string(), "money".to_string()),
            representation: (
                crate::datatypes::EXI_DATATYPE_URI.to_string(),
                "string".to_string(),
            ),
        });
        let decoded = round_trip(options);
        assert_eq!(decoded.dtr_map.len(), 1);
        assert_eq!(decoded.dtr_map[0].type_name.1, "money");
    }
}
