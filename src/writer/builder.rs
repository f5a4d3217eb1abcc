//! Builder for configuring a new writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::grammar::Grammars;
use crate::options::{impl_options_methods, Options};
use crate::{Result, Writer};

/// Builder for configuring a [`Writer`].
///
/// ```
/// use quick_exi::{CodingMode, Writer};
///
/// let mut out = Vec::new();
/// let writer = Writer::builder()
///     .coding_mode(CodingMode::BytePacked)
///     .include_cookie(true)
///     .into_writer(&mut out)
///     .unwrap();
/// # drop(writer);
/// ```
pub struct WriterBuilder {
    pub(crate) options: Options,
    pub(crate) grammars: Option<Arc<Grammars>>,
}

impl WriterBuilder {
    /// Creates a new default [`WriterBuilder`].
    pub fn new() -> Self {
        WriterBuilder {
            options: Options::default(),
            grammars: None,
        }
    }

    /// Builds a [`Writer`] from this configuration feeding the given
    /// sink. The options are checked here; nothing is written until the
    /// first event.
    pub fn into_writer<W: Write>(self, sink: W) -> Result<Writer<W>> {
        Writer::with_options(sink, self.options, self.grammars)
    }

    /// Builds a [`Writer`] writing to a freshly created file.
    pub fn into_file_writer<P: AsRef<Path>>(self, path: P) -> Result<Writer<BufWriter<File>>> {
        let file = File::create(path)?;
        self.into_writer(BufWriter::new(file))
    }
}

impl Default for WriterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl_options_methods!(WriterBuilder);
