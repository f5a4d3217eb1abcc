//! Builder for configuring a new reader.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::grammar::Grammars;
use crate::options::{impl_options_methods, Options};
use crate::{Reader, Result};

/// Builder for configuring a [`Reader`].
///
/// Options given here are the out-of-band agreement with the producer;
/// an options document found in the stream header overrides them.
pub struct ReaderBuilder {
    pub(crate) options: Options,
    pub(crate) grammars: Option<Arc<Grammars>>,
}

impl ReaderBuilder {
    /// Creates a new default [`ReaderBuilder`].
    pub fn new() -> Self {
        ReaderBuilder {
            options: Options::default(),
            grammars: None,
        }
    }

    /// Builds a [`Reader`] from this configuration over the given
    /// source. The stream header is consumed here.
    pub fn into_reader<R: Read>(self, source: R) -> Result<Reader<R>> {
        Reader::with_options(source, self.options, self.grammars)
    }

    /// Builds a [`Reader`] over a buffered file.
    pub fn into_file_reader<P: AsRef<Path>>(self, path: P) -> Result<Reader<BufReader<File>>> {
        let file = File::open(path)?;
        self.into_reader(BufReader::new(file))
    }
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl_options_methods!(ReaderBuilder);
