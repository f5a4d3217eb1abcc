//! Error management module

use std::fmt;
use std::io;

use thiserror::Error;

/// Broad classification of an [`Error`].
///
/// Once a stream has failed, every further operation on it reports the kind
/// of the first failure through [`Error::Poisoned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying reader or writer failed.
    Io,
    /// The stream ended in the middle of a value or event code.
    UnexpectedEof,
    /// A caller-supplied argument was out of range.
    Argument,
    /// The event sequence or the encoded stream does not match the grammar.
    Protocol,
    /// A textual value does not parse in its declared datatype.
    Format,
    /// The requested combination of options is not valid.
    Configuration,
    /// The feature is recognized but not implemented.
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "I/O",
            ErrorKind::UnexpectedEof => "unexpected EOF",
            ErrorKind::Argument => "argument",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Format => "format",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Unsupported => "unsupported feature",
        };
        f.write_str(name)
    }
}

/// The error type used by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// End of stream reached while more octets or bits were required. The
    /// payload names the construct that was being read.
    #[error("unexpected end of stream while reading {0}")]
    UnexpectedEof(String),
    /// An argument passed to an encoding or decoding primitive was out of
    /// its valid range.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// The requested event does not match any production of the current
    /// grammar state and no fallback is permitted.
    #[error("event {event} does not match any production in state {state}")]
    UnexpectedEvent {
        /// Name of the grammar state the stream is in.
        state: &'static str,
        /// Description of the offending event.
        event: String,
    },
    /// The encoded stream violates the grammar or the stream layout.
    #[error("malformed stream: {0}")]
    Protocol(String),
    /// A lexical value failed to parse in its declared datatype.
    #[error("{value:?} is not a valid {datatype} value")]
    Format {
        /// Name of the datatype whose lexical space was violated.
        datatype: &'static str,
        /// The offending lexical form.
        value: String,
    },
    /// Incompatible or inconsistent options.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// A declared but unimplemented feature was requested.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    /// The stream failed earlier and refuses further operations.
    #[error("stream poisoned by an earlier {0} error")]
    Poisoned(ErrorKind),
}

impl Error {
    /// Classify this error. Used to poison a stream after its first failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::UnexpectedEof(_) => ErrorKind::UnexpectedEof,
            Error::Argument(_) => ErrorKind::Argument,
            Error::UnexpectedEvent { .. } | Error::Protocol(_) => ErrorKind::Protocol,
            Error::Format { .. } => ErrorKind::Format,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Poisoned(kind) => *kind,
        }
    }
}

/// A specialized `Result` type where the error is hard-wired to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_of_io_is_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn poisoned_keeps_original_kind() {
        let err = Error::Format {
            datatype: "decimal",
            value: "1..2".to_string(),
        };
        let poisoned = Error::Poisoned(err.kind());
        assert_eq!(poisoned.kind(), ErrorKind::Format);
    }
}
