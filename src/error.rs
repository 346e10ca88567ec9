//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout vnkit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    BadMagic,
    /// A format version is present in the data but not supported by this
    /// parser.
    UnsupportedVersion(u32),
    /// The stream ended before all expected bytes could be read.
    UnexpectedEof,
    /// A null-terminated string had no null terminator within the buffer.
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    InvalidRange,
    /// An entry count is zero or exceeds the format's sanity bound.
    InvalidCount(u32),
    /// A file name does not fit the format's name field.
    NameTooLong(usize),
    /// A decoded payload did not have the length recorded in its header.
    SizeMismatch {
        /// Length recorded in the container.
        expected: usize,
        /// Length actually produced.
        actual: usize,
    },
    /// The data uses a feature of the format this library does not handle.
    Unsupported(&'static str),
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
    /// Zlib compression or decompression failed.
    #[cfg(feature = "compression")]
    Zlib,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadMagic => write!(f, "bad magic value"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported version: {v}"),
            Error::UnexpectedEof => write!(f, "unexpected end of file"),
            Error::UnterminatedName => write!(f, "unterminated string"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::InvalidCount(n) => write!(f, "invalid entry count: {n}"),
            Error::NameTooLong(len) => write!(f, "file name too long: {len} bytes"),
            Error::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {expected:#x}, got {actual:#x}")
            }
            Error::Unsupported(s) => write!(f, "unsupported: {s}"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "compression")]
            Error::Zlib => write!(f, "zlib stream is corrupt"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
