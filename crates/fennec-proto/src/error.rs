//! Wire format errors.

use thiserror::Error;

/// Error produced while reading or writing DNS wire format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("buffer too short: need {needed} bytes, have {have}")]
    BufferTooShort { needed: usize, have: usize },

    #[error("label exceeds 63 octets ({0})")]
    LabelTooLong(usize),

    #[error("name exceeds 255 octets ({0})")]
    NameTooLong(usize),

    #[error("bad compression pointer at offset {0}")]
    BadPointer(usize),

    #[error("compression pointer loop detected")]
    PointerLoop,

    #[error("record data length {len} overruns the message")]
    BadRdataLength { len: usize },

    #[error("empty label in name")]
    EmptyLabel,

    #[error("invalid text data: {0}")]
    InvalidText(String),
}

/// Result type for wire format operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand used by the reader when a read would pass the end of input.
    pub(crate) fn eof(at: usize) -> Self {
        Self::UnexpectedEof(at)
    }
}
