use thiserror::Error;

/// A parser `Result`, conveniently wrapping [`ParserError`].
pub type Result<T> = std::result::Result<T, ParserError>;

#[derive(Error, Debug)]
/// Errors which can occur while constructing a [`crate::state::ParseState`].
///
/// These are the only failures this crate ever returns from a function call;
/// everything encountered once parsing is underway (bad framing, bad
/// checksums, buffer overflow) is reported to the caller's diagnostic sinks
/// and recovered from locally, per the parser's error taxonomy.
pub enum ParserError {
    #[error("parser table must contain at least one protocol")]
    EmptyParserTable,
    #[error("parser name must not be empty")]
    EmptyName,
    #[error(
        "buffer too small: need at least {required} bytes to hold one payload byte plus overhead, got {supplied}"
    )]
    BufferTooSmall { required: usize, supplied: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
