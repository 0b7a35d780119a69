use thiserror::Error;

/// Errors returned by packet and ledger codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The byte stream ended before a fixed field or a declared-length
    /// variable field could be read in full.
    #[error("truncated frame: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    /// A field decoded to a value outside its defined range (e.g. an
    /// unrecognized packet type byte).
    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}

impl CodecError {
    pub(crate) fn truncated(expected: usize, got: usize) -> Self {
        Self::Truncated { expected, got }
    }
}
