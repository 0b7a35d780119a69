use thiserror::Error;

/// Shared lightweight error type for core primitive operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid caller input or malformed primitive value.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A node id appears where it is not a member of the route it was
    /// expected to be found in.
    #[error("node {0} not present in route")]
    NodeNotInRoute(u8),
}
