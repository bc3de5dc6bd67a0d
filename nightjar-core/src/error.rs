use displaydoc::Display;
use thiserror::Error;

/// Errors produced by the pure topic/token primitives.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// workspace id must not be empty
    EmptyWorkspaceId,
    /// hex string had an invalid length or contained non-hex characters
    InvalidHex,
}

pub type CoreResult<T> = Result<T, CoreError>;
