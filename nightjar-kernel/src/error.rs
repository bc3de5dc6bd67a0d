use displaydoc::Display;
use thiserror::Error;

/// Errors produced by lifecycle management.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// graceful shutdown did not complete within the configured grace period
    ShutdownDeadlineExceeded,
}

pub type KernelResult<T> = Result<T, KernelError>;
