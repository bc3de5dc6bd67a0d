//! Backoff scheduling and lifecycle management shared by the mesh
//! participant, relay server and relay bridge.

pub mod backoff;
pub mod error;
pub mod lifecycle;

pub use backoff::{backoff, has_exhausted_retries};
pub use error::{KernelError, KernelResult};
pub use lifecycle::{graceful_shutdown, Suspendable};
