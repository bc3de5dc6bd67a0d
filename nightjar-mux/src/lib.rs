//! Frame-delimited message multiplexing over a long-lived stream: newline
//! JSON framing with size caps, per-peer duplicate suppression, and
//! heartbeat liveness checking.

pub mod codec;
pub mod connection;
pub mod dedup;
pub mod error;
pub mod frame;
pub mod heartbeat;

pub use codec::FrameReader;
pub use connection::{CloseReason, ConnectionState, MuxConnection};
pub use dedup::DedupWindow;
pub use error::{MuxError, MuxResult};
pub use frame::MuxFrame;
pub use heartbeat::Heartbeat;
