//! Constants, identifiers, topic derivation and announcement tokens shared
//! by every component of the relay mesh.

pub mod constants;
pub mod error;
pub mod node_id;
pub mod token;
pub mod topic;

pub use error::{CoreError, CoreResult};
pub use node_id::NodeId;
pub use topic::Topic;
