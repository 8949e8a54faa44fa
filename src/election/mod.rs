//! Bully-style coordinator election.
//!
//! Every node holds one [`Node`]. Elections are decided by node id: a node
//! asks every higher-id peer to take over and claims coordinatorship itself
//! only when none of them answers in time.

mod error;
mod follower;
mod leader;
mod message;
mod node;
mod server;
mod state;

pub use error::ElectionError;
pub use message::{Message, MessageKind};
pub use node::Node;
pub use state::{NodeState, NodeStatus};

/// Node ids are positive; a higher id wins an election.
pub type NodeId = u32;
