// Coordination
pub mod election;
pub mod network;

// Supervision
pub mod resurrecter;
pub mod roster;

pub mod common;
pub mod config;

// Public exports
pub use config::{Config, Timeouts};
pub use election::{Message, MessageKind, Node, NodeId, NodeState, NodeStatus};
pub use resurrecter::{CommandRestarter, Restarter, Resurrecter};
pub use roster::{Roster, RosterEntry};
