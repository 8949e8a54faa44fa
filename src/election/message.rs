use std::fmt;

use serde::{Deserialize, Serialize};

use super::NodeId;

/// The closed set of coordination messages. Declaration order fixes the wire
/// tags: Election=0, Ok=1, Coordinator=2, Ping=3, Pong=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Election,
    Ok,
    Coordinator,
    Ping,
    Pong,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Election => "Election",
            MessageKind::Ok => "Ok",
            MessageKind::Coordinator => "Coordinator",
            MessageKind::Ping => "Ping",
            MessageKind::Pong => "Pong",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: NodeId,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(sender: NodeId, kind: MessageKind) -> Self {
        Self { sender, kind }
    }

    pub fn election(sender: NodeId) -> Self {
        Self::new(sender, MessageKind::Election)
    }

    pub fn ok(sender: NodeId) -> Self {
        Self::new(sender, MessageKind::Ok)
    }

    pub fn coordinator(sender: NodeId) -> Self {
        Self::new(sender, MessageKind::Coordinator)
    }

    pub fn ping(sender: NodeId) -> Self {
        Self::new(sender, MessageKind::Ping)
    }

    pub fn pong(sender: NodeId) -> Self {
        Self::new(sender, MessageKind::Pong)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from node {}", self.kind, self.sender)
    }
}
