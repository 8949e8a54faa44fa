use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use super::NodeId;
use crate::common::StopSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Follower,
    Candidate,
    WaitingCoordinator,
    Coordinator,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Follower => "Follower",
            NodeState::Candidate => "Candidate",
            NodeState::WaitingCoordinator => "WaitingCoordinator",
            NodeState::Coordinator => "Coordinator",
        };
        f.write_str(name)
    }
}

/// A copy of a node's coordination state at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub id: NodeId,
    pub state: NodeState,
    pub leader: Option<NodeId>,
}

/// Mutable coordination state, only ever touched under the node's state lock.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) state: NodeState,
    pub(crate) leader: Option<NodeId>,
    /// Bumped whenever a leader is adopted; a heartbeat loop only acts while
    /// the epoch it was started with is current.
    pub(crate) follow_epoch: u64,
    /// Bumped at the start of every election attempt.
    pub(crate) election_round: u64,
    /// Scope of the running resurrecter while this node is coordinator.
    pub(crate) tenure: Option<StopSignal>,
}

impl Inner {
    pub(crate) fn new() -> Self {
        Self {
            state: NodeState::Follower,
            leader: None,
            follow_epoch: 0,
            election_round: 0,
            tenure: None,
        }
    }

    /// Move to `state` and return the previous one. Becoming a follower or
    /// waiting for a coordinator ends any coordinator tenure immediately; a
    /// coordinator that re-runs an election keeps its tenure until the
    /// election resolves.
    pub(crate) fn set_state(&mut self, state: NodeState) -> NodeState {
        if matches!(state, NodeState::Follower | NodeState::WaitingCoordinator) {
            self.end_tenure();
        }
        std::mem::replace(&mut self.state, state)
    }

    pub(crate) fn end_tenure(&mut self) -> bool {
        match self.tenure.take() {
            Some(tenure) => {
                info!("Coordinator tenure ended, stopping resurrecter");
                tenure.trigger();
                true
            }
            None => false,
        }
    }

    pub(crate) fn adopt_leader(&mut self, leader: NodeId) -> u64 {
        self.leader = Some(leader);
        self.follow_epoch += 1;
        self.follow_epoch
    }

    pub(crate) fn is_following(&self, leader: NodeId, epoch: u64) -> bool {
        self.leader == Some(leader) && self.follow_epoch == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_follower_without_leader() {
        let inner = Inner::new();
        assert_eq!(inner.state, NodeState::Follower);
        assert_eq!(inner.leader, None);
        assert!(inner.tenure.is_none());
    }

    #[test]
    fn candidate_keeps_tenure_but_follower_ends_it() {
        let mut inner = Inner::new();
        let tenure = StopSignal::new();
        inner.tenure = Some(tenure.clone());
        inner.set_state(NodeState::Coordinator);

        let previous = inner.set_state(NodeState::Candidate);
        assert_eq!(previous, NodeState::Coordinator);
        assert!(!tenure.is_triggered());

        inner.set_state(NodeState::Follower);
        assert!(tenure.is_triggered());
        assert!(inner.tenure.is_none());
    }

    #[test]
    fn waiting_for_coordinator_ends_tenure() {
        let mut inner = Inner::new();
        let tenure = StopSignal::new();
        inner.tenure = Some(tenure.clone());

        inner.set_state(NodeState::WaitingCoordinator);
        assert!(tenure.is_triggered());
        assert!(!inner.end_tenure());
    }

    #[test]
    fn adopting_a_leader_starts_a_new_epoch() {
        let mut inner = Inner::new();
        let first = inner.adopt_leader(3);
        assert!(inner.is_following(3, first));

        let second = inner.adopt_leader(3);
        assert_ne!(first, second);
        assert!(!inner.is_following(3, first));
        assert!(inner.is_following(3, second));
        assert!(!inner.is_following(2, second));
    }

    #[test]
    fn state_display_names() {
        assert_eq!(NodeState::WaitingCoordinator.to_string(), "WaitingCoordinator");
        assert_eq!(NodeState::Coordinator.to_string(), "Coordinator");
    }
}
