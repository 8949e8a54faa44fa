use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::sleep;

use super::{Message, MessageKind, Node, NodeId, NodeState};
use crate::network::NetworkError;

impl Node {
    /// Apply a Coordinator message from `from`.
    pub(crate) async fn handle_coordinator(self: &Arc<Self>, from: NodeId) {
        if from == self.id() {
            warn!("Node {} received its own Coordinator message", self.id());
            return;
        }
        if from < self.id() {
            info!("Node {} contests the claim of lower node {}", self.id(), from);
            self.trigger_election();
            return;
        }

        let epoch = {
            let mut inner = self.inner().lock().await;
            let previous = inner.set_state(NodeState::Follower);
            if previous == NodeState::Coordinator {
                info!("Node {} yields coordinatorship to node {}", self.id(), from);
            }
            if inner.leader == Some(from) {
                return;
            }
            inner.adopt_leader(from)
        };

        info!("Node {} now follows coordinator {}", self.id(), from);
        let node = Arc::clone(self);
        tokio::spawn(async move { node.follow(from, epoch).await });
    }

    /// Heartbeat `leader` until it stops answering or a newer leader is adopted.
    async fn follow(self: Arc<Self>, leader: NodeId, epoch: u64) {
        let Some(peer) = self.peer(leader).cloned() else {
            warn!("Coordinator {} is not in the peer list, cannot heartbeat it", leader);
            return;
        };
        peer.close().await;

        loop {
            tokio::select! {
                _ = self.shutdown_signal().stopped() => return,
                _ = sleep(self.timeouts().ping_interval()) => {}
            }

            if !self.inner().lock().await.is_following(leader, epoch) {
                debug!("Node {} stops heartbeating former leader {}", self.id(), leader);
                return;
            }

            let err = match peer.request(&Message::ping(self.id()), self.timeouts().pong()).await {
                Ok(reply) if reply.kind == MessageKind::Pong => continue,
                Ok(reply) => {
                    warn!("Node {} got {} in answer to Ping", self.id(), reply);
                    continue;
                }
                Err(NetworkError::Decode(e)) => {
                    warn!("Node {} could not decode heartbeat reply from {}: {}", self.id(), leader, e);
                    continue;
                }
                Err(e) => e,
            };

            if self.shutdown_signal().is_triggered() || !self.forget_leader(leader, epoch).await {
                return;
            }

            if err.is_send_failure() {
                warn!("Node {} could not ping coordinator {}: {}", self.id(), leader, err);
            } else {
                warn!("Coordinator {} did not answer node {}: {}", leader, self.id(), err);
            }
            self.trigger_election();
            return;
        }
    }

    /// Drop `leader` if it is still the one this heartbeat loop was started
    /// for. Returns false when a newer leader has already been adopted.
    async fn forget_leader(&self, leader: NodeId, epoch: u64) -> bool {
        let mut inner = self.inner().lock().await;
        if !inner.is_following(leader, epoch) {
            return false;
        }
        inner.leader = None;
        inner.set_state(NodeState::Follower);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StopSignal;
    use crate::election::node::tests::{test_config, test_node, NoopRestarter};
    use crate::roster::Roster;
    use std::time::Duration;

    async fn settle(node: &Node, state: NodeState, leader: NodeId) {
        for _ in 0..200 {
            if node.status().await.state == state && node.current_leader().await == Some(leader) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("node {} never became {state} under {leader}", node.id());
    }

    #[tokio::test]
    async fn coordinator_from_higher_node_is_adopted() {
        let node = test_node(1, vec![(3, "127.0.0.1:1".to_string())]);
        node.handle_coordinator(3).await;

        let status = node.status().await;
        assert_eq!(status.state, NodeState::Follower);
        assert_eq!(status.leader, Some(3));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn coordinator_yields_to_higher_node() {
        let node = test_node(2, vec![(3, "127.0.0.1:1".to_string())]);
        let tenure = StopSignal::new();
        {
            let mut inner = node.inner().lock().await;
            inner.set_state(NodeState::Coordinator);
            inner.leader = Some(2);
            inner.tenure = Some(tenure.clone());
        }

        node.handle_coordinator(3).await;
        assert!(tenure.is_triggered());
        assert_eq!(node.state().await, NodeState::Follower);
        assert_eq!(node.current_leader().await, Some(3));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn lower_claim_is_contested() {
        let node = test_node(3, vec![(1, "127.0.0.1:1".to_string())]);
        node.handle_coordinator(1).await;

        // Node 3 has no higher peer, so contesting makes it coordinator.
        settle(&node, NodeState::Coordinator, 3).await;
        node.shutdown().await;
    }

    #[tokio::test]
    async fn unreachable_leader_is_forgotten() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let dead = listener.local_addr().expect("addr").to_string();
        drop(listener);

        let mut config = test_config(1);
        config.timeouts.ping_interval_ms = 20;
        let node = Node::with_peers(
            config,
            vec![(2, dead)],
            Roster::default(),
            Arc::new(NoopRestarter),
        )
        .expect("node");

        node.handle_coordinator(2).await;
        assert_eq!(node.current_leader().await, Some(2));

        // The heartbeat fails, the leader is dropped and node 1 re-elects;
        // with node 2 gone it ends up leading.
        settle(&node, NodeState::Coordinator, 1).await;
        node.shutdown().await;
    }

    #[tokio::test]
    async fn stale_epoch_is_not_forgotten() {
        let node = test_node(1, vec![(3, "127.0.0.1:1".to_string())]);
        let first = node.inner().lock().await.adopt_leader(3);
        let _second = node.inner().lock().await.adopt_leader(3);

        assert!(!node.forget_leader(3, first).await);
        assert_eq!(node.current_leader().await, Some(3));
    }
}
