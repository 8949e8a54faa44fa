use std::sync::Arc;

use log::{info, log, Level};
use tokio::task::JoinSet;
use tokio::time::sleep;

use super::state::Inner;
use super::{Message, Node, NodeState};
use crate::common::StopSignal;
use crate::resurrecter::Resurrecter;

impl Node {
    /// Take over as coordinator and tell every peer.
    pub(crate) async fn become_leader(self: &Arc<Self>) {
        {
            let mut inner = self.inner().lock().await;
            self.claim_leadership(&mut inner);
        }
        self.announce(Level::Warn).await;
    }

    /// Record this node as coordinator. The caller holds the state lock and
    /// broadcasts afterwards.
    pub(crate) fn claim_leadership(self: &Arc<Self>, inner: &mut Inner) {
        inner.set_state(NodeState::Coordinator);
        inner.leader = Some(self.id());

        if inner.tenure.is_none() {
            info!("Node {} is the coordinator", self.id());
            inner.tenure = Some(self.start_tenure());
        }
    }

    fn start_tenure(self: &Arc<Self>) -> StopSignal {
        let tenure = StopSignal::new();

        let resurrecter = Resurrecter::new(
            self.roster().clone(),
            self.config().health_port,
            *self.timeouts(),
            Arc::clone(self.restarter()),
            tenure.clone(),
        );
        tokio::spawn(resurrecter.run());

        let node = Arc::clone(self);
        let scope = tenure.clone();
        tokio::spawn(async move { node.announce_loop(scope).await });

        tenure
    }

    /// Re-broadcast the Coordinator message for as long as the tenure lasts.
    async fn announce_loop(self: Arc<Self>, tenure: StopSignal) {
        loop {
            tokio::select! {
                _ = tenure.stopped() => return,
                _ = self.shutdown_signal().stopped() => return,
                _ = sleep(self.timeouts().announce_interval()) => {}
            }

            // A coordinator re-running an election keeps its tenure but stays quiet.
            if self.state().await == NodeState::Coordinator {
                self.announce(Level::Debug).await;
            }
        }
    }

    /// Send a Coordinator message to every peer concurrently. Failures are
    /// logged at `level` and never retried.
    pub(crate) async fn announce(&self, level: Level) {
        let message = Message::coordinator(self.id());
        let mut sends = JoinSet::new();
        for peer in self.peers() {
            let peer = Arc::clone(peer);
            sends.spawn(async move {
                let result = peer.send(&message).await;
                (peer.id(), result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((peer_id, Err(e))) => {
                    log!(level, "Node {} could not announce to node {}: {}", self.id(), peer_id, e);
                }
                Err(e) => log!(level, "Announce task failed: {e}"),
            }
        }
    }
}
