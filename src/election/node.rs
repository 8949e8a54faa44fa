use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::sleep;

use super::state::Inner;
use super::{ElectionError, Message, MessageKind, NodeId, NodeState, NodeStatus};
use crate::common::StopSignal;
use crate::config::{Config, Timeouts};
use crate::network::Peer;
use crate::resurrecter::Restarter;
use crate::roster::Roster;

/// One coordination node.
///
/// A node is always both a server (answering requests on inbound
/// connections) and a client (sending its own requests through its [`Peer`]
/// links); the two roles never share a connection.
pub struct Node {
    id: NodeId,
    config: Config,
    peers: Vec<Arc<Peer>>,
    roster: Roster,
    restarter: Arc<dyn Restarter>,
    inner: Mutex<Inner>,
    election_lock: Mutex<()>,
    in_election: AtomicBool,
    shutdown: StopSignal,
}

/// Clears the in-election flag when an election attempt ends, however it ends.
struct ElectionFlag<'a>(&'a AtomicBool);

impl Drop for ElectionFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Node {
    /// Build a node whose peers are the roster's `<prefix>-<id>` entries.
    pub fn new(
        config: Config,
        roster: Roster,
        restarter: Arc<dyn Restarter>,
    ) -> Result<Arc<Self>, ElectionError> {
        let peers = roster
            .revivers(&config.name_prefix)
            .map(|(id, entry)| (id, entry.endpoint(config.coordination_port)))
            .collect();
        Self::with_peers(config, peers, roster, restarter)
    }

    /// Load the roster named by `config` and build the node from it.
    pub fn load(config: Config, restarter: Arc<dyn Restarter>) -> Result<Arc<Self>, ElectionError> {
        config.validate()?;
        let roster = Roster::load(&config.roster_path, &config.node_name())?;
        Self::new(config, roster, restarter)
    }

    /// Build a node with an explicit peer set of `(id, host:port)` pairs.
    pub fn with_peers(
        config: Config,
        peers: Vec<(NodeId, String)>,
        roster: Roster,
        restarter: Arc<dyn Restarter>,
    ) -> Result<Arc<Self>, ElectionError> {
        config.validate()?;

        let mut seen = BTreeSet::new();
        for (id, _) in &peers {
            if *id == config.node_id {
                return Err(ElectionError::InvalidPeer(format!(
                    "peer list contains this node's own id {id}"
                )));
            }
            if *id == 0 {
                return Err(ElectionError::InvalidPeer("peer id 0 is not allowed".to_string()));
            }
            if !seen.insert(*id) {
                return Err(ElectionError::InvalidPeer(format!("duplicate peer id {id}")));
            }
        }

        let connect = config.timeouts.connect();
        let mut peers: Vec<Arc<Peer>> = peers
            .into_iter()
            .map(|(id, addr)| Arc::new(Peer::new(id, addr, connect)))
            .collect();
        peers.sort_by_key(|p| p.id());

        Ok(Arc::new(Self {
            id: config.node_id,
            config,
            peers,
            roster,
            restarter,
            inner: Mutex::new(Inner::new()),
            election_lock: Mutex::new(()),
            in_election: AtomicBool::new(false),
            shutdown: StopSignal::new(),
        }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn timeouts(&self) -> &Timeouts {
        &self.config.timeouts
    }

    pub fn peer_ids(&self) -> Vec<NodeId> {
        self.peers.iter().map(|p| p.id()).collect()
    }

    pub(crate) fn peers(&self) -> &[Arc<Peer>] {
        &self.peers
    }

    pub(crate) fn peer(&self, id: NodeId) -> Option<&Arc<Peer>> {
        self.peers.iter().find(|p| p.id() == id)
    }

    pub(crate) fn roster(&self) -> &Roster {
        &self.roster
    }

    pub(crate) fn restarter(&self) -> &Arc<dyn Restarter> {
        &self.restarter
    }

    pub(crate) fn inner(&self) -> &Mutex<Inner> {
        &self.inner
    }

    pub fn shutdown_signal(&self) -> &StopSignal {
        &self.shutdown
    }

    pub async fn state(&self) -> NodeState {
        self.inner.lock().await.state
    }

    pub async fn current_leader(&self) -> Option<NodeId> {
        self.inner.lock().await.leader
    }

    pub async fn status(&self) -> NodeStatus {
        let inner = self.inner.lock().await;
        NodeStatus {
            id: self.id,
            state: inner.state,
            leader: inner.leader,
        }
    }

    pub fn in_election(&self) -> bool {
        self.in_election.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Bind the coordination listener on the configured host and port.
    pub async fn bind(&self) -> Result<TcpListener, ElectionError> {
        let addr = self.config.coordination_bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        Ok(listener)
    }

    /// Serve inbound peer traffic on `listener` and hold the boot election
    /// after the configured delay. Returns once the node shuts down.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        info!(
            "Running node {} with {} peers and {} monitored processes",
            self.id,
            self.peers.len(),
            self.roster.len()
        );

        let boot = {
            let node = Arc::clone(&self);
            tokio::spawn(async move {
                tokio::select! {
                    _ = node.shutdown.stopped() => {}
                    _ = sleep(node.timeouts().boot_delay()) => {
                        node.trigger_election();
                    }
                }
            })
        };

        self.serve(listener).await;
        boot.abort();
    }

    /// Stop every loop of this node and drop all outbound links.
    pub async fn shutdown(&self) {
        info!("Shutting down node {}", self.id);
        self.shutdown.trigger();
        self.inner.lock().await.end_tenure();
        for peer in &self.peers {
            peer.close().await;
        }
    }

    /// Start an election in the background unless one is already under way.
    /// Returns whether a new election was started.
    pub fn trigger_election(self: &Arc<Self>) -> bool {
        if self.shutdown.is_triggered() {
            return false;
        }
        if self.in_election.swap(true, Ordering::SeqCst) {
            debug!("Node {} is already running an election", self.id);
            return false;
        }

        let node = Arc::clone(self);
        tokio::spawn(async move { node.start_election().await });
        true
    }

    async fn start_election(self: Arc<Self>) {
        let _serial = self.election_lock.lock().await;
        self.in_election.store(true, Ordering::SeqCst);
        let _flag = ElectionFlag(&self.in_election);

        let round = {
            let mut inner = self.inner.lock().await;
            inner.set_state(NodeState::Candidate);
            inner.election_round += 1;
            inner.election_round
        };

        let higher: Vec<Arc<Peer>> = self
            .peers
            .iter()
            .filter(|p| p.id() > self.id)
            .cloned()
            .collect();

        if higher.is_empty() {
            info!("Node {} has no higher peer, taking over", self.id);
            self.become_leader().await;
            return;
        }

        info!(
            "Node {} starting election against {:?}",
            self.id,
            higher.iter().map(|p| p.id()).collect::<Vec<_>>()
        );

        let mut waits = JoinSet::new();
        for peer in higher {
            let request = Message::election(self.id);
            let wait = self.timeouts().ok_response();
            waits.spawn(async move {
                let reply = peer.request(&request, wait).await;
                (peer.id(), reply)
            });
        }

        let deadline = sleep(self.timeouts().election());
        tokio::pin!(deadline);

        let answered = loop {
            tokio::select! {
                _ = self.shutdown.stopped() => return,
                _ = &mut deadline => break false,
                joined = waits.join_next() => match joined {
                    None => break false,
                    Some(Ok((peer_id, Ok(reply)))) if reply.kind == MessageKind::Ok => {
                        debug!("Node {} got Ok from node {}", self.id, peer_id);
                        break true;
                    }
                    Some(Ok((peer_id, Ok(reply)))) => {
                        warn!("Node {} ignoring {} in answer to Election sent to {}", self.id, reply, peer_id);
                    }
                    Some(Ok((peer_id, Err(e)))) => {
                        debug!("Node {} got no Ok from node {}: {}", self.id, peer_id, e);
                    }
                    Some(Err(e)) => {
                        warn!("Election wait task failed: {e}");
                    }
                },
            }
        };
        // Outstanding Ok waits are moot once the attempt is decided.
        waits.abort_all();

        let mut inner = self.inner.lock().await;
        if inner.state != NodeState::Candidate {
            debug!(
                "Node {} election superseded, now {} following {:?}",
                self.id, inner.state, inner.leader
            );
            return;
        }

        if answered {
            inner.set_state(NodeState::WaitingCoordinator);
            drop(inner);
            info!("Node {} waiting for a Coordinator message", self.id);
            self.wait_for_coordinator(round);
        } else {
            info!("Node {} heard no Ok from any higher peer", self.id);
            self.claim_leadership(&mut inner);
            drop(inner);
            self.announce(log::Level::Warn).await;
        }
    }

    /// Re-elect if no Coordinator message arrives in time for this round.
    fn wait_for_coordinator(self: &Arc<Self>, round: u64) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = node.shutdown.stopped() => return,
                _ = sleep(node.timeouts().coordinator_wait()) => {}
            }

            let still_waiting = {
                let inner = node.inner.lock().await;
                inner.state == NodeState::WaitingCoordinator && inner.election_round == round
            };
            if still_waiting {
                warn!("Node {} got no Coordinator message, electing again", node.id);
                node.trigger_election();
            }
        });
    }
}
