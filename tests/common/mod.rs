#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use reviver::resurrecter::RestartError;
use reviver::{Config, Node, NodeId, NodeState, Restarter, Roster, Timeouts};

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        election_ms: 300,
        ok_response_ms: 150,
        pong_ms: 200,
        ping_interval_ms: 60,
        probe_timeout_ms: 30,
        probe_interval_ms: 30,
        probe_retries: 1,
        restart_cooldown_ms: 400,
        connect_ms: 200,
        announce_interval_ms: 100,
        boot_delay_ms: 0,
    }
}

pub fn config(id: NodeId, timeouts: Timeouts) -> Config {
    Config {
        node_id: id,
        bind_host: "127.0.0.1".to_string(),
        timeouts,
        ..Config::default()
    }
}

#[derive(Default)]
pub struct CountingRestarter {
    calls: AtomicUsize,
    names: std::sync::Mutex<Vec<String>>,
}

impl CountingRestarter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().expect("names lock").clone()
    }
}

#[async_trait]
impl Restarter for CountingRestarter {
    async fn restart(&self, name: &str) -> Result<(), RestartError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().expect("names lock").push(name.to_string());
        Ok(())
    }
}

pub struct RunningNode {
    pub node: Arc<Node>,
    handle: JoinHandle<()>,
}

pub async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    (listener, addr)
}

pub fn spawn_node(
    config: Config,
    listener: TcpListener,
    peers: Vec<(NodeId, String)>,
    roster: Roster,
    restarter: Arc<dyn Restarter>,
) -> RunningNode {
    let node = Node::with_peers(config, peers, roster, restarter).expect("node");
    let handle = tokio::spawn(Arc::clone(&node).run(listener));
    RunningNode { node, handle }
}

/// Nodes that reach each other directly.
pub struct Cluster {
    pub nodes: Vec<RunningNode>,
}

impl Cluster {
    pub async fn start(ids: &[NodeId]) -> Self {
        let mut bound = Vec::new();
        for id in ids {
            let (listener, addr) = listener().await;
            bound.push((*id, listener, addr));
        }
        let addrs: Vec<(NodeId, SocketAddr)> = bound.iter().map(|(id, _, addr)| (*id, *addr)).collect();

        let nodes = bound
            .into_iter()
            .map(|(id, listener, _)| {
                let peers = addrs
                    .iter()
                    .filter(|(peer, _)| *peer != id)
                    .map(|(peer, addr)| (*peer, addr.to_string()))
                    .collect();
                spawn_node(
                    config(id, fast_timeouts()),
                    listener,
                    peers,
                    Roster::default(),
                    Arc::new(CountingRestarter::default()),
                )
            })
            .collect();

        Self { nodes }
    }

    pub fn node(&self, id: NodeId) -> &Arc<Node> {
        &self
            .nodes
            .iter()
            .find(|n| n.node.id() == id)
            .expect("node in cluster")
            .node
    }

    pub async fn stop(&self, id: NodeId) {
        self.node(id).shutdown().await;
    }

    pub async fn shutdown(self) {
        for running in &self.nodes {
            running.node.shutdown().await;
        }
        for running in self.nodes {
            let _ = tokio::time::timeout(Duration::from_secs(1), running.handle).await;
        }
    }
}

/// Ids of the nodes among `nodes` currently in the Coordinator state.
pub async fn coordinators(nodes: &[&Arc<Node>]) -> Vec<NodeId> {
    let mut ids = Vec::new();
    for node in nodes {
        if node.state().await == NodeState::Coordinator {
            ids.push(node.id());
        }
    }
    ids
}

/// Wait until exactly `leader` is coordinator among `nodes` and every other
/// node follows it.
pub async fn settle_on(nodes: &[&Arc<Node>], leader: NodeId, within: Duration) {
    let deadline = Instant::now() + within;
    loop {
        let mut settled = coordinators(nodes).await == vec![leader];
        for node in nodes {
            settled &= node.current_leader().await == Some(leader);
        }
        if settled {
            return;
        }
        if Instant::now() > deadline {
            let mut statuses = Vec::new();
            for node in nodes {
                statuses.push(node.status().await);
            }
            panic!("cluster did not settle on node {leader}: {statuses:?}");
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// A TCP forwarder standing in for the network between two nodes. Cutting it
/// drops every forwarded connection and refuses new ones until healed.
pub struct Relay {
    addr: SocketAddr,
    cut: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Relay {
    pub async fn start(target: SocketAddr) -> Self {
        let (listener, addr) = listener().await;
        let (cut, _) = watch::channel(false);
        let state = cut.subscribe();

        let task = tokio::spawn(async move {
            loop {
                let Ok((mut inbound, _)) = listener.accept().await else {
                    continue;
                };
                if *state.borrow() {
                    drop(inbound);
                    continue;
                }

                let mut cut = state.clone();
                tokio::spawn(async move {
                    let Ok(mut outbound) = TcpStream::connect(target).await else {
                        return;
                    };
                    tokio::select! {
                        _ = copy_bidirectional(&mut inbound, &mut outbound) => {}
                        _ = cut.wait_for(|cut| *cut) => {}
                    }
                });
            }
        });

        Self { addr, cut, task }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub fn cut(&self) {
        self.cut.send_replace(true);
    }

    pub fn heal(&self) {
        self.cut.send_replace(false);
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}
