//! UDP liveness probing.
//!
//! Every monitored process runs a [`HealthResponder`]; the coordinator's
//! resurrecter calls [`probe`] against it. Any datagram counts as a probe and
//! any reply counts as proof of life.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info};
use tokio::net::{lookup_host, ToSocketAddrs, UdpSocket};
use tokio::time::timeout;

use super::NetworkError;
use crate::common::StopSignal;

pub const PROBE: &[u8] = b"ping";
pub const ACK: &[u8] = b"pong";

pub struct HealthResponder {
    socket: UdpSocket,
}

impl HealthResponder {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answer probes until `shutdown` fires.
    pub async fn run(self, shutdown: StopSignal) {
        if let Ok(addr) = self.socket.local_addr() {
            info!("Health responder listening on {addr}");
        }

        let mut buf = [0u8; 512];
        loop {
            let received = tokio::select! {
                _ = shutdown.stopped() => return,
                received = self.socket.recv_from(&mut buf) => received,
            };

            let from = match received {
                Ok((_, from)) => from,
                Err(e) => {
                    debug!("Health responder receive error: {e}");
                    continue;
                }
            };

            if let Err(e) = self.socket.send_to(ACK, from).await {
                debug!("Health responder could not answer {from}: {e}");
            }
        }
    }
}

/// Send one probe to `target` (`host:port`) and wait up to `wait` for any
/// reply. Name resolution counts against the same budget.
pub async fn probe(target: &str, wait: Duration) -> Result<(), NetworkError> {
    match timeout(wait, probe_once(target)).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout),
    }
}

async fn probe_once(target: &str) -> Result<(), NetworkError> {
    let connect_err = |source: io::Error| NetworkError::Connect {
        addr: target.to_string(),
        source,
    };

    let addr = lookup_host(target)
        .await
        .map_err(connect_err)?
        .next()
        .ok_or_else(|| connect_err(io::Error::new(io::ErrorKind::NotFound, "no address")))?;

    let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await.map_err(connect_err)?;
    socket.connect(addr).await.map_err(connect_err)?;
    socket.send(PROBE).await.map_err(NetworkError::Send)?;

    let mut buf = [0u8; 64];
    socket.recv(&mut buf).await.map_err(NetworkError::Recv)?;
    Ok(())
}
