use std::net::IpAddr;
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::codec::{read_frame, write_frame};
use super::NetworkError;
use crate::election::{Message, NodeId};

/// Outbound link to one remote node.
///
/// The link only ever carries requests from this node and the replies to
/// them; requests from the remote arrive on a separate inbound connection.
/// The connection is dialed on first use and dropped on any failure, so the
/// next call dials again. Failures are never retried here.
pub struct Peer {
    id: NodeId,
    addr: String,
    connect_timeout: Duration,
    link: Mutex<Option<TcpStream>>,
    last_remote: Mutex<Option<IpAddr>>,
}

impl Peer {
    pub fn new(id: NodeId, addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            id,
            addr: addr.into(),
            connect_timeout,
            link: Mutex::new(None),
            last_remote: Mutex::new(None),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn dial(&self) -> Result<TcpStream, NetworkError> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(NetworkError::Connect {
                    addr: self.addr.clone(),
                    source,
                })
            }
            Err(_) => return Err(NetworkError::ConnectTimeout(self.addr.clone())),
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY towards peer {}: {e}", self.id);
        }
        if let Ok(remote) = stream.peer_addr() {
            *self.last_remote.lock().await = Some(remote.ip());
        }

        debug!("Dialed peer {} at {}", self.id, self.addr);
        Ok(stream)
    }

    /// Send a message that expects no reply.
    pub async fn send(&self, message: &Message) -> Result<(), NetworkError> {
        let mut link = self.link.lock().await;
        let mut stream = match link.take() {
            Some(stream) => stream,
            None => self.dial().await?,
        };

        write_frame(&mut stream, message).await?;
        *link = Some(stream);
        Ok(())
    }

    /// Send a message and wait up to `wait` for the reply on the same link.
    ///
    /// The link stays locked for the whole exchange, so concurrent callers
    /// never read each other's replies. The stream is only put back once the
    /// exchange completes: a failed or cancelled request leaves the link
    /// empty, so a late reply can never be read as the answer to a later
    /// request.
    pub async fn request(&self, message: &Message, wait: Duration) -> Result<Message, NetworkError> {
        let mut link = self.link.lock().await;
        let mut stream = match link.take() {
            Some(stream) => stream,
            None => self.dial().await?,
        };

        write_frame(&mut stream, message).await?;
        let reply = match timeout(wait, read_frame::<_, Message>(&mut stream)).await {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => return Err(NetworkError::Closed),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(NetworkError::Timeout),
        };

        *link = Some(stream);
        Ok(reply)
    }

    /// Drop the connection, if any. Safe to call repeatedly.
    pub async fn close(&self) {
        if self.link.lock().await.take().is_some() {
            debug!("Closed link to peer {}", self.id);
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    /// IP of the last successfully dialed connection.
    pub async fn last_remote_ip(&self) -> Option<IpAddr> {
        *self.last_remote.lock().await
    }
}
