use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};

use super::{Message, MessageKind, Node};
use crate::network::codec::{read_frame, write_frame};

impl Node {
    /// Accept inbound peer connections until shutdown.
    pub(crate) async fn serve(self: &Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("Node {} listening on {addr}", self.id());
        }

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown_signal().stopped() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, remote)) => {
                    debug!("Node {} accepted connection from {remote}", self.id());
                    let node = Arc::clone(self);
                    tokio::spawn(async move { node.serve_connection(stream, remote).await });
                }
                Err(e) => warn!("Node {} failed to accept a connection: {e}", self.id()),
            }
        }

        info!("Node {} stopped listening", self.id());
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream, remote: SocketAddr) {
        let (mut reader, mut writer) = stream.into_split();

        loop {
            let frame = tokio::select! {
                _ = self.shutdown_signal().stopped() => break,
                frame = read_frame::<_, Message>(&mut reader) => frame,
            };

            let message = match frame {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("Connection from {remote} closed");
                    break;
                }
                Err(e) => {
                    warn!("Dropping connection from {remote}: {e}");
                    break;
                }
            };

            if let Some(reply) = self.handle_message(message).await {
                if let Err(e) = write_frame(&mut writer, &reply).await {
                    debug!("Could not reply to {remote}: {e}");
                    break;
                }
            }
        }

        self.release_peer(remote.ip()).await;
    }

    /// Dispatch one inbound message and return the reply to send, if any.
    pub(crate) async fn handle_message(self: &Arc<Self>, message: Message) -> Option<Message> {
        debug!("Node {} received {}", self.id(), message);

        match message.kind {
            MessageKind::Election => {
                self.trigger_election();
                Some(Message::ok(self.id()))
            }
            MessageKind::Coordinator => {
                self.handle_coordinator(message.sender).await;
                None
            }
            MessageKind::Ping => Some(Message::pong(self.id())),
            MessageKind::Ok | MessageKind::Pong => {
                warn!("Node {} ignoring unsolicited {}", self.id(), message);
                None
            }
        }
    }

    /// The remote at `ip` went away; drop our outbound link to it so the next
    /// request dials a fresh connection.
    async fn release_peer(&self, ip: IpAddr) {
        for peer in self.peers() {
            if peer.last_remote_ip().await == Some(ip) {
                debug!("Releasing link to node {} after inbound close", peer.id());
                peer.close().await;
                return;
            }
        }
    }
}
