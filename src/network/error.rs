use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection error: could not reach {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection error: timed out dialing {0}")]
    ConnectTimeout(String),

    #[error("Send error: {0}")]
    Send(#[source] io::Error),

    #[error("Receive error: {0}")]
    Recv(#[source] io::Error),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),

    #[error("Stream closed by peer")]
    Closed,

    #[error("Timeout error")]
    Timeout,
}

impl NetworkError {
    /// True when the request never made it onto the wire: the peer could not
    /// be dialed or the frame could not be written.
    pub fn is_send_failure(&self) -> bool {
        matches!(
            self,
            NetworkError::Connect { .. }
                | NetworkError::ConnectTimeout(_)
                | NetworkError::Send(_)
                | NetworkError::Encode(_)
        )
    }
}
