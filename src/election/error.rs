use thiserror::Error;

use crate::config::ConfigError;
use crate::roster::RosterError;

/// Startup failures. Nothing that happens after a node is running is
/// reported through this type.
#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid peer: {0}")]
    InvalidPeer(String),
}
