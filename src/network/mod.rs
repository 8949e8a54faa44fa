mod error;

pub mod codec;
pub mod health;
pub mod peer;

pub use error::NetworkError;
pub use health::{probe, HealthResponder};
pub use peer::Peer;
