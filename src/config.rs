use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::election::NodeId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_id: NodeId,
    /// Node names are `<name_prefix>-<node_id>`; roster rows with that shape are peers.
    pub name_prefix: String,
    pub roster_path: PathBuf,
    pub bind_host: String,
    pub coordination_port: u16,
    pub health_port: u16,
    /// Program and leading arguments used to restart a process; its name is appended.
    pub restart_command: Vec<String>,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: 1,
            name_prefix: "reviver".to_string(),
            roster_path: PathBuf::from("name_ip.csv"),
            bind_host: "0.0.0.0".to_string(),
            coordination_port: 8000,
            health_port: 8080,
            restart_command: vec!["docker".to_string(), "start".to_string()],
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Load a config file. Fields missing from the file keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn node_name(&self) -> String {
        format!("{}-{}", self.name_prefix, self.node_id)
    }

    pub fn coordination_bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.coordination_port)
    }

    pub fn health_bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.health_port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id == 0 {
            return Err(ConfigError::Invalid("node id must be positive".to_string()));
        }
        if self.name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("name prefix is empty".to_string()));
        }
        if self.restart_command.is_empty() || self.restart_command[0].trim().is_empty() {
            return Err(ConfigError::Invalid("restart command is empty".to_string()));
        }
        self.timeouts.validate()
    }
}

/// Protocol timing constants, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub election_ms: u64,
    pub ok_response_ms: u64,
    pub pong_ms: u64,
    pub ping_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_interval_ms: u64,
    pub probe_retries: u32,
    pub restart_cooldown_ms: u64,
    pub connect_ms: u64,
    pub announce_interval_ms: u64,
    pub boot_delay_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            election_ms: 2000,
            ok_response_ms: 1000,
            pong_ms: 1200,
            ping_interval_ms: 400,
            probe_timeout_ms: 200,
            probe_interval_ms: 400,
            probe_retries: 2,
            restart_cooldown_ms: 2000,
            connect_ms: 1000,
            announce_interval_ms: 1000,
            boot_delay_ms: 2000,
        }
    }
}

impl Timeouts {
    pub fn election(&self) -> Duration {
        Duration::from_millis(self.election_ms)
    }

    pub fn ok_response(&self) -> Duration {
        Duration::from_millis(self.ok_response_ms)
    }

    pub fn pong(&self) -> Duration {
        Duration::from_millis(self.pong_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    pub fn boot_delay(&self) -> Duration {
        Duration::from_millis(self.boot_delay_ms)
    }

    /// How long a node that received an Ok waits for the Coordinator message
    /// before electing again.
    pub fn coordinator_wait(&self) -> Duration {
        self.election() + self.ok_response()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("election", self.election_ms),
            ("ok_response", self.ok_response_ms),
            ("pong", self.pong_ms),
            ("ping_interval", self.ping_interval_ms),
            ("probe_timeout", self.probe_timeout_ms),
            ("probe_interval", self.probe_interval_ms),
            ("connect", self.connect_ms),
            ("announce_interval", self.announce_interval_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} timeout must be positive")));
            }
        }

        if self.ok_response_ms >= self.election_ms {
            return Err(ConfigError::Invalid(format!(
                "ok_response ({}ms) must be shorter than election ({}ms)",
                self.ok_response_ms, self.election_ms
            )));
        }

        if self.announce_interval() >= self.coordinator_wait() {
            return Err(ConfigError::Invalid(format!(
                "announce_interval ({}ms) must be shorter than election + ok_response ({}ms)",
                self.announce_interval_ms,
                self.coordinator_wait().as_millis()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_default_values_are_sensible() {
        let cfg = Config::default();
        assert_eq!(cfg.node_id, 1);
        assert_eq!(cfg.node_name(), "reviver-1");
        assert_eq!(cfg.coordination_bind_addr(), "0.0.0.0:8000");
        assert_eq!(cfg.health_bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.restart_command, vec!["docker", "start"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_timeouts_match_protocol_constants() {
        let t = Timeouts::default();
        assert_eq!(t.election(), Duration::from_secs(2));
        assert_eq!(t.ok_response(), Duration::from_millis(1000));
        assert_eq!(t.pong(), Duration::from_millis(1200));
        assert_eq!(t.ping_interval(), Duration::from_millis(400));
        assert_eq!(t.probe_retries, 2);
        assert_eq!(t.coordinator_wait(), Duration::from_secs(3));
    }

    #[test]
    fn validate_rejects_zero_id_and_empty_command() {
        let cfg = Config {
            node_id: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = Config {
            restart_command: vec![],
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_ok_wait_not_shorter_than_election() {
        let t = Timeouts {
            ok_response_ms: 2000,
            ..Timeouts::default()
        };
        let err = t.validate().unwrap_err();
        assert!(format!("{err}").contains("ok_response"));
    }

    #[test]
    fn validate_rejects_slow_announcements() {
        let t = Timeouts {
            announce_interval_ms: 5000,
            ..Timeouts::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn from_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{"node_id": 3, "health_port": 9090, "timeouts": {{"election_ms": 500, "ok_response_ms": 100, "announce_interval_ms": 200}}}}"#
        )
        .expect("write config");

        let cfg = Config::from_file(file.path()).expect("load config");
        assert_eq!(cfg.node_id, 3);
        assert_eq!(cfg.health_port, 9090);
        assert_eq!(cfg.coordination_port, 8000);
        assert_eq!(cfg.timeouts.election_ms, 500);
        assert_eq!(cfg.timeouts.pong_ms, 1200);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn from_file_reports_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "{{ not json").expect("write config");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
