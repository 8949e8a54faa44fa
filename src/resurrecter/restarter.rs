use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum RestartError {
    #[error("Could not run restart command for {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Restart of {name} exited with {status}: {stderr}")]
    Failed {
        name: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Restart command is empty")]
    EmptyCommand,
}

/// Brings a monitored process back to life.
#[async_trait]
pub trait Restarter: Send + Sync {
    async fn restart(&self, name: &str) -> Result<(), RestartError>;
}

/// Restarts a process by running an external command with the process name
/// as its last argument, `docker start <name>` by default.
#[derive(Debug, Clone)]
pub struct CommandRestarter {
    program: String,
    args: Vec<String>,
}

impl CommandRestarter {
    pub fn new(command: &[String]) -> Result<Self, RestartError> {
        let (program, args) = command.split_first().ok_or(RestartError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(RestartError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Restarter for CommandRestarter {
    async fn restart(&self, name: &str) -> Result<(), RestartError> {
        debug!("Running {} {:?} {}", self.program, self.args, name);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(name)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RestartError::Spawn {
                name: name.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(RestartError::Failed {
                name: name.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
