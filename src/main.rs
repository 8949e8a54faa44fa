use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use reviver::common::StopSignal;
use reviver::network::{probe, HealthResponder};
use reviver::{CommandRestarter, Config, Node};

#[derive(Parser)]
#[command(name = "reviver")]
#[command(about = "Coordinator election and process resurrection for a fleet of workers")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "REVIVER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a reviver node
    Run(RunArgs),

    /// Probe a health responder once; exits non-zero if it does not answer
    Probe {
        /// host:port of the health responder
        #[arg(short, long)]
        target: String,

        /// How long to wait for the answer
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// JSON config file; flags override its values
    #[arg(short, long, env = "REVIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Id of this node; its name is <prefix>-<id>
    #[arg(short, long, env = "REVIVER_ID")]
    id: Option<u32>,

    /// Node name prefix
    #[arg(long, env = "REVIVER_NAME_PREFIX")]
    name_prefix: Option<String>,

    /// CSV file of `name,address` rows for every monitored process
    #[arg(short, long, env = "REVIVER_ROSTER")]
    roster: Option<PathBuf>,

    /// Host to bind both listeners on
    #[arg(long, env = "REVIVER_BIND_HOST")]
    bind_host: Option<String>,

    /// TCP port for election traffic
    #[arg(long, env = "REVIVER_PORT")]
    port: Option<u16>,

    /// UDP port of the health responders
    #[arg(long, env = "REVIVER_HEALTH_PORT")]
    health_port: Option<u16>,

    /// Restart command, e.g. "docker start"; the process name is appended
    #[arg(long, env = "REVIVER_RESTART_COMMAND")]
    restart_command: Option<String>,
}

impl RunArgs {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(id) = self.id {
            config.node_id = id;
        }
        if let Some(prefix) = self.name_prefix {
            config.name_prefix = prefix;
        }
        if let Some(roster) = self.roster {
            config.roster_path = roster;
        }
        if let Some(host) = self.bind_host {
            config.bind_host = host;
        }
        if let Some(port) = self.port {
            config.coordination_port = port;
        }
        if let Some(port) = self.health_port {
            config.health_port = port;
        }
        if let Some(command) = self.restart_command {
            config.restart_command = command.split_whitespace().map(String::from).collect();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

async fn run_node(args: RunArgs) -> anyhow::Result<()> {
    let config = args.into_config()?;
    let name = config.node_name();
    info!("Starting {name}");

    let restarter = Arc::new(CommandRestarter::new(&config.restart_command)?);

    let health_addr = config.health_bind_addr();
    let node = Node::load(config, restarter)?;
    let listener = node.bind().await?;

    let responder = HealthResponder::bind(&health_addr)
        .await
        .with_context(|| format!("binding health responder on {health_addr}"))?;
    let responder_stop: StopSignal = node.shutdown_signal().clone();
    tokio::spawn(responder.run(responder_stop));

    let running = tokio::spawn(Arc::clone(&node).run(listener));

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down {name}");
    node.shutdown().await;
    running.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Run(args) => run_node(args).await,
        Command::Probe { target, timeout_ms } => {
            match probe(&target, Duration::from_millis(timeout_ms)).await {
                Ok(()) => {
                    info!("{target} is alive");
                    Ok(())
                }
                Err(e) => {
                    error!("{target} did not answer: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
