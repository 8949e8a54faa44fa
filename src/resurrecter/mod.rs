//! Coordinator-only supervision of the monitored processes.
//!
//! While a node is coordinator it runs one [`Resurrecter`], which probes every
//! roster entry on its own timer and restarts the ones that stop answering.

mod restarter;

pub use restarter::{CommandRestarter, RestartError, Restarter};

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::common::StopSignal;
use crate::config::Timeouts;
use crate::network::probe;
use crate::roster::{Roster, RosterEntry};

pub struct Resurrecter {
    roster: Roster,
    health_port: u16,
    timeouts: Timeouts,
    restarter: Arc<dyn Restarter>,
    stop: StopSignal,
}

impl Resurrecter {
    pub fn new(
        roster: Roster,
        health_port: u16,
        timeouts: Timeouts,
        restarter: Arc<dyn Restarter>,
        stop: StopSignal,
    ) -> Self {
        Self {
            roster,
            health_port,
            timeouts,
            restarter,
            stop,
        }
    }

    /// Watch every roster entry until the stop signal fires.
    pub async fn run(self) {
        info!("Resurrecter watching {} processes", self.roster.len());

        let mut watchers = JoinSet::new();
        for entry in self.roster.entries() {
            let watcher = Watcher {
                entry: entry.clone(),
                target: entry.endpoint(self.health_port),
                timeouts: self.timeouts,
                restarter: Arc::clone(&self.restarter),
            };
            let stop = self.stop.clone();
            watchers.spawn(async move {
                tokio::select! {
                    _ = stop.stopped() => {}
                    _ = watcher.run() => {}
                }
            });
        }

        self.stop.stopped().await;
        watchers.shutdown().await;
        info!("Resurrecter stopped");
    }
}

struct Watcher {
    entry: RosterEntry,
    target: String,
    timeouts: Timeouts,
    restarter: Arc<dyn Restarter>,
}

impl Watcher {
    async fn run(self) {
        loop {
            sleep(self.timeouts.probe_interval()).await;

            if self.is_alive().await {
                continue;
            }

            warn!(
                "Process {} at {} is not answering, restarting it",
                self.entry.name, self.target
            );
            let restarter = Arc::clone(&self.restarter);
            let name = self.entry.name.clone();
            tokio::spawn(async move {
                match restarter.restart(&name).await {
                    Ok(()) => info!("Restarted process {name}"),
                    Err(e) => error!("Failed to restart process {name}: {e}"),
                }
            });

            sleep(self.timeouts.restart_cooldown()).await;
        }
    }

    /// One probe plus the configured number of retries.
    async fn is_alive(&self) -> bool {
        let attempts = self.timeouts.probe_retries + 1;
        for attempt in 1..=attempts {
            match probe(&self.target, self.timeouts.probe_timeout()).await {
                Ok(()) => return true,
                Err(e) => debug!(
                    "Probe {attempt}/{attempts} of {} failed: {e}",
                    self.entry.name
                ),
            }
            if attempt < attempts {
                sleep(self.timeouts.probe_interval()).await;
            }
        }
        false
    }
}
