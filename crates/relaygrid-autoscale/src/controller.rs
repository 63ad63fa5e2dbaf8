//! Fleet controller — turns request backlog into start/stop calls.
//!
//! Each cycle samples the request channel depth and a fresh fleet snapshot,
//! runs the pure [`FleetController::decide`] step, and applies the decision
//! through the fleet API.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, error, info};

use relay_core::config::ControllerConfig;
use relaygrid_queue::MessageQueue;

use crate::fleet::{FleetApi, FleetSnapshot};

/// A scaling decision for one controller cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Start these stopped instances.
    Start(Vec<String>),
    /// Stop these running instances.
    Stop(Vec<String>),
    /// No change needed.
    Hold,
}

/// Picks which running instances to stop.
///
/// Called with the running ids in listing order and the number to stop;
/// must return at most that many ids from the slice.
pub type VictimSelector = Box<dyn Fn(&[String], usize) -> Vec<String> + Send + Sync>;

fn first_listed(running: &[String], count: usize) -> Vec<String> {
    running.iter().take(count).cloned().collect()
}

/// Backlog-driven fleet controller.
pub struct FleetController {
    fleet: Arc<dyn FleetApi>,
    queue: Arc<dyn MessageQueue>,
    request_queue: String,
    config: ControllerConfig,
    /// Consecutive cycles with backlog covered by running instances.
    idle_counter: u32,
    select_victims: VictimSelector,
}

impl FleetController {
    /// Create a controller watching `request_queue`.
    pub fn new(
        fleet: Arc<dyn FleetApi>,
        queue: Arc<dyn MessageQueue>,
        request_queue: impl Into<String>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            fleet,
            queue,
            request_queue: request_queue.into(),
            config,
            idle_counter: 0,
            select_victims: Box::new(first_listed),
        }
    }

    /// Replace the default first-listed scale-down selection.
    pub fn with_victim_selector(mut self, selector: VictimSelector) -> Self {
        self.select_victims = selector;
        self
    }

    pub fn idle_counter(&self) -> u32 {
        self.idle_counter
    }

    /// Decide what to do given the current backlog and fleet snapshot.
    ///
    /// Updates the idle counter; performs no I/O.
    pub fn decide(&mut self, pending: usize, snapshot: &FleetSnapshot) -> ScaleDecision {
        let running = snapshot.running.len();

        if pending <= running {
            self.idle_counter += 1;
            debug!(idle_counter = self.idle_counter, pending, running, "fleet idle");

            if self.idle_counter < self.config.idle_threshold {
                return ScaleDecision::Hold;
            }

            // The streak is consumed whether or not anything is stopped.
            self.idle_counter = 0;
            let to_stop = running - pending;
            if to_stop == 0 {
                return ScaleDecision::Hold;
            }
            let mut victims = (self.select_victims)(&snapshot.running, to_stop);
            victims.truncate(to_stop);
            if victims.is_empty() {
                return ScaleDecision::Hold;
            }
            ScaleDecision::Stop(victims)
        } else {
            self.idle_counter = 0;
            let headroom = self.config.max_fleet.saturating_sub(running);
            let to_start = (pending - running)
                .min(snapshot.stopped.len())
                .min(headroom);
            if to_start == 0 {
                return ScaleDecision::Hold;
            }
            ScaleDecision::Start(snapshot.stopped[..to_start].to_vec())
        }
    }

    /// Sample, decide, and apply one cycle. Returns the observed backlog.
    pub async fn run_cycle(&mut self) -> anyhow::Result<usize> {
        let pending = self.queue.approximate_depth(&self.request_queue).await?;
        let instances = self.fleet.list_instances(&self.config.tag_prefix).await?;
        let snapshot = FleetSnapshot::from_instances(&instances);

        debug!(
            pending,
            running = snapshot.running.len(),
            stopped = snapshot.stopped.len(),
            "controller sample"
        );

        match self.decide(pending, &snapshot) {
            ScaleDecision::Start(ids) => {
                info!(count = ids.len(), ?ids, pending, "starting instances");
                self.fleet.start(&ids).await?;
            }
            ScaleDecision::Stop(ids) => {
                info!(count = ids.len(), ?ids, pending, "stopping excess instances");
                self.fleet.stop(&ids).await?;
            }
            ScaleDecision::Hold => {}
        }

        Ok(pending)
    }

    /// Base interval for the given backlog plus uniform jitter.
    pub fn next_interval(&self, pending: usize) -> Duration {
        let base = if pending == 0 {
            self.config.idle_interval
        } else {
            self.config.busy_interval
        };
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=self.config.jitter);
        base + jitter
    }

    /// Run the controller loop until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.request_queue,
            max_fleet = self.config.max_fleet,
            tag_prefix = %self.config.tag_prefix,
            "fleet controller started"
        );

        loop {
            let pause = match self.run_cycle().await {
                Ok(pending) => self.next_interval(pending),
                Err(e) => {
                    error!(error = %e, backoff = ?self.config.error_backoff, "controller cycle failed");
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {
                    info!("fleet controller shutting down");
                    break;
                }
            }
        }
    }
}
