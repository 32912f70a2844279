//! Repeating cycle loop with a randomized post-cycle delay and cooperative shutdown

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::orchestrator::Orchestrator;
use crate::state::ServiceState;

/// Uniform delay range between the end of one cycle and the start of the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    min: Duration,
    max: Duration,
}

impl DelayPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.min_delay(), config.max_delay())
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Uniform draw in whole seconds
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (min, max) = (self.min.as_secs(), self.max.as_secs());
        if min == max {
            return Duration::from_secs(min);
        }
        Duration::from_secs(rng.gen_range(min..=max))
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(45), Duration::from_secs(120))
    }
}

/// Source of inter-cycle waits, swapped out in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Requests a clean stop of a running scheduler.
///
/// Dropping the handle has the same effect as calling `shutdown`.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn channel() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    /// Stop arming new cycles; a cycle already running finishes first
    pub fn shutdown(&self) {
        // No receiver means the scheduler already stopped
        let _ = self.tx.send(true);
    }
}

fn shutdown_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

pub struct Scheduler {
    orchestrator: Orchestrator,
    policy: DelayPolicy,
    sleeper: Arc<dyn Sleeper>,
    rng: StdRng,
    run_on_start: bool,
    state: ServiceState,
    state_path: Option<PathBuf>,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator, config: &ScheduleConfig) -> Self {
        Self {
            orchestrator,
            policy: DelayPolicy::from_config(config),
            sleeper: Arc::new(TokioSleeper),
            rng: StdRng::from_entropy(),
            run_on_start: config.run_on_start,
            state: ServiceState::new(),
            state_path: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Write the status snapshot here after every cycle
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_path = Some(path);
        self
    }

    /// Start the loop on the runtime, returning its handle and a way to stop it
    pub fn spawn(self) -> (JoinHandle<ServiceState>, ShutdownHandle) {
        let (handle, rx) = ShutdownHandle::channel();
        let task = tokio::spawn(self.run(rx));
        (task, handle)
    }

    /// Run cycles until shutdown is requested.
    ///
    /// Shutdown is only observed between cycles: a running cycle always
    /// completes, and the next one is armed only after it is done.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ServiceState {
        info!(
            min_delay_secs = self.policy.min.as_secs(),
            max_delay_secs = self.policy.max.as_secs(),
            "Scheduler started"
        );

        if !self.run_on_start {
            let delay = self.policy.sample(&mut self.rng);
            info!(delay_secs = delay.as_secs(), "First cycle delayed");
            if self.wait(delay, &mut shutdown).await {
                return self.stop();
            }
        }

        loop {
            if shutdown_requested(&shutdown) {
                break;
            }

            let mut report = self.orchestrator.run_cycle().await;

            let delay = self.policy.sample(&mut self.rng);
            report.next_delay_secs = Some(delay.as_secs());
            self.state.record_cycle(&report);
            self.persist_state().await;

            info!(
                cycle_id = %report.cycle_id,
                delay_secs = delay.as_secs(),
                "Next cycle scheduled"
            );

            if self.wait(delay, &mut shutdown).await {
                break;
            }
        }

        self.stop()
    }

    /// Returns true if shutdown was requested before the delay elapsed
    async fn wait(&self, delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        if shutdown_requested(shutdown) {
            return true;
        }

        let sleep = self.sleeper.sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed() => {
                    if changed.is_err() || shutdown_requested(shutdown) {
                        return true;
                    }
                }
            }
        }
    }

    async fn persist_state(&self) {
        if let Some(path) = &self.state_path {
            if let Err(e) = self.state.save(path).await {
                warn!("Failed to write status snapshot to {:?}: {}", path, e);
            }
        }
    }

    fn stop(self) -> ServiceState {
        info!(
            cycles = self.state.cycles_completed,
            replies = self.state.replies_sent,
            "Scheduler stopped"
        );
        debug!("Final state: {:?}", self.state);
        self.state
    }
}
