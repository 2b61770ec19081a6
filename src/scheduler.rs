//! Periodic risk and retry sweeps

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Work driven by the two timers. Each call runs to completion and
/// handles its own errors.
#[async_trait]
pub trait SweepTarget: Send + Sync {
    async fn run_risk_sweep(&self);

    async fn run_retry_sweep(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub risk_interval: Duration,
    pub retry_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            risk_interval: Duration::from_secs(60),
            retry_interval: Duration::from_secs(600),
        }
    }
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal both loops and wait for any in-flight sweep to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Scheduler task ended abnormally: {}", e);
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

#[derive(Clone, Copy)]
enum Sweep {
    Risk,
    Retry,
}

impl Sweep {
    fn name(&self) -> &'static str {
        match self {
            Self::Risk => "risk",
            Self::Retry => "retry",
        }
    }
}

pub fn start(target: Arc<dyn SweepTarget>, config: SchedulerConfig) -> SchedulerHandle {
    let (shutdown, rx) = watch::channel(false);

    tracing::info!(
        "Scheduler started (risk every {:?}, retry every {:?})",
        config.risk_interval,
        config.retry_interval
    );

    let tasks = vec![
        spawn_loop(Sweep::Risk, config.risk_interval, target.clone(), rx.clone()),
        spawn_loop(Sweep::Retry, config.retry_interval, target, rx),
    ];

    SchedulerHandle { shutdown, tasks }
}

fn spawn_loop(
    sweep: Sweep,
    period: Duration,
    target: Arc<dyn SweepTarget>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        // a sweep that overruns its period is not followed by a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Running {} sweep", sweep.name());
                    match sweep {
                        Sweep::Risk => target.run_risk_sweep().await,
                        Sweep::Retry => target.run_retry_sweep().await,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}
