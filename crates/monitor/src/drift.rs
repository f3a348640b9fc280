use std::future::Future;
use std::time::Duration;

use metrics::{counter, histogram};
use sidecheck_core::{compare_machines, Baseline, DriftVerdict, MachineReader};
use tokio::time::Instant;

use crate::{MonitorConfig, Reporter, TracingReporter};

/// The check was interrupted before reaching a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("drift check cancelled")]
pub struct Cancelled;

/// Polls live machine inventory and compares it against a baseline.
pub struct DriftMonitor<R> {
    reader: R,
    config: MonitorConfig,
    reporter: Box<dyn Reporter>,
}

impl<R: MachineReader> DriftMonitor<R> {
    pub fn new(reader: R, config: MonitorConfig) -> Self {
        Self { reader, config, reporter: Box::new(TracingReporter) }
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn config(&self) -> &MonitorConfig { &self.config }

    /// Block until the first divergence, or until the check duration elapses.
    pub async fn detect(&self, baseline: &Baseline) -> DriftVerdict {
        run(&self.reader, baseline, &self.config, self.reporter.as_ref()).await
    }

    /// Like [`detect`](Self::detect), but gives up with [`Cancelled`] once `shutdown` resolves.
    pub async fn detect_until<F>(&self, baseline: &Baseline, shutdown: F) -> Result<DriftVerdict, Cancelled>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            verdict = self.detect(baseline) => Ok(verdict),
            _ = shutdown => Err(Cancelled),
        }
    }
}

/// Poll `baseline` clusters for `check_duration`, reporting through `tracing`.
pub async fn detect_drift<R>(reader: &R, baseline: &Baseline, check_duration: Duration, poll_interval: Duration) -> DriftVerdict
where
    R: MachineReader + ?Sized,
{
    run(reader, baseline, &MonitorConfig::new(check_duration, poll_interval), &TracingReporter).await
}

async fn run<R>(reader: &R, baseline: &Baseline, config: &MonitorConfig, reporter: &dyn Reporter) -> DriftVerdict
where
    R: MachineReader + ?Sized,
{
    reporter.check_started(config.check_duration);
    let start = Instant::now();
    let verdict = 'poll: loop {
        if start.elapsed() > config.check_duration {
            break 'poll DriftVerdict::Unchanged;
        }
        for snapshot in baseline {
            let cluster = snapshot.name();
            reporter.reading(cluster);
            counter!("drift_polls_total", 1u64);
            let current = match reader.read_machines(cluster).await {
                Ok(current) => current,
                Err(e) => {
                    // Unreachable API servers are expected mid-upgrade; never a drift signal.
                    counter!("drift_read_errors_total", 1u64);
                    reporter.read_failed(cluster, &e);
                    continue;
                }
            };
            if let Some(reason) = compare_machines(snapshot.machines(), &current) {
                counter!("drift_divergences_total", 1u64);
                reporter.diverged(cluster, &reason);
                break 'poll DriftVerdict::Changed { cluster: cluster.to_string(), reason };
            }
            reporter.unchanged(cluster);
        }
        reporter.waiting(config.poll_interval);
        tokio::time::sleep(config.poll_interval).await;
    };
    histogram!("drift_check_ms", start.elapsed().as_secs_f64() * 1000.0);
    verdict
}
