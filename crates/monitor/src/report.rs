use std::time::Duration;

use sidecheck_core::Divergence;
use tracing::{info, warn};

/// Progress hooks of a drift check. All hooks default to no-ops.
pub trait Reporter: Send + Sync {
    fn check_started(&self, _duration: Duration) {}
    fn reading(&self, _cluster: &str) {}
    fn read_failed(&self, _cluster: &str, _error: &anyhow::Error) {}
    fn unchanged(&self, _cluster: &str) {}
    fn diverged(&self, _cluster: &str, _reason: &Divergence) {}
    fn waiting(&self, _interval: Duration) {}
}

/// Reports progress as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn check_started(&self, duration: Duration) {
        info!(duration = ?duration, "checking for changes in machines");
    }

    fn reading(&self, cluster: &str) {
        info!(cluster = %cluster, "reading machines");
    }

    fn read_failed(&self, cluster: &str, error: &anyhow::Error) {
        warn!(cluster = %cluster, error = %format!("{:#}", error), "failed getting machines; treating as transient");
    }

    fn unchanged(&self, cluster: &str) {
        info!(cluster = %cluster, "machines unchanged");
    }

    fn diverged(&self, cluster: &str, reason: &Divergence) {
        warn!(cluster = %cluster, reason = %reason, "machines changed");
    }

    fn waiting(&self, interval: Duration) {
        info!(interval = ?interval, "waiting until next check");
    }
}
