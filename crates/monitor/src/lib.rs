//! Sidecheck monitor: baseline capture before a management-plane mutation and
//! bounded-time drift detection after it.

#![forbid(unsafe_code)]

mod config;
mod drift;
mod report;
mod snapshot;

pub use config::MonitorConfig;
pub use drift::{detect_drift, Cancelled, DriftMonitor};
pub use report::{Reporter, TracingReporter};
pub use snapshot::{build_baseline, BaselineError};

pub use sidecheck_core::{Baseline, DriftVerdict};
