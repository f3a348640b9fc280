use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sidecheck_core::{render_state, Baseline, DriftVerdict};
use sidecheck_kubehub::{KubeMachineReader, MachineQuery, DEFAULT_MACHINE_GVK, DEFAULT_NAMESPACE};
use sidecheck_monitor::{build_baseline, DriftMonitor, MonitorConfig};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "sidecheckctl", version, about = "Detect machine side effects of management cluster changes")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubeconfig of the management cluster (default: current context)
    #[arg(long, global = true, env = "SIDECHECK_KUBECONFIG")]
    kubeconfig: Option<String>,

    /// Namespace holding the CAPI machines
    #[arg(long = "ns", visible_alias = "namespace", global = true, env = "SIDECHECK_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Machine kind as a GVK key
    #[arg(long = "machine-gvk", global = true, env = "SIDECHECK_MACHINE_GVK", default_value = DEFAULT_MACHINE_GVK)]
    machine_gvk: String,

    /// Name printed at the root of machine state trees
    #[arg(long, global = true, env = "SIDECHECK_MANAGEMENT", default_value = "management")]
    management: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current machines of workload clusters
    Machines {
        #[arg(required = true)]
        clusters: Vec<String>,
    },
    /// Capture a machine baseline before mutating the management cluster
    Snapshot {
        /// Workload cluster to include (repeatable, order is kept)
        #[arg(long = "cluster", required = true)]
        clusters: Vec<String>,
        /// Write the baseline here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Poll workload clusters and fail if machines changed since the baseline
    Watch {
        /// Baseline file written by `snapshot`
        #[arg(long)]
        baseline: PathBuf,
        /// Total check duration in seconds (default: SIDECHECK_CHECK_DURATION_SECS or 600)
        #[arg(long = "duration-secs")]
        duration_secs: Option<u64>,
        /// Pause between checks in seconds (default: SIDECHECK_POLL_INTERVAL_SECS or 20)
        #[arg(long = "interval-secs")]
        interval_secs: Option<u64>,
    },
}

fn init_tracing() {
    let env = std::env::var("SIDECHECK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("SIDECHECK_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid SIDECHECK_METRICS_ADDR; expected host:port");
        }
    }
}

fn monitor_config(duration_secs: Option<u64>, interval_secs: Option<u64>) -> MonitorConfig {
    let mut cfg = MonitorConfig::from_env();
    if let Some(s) = duration_secs { cfg.check_duration = Duration::from_secs(s); }
    if let Some(s) = interval_secs { cfg.poll_interval = Duration::from_secs(s); }
    cfg
}

fn load_baseline(path: &Path) -> Result<Baseline> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading baseline {}", path.display()))?;
    let baseline: Baseline = serde_json::from_str(&raw).with_context(|| format!("parsing baseline {}", path.display()))?;
    anyhow::ensure!(!baseline.is_empty(), "baseline {} holds no clusters", path.display());
    Ok(baseline)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let query = MachineQuery { gvk: cli.machine_gvk.clone(), namespace: cli.namespace.clone() };
    let reader = KubeMachineReader::connect(cli.kubeconfig.as_deref(), &query).await?;

    match cli.command {
        Commands::Machines { clusters } => {
            info!(clusters = ?clusters, "machines invoked");
            let current = build_baseline(&reader, clusters.as_slice()).await?;
            match cli.output {
                Output::Human => print!("{}", render_state(&cli.management, current.snapshots())),
                Output::Json => println!("{}", serde_json::to_string_pretty(&current)?),
            }
        }
        Commands::Snapshot { clusters, out } => {
            info!(clusters = ?clusters, out = ?out, "snapshot invoked");
            let baseline = build_baseline(&reader, clusters.as_slice()).await?;
            let json = serde_json::to_string_pretty(&baseline)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("writing baseline {}", path.display()))?;
                    if cli.output == Output::Human {
                        print!("{}", render_state(&cli.management, baseline.snapshots()));
                    }
                    info!(path = %path.display(), clusters = baseline.len(), "baseline written");
                }
                None => println!("{}", json),
            }
        }
        Commands::Watch { baseline, duration_secs, interval_secs } => {
            let config = monitor_config(duration_secs, interval_secs);
            let baseline = load_baseline(&baseline)?;
            info!(clusters = ?baseline.cluster_names(), duration = ?config.check_duration, interval = ?config.poll_interval, "watch invoked");

            let monitor = DriftMonitor::new(reader.clone(), config);
            let shutdown = async {
                match signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl-C received; stopping drift check"),
                    Err(e) => {
                        warn!(error = %e, "cannot listen for Ctrl-C");
                        std::future::pending::<()>().await
                    }
                }
            };
            let verdict = match monitor.detect_until(&baseline, shutdown).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "no verdict");
                    return Ok(ExitCode::from(130));
                }
            };

            // Re-read for the diagnostic dump; the verdict is already final.
            let after = match build_baseline(&reader, baseline.cluster_names().as_slice()).await {
                Ok(after) => Some(after),
                Err(e) => {
                    warn!(error = %e, "could not read machines after check");
                    None
                }
            };
            report_verdict(&cli.management, cli.output, &verdict, &baseline, after.as_ref())?;
            if verdict.is_changed() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report_verdict(management: &str, output: Output, verdict: &DriftVerdict, before: &Baseline, after: Option<&Baseline>) -> Result<()> {
    match output {
        Output::Human => {
            match verdict {
                DriftVerdict::Changed { .. } => {
                    error!(%verdict, "management cluster change had cascading effects");
                    eprintln!("{}", verdict);
                    println!("Machines state before:");
                    print!("{}", render_state(management, before.snapshots()));
                }
                DriftVerdict::Unchanged => {
                    println!("No machines were created or deleted in {} workload clusters.", before.len());
                }
            }
            if let Some(after) = after {
                println!("Machines state after:");
                print!("{}", render_state(management, after.snapshots()));
            }
        }
        Output::Json => {
            #[derive(serde::Serialize)]
            struct Report<'a> { verdict: &'a DriftVerdict, before: &'a Baseline, after: Option<&'a Baseline> }
            println!("{}", serde_json::to_string_pretty(&Report { verdict, before, after })?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_monitor_defaults() {
        let cfg = monitor_config(Some(30), Some(5));
        assert_eq!(cfg.check_duration, Duration::from_secs(30));
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn snapshot_parses_repeatable_clusters_and_globals() {
        let cli = Cli::try_parse_from(["sidecheckctl", "--ns", "capi", "snapshot", "--cluster", "w01", "--cluster", "w02"]).expect("parse");
        assert_eq!(cli.namespace, "capi");
        match cli.command {
            Commands::Snapshot { clusters, out } => {
                assert_eq!(clusters, vec!["w01", "w02"]);
                assert!(out.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn namespace_is_accepted_as_long_form_of_ns() {
        let cli = Cli::try_parse_from(["sidecheckctl", "machines", "w01", "--namespace", "capi-system"]).expect("parse");
        assert_eq!(cli.namespace, "capi-system");
    }

    #[test]
    fn snapshot_requires_a_cluster() {
        assert!(Cli::try_parse_from(["sidecheckctl", "snapshot"]).is_err());
    }

    #[test]
    fn empty_baseline_file_is_rejected() {
        let path = std::env::temp_dir().join(format!("sidecheck-empty-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"clusters":[]}"#).expect("write");
        let err = load_baseline(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(err.to_string().contains("holds no clusters"));
    }
}
