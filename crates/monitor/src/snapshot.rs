use metrics::counter;
use sidecheck_core::{Baseline, ClusterSnapshot, MachineReader};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("no clusters to snapshot")]
    NoClusters,
    #[error("reading machines for cluster {cluster}: {source:#}")]
    Read {
        cluster: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Capture the machine inventory of every named cluster, in order.
///
/// Each cluster is read exactly once. Any read failure aborts the whole
/// capture; a partial baseline is never returned.
pub async fn build_baseline<R, S>(reader: &R, clusters: &[S]) -> Result<Baseline, BaselineError>
where
    R: MachineReader + ?Sized,
    S: AsRef<str>,
{
    if clusters.is_empty() {
        return Err(BaselineError::NoClusters);
    }
    let mut snapshots = Vec::with_capacity(clusters.len());
    for (order, cluster) in clusters.iter().enumerate() {
        let cluster = cluster.as_ref();
        info!(cluster = %cluster, "reading machines for baseline");
        let machines = reader
            .read_machines(cluster)
            .await
            .map_err(|source| BaselineError::Read { cluster: cluster.to_string(), source })?;
        info!(cluster = %cluster, count = machines.len(), "baseline captured");
        snapshots.push(ClusterSnapshot::new(cluster, order, machines));
    }
    counter!("baseline_clusters_total", snapshots.len() as u64);
    Ok(Baseline::from_snapshots(snapshots))
}
