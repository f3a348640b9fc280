//! Sidecheck kubehub – Cluster API machine inventory over kube-rs

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use kube::{
    api::{Api, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use sidecheck_core::{Machine, MachineCondition, MachineReader, MachineSet};
use tracing::{debug, info};

pub const DEFAULT_MACHINE_GVK: &str = "cluster.x-k8s.io/v1beta1/Machine";
pub const DEFAULT_NAMESPACE: &str = "eksa-system";
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Where machines live on the management cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineQuery {
    /// GVK key of the machine kind, e.g. "cluster.x-k8s.io/v1beta1/Machine"
    pub gvk: String,
    pub namespace: String,
}

impl Default for MachineQuery {
    fn default() -> Self {
        Self { gvk: DEFAULT_MACHINE_GVK.to_string(), namespace: DEFAULT_NAMESPACE.to_string() }
    }
}

fn parse_gvk_key(key: &str) -> Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] if !version.is_empty() && !kind.is_empty() => {
            Ok(GroupVersionKind { group: String::new(), version: version.to_string(), kind: kind.to_string() })
        }
        [group, version, kind] if !version.is_empty() && !kind.is_empty() => {
            Ok(GroupVersionKind { group: (*group).to_string(), version: (*version).to_string(), kind: (*kind).to_string() })
        }
        _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
    }
}

/// Build a client from an explicit kubeconfig path, or the ambient config when `None`.
pub async fn client_for(kubeconfig: Option<&str>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default().await.context("creating default kube client");
    };
    let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path))?;
    let mut config = kube::Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
        .await
        .context("building kube config")?;
    config.connect_timeout = Some(Duration::from_secs(5));
    config.read_timeout = Some(Duration::from_secs(30));
    Client::try_from(config).context("creating kube client")
}

fn machine_from(obj: &DynamicObject) -> Result<Machine> {
    let name = obj.metadata.name.clone().ok_or_else(|| anyhow!("machine missing metadata.name"))?;
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    let conditions = obj
        .data
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(|c| c.as_array())
        .map(|list| {
            list.iter()
                .map(|c| MachineCondition {
                    kind: c.get("type").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    status: c.get("status").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(Machine { name, labels, conditions })
}

/// Reads CAPI machines of workload clusters from their management cluster.
#[derive(Clone)]
pub struct KubeMachineReader {
    client: Client,
    namespace: String,
    resource: ApiResource,
}

impl KubeMachineReader {
    pub fn new(client: Client, query: &MachineQuery) -> Result<Self> {
        let gvk = parse_gvk_key(&query.gvk)?;
        Ok(Self { client, namespace: query.namespace.clone(), resource: ApiResource::from_gvk(&gvk) })
    }

    pub async fn connect(kubeconfig: Option<&str>, query: &MachineQuery) -> Result<Self> {
        let client = client_for(kubeconfig).await?;
        info!(kubeconfig = ?kubeconfig, gvk = %query.gvk, ns = %query.namespace, "machine reader connected");
        Self::new(client, query)
    }
}

#[async_trait::async_trait]
impl MachineReader for KubeMachineReader {
    async fn read_machines(&self, cluster: &str) -> Result<MachineSet> {
        let started = Instant::now();
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &self.namespace, &self.resource);
        let lp = ListParams::default().labels(&format!("{}={}", CLUSTER_NAME_LABEL, cluster));
        let list = api.list(&lp).await.with_context(|| format!("listing machines for cluster {}", cluster))?;
        let machines = list.items.iter().map(machine_from).collect::<Result<MachineSet>>()?;
        histogram!("machine_list_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("machine_list_total", 1u64);
        debug!(cluster = %cluster, count = machines.len(), "machines listed");
        Ok(machines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic(v: serde_json::Value) -> DynamicObject {
        serde_json::from_value(v).expect("dynamic object")
    }

    #[test]
    fn machine_from_reads_labels_and_conditions() {
        let obj = dynamic(serde_json::json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Machine",
            "metadata": {
                "name": "w01-md-0-7f9c",
                "namespace": "eksa-system",
                "labels": { "cluster.x-k8s.io/cluster-name": "w01", "pool": "md-0" }
            },
            "status": {
                "phase": "Running",
                "conditions": [
                    { "type": "Ready", "status": "True" },
                    { "type": "InfrastructureReady", "status": "False", "reason": "Waiting" }
                ]
            }
        }));
        let m = machine_from(&obj).expect("machine");
        assert_eq!(m.name, "w01-md-0-7f9c");
        assert_eq!(m.labels.get("pool").map(String::as_str), Some("md-0"));
        assert_eq!(m.conditions.len(), 2);
        assert_eq!(m.conditions[1], MachineCondition { kind: "InfrastructureReady".into(), status: "False".into() });
    }

    #[test]
    fn machine_from_tolerates_missing_status() {
        let obj = dynamic(serde_json::json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Machine",
            "metadata": { "name": "w01-cp-0" }
        }));
        let m = machine_from(&obj).expect("machine");
        assert!(m.labels.is_empty());
        assert!(m.conditions.is_empty());
    }

    #[test]
    fn machine_from_rejects_unnamed_objects() {
        let obj = dynamic(serde_json::json!({
            "apiVersion": "cluster.x-k8s.io/v1beta1",
            "kind": "Machine",
            "metadata": {}
        }));
        assert!(machine_from(&obj).is_err());
    }

    #[test]
    fn parse_gvk_key_parses_group() {
        let gvk = parse_gvk_key(DEFAULT_MACHINE_GVK).expect("ok");
        assert_eq!(gvk.group, "cluster.x-k8s.io");
        assert_eq!(gvk.version, "v1beta1");
        assert_eq!(gvk.kind, "Machine");
    }

    #[test]
    fn parse_gvk_key_parses_core() {
        let gvk = parse_gvk_key("v1/Node").expect("ok");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.kind, "Node");
    }

    #[test]
    fn parse_gvk_key_invalid_returns_err() {
        assert!(parse_gvk_key("invalid").is_err());
        assert!(parse_gvk_key("").is_err());
        assert!(parse_gvk_key("a/b/c/d").is_err());
    }

    #[test]
    fn default_query_targets_capi_machines() {
        let q = MachineQuery::default();
        assert_eq!(q.gvk, "cluster.x-k8s.io/v1beta1/Machine");
        assert_eq!(q.namespace, "eksa-system");
    }
}
