//! Sidecheck core types: machines, per-cluster snapshots and drift verdicts.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

mod render;

pub use render::{render_state, write_state};

/// One `{type, status}` pair from a machine's status. Diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

/// A compute node belonging to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: SmallVec<[MachineCondition; 4]>,
}

impl Machine {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), labels: BTreeMap::new(), conditions: SmallVec::new() }
    }
}

/// Machines of one cluster at one instant, keyed by machine name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineSet(BTreeMap<String, Machine>);

impl MachineSet {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn contains(&self, name: &str) -> bool { self.0.contains_key(name) }
    pub fn get(&self, name: &str) -> Option<&Machine> { self.0.get(name) }

    /// Machines ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Machine> { self.0.values() }
    pub fn names(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }
}

impl FromIterator<Machine> for MachineSet {
    fn from_iter<I: IntoIterator<Item = Machine>>(iter: I) -> Self {
        Self(iter.into_iter().map(|m| (m.name.clone(), m)).collect())
    }
}

/// Machine inventory of a single cluster captured at a specific moment.
///
/// There is no mutating API: a later read produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    name: String,
    order: usize,
    captured_at: DateTime<Utc>,
    machines: MachineSet,
}

impl ClusterSnapshot {
    pub fn new(name: impl Into<String>, order: usize, machines: MachineSet) -> Self {
        Self { name: name.into(), order, captured_at: Utc::now(), machines }
    }

    pub fn name(&self) -> &str { &self.name }
    /// Position of this snapshot in the capture sequence.
    pub fn order(&self) -> usize { self.order }
    pub fn captured_at(&self) -> DateTime<Utc> { self.captured_at }
    pub fn machines(&self) -> &MachineSet { &self.machines }
}

/// Snapshots of every watched cluster, captured once before a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    clusters: Vec<ClusterSnapshot>,
}

impl Baseline {
    pub fn from_snapshots(clusters: Vec<ClusterSnapshot>) -> Self { Self { clusters } }

    pub fn len(&self) -> usize { self.clusters.len() }
    pub fn is_empty(&self) -> bool { self.clusters.is_empty() }

    /// Snapshots in capture order.
    pub fn iter(&self) -> std::slice::Iter<'_, ClusterSnapshot> { self.clusters.iter() }
    pub fn snapshots(&self) -> &[ClusterSnapshot] { &self.clusters }
    pub fn get(&self, cluster: &str) -> Option<&ClusterSnapshot> { self.clusters.iter().find(|c| c.name == cluster) }
    pub fn cluster_names(&self) -> Vec<String> { self.clusters.iter().map(|c| c.name.clone()).collect() }
}

impl<'a> IntoIterator for &'a Baseline {
    type Item = &'a ClusterSnapshot;
    type IntoIter = std::slice::Iter<'a, ClusterSnapshot>;
    fn into_iter(self) -> Self::IntoIter { self.clusters.iter() }
}

/// Why a cluster's machine set is considered changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    CountDiffers { before: usize, after: usize },
    MissingMachine { name: String },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::CountDiffers { before, after } => write!(f, "count differs: before {}, after {}", before, after),
            Divergence::MissingMachine { name } => write!(f, "machine {} not present in current cluster", name),
        }
    }
}

/// Outcome of a drift detection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum DriftVerdict {
    Unchanged,
    Changed { cluster: String, reason: Divergence },
}

impl DriftVerdict {
    pub fn is_changed(&self) -> bool { matches!(self, DriftVerdict::Changed { .. }) }
}

impl fmt::Display for DriftVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftVerdict::Unchanged => f.write_str("machines unchanged"),
            DriftVerdict::Changed { cluster, reason } => write!(f, "cluster {} has changed: {}", cluster, reason),
        }
    }
}

/// Presence/absence comparison of two machine sets.
///
/// A count mismatch wins over missing names. With equal counts, the first
/// original name (by name order) absent from `current` is reported. Label
/// and condition changes on a machine that keeps its name are not detected.
pub fn compare_machines(original: &MachineSet, current: &MachineSet) -> Option<Divergence> {
    if original.len() != current.len() {
        return Some(Divergence::CountDiffers { before: original.len(), after: current.len() });
    }
    original
        .names()
        .find(|name| !current.contains(name))
        .map(|name| Divergence::MissingMachine { name: name.to_string() })
}

/// Source of live machine inventory for a cluster.
///
/// Implementations must not cache: every call reflects current state.
#[async_trait::async_trait]
pub trait MachineReader: Send + Sync {
    async fn read_machines(&self, cluster: &str) -> anyhow::Result<MachineSet>;
}

#[async_trait::async_trait]
impl<T: MachineReader + ?Sized> MachineReader for std::sync::Arc<T> {
    async fn read_machines(&self, cluster: &str) -> anyhow::Result<MachineSet> {
        (**self).read_machines(cluster).await
    }
}

pub mod prelude {
    pub use super::{
        compare_machines, render_state, write_state, Baseline, ClusterSnapshot, Divergence, DriftVerdict, Machine,
        MachineCondition, MachineReader, MachineSet,
    };
}
