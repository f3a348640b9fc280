//! Tree rendering of machine state for diagnostic dumps.

use std::fmt::{self, Write};

use crate::ClusterSnapshot;

/// Write machines of every cluster as a tree rooted at the management cluster.
pub fn write_state<W: Write>(out: &mut W, management: &str, clusters: &[ClusterSnapshot]) -> fmt::Result {
    writeln!(out, "{}", management)?;
    for cluster in clusters {
        writeln!(out, "├── {}", cluster.name())?;
        for m in cluster.machines().iter() {
            writeln!(out, "│   ├──  {}", m.name)?;
            writeln!(out, "│   │    ├──  Labels")?;
            for (k, v) in &m.labels {
                writeln!(out, "│   │    │    ├──  {}: {}", k, v)?;
            }
            writeln!(out, "│   │    ├──  Conditions")?;
            for c in &m.conditions {
                writeln!(out, "│   │    │    ├──  {}: {}", c.kind, c.status)?;
            }
        }
    }
    Ok(())
}

/// [`write_state`] into a fresh `String`.
pub fn render_state(management: &str, clusters: &[ClusterSnapshot]) -> String {
    let mut out = String::new();
    // Writing into a String never fails.
    let _ = write_state(&mut out, management, clusters);
    out
}
