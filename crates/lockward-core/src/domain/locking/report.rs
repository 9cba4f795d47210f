//! Read-only views of coordinator state
//!
//! `Snapshot` maps every registered resource to its ownership, `WaitReport`
//! lists the pending waits, and `StateReport` bundles both for diagnostics.
//! All of them are owned copies taken under the table lock, so holding or
//! iterating one never touches the coordinator again.

use super::types::{ActorId, Ownership, ResourceId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Ownership of every registered resource at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    resources: BTreeMap<ResourceId, Ownership>,
}

impl Snapshot {
    pub(crate) fn new(resources: BTreeMap<ResourceId, Ownership>) -> Self {
        Self { resources }
    }

    pub fn get(&self, resource: &str) -> Option<&Ownership> {
        self.resources.get(resource)
    }

    pub fn owner_of(&self, resource: &str) -> Option<&ActorId> {
        self.get(resource).and_then(Ownership::owner)
    }

    /// True when the resource is registered and nobody holds it
    pub fn is_free(&self, resource: &str) -> bool {
        self.get(resource).is_some_and(Ownership::is_free)
    }

    pub fn all_free(&self) -> bool {
        self.resources.values().all(Ownership::is_free)
    }

    /// Resources held by `actor`, in canonical order
    pub fn held_by(&self, actor: &ActorId) -> BTreeSet<ResourceId> {
        self.resources
            .iter()
            .filter(|(_, ownership)| ownership.owner() == Some(actor))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &Ownership)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// One pending wait: `waiter` is blocked on `resource`, held by `holder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitEdge {
    pub waiter: ActorId,
    pub holder: ActorId,
    pub resource: Option<ResourceId>,
}

/// Ordered sequence of pending waits
///
/// Iterate by reference as many times as needed; each pass yields the same
/// edges in `(waiter, holder)` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WaitReport {
    waits: Vec<WaitEdge>,
}

impl WaitReport {
    pub(crate) fn new(waits: Vec<WaitEdge>) -> Self {
        Self { waits }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WaitEdge> {
        self.waits.iter()
    }

    /// `(waiter, holder)` pairs
    pub fn pairs(&self) -> impl Iterator<Item = (&ActorId, &ActorId)> {
        self.waits.iter().map(|edge| (&edge.waiter, &edge.holder))
    }

    pub fn is_waiting(&self, waiter: &ActorId) -> bool {
        self.waits.iter().any(|edge| &edge.waiter == waiter)
    }

    pub fn len(&self) -> usize {
        self.waits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }
}

impl<'a> IntoIterator for &'a WaitReport {
    type Item = &'a WaitEdge;
    type IntoIter = std::slice::Iter<'a, WaitEdge>;

    fn into_iter(self) -> Self::IntoIter {
        self.waits.iter()
    }
}

/// Snapshot plus pending waits, rendered as a table by `Display`
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub generated_at: DateTime<Utc>,
    pub resources: Snapshot,
    pub waits: WaitReport,
}

impl StateReport {
    pub(crate) fn new(resources: Snapshot, waits: WaitReport) -> Self {
        Self {
            generated_at: Utc::now(),
            resources,
            waits,
        }
    }
}

impl fmt::Display for StateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .resources
            .iter()
            .map(|(id, _)| id.as_str().len())
            .max()
            .unwrap_or(0)
            .max("RESOURCE".len());

        writeln!(f, "{:<width$}  OWNER", "RESOURCE")?;
        for (id, ownership) in self.resources.iter() {
            let owner = ownership.owner().map(ActorId::as_str).unwrap_or("-");
            writeln!(f, "{:<width$}  {}", id.as_str(), owner)?;
        }

        if self.waits.is_empty() {
            write!(f, "no pending waits")
        } else {
            writeln!(f, "pending waits:")?;
            for (i, edge) in self.waits.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                match &edge.resource {
                    Some(resource) => write!(
                        f,
                        "  {} -> {} (on {})",
                        edge.waiter, edge.holder, resource
                    )?,
                    None => write!(f, "  {} -> {}", edge.waiter, edge.holder)?,
                }
            }
            Ok(())
        }
    }
}
