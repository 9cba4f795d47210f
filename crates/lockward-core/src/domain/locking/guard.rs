//! Lock guards for RAII-style release
//!
//! Guards release their resource set when dropped, ensuring proper cleanup
//! even in the presence of panics, early returns or cancelled tasks.

use super::coordinator::ResourceCoordinator;
use super::types::{ActorId, ResourceId};
use crate::error::Result;
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// A set of resources held by one actor
///
/// The whole set is released when the guard is dropped, including any
/// resource of the set the actor already held before acquiring the guard.
#[derive(Debug)]
pub struct ResourceSetGuard {
    /// Coordinator that granted the set
    coordinator: ResourceCoordinator,

    /// Holder of the set
    actor: ActorId,

    /// Resources in canonical order
    resources: BTreeSet<ResourceId>,

    /// Whether the set has been explicitly released
    released: bool,
}

impl ResourceSetGuard {
    pub(crate) fn new(
        coordinator: ResourceCoordinator,
        actor: ActorId,
        resources: BTreeSet<ResourceId>,
    ) -> Self {
        Self {
            coordinator,
            actor,
            resources,
            released: false,
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceId> {
        self.resources.iter()
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.resources.contains(resource)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Explicitly release the set, surfacing any error
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.coordinator.release(&self.actor, &self.resources)
    }
}

impl Drop for ResourceSetGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.coordinator.release(&self.actor, &self.resources) {
            warn!(actor = %self.actor, error = %e, "Failed to release resource set on drop");
        }
    }
}

impl fmt::Display for ResourceSetGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceSet[{}: ", self.actor)?;
        for (i, resource) in self.resources.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", resource)?;
        }
        write!(f, "]")
    }
}
