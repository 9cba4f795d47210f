//! Per-resource ownership record

use super::types::{ActorId, Ownership, ResourceId, ResourceState};
use std::sync::Arc;
use tokio::sync::Notify;

/// Identity and ownership state of one lockable resource
///
/// Handles live in the coordinator's resource table and are only mutated
/// while the table lock is held. Each handle carries a `Notify` that wakes
/// actors blocked on it whenever it is freed.
#[derive(Debug)]
pub struct ResourceHandle {
    id: ResourceId,
    owner: Option<ActorId>,
    released: Arc<Notify>,
}

impl ResourceHandle {
    pub(crate) fn new(id: ResourceId) -> Self {
        Self {
            id,
            owner: None,
            released: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn owner(&self) -> Option<&ActorId> {
        self.owner.as_ref()
    }

    pub fn state(&self) -> ResourceState {
        if self.owner.is_some() {
            ResourceState::Locked
        } else {
            ResourceState::Free
        }
    }

    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    pub fn is_held_by(&self, actor: &ActorId) -> bool {
        self.owner.as_ref() == Some(actor)
    }

    pub fn ownership(&self) -> Ownership {
        match &self.owner {
            Some(actor) => Ownership::Owned(actor.clone()),
            None => Ownership::Free,
        }
    }

    /// Wake-up primitive signalled when the resource is freed
    pub(crate) fn released(&self) -> Arc<Notify> {
        Arc::clone(&self.released)
    }

    pub(crate) fn claim(&mut self, actor: &ActorId) {
        debug_assert!(self.owner.is_none(), "claiming a locked resource");
        self.owner = Some(actor.clone());
    }

    /// Free the resource and wake every actor blocked on it
    pub(crate) fn free(&mut self) -> Option<ActorId> {
        let previous = self.owner.take();
        if previous.is_some() {
            self.released.notify_waiters();
        }
        previous
    }
}
