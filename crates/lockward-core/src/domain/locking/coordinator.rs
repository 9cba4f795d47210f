//! Resource coordinator
//!
//! The coordinator is the single entry point for acquiring and releasing
//! resources. It handles:
//! - Canonical ordering of every requested set
//! - Blocking until contended resources are freed
//! - Wait-for graph maintenance and deadlock refusal
//! - Rollback of partial claims on failure, timeout or cancellation
//! - Ownership snapshots and lock event broadcast

use super::event::LockEvent;
use super::graph::WaitForGraph;
use super::guard::ResourceSetGuard;
use super::handle::ResourceHandle;
use super::report::{Snapshot, StateReport, WaitEdge, WaitReport};
use super::types::{ActorId, CoordinatorConfig, ResourceId};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Coordinator for exclusive access to named resources
///
/// Cloning is cheap; every clone shares the same resource table.
#[derive(Debug, Clone)]
pub struct ResourceCoordinator {
    inner: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    /// Configuration
    config: CoordinatorConfig,

    /// Resource table, actor records and wait-for graph behind one lock.
    /// Never held across an `.await`.
    table: Mutex<ResourceTable>,

    /// Broadcast channel for lock events
    events: broadcast::Sender<LockEvent>,
}

#[derive(Debug, Default)]
struct ResourceTable {
    resources: BTreeMap<ResourceId, ResourceHandle>,
    actors: HashMap<ActorId, ActorRecord>,
    graph: WaitForGraph,
}

#[derive(Debug, Default)]
struct ActorRecord {
    held: BTreeSet<ResourceId>,
    waiting_on: Option<ResourceId>,
}

/// Outcome of one claim attempt on a single resource
enum Step {
    Claimed,
    AlreadyHeld,
    Blocked { holder: ActorId, fresh: bool },
}

impl ResourceCoordinator {
    /// Create a new coordinator with the given configuration
    pub fn new(config: CoordinatorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(Shared {
                config,
                table: Mutex::new(ResourceTable::default()),
                events,
            }),
        }
    }

    /// Create a coordinator with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CoordinatorConfig::default())
    }

    /// Create a coordinator with a set of resources registered up front
    pub fn with_resources<I, R>(config: CoordinatorConfig, resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let coordinator = Self::new(config);
        for resource in resources {
            coordinator.register(resource)?;
        }
        Ok(coordinator)
    }

    /// Get the configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Register a resource handle
    pub fn register(&self, resource: impl Into<ResourceId>) -> Result<()> {
        let resource = resource.into();
        if resource.as_str().is_empty() {
            return Err(Error::InvalidInput("resource id must not be empty".to_string()));
        }

        let mut table = self.table();
        if table.resources.contains_key(&resource) {
            return Err(Error::DuplicateResource(resource));
        }

        debug!(resource = %resource, "Resource registered");
        table
            .resources
            .insert(resource.clone(), ResourceHandle::new(resource));
        Ok(())
    }

    pub fn is_registered(&self, resource: &str) -> bool {
        self.table().resources.contains_key(resource)
    }

    /// Subscribe to lock events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.inner.events.subscribe()
    }

    /// Acquire every resource in the set for `actor`
    ///
    /// The set is claimed in canonical order. While a resource is held by
    /// another actor the call waits; if waiting would close a cycle in the
    /// wait-for graph the request fails with `DeadlockDetected` and the
    /// resources claimed by this call are released again. Resources the
    /// actor already held before the call are left untouched either way.
    ///
    /// Dropping the returned future rolls back like a failed acquire.
    pub async fn acquire<I, R>(&self, actor: &ActorId, resources: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let requested = canonicalize(resources);
        match self.inner.config.acquire_timeout {
            Some(timeout) => self.acquire_within(actor, requested, timeout).await,
            None => self.acquire_ordered(actor, requested).await,
        }
    }

    /// Acquire with an explicit deadline, failing with `Timeout` when it passes
    pub async fn acquire_timeout<I, R>(
        &self,
        actor: &ActorId,
        resources: I,
        timeout: Duration,
    ) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        self.acquire_within(actor, canonicalize(resources), timeout)
            .await
    }

    /// Acquire and return a guard that releases the whole set when dropped
    pub async fn acquire_guard<I, R>(&self, actor: &ActorId, resources: I) -> Result<ResourceSetGuard>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let requested = canonicalize(resources);
        self.acquire(actor, requested.iter()).await?;
        Ok(ResourceSetGuard::new(self.clone(), actor.clone(), requested))
    }

    /// Claim the whole set if none of it is held by another actor
    ///
    /// Never waits. Returns `Ok(false)` without touching any state when the
    /// set is contended.
    pub fn try_acquire<I, R>(&self, actor: &ActorId, resources: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let requested = canonicalize(resources);
        if requested.is_empty() {
            return Ok(true);
        }
        self.ensure_registered(&requested)?;

        let mut guard = self.table();
        let table = &mut *guard;

        let contended = requested.iter().find_map(|id| {
            table
                .resources
                .get(id)
                .and_then(ResourceHandle::owner)
                .filter(|owner| *owner != actor)
                .map(|owner| (id, owner))
        });
        if let Some((resource, holder)) = contended {
            debug!(
                actor = %actor,
                resource = %resource,
                holder = %holder,
                "Resource set contended, not acquired"
            );
            return Ok(false);
        }

        for id in &requested {
            if let Some(handle) = table.resources.get_mut(id) {
                if handle.is_free() {
                    handle.claim(actor);
                    table
                        .actors
                        .entry(actor.clone())
                        .or_default()
                        .held
                        .insert(id.clone());
                }
            }
        }
        table.verify_or_abort();
        drop(guard);

        info!(actor = %actor, resources = ?requested, "Resource set acquired without waiting");
        self.emit(LockEvent::lock_acquired(
            actor,
            requested.into_iter().collect(),
            0,
        ));
        Ok(true)
    }

    /// Release resources held by `actor`
    ///
    /// Fails with `NotOwner` if the actor does not hold every resource in the
    /// set; nothing is released in that case.
    pub fn release<I, R>(&self, actor: &ActorId, resources: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let requested = canonicalize(resources);
        if requested.is_empty() {
            return Ok(());
        }

        let freed = {
            let mut table = self.table();
            for id in &requested {
                let handle = table
                    .resources
                    .get(id)
                    .ok_or_else(|| Error::UnknownResource(id.clone()))?;
                if !handle.is_held_by(actor) {
                    return Err(Error::NotOwner {
                        actor: actor.clone(),
                        resource: id.clone(),
                    });
                }
            }

            let freed = table.free(actor, &requested);
            table.verify_or_abort();
            freed
        };

        info!(actor = %actor, resources = ?freed, "Resources released");
        self.emit(LockEvent::lock_released(actor, freed));
        Ok(())
    }

    /// Release everything `actor` holds, returning how many resources were freed
    pub fn release_all(&self, actor: &ActorId) -> Result<usize> {
        let held = self.holdings(actor);
        if held.is_empty() {
            return Ok(0);
        }

        self.release(actor, &held)?;
        Ok(held.len())
    }

    /// Acquire the set, run `work`, then release the set
    ///
    /// The set is released even if the returned future is dropped midway.
    pub async fn run<I, R, F, Fut, T>(&self, actor: &ActorId, resources: I, work: F) -> Result<T>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.acquire_guard(actor, resources).await?;
        let output = work().await;
        guard.release()?;
        Ok(output)
    }

    /// Resources currently held by `actor`
    pub fn holdings(&self, actor: &ActorId) -> BTreeSet<ResourceId> {
        self.table()
            .actors
            .get(actor)
            .map(|record| record.held.clone())
            .unwrap_or_default()
    }

    /// Number of actors that hold or wait on something
    pub fn active_actors(&self) -> usize {
        self.table().actors.len()
    }

    /// Ownership of every registered resource
    pub fn snapshot(&self) -> Snapshot {
        self.table().snapshot()
    }

    /// Pending waits as `(waiter, holder)` edges in canonical order
    pub fn pending_waits(&self) -> WaitReport {
        self.table().waits()
    }

    /// Snapshot and pending waits taken under the same lock
    pub fn report(&self) -> StateReport {
        let table = self.table();
        StateReport::new(table.snapshot(), table.waits())
    }

    // ========== Internal Methods ==========

    fn table(&self) -> MutexGuard<'_, ResourceTable> {
        // A panic under the lock only happens after the invariant dump, so
        // the state behind a poisoned lock is still the last verified one.
        self.inner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LockEvent) {
        // No subscribers is not an error
        let _ = self.inner.events.send(event);
    }

    async fn acquire_within(
        &self,
        actor: &ActorId,
        requested: BTreeSet<ResourceId>,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, self.acquire_ordered(actor, requested)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    actor = %actor,
                    timeout_ms = timeout.as_millis(),
                    "Acquire timed out"
                );
                Err(Error::Timeout {
                    actor: actor.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    async fn acquire_ordered(&self, actor: &ActorId, requested: BTreeSet<ResourceId>) -> Result<()> {
        if requested.is_empty() {
            return Ok(());
        }
        self.ensure_registered(&requested)?;

        debug!(
            actor = %actor,
            resources = ?requested,
            "Attempting to acquire resource set"
        );

        let start = Instant::now();
        let mut pending = PendingAcquire::new(self, actor);

        for resource in &requested {
            loop {
                let released = self.table().released(resource)?;
                let notified = released.notified();
                tokio::pin!(notified);
                // Register for the wake-up before looking at the owner, so a
                // release between the check and the await is not lost.
                notified.as_mut().enable();

                match self.step(actor, resource, &mut pending)? {
                    Step::Claimed | Step::AlreadyHeld => break,
                    Step::Blocked { holder, fresh } => {
                        if fresh {
                            debug!(
                                actor = %actor,
                                resource = %resource,
                                holder = %holder,
                                "Waiting for resource"
                            );
                            self.emit(LockEvent::lock_contention(actor, resource, &holder));
                        }
                        notified.await;
                    }
                }
            }
        }

        {
            let mut table = self.table();
            table.stop_waiting(actor);
            table.verify_or_abort();
        }
        pending.settle();

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            actor = %actor,
            resources = ?requested,
            elapsed_ms = elapsed_ms,
            "Resource set acquired"
        );
        self.emit(LockEvent::lock_acquired(
            actor,
            requested.into_iter().collect(),
            elapsed_ms,
        ));
        Ok(())
    }

    /// Try to claim one resource, registering a wait edge if it is held
    fn step(
        &self,
        actor: &ActorId,
        resource: &ResourceId,
        pending: &mut PendingAcquire<'_>,
    ) -> Result<Step> {
        let mut guard = self.table();
        let table = &mut *guard;

        let handle = table
            .resources
            .get_mut(resource)
            .ok_or_else(|| Error::UnknownResource(resource.clone()))?;

        match handle.owner().cloned() {
            None => {
                handle.claim(actor);
                let record = table.actors.entry(actor.clone()).or_default();
                record.held.insert(resource.clone());
                record.waiting_on = None;
                table.graph.remove_edges_from(actor);
                pending.claimed.push(resource.clone());
                table.verify_or_abort();
                Ok(Step::Claimed)
            }
            Some(owner) if &owner == actor => Ok(Step::AlreadyHeld),
            Some(holder) => {
                let fresh = !table.graph.waits_on(actor).any(|h| *h == holder);
                table.graph.remove_edges_from(actor);

                match table.graph.add_edge(actor, &holder) {
                    Ok(()) => {
                        table.actors.entry(actor.clone()).or_default().waiting_on =
                            Some(resource.clone());
                        Ok(Step::Blocked { holder, fresh })
                    }
                    Err(rejected) => {
                        let rolled_back = table.rollback(actor, &pending.claimed);
                        pending.settle();
                        table.verify_or_abort();
                        drop(guard);

                        warn!(
                            actor = %actor,
                            resource = %resource,
                            holder = %holder,
                            rolled_back = ?rolled_back,
                            "Deadlock detected, request refused"
                        );
                        self.emit(LockEvent::deadlock_detected(actor, resource, &rejected.cycle));

                        Err(Error::DeadlockDetected {
                            actor: actor.clone(),
                            resource: resource.clone(),
                            cycle: rejected.cycle,
                        })
                    }
                }
            }
        }
    }

    /// Fail on unknown ids, or register them when `auto_register` is set
    fn ensure_registered(&self, requested: &BTreeSet<ResourceId>) -> Result<()> {
        let mut table = self.table();
        for id in requested {
            if table.resources.contains_key(id) {
                continue;
            }
            if !self.inner.config.auto_register {
                return Err(Error::UnknownResource(id.clone()));
            }
            if id.as_str().is_empty() {
                return Err(Error::InvalidInput("resource id must not be empty".to_string()));
            }
            debug!(resource = %id, "Resource registered on first reference");
            table.resources.insert(id.clone(), ResourceHandle::new(id.clone()));
        }
        Ok(())
    }

    /// Roll back an acquire that will never complete
    fn cancel(&self, actor: &ActorId, claimed: &[ResourceId]) {
        let rolled_back = {
            let mut table = self.table();
            let rolled_back = table.rollback(actor, claimed);
            table.verify_or_abort();
            rolled_back
        };

        warn!(
            actor = %actor,
            rolled_back = ?rolled_back,
            "Acquire cancelled, partial claims rolled back"
        );
        self.emit(LockEvent::acquire_cancelled(actor, rolled_back));
    }
}

impl ResourceTable {
    fn released(&self, resource: &ResourceId) -> Result<Arc<tokio::sync::Notify>> {
        self.resources
            .get(resource)
            .map(ResourceHandle::released)
            .ok_or_else(|| Error::UnknownResource(resource.clone()))
    }

    /// Free resources held by `actor` and clear the edges of their waiters
    fn free<'a>(
        &mut self,
        actor: &ActorId,
        resources: impl IntoIterator<Item = &'a ResourceId>,
    ) -> Vec<ResourceId> {
        let mut freed = Vec::new();

        for resource in resources {
            let Some(handle) = self.resources.get_mut(resource) else {
                continue;
            };
            if !handle.is_held_by(actor) {
                continue;
            }
            handle.free();

            if let Some(record) = self.actors.get_mut(actor) {
                record.held.remove(resource);
            }

            // Waiters re-register against the next holder when they wake
            let waiters: Vec<ActorId> = self
                .actors
                .iter()
                .filter(|(_, record)| record.waiting_on.as_ref() == Some(resource))
                .map(|(id, _)| id.clone())
                .collect();
            for waiter in &waiters {
                self.graph.remove_edges_from(waiter);
            }

            freed.push(resource.clone());
        }

        self.prune(actor);
        freed
    }

    fn rollback(&mut self, actor: &ActorId, claimed: &[ResourceId]) -> Vec<ResourceId> {
        self.stop_waiting(actor);
        self.free(actor, claimed)
    }

    fn stop_waiting(&mut self, actor: &ActorId) {
        self.graph.remove_edges_from(actor);
        if let Some(record) = self.actors.get_mut(actor) {
            record.waiting_on = None;
        }
        self.prune(actor);
    }

    /// Forget actors that hold and wait on nothing
    fn prune(&mut self, actor: &ActorId) {
        let idle = self
            .actors
            .get(actor)
            .is_some_and(|record| record.held.is_empty() && record.waiting_on.is_none());
        if idle {
            self.actors.remove(actor);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.resources
                .iter()
                .map(|(id, handle)| (id.clone(), handle.ownership()))
                .collect(),
        )
    }

    fn waits(&self) -> WaitReport {
        WaitReport::new(
            self.graph
                .edges()
                .map(|(waiter, holder)| WaitEdge {
                    waiter: waiter.clone(),
                    holder: holder.clone(),
                    resource: self
                        .actors
                        .get(waiter)
                        .and_then(|record| record.waiting_on.clone()),
                })
                .collect(),
        )
    }

    /// Abort with a state dump if the table is inconsistent
    fn verify_or_abort(&self) {
        if let Err(violation) = self.verify() {
            error!(violation = %violation, table = ?self, "Coordinator invariant violated");
            panic!("resource table corrupted: {violation}");
        }
    }

    fn verify(&self) -> std::result::Result<(), String> {
        for (id, handle) in &self.resources {
            if let Some(owner) = handle.owner() {
                let recorded = self
                    .actors
                    .get(owner)
                    .is_some_and(|record| record.held.contains(id));
                if !recorded {
                    return Err(format!("{} is owned by {} but missing from its holdings", id, owner));
                }
            }
        }

        for (actor, record) in &self.actors {
            for id in &record.held {
                let owned = self
                    .resources
                    .get(id)
                    .is_some_and(|handle| handle.is_held_by(actor));
                if !owned {
                    return Err(format!("{} lists {} as held but does not own it", actor, id));
                }
            }
        }

        if !self.graph.is_acyclic() {
            return Err("wait-for graph contains a cycle".to_string());
        }

        Ok(())
    }
}

/// Tracks the claims of one in-flight acquire and rolls them back on drop
struct PendingAcquire<'a> {
    coordinator: &'a ResourceCoordinator,
    actor: &'a ActorId,
    claimed: Vec<ResourceId>,
    settled: bool,
}

impl<'a> PendingAcquire<'a> {
    fn new(coordinator: &'a ResourceCoordinator, actor: &'a ActorId) -> Self {
        Self {
            coordinator,
            actor,
            claimed: Vec::new(),
            settled: false,
        }
    }

    /// The acquire finished (either way); nothing is left to roll back
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.cancel(self.actor, &self.claimed);
        }
    }
}

fn canonicalize<I, R>(resources: I) -> BTreeSet<ResourceId>
where
    I: IntoIterator<Item = R>,
    R: Into<ResourceId>,
{
    resources.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::locking::event::LockEventType;
    use crate::domain::locking::types::Ownership;

    fn create_test_coordinator() -> ResourceCoordinator {
        ResourceCoordinator::with_resources(
            CoordinatorConfig::default(),
            ["alpha", "beta", "gamma"],
        )
        .expect("Failed to create coordinator")
    }

    fn set(ids: &[&str]) -> BTreeSet<ResourceId> {
        ids.iter().map(|id| ResourceId::from(*id)).collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let coordinator = create_test_coordinator();
        let actor = ActorId::from("t1");

        coordinator
            .acquire(&actor, ["beta", "alpha"])
            .await
            .expect("Failed to acquire");

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.owner_of("alpha"), Some(&actor));
        assert_eq!(snapshot.owner_of("beta"), Some(&actor));
        assert!(snapshot.is_free("gamma"));
        assert_eq!(coordinator.holdings(&actor), set(&["alpha", "beta"]));

        coordinator
            .release(&actor, ["alpha", "beta"])
            .expect("Failed to release");

        assert!(coordinator.snapshot().all_free());
        assert_eq!(coordinator.active_actors(), 0);
    }

    #[tokio::test]
    async fn test_empty_set_is_noop() {
        let coordinator = create_test_coordinator();
        let actor = ActorId::from("t1");

        coordinator
            .acquire(&actor, Vec::<ResourceId>::new())
            .await
            .unwrap();
        coordinator.release(&actor, Vec::<ResourceId>::new()).unwrap();

        assert_eq!(coordinator.active_actors(), 0);
    }

    #[tokio::test]
    async fn test_unknown_resource_rejected() {
        let coordinator = create_test_coordinator();
        let actor = ActorId::from("t1");

        let err = coordinator
            .acquire(&actor, ["alpha", "missing"])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownResource(ref id) if id.as_str() == "missing"));
        // Nothing was claimed before the unknown id was found
        assert!(coordinator.snapshot().all_free());
    }

    #[tokio::test]
    async fn test_auto_register() {
        let coordinator =
            ResourceCoordinator::new(CoordinatorConfig::default().with_auto_register(true));
        let actor = ActorId::from("t1");

        coordinator.acquire(&actor, ["lazy"]).await.unwrap();

        assert!(coordinator.is_registered("lazy"));
        assert_eq!(coordinator.snapshot().owner_of("lazy"), Some(&actor));
    }

    #[test]
    fn test_duplicate_registration() {
        let coordinator = create_test_coordinator();
        let err = coordinator.register("alpha").unwrap_err();
        assert_eq!(err.code(), "E304");

        let err = coordinator.register("").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_release_not_owner_leaves_state_intact() {
        let coordinator = create_test_coordinator();
        let t1 = ActorId::from("t1");
        let t2 = ActorId::from("t2");

        coordinator.acquire(&t1, ["alpha"]).await.unwrap();
        let before = coordinator.snapshot();

        // t2 holds nothing
        let err = coordinator.release(&t2, ["alpha"]).unwrap_err();
        assert!(matches!(err, Error::NotOwner { .. }));

        // t1 holds alpha but not beta: nothing is released
        let err = coordinator.release(&t1, ["alpha", "beta"]).unwrap_err();
        assert!(matches!(err, Error::NotOwner { ref resource, .. } if resource.as_str() == "beta"));

        assert_eq!(coordinator.snapshot(), before);
    }

    #[tokio::test]
    async fn test_reacquire_held_resource_is_idempotent() {
        let coordinator = create_test_coordinator();
        let actor = ActorId::from("t1");

        coordinator.acquire(&actor, ["alpha"]).await.unwrap();
        coordinator.acquire(&actor, ["alpha", "beta"]).await.unwrap();

        assert_eq!(coordinator.holdings(&actor), set(&["alpha", "beta"]));
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let coordinator = create_test_coordinator();
        let t1 = ActorId::from("t1");
        let t2 = ActorId::from("t2");

        coordinator.acquire(&t1, ["alpha"]).await.unwrap();

        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            let t2 = t2.clone();
            async move { coordinator.acquire(&t2, ["alpha", "beta"]).await }
        });

        wait_until(|| coordinator.pending_waits().is_waiting(&t2)).await;
        let waits = coordinator.pending_waits();
        let edge = waits.iter().next().unwrap();
        assert_eq!(edge.holder, t1);
        assert_eq!(edge.resource, Some(ResourceId::from("alpha")));

        coordinator.release(&t1, ["alpha"]).unwrap();
        waiter.await.unwrap().unwrap();

        assert_eq!(coordinator.holdings(&t2), set(&["alpha", "beta"]));
        assert!(coordinator.pending_waits().is_empty());
    }

    #[tokio::test]
    async fn test_cross_wait_detected() {
        let coordinator = create_test_coordinator();
        let a = ActorId::from("a");
        let b = ActorId::from("b");

        coordinator.acquire(&a, ["gamma"]).await.unwrap();
        coordinator.acquire(&b, ["alpha"]).await.unwrap();

        let a_waits = tokio::spawn({
            let coordinator = coordinator.clone();
            let a = a.clone();
            async move { coordinator.acquire(&a, ["alpha"]).await }
        });
        wait_until(|| coordinator.pending_waits().is_waiting(&a)).await;

        // beta is claimed first, then gamma would close b -> a -> b
        let err = coordinator.acquire(&b, ["gamma", "beta"]).await.unwrap_err();
        match err {
            Error::DeadlockDetected {
                actor,
                resource,
                cycle,
            } => {
                assert_eq!(actor, b);
                assert_eq!(resource.as_str(), "gamma");
                assert_eq!(cycle, vec![b.clone(), a.clone(), b.clone()]);
            }
            other => panic!("expected deadlock, got {other:?}"),
        }

        // beta was rolled back; prior holdings are intact
        assert!(coordinator.snapshot().is_free("beta"));
        assert_eq!(coordinator.holdings(&a), set(&["gamma"]));
        assert_eq!(coordinator.holdings(&b), set(&["alpha"]));
        assert!(!coordinator.pending_waits().is_waiting(&b));

        // b backs off, a completes
        assert_eq!(coordinator.release_all(&b).unwrap(), 1);
        a_waits.await.unwrap().unwrap();
        assert_eq!(coordinator.holdings(&a), set(&["alpha", "gamma"]));
    }

    #[tokio::test]
    async fn test_timeout_rolls_back_partial_claims() {
        let coordinator = create_test_coordinator();
        let t1 = ActorId::from("t1");
        let t2 = ActorId::from("t2");

        coordinator.acquire(&t1, ["beta"]).await.unwrap();

        let err = coordinator
            .acquire_timeout(&t2, ["alpha", "beta"], Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(coordinator.snapshot().is_free("alpha"));
        assert!(coordinator.pending_waits().is_empty());
        assert!(coordinator.holdings(&t2).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_acquire_rolls_back() {
        let coordinator = create_test_coordinator();
        let t1 = ActorId::from("t1");
        let t2 = ActorId::from("t2");
        let mut events = coordinator.subscribe();

        coordinator.acquire(&t1, ["beta"]).await.unwrap();

        let handle = tokio::spawn({
            let coordinator = coordinator.clone();
            let t2 = t2.clone();
            async move { coordinator.acquire(&t2, ["alpha", "beta"]).await }
        });
        wait_until(|| coordinator.pending_waits().is_waiting(&t2)).await;
        assert_eq!(coordinator.snapshot().owner_of("alpha"), Some(&t2));

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert!(coordinator.snapshot().is_free("alpha"));
        assert!(coordinator.pending_waits().is_empty());

        let mut saw_cancel = false;
        while let Ok(event) = events.try_recv() {
            if event.event_type == LockEventType::AcquireCancelled {
                assert_eq!(event.actor, t2);
                assert_eq!(event.resources, vec![ResourceId::from("alpha")]);
                saw_cancel = true;
            }
        }
        assert!(saw_cancel);
    }

    #[tokio::test]
    async fn test_try_acquire() {
        let coordinator = create_test_coordinator();
        let t1 = ActorId::from("t1");
        let t2 = ActorId::from("t2");

        assert!(coordinator.try_acquire(&t1, ["alpha"]).unwrap());
        assert!(!coordinator.try_acquire(&t2, ["beta", "alpha"]).unwrap());

        // The contended attempt claimed nothing
        assert!(coordinator.snapshot().is_free("beta"));
        assert!(coordinator.try_acquire(&t1, ["alpha", "beta"]).unwrap());
        assert_eq!(coordinator.holdings(&t1), set(&["alpha", "beta"]));
    }

    #[tokio::test]
    async fn test_run_releases_after_work() {
        let coordinator = create_test_coordinator();
        let actor = ActorId::from("t1");

        let observed = coordinator
            .run(&actor, ["alpha"], || {
                let coordinator = coordinator.clone();
                async move { coordinator.snapshot().get("alpha").cloned() }
            })
            .await
            .unwrap();

        assert_eq!(observed, Some(Ownership::Owned(actor)));
        assert!(coordinator.snapshot().all_free());
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let coordinator = create_test_coordinator();
        let actor = ActorId::from("t1");
        let mut events = coordinator.subscribe();

        coordinator.acquire(&actor, ["alpha"]).await.unwrap();
        coordinator.release(&actor, ["alpha"]).unwrap();

        assert_eq!(
            events.recv().await.unwrap().event_type,
            LockEventType::LockAcquired
        );
        assert_eq!(
            events.recv().await.unwrap().event_type,
            LockEventType::LockReleased
        );
    }

    #[test]
    fn test_canonicalize_sorts_and_dedups() {
        let ids = canonicalize(["whats_up", "how_you_doin", "whats_up"]);
        let ordered: Vec<_> = ids.iter().map(ResourceId::as_str).collect();
        assert_eq!(ordered, vec!["how_you_doin", "whats_up"]);
    }
}
