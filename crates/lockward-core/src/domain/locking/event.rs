//! Locking events
//!
//! Events for tracking lock-related activities. The coordinator broadcasts
//! them to any subscriber (a logger, a metrics sink, a test harness).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{ActorId, ResourceId};

/// Type of lock event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventType {
    /// A resource set was acquired
    LockAcquired,
    /// Resources were released
    LockReleased,
    /// An actor blocked on a resource held by another actor
    LockContention,
    /// A request was refused because waiting would close a cycle
    DeadlockDetected,
    /// A pending acquire was cancelled or timed out and rolled back
    AcquireCancelled,
}

impl LockEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockAcquired => "lock_acquired",
            Self::LockReleased => "lock_released",
            Self::LockContention => "lock_contention",
            Self::DeadlockDetected => "deadlock_detected",
            Self::AcquireCancelled => "acquire_cancelled",
        }
    }
}

impl std::fmt::Display for LockEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A locking event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// Type of event
    pub event_type: LockEventType,
    /// The actor the event is about
    pub actor: ActorId,
    /// Resources involved, in canonical order
    pub resources: Vec<ResourceId>,
    /// Event data
    pub data: Option<serde_json::Value>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl LockEvent {
    /// Create a new lock event
    pub fn new(
        event_type: LockEventType,
        actor: &ActorId,
        resources: Vec<ResourceId>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            actor: actor.clone(),
            resources,
            data,
            created_at: Utc::now(),
        }
    }

    /// Create a lock acquired event
    pub fn lock_acquired(actor: &ActorId, resources: Vec<ResourceId>, elapsed_ms: u64) -> Self {
        let data = serde_json::json!({ "elapsed_ms": elapsed_ms });
        Self::new(LockEventType::LockAcquired, actor, resources, Some(data))
    }

    /// Create a lock released event
    pub fn lock_released(actor: &ActorId, resources: Vec<ResourceId>) -> Self {
        Self::new(LockEventType::LockReleased, actor, resources, None)
    }

    /// Create a lock contention event
    pub fn lock_contention(actor: &ActorId, resource: &ResourceId, holder: &ActorId) -> Self {
        let data = serde_json::json!({ "holder": holder });
        Self::new(
            LockEventType::LockContention,
            actor,
            vec![resource.clone()],
            Some(data),
        )
    }

    /// Create a deadlock detected event
    pub fn deadlock_detected(actor: &ActorId, resource: &ResourceId, cycle: &[ActorId]) -> Self {
        let data = serde_json::json!({ "cycle": cycle });
        Self::new(
            LockEventType::DeadlockDetected,
            actor,
            vec![resource.clone()],
            Some(data),
        )
    }

    /// Create an acquire cancelled event listing the rolled-back resources
    pub fn acquire_cancelled(actor: &ActorId, rolled_back: Vec<ResourceId>) -> Self {
        Self::new(LockEventType::AcquireCancelled, actor, rolled_back, None)
    }
}
