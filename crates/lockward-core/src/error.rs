//! Error types for Lockward

use crate::domain::locking::{ActorId, ResourceId};
use thiserror::Error;

/// Result type alias using Lockward's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Lockward error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Coordination errors (E300-E399)
    #[error(
        "Deadlock detected: actor '{actor}' waiting on '{resource}' would close the cycle {}. Release held resources and retry.",
        display_cycle(.cycle)
    )]
    DeadlockDetected {
        actor: ActorId,
        resource: ResourceId,
        cycle: Vec<ActorId>,
    },

    #[error("Actor '{actor}' does not hold resource '{resource}'")]
    NotOwner { actor: ActorId, resource: ResourceId },

    #[error("Resource '{0}' is not registered with the coordinator")]
    UnknownResource(ResourceId),

    #[error("Lock timeout: actor '{actor}' gave up after {timeout_ms}ms")]
    Timeout { actor: ActorId, timeout_ms: u64 },

    #[error("Resource '{0}' is already registered")]
    DuplicateResource(ResourceId),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeadlockDetected { .. } => "E300",
            Self::NotOwner { .. } => "E301",
            Self::UnknownResource(_) => "E302",
            Self::Timeout { .. } => "E303",
            Self::DuplicateResource(_) => "E304",
            Self::InvalidInput(_) => "E800",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::DeadlockDetected { actor, .. } => Some(format!(
                "release the resources held by '{}' and retry the request",
                actor
            )),
            Self::UnknownResource(id) => Some(format!(
                "register '{}' first or set coordinator.auto_register = true",
                id
            )),
            Self::Timeout { .. } => Some("lockward config set coordinator.acquire_timeout_ms <ms>".to_string()),
            _ => None,
        }
    }

    /// Whether the caller may back off and retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeadlockDetected { .. } | Self::Timeout { .. })
    }
}

fn display_cycle(cycle: &[ActorId]) -> String {
    cycle
        .iter()
        .map(ActorId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
