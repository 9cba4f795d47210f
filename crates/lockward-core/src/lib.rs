//! Lockward Core Library
//!
//! This crate provides the core functionality for Lockward, including:
//! - Resource coordination with canonical acquisition order
//! - Wait-for graph deadlock refusal
//! - Ownership snapshots and lock events
//! - File-backed configuration

pub mod config;
pub mod domain;
pub mod error;

pub use domain::locking::{
    ActorId, CoordinatorConfig, LockEvent, LockEventType, Ownership, ResourceCoordinator,
    ResourceId, ResourceSetGuard, Snapshot, StateReport, WaitReport,
};
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::locking::{
        ActorId, CoordinatorConfig, Ownership, ResourceCoordinator, ResourceId, ResourceSetGuard,
    };
    pub use crate::error::{Error, Result};
}
