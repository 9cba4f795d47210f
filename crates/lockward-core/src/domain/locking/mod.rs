//! Resource coordination for concurrent actors
//!
//! This module lets independent actors (threads or tasks) acquire exclusive
//! access to sets of named resources without deadlocking.
//!
//! # Architecture
//!
//! - **Types**: `ResourceId`, `ActorId`, `Ownership`, `CoordinatorConfig`
//! - **Handles**: `ResourceHandle`, one per registered resource
//! - **Wait-for graph**: `WaitForGraph`, refuses edges that close a cycle
//! - **Coordinator**: `ResourceCoordinator`, the acquire/release API
//! - **Reports**: `Snapshot`, `WaitReport`, `StateReport`
//! - **Guards**: `ResourceSetGuard` for automatic release
//!
//! # Deadlock freedom
//!
//! Every request is claimed in ascending `ResourceId` order, so two actors
//! asking for the same set in opposite orders cannot block each other. An
//! actor that already holds resources and asks for more can still close a
//! cycle; the wait-for graph catches that and the request fails with
//! `Error::DeadlockDetected` instead of blocking forever.
//!
//! # Example
//!
//! ```ignore
//! use lockward_core::domain::locking::{ActorId, CoordinatorConfig, ResourceCoordinator};
//!
//! let coordinator = ResourceCoordinator::with_resources(
//!     CoordinatorConfig::default(),
//!     ["whats_up", "how_you_doin"],
//! )?;
//!
//! let t1 = ActorId::from("t1");
//! coordinator.acquire(&t1, ["whats_up", "how_you_doin"]).await?;
//! // Do work...
//! coordinator.release(&t1, ["whats_up", "how_you_doin"])?;
//! ```

pub mod coordinator;
pub mod event;
pub mod graph;
pub mod guard;
pub mod handle;
pub mod report;
pub mod types;

// Re-export main types
pub use coordinator::ResourceCoordinator;
pub use event::{LockEvent, LockEventType};
pub use graph::{WaitForGraph, WouldCycle};
pub use guard::ResourceSetGuard;
pub use handle::ResourceHandle;
pub use report::{Snapshot, StateReport, WaitEdge, WaitReport};
pub use types::{ActorId, CoordinatorConfig, Ownership, ResourceId, ResourceState};
