//! Domain layer
//!
//! Contains the core coordination logic and its models.

pub mod locking;
