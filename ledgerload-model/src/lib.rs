//! Core data model definitions shared across ledgerload crates.
#![allow(missing_docs)]

pub mod entity;
pub mod error;
pub mod ids;
pub mod record;

// Intentionally curated re-exports for downstream consumers.
pub use entity::{Entity, EntityStatus};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{ActorId, ContainerId, EntityId, LogicalKey};
pub use record::{MutationRecord, Operation, TargetStatus};
