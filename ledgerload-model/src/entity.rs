use std::collections::BTreeMap;

use crate::ids::{ActorId, ContainerId, EntityId, LogicalKey};

/// Where an entity sits in its submission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntityStatus {
    Workspace,
    Workflow,
    #[default]
    Archived,
    Withdrawn,
}

/// A materialized entity in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entity {
    pub id: EntityId,
    pub logical_key: LogicalKey,
    pub source_ref: Option<String>,
    pub owner: ActorId,
    pub container: ContainerId,
    pub status: EntityStatus,
    pub metadata: BTreeMap<String, Vec<String>>,
    /// Names of the files attached to the entity.
    pub bitstreams: Vec<String>,
}

impl Entity {
    pub fn new(
        logical_key: LogicalKey,
        owner: ActorId,
        container: ContainerId,
    ) -> Self {
        Self {
            id: EntityId::new(),
            logical_key,
            source_ref: None,
            owner,
            container,
            status: EntityStatus::default(),
            metadata: BTreeMap::new(),
            bitstreams: Vec::new(),
        }
    }

    pub fn is_withdrawn(&self) -> bool {
        self.status == EntityStatus::Withdrawn
    }
}
