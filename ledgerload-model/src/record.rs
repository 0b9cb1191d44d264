use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::{
    error::ModelError,
    ids::{ActorId, ContainerId, EntityId, LogicalKey},
};

/// Kind of mutation a ledger row requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "add" | "insert" | "create" => Ok(Operation::Add),
            "update" | "replace" => Ok(Operation::Update),
            "delete" | "remove" => Ok(Operation::Delete),
            other => Err(ModelError::UnknownOperation(other.to_string())),
        }
    }
}

/// Lifecycle transition requested alongside a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TargetStatus {
    /// Send the submission back to the submitter's workspace (`p`).
    Workspace,
    /// Route the submission through the container's workflow (`w`).
    Workflow,
    /// Withdraw the entity from public view (`g`).
    Withdraw,
    /// Reinstate a previously withdrawn entity (`z`).
    Reinstate,
}

impl FromStr for TargetStatus {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "p" | "workspace" => Ok(TargetStatus::Workspace),
            "w" | "workflow" => Ok(TargetStatus::Workflow),
            "g" | "withdraw" | "withdrawn" => Ok(TargetStatus::Withdraw),
            "z" | "reinstate" => Ok(TargetStatus::Reinstate),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// One pending row of the import ledger.
///
/// `sequence_id` is the position in ledger scan order; records sharing a
/// `logical_key` must reach the applier in non-decreasing `sequence_id`
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MutationRecord {
    pub sequence_id: u64,
    pub logical_key: LogicalKey,
    pub operation: Operation,
    #[cfg_attr(feature = "serde", serde(default))]
    pub target_entity_id: Option<EntityId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub actor_id: Option<ActorId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub container_id: Option<ContainerId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub source_ref: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: Option<TargetStatus>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub metadata: BTreeMap<String, Vec<String>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bitstreams: Vec<String>,
}

impl MutationRecord {
    pub fn new(
        sequence_id: u64,
        logical_key: LogicalKey,
        operation: Operation,
    ) -> Self {
        Self {
            sequence_id,
            logical_key,
            operation,
            target_entity_id: None,
            actor_id: None,
            container_id: None,
            source_ref: None,
            status: None,
            metadata: BTreeMap::new(),
            bitstreams: Vec::new(),
        }
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor_id = Some(actor);
        self
    }

    pub fn with_container(mut self, container: ContainerId) -> Self {
        self.container_id = Some(container);
        self
    }

    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target_entity_id = Some(target);
        self
    }

    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    pub fn with_status(mut self, status: TargetStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_bitstream(mut self, name: impl Into<String>) -> Self {
        self.bitstreams.push(name.into());
        self
    }

    pub fn with_field<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata
            .insert(field.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_accepts_legacy_spellings() {
        assert_eq!("insert".parse::<Operation>().unwrap(), Operation::Add);
        assert_eq!(" Update ".parse::<Operation>().unwrap(), Operation::Update);
        assert!(matches!(
            "".parse::<Operation>(),
            Err(ModelError::UnknownOperation(_))
        ));
    }

    #[test]
    fn status_parses_single_letter_flags() {
        assert_eq!("g".parse::<TargetStatus>().unwrap(), TargetStatus::Withdraw);
        assert_eq!("z".parse::<TargetStatus>().unwrap(), TargetStatus::Reinstate);
        assert!("q".parse::<TargetStatus>().is_err());
    }
}
