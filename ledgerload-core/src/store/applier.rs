//! Record semantics for the in-memory store: add, replace, delete, and
//! lifecycle transitions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ledgerload_model::{
    Entity, EntityId, EntityStatus, MutationRecord, Operation, TargetStatus,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApplyFault,
    import::{ApplyOutcome, ExecutionContext, MutationApplier},
};

use super::memory::{Actor, ImportMapping, MemoryContext};

pub const PROVENANCE_FIELD: &str = "dc.description.provenance";

/// How updates treat existing content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
    /// Metadata fields cleared before an update writes new values. A trailing
    /// `.*` matches every qualifier. Empty means clear everything.
    pub metadata_clean: Vec<String>,
    /// Clear every field except those listed in `metadata_clean`.
    pub invert_metadata_clean: bool,
    /// Replace attached bitstreams on update instead of appending.
    pub delete_bitstreams: bool,
}

impl ApplyOptions {
    /// Fields of `existing` an update must clear.
    pub fn fields_to_clear<'a, I>(&self, existing: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        existing
            .into_iter()
            .filter(|field| {
                if self.metadata_clean.is_empty() {
                    return true;
                }
                let listed = self
                    .metadata_clean
                    .iter()
                    .any(|pattern| field_matches(pattern, field));
                listed != self.invert_metadata_clean
            })
            .cloned()
            .collect()
    }
}

fn field_matches(pattern: &str, field: &str) -> bool {
    match pattern.strip_suffix(".*") {
        Some(prefix) => {
            field == prefix
                || field
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
        None => field == pattern,
    }
}

/// Applies ledger records against a [`MemoryContext`].
#[derive(Clone, Debug, Default)]
pub struct RecordApplier {
    options: ApplyOptions,
    batch_actor: Option<Actor>,
}

impl RecordApplier {
    pub fn new(options: ApplyOptions) -> Self {
        Self {
            options,
            batch_actor: None,
        }
    }

    /// Stamp provenance with the account the batch runs as.
    pub fn with_batch_actor(mut self, actor: Actor) -> Self {
        self.batch_actor = Some(actor);
        self
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    async fn resolve_target(
        &self,
        record: &MutationRecord,
        context: &MemoryContext,
    ) -> Option<EntityId> {
        if record.target_entity_id.is_some() {
            return record.target_entity_id;
        }
        context
            .mapping(&record.logical_key)
            .await
            .filter(|mapping| mapping.source_ref == record.source_ref)
            .map(|mapping| mapping.entity_id)
    }

    fn stamp(&self, record: &MutationRecord, entity: &mut Entity) {
        let Some(actor) = &self.batch_actor else {
            return;
        };
        entity
            .metadata
            .entry(PROVENANCE_FIELD.to_string())
            .or_default()
            .push(format!(
                "Imported by {} from ledger record {}",
                actor.email, record.sequence_id
            ));
    }

    fn create(&self, record: &MutationRecord) -> Result<Entity, String> {
        let (Some(owner), Some(container)) = (record.actor_id, record.container_id) else {
            return Err("actor or container missing".to_string());
        };
        let mut entity = Entity::new(record.logical_key.clone(), owner, container);
        entity.source_ref = record.source_ref.clone();
        entity.metadata = record.metadata.clone();
        entity.bitstreams = record.bitstreams.clone();
        match record.status {
            Some(TargetStatus::Withdraw) => {
                return Err(format!("entity for {} is not in archive", record.logical_key));
            }
            Some(status) => transition(&mut entity, status)?,
            None => {}
        }
        self.stamp(record, &mut entity);
        Ok(entity)
    }

    fn replace(&self, record: &MutationRecord, mut entity: Entity) -> Result<Entity, String> {
        for field in self.options.fields_to_clear(entity.metadata.keys()) {
            entity.metadata.remove(&field);
        }
        merge_metadata(&mut entity.metadata, &record.metadata);

        if self.options.delete_bitstreams {
            entity.bitstreams = record.bitstreams.clone();
        } else {
            entity.bitstreams.extend(record.bitstreams.iter().cloned());
        }
        if let Some(owner) = record.actor_id {
            entity.owner = owner;
        }
        if let Some(container) = record.container_id {
            entity.container = container;
        }
        if record.source_ref.is_some() {
            entity.source_ref = record.source_ref.clone();
        }
        if let Some(status) = record.status {
            transition(&mut entity, status)?;
        }
        self.stamp(record, &mut entity);
        Ok(entity)
    }
}

fn merge_metadata(
    target: &mut BTreeMap<String, Vec<String>>,
    incoming: &BTreeMap<String, Vec<String>>,
) {
    for (field, values) in incoming {
        target
            .entry(field.clone())
            .or_default()
            .extend(values.iter().cloned());
    }
}

/// Only archived entities can be withdrawn; reinstating anything that is not
/// withdrawn leaves it untouched.
fn transition(entity: &mut Entity, status: TargetStatus) -> Result<(), String> {
    entity.status = match status {
        TargetStatus::Workspace => EntityStatus::Workspace,
        TargetStatus::Workflow => EntityStatus::Workflow,
        TargetStatus::Withdraw if entity.status == EntityStatus::Archived => {
            EntityStatus::Withdrawn
        }
        TargetStatus::Withdraw => {
            return Err(format!("entity {} is not in archive", entity.id));
        }
        TargetStatus::Reinstate if entity.is_withdrawn() => EntityStatus::Archived,
        TargetStatus::Reinstate => entity.status,
    };
    Ok(())
}

#[async_trait]
impl MutationApplier<MemoryContext> for RecordApplier {
    async fn apply(
        &self,
        record: &MutationRecord,
        context: &mut MemoryContext,
    ) -> Result<ApplyOutcome, ApplyFault> {
        if !context.is_valid() {
            return Err(ApplyFault::new("apply called on an invalid context"));
        }

        let (Some(actor_id), Some(container_id)) = (record.actor_id, record.container_id)
        else {
            return Ok(ApplyOutcome::rejected("actor or container missing"));
        };
        if context.actor(actor_id).await.is_none() {
            return Ok(ApplyOutcome::rejected(format!("actor {actor_id} not found")));
        }
        if !context.container_exists(container_id).await {
            return Ok(ApplyOutcome::rejected(format!(
                "container {container_id} not found"
            )));
        }

        let target = self.resolve_target(record, context).await;
        let existing = match target {
            Some(id) => context.entity(id).await,
            None => None,
        };
        // any mapping for the key turns an update into a replace, even one
        // recorded under another source ref
        let mapped = context.mapping(&record.logical_key).await.is_some();

        match (record.operation, target, existing) {
            (Operation::Delete, None, _) => Ok(ApplyOutcome::rejected(
                "delete without a resolvable target",
            )),
            (Operation::Delete, Some(id), None) => Ok(ApplyOutcome::rejected(format!(
                "entity {id} not found for delete"
            ))),
            (Operation::Delete, Some(id), Some(_)) => {
                context.remove_entity(id);
                context.unmap_key(record.logical_key.clone());
                Ok(ApplyOutcome::Applied)
            }
            (Operation::Update, Some(_), Some(entity)) => {
                match self.replace(record, entity) {
                    Ok(entity) => {
                        context.put_entity(entity);
                        Ok(ApplyOutcome::Applied)
                    }
                    Err(reason) => Ok(ApplyOutcome::rejected(reason)),
                }
            }
            (Operation::Update, Some(id), None) => Ok(ApplyOutcome::rejected(format!(
                "entity {id} not found for update"
            ))),
            (Operation::Update, None, _) if mapped => Ok(ApplyOutcome::rejected(format!(
                "no entity found for {}: source ref does not match the stored mapping",
                record.logical_key
            ))),
            (_, Some(id), None) if record.target_entity_id.is_some() => Ok(
                ApplyOutcome::rejected(format!("referenced entity {id} not found")),
            ),
            // adds, and updates with no prior import of this key
            _ => match self.create(record) {
                Ok(entity) => {
                    context.map_key(
                        record.logical_key.clone(),
                        ImportMapping {
                            entity_id: entity.id,
                            source_ref: record.source_ref.clone(),
                        },
                    );
                    context.put_entity(entity);
                    Ok(ApplyOutcome::Applied)
                }
                Err(reason) => Ok(ApplyOutcome::rejected(reason)),
            },
        }
    }
}
