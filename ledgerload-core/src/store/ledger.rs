use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use ledgerload_model::{ContainerId, Entity, LogicalKey, MutationRecord};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ImportError, Result},
    import::{CardinalityOracle, LedgerReader},
};

use super::memory::{Actor, EntityStore};

/// On-disk ledger: the store seed plus the pending records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerFile {
    pub actors: Vec<Actor>,
    pub containers: Vec<ContainerId>,
    /// Entities created by earlier runs, with their key mappings.
    pub entities: Vec<Entity>,
    pub records: Vec<MutationRecord>,
}

impl LedgerFile {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            ImportError::Ledger(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Register actors, containers, and prior entities with `store`.
    pub async fn seed(&self, store: &EntityStore) {
        for actor in &self.actors {
            store.register_actor(actor.clone()).await;
        }
        for container in &self.containers {
            store.register_container(*container).await;
        }
        for entity in &self.entities {
            store.insert_entity(entity.clone()).await;
        }
    }

    pub fn into_ledger(self) -> Result<SnapshotLedger> {
        SnapshotLedger::new(self.records)
    }
}

/// Immutable pending-record snapshot, ordered by `sequence_id`. Serves as
/// both the ledger reader and the cardinality oracle for a run.
#[derive(Clone, Debug, Default)]
pub struct SnapshotLedger {
    records: Vec<MutationRecord>,
    pending: HashMap<LogicalKey, usize>,
}

impl SnapshotLedger {
    pub fn new(mut records: Vec<MutationRecord>) -> Result<Self> {
        records.sort_by_key(|record| record.sequence_id);
        if let Some(pair) = records
            .windows(2)
            .find(|pair| pair[0].sequence_id == pair[1].sequence_id)
        {
            return Err(ImportError::Ledger(format!(
                "duplicate sequence id {}",
                pair[0].sequence_id
            )));
        }

        let mut pending: HashMap<LogicalKey, usize> = HashMap::new();
        for record in &records {
            *pending.entry(record.logical_key.clone()).or_default() += 1;
        }
        Ok(Self { records, pending })
    }

    pub fn records(&self) -> &[MutationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_for(&self, key: &LogicalKey) -> usize {
        self.pending.get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LedgerReader for SnapshotLedger {
    async fn read_pending(&self) -> Result<Vec<MutationRecord>> {
        Ok(self.records.clone())
    }
}

#[async_trait]
impl CardinalityOracle for SnapshotLedger {
    async fn count_pending(&self, record: &MutationRecord) -> Result<usize> {
        Ok(self.pending_for(&record.logical_key))
    }
}
