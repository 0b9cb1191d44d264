#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ledgerload_core::error::{ApplyFault, ContextError};
use ledgerload_core::import::{
    ApplyOutcome, ContextProvider, ExecutionContext, MutationApplier,
};
use ledgerload_model::{LogicalKey, MutationRecord, Operation};

/// One committed application: (context id, sequence id, key).
pub type Applied = (usize, u64, String);

#[derive(Debug, Default)]
pub struct Journal {
    applied: Mutex<Vec<Applied>>,
}

impl Journal {
    pub fn applied(&self) -> Vec<Applied> {
        self.applied.lock().expect("journal lock").clone()
    }

    /// Sequence ids committed for `key`, with the context that ran each.
    pub fn for_key(&self, key: &str) -> Vec<(usize, u64)> {
        self.applied()
            .into_iter()
            .filter(|(_, _, k)| k == key)
            .map(|(ctx, seq, _)| (ctx, seq))
            .collect()
    }
}

#[derive(Debug)]
pub struct RecordingContext {
    id: usize,
    journal: Arc<Journal>,
    pending: Vec<(u64, String)>,
    fail_commit_on: Arc<HashSet<u64>>,
    valid: bool,
}

#[async_trait]
impl ExecutionContext for RecordingContext {
    async fn commit(&mut self) -> Result<(), ContextError> {
        if !self.valid {
            return Err(ContextError::Invalid);
        }
        if let Some((seq, _)) = self
            .pending
            .iter()
            .find(|(seq, _)| self.fail_commit_on.contains(seq))
        {
            return Err(ContextError::Commit(format!("constraint violation on {seq}")));
        }
        let mut applied = self.journal.applied.lock().expect("journal lock");
        for (seq, key) in self.pending.drain(..) {
            applied.push((self.id, seq, key));
        }
        Ok(())
    }

    async fn abort(&mut self) {
        self.pending.clear();
        self.valid = false;
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

#[derive(Debug, Default)]
pub struct RecordingProvider {
    pub journal: Arc<Journal>,
    created: AtomicUsize,
    fail_commit_on: Arc<HashSet<u64>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_commit_on(seqs: impl IntoIterator<Item = u64>) -> Self {
        Self {
            fail_commit_on: Arc::new(seqs.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn contexts_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextProvider for RecordingProvider {
    type Context = RecordingContext;

    async fn new_context(&self) -> Result<RecordingContext, ContextError> {
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(RecordingContext {
            id,
            journal: Arc::clone(&self.journal),
            pending: Vec::new(),
            fail_commit_on: Arc::clone(&self.fail_commit_on),
            valid: true,
        })
    }
}

/// Applier whose behaviour per sequence id is scripted by the test.
#[derive(Debug, Default)]
pub struct ScriptedApplier {
    pub delay: Option<Duration>,
    pub slow: HashSet<u64>,
    pub reject: HashSet<u64>,
    pub fatal: HashSet<u64>,
    /// Stage the record, then fault.
    pub fatal_after_stage: HashSet<u64>,
    pub panic_on: HashSet<u64>,
    calls: AtomicUsize,
}

impl ScriptedApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn slow_on(mut self, seqs: impl IntoIterator<Item = u64>) -> Self {
        self.slow.extend(seqs);
        self
    }

    pub fn rejecting(mut self, seqs: impl IntoIterator<Item = u64>) -> Self {
        self.reject.extend(seqs);
        self
    }

    pub fn fatal_on(mut self, seqs: impl IntoIterator<Item = u64>) -> Self {
        self.fatal.extend(seqs);
        self
    }

    pub fn fatal_after_staging(mut self, seqs: impl IntoIterator<Item = u64>) -> Self {
        self.fatal_after_stage.extend(seqs);
        self
    }

    pub fn panicking_on(mut self, seqs: impl IntoIterator<Item = u64>) -> Self {
        self.panic_on.extend(seqs);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MutationApplier<RecordingContext> for ScriptedApplier {
    async fn apply(
        &self,
        record: &MutationRecord,
        context: &mut RecordingContext,
    ) -> Result<ApplyOutcome, ApplyFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seq = record.sequence_id;

        if let Some(delay) = self.delay {
            if self.slow.is_empty() || self.slow.contains(&seq) {
                tokio::time::sleep(delay).await;
            }
        }
        if self.panic_on.contains(&seq) {
            panic!("applier blew up on record {seq}");
        }
        if self.fatal.contains(&seq) {
            return Err(ApplyFault::new(format!("store connection lost at {seq}")));
        }
        if self.reject.contains(&seq) {
            return Ok(ApplyOutcome::rejected(format!("record {seq} rejected")));
        }

        context
            .pending
            .push((seq, record.logical_key.as_str().to_string()));
        if self.fatal_after_stage.contains(&seq) {
            return Err(ApplyFault::new(format!("store connection lost after staging {seq}")));
        }
        Ok(ApplyOutcome::Applied)
    }
}

pub fn record(seq: u64, key: &str) -> MutationRecord {
    MutationRecord::new(seq, LogicalKey::new(key).expect("valid key"), Operation::Add)
}

/// `count` records cycling through `keys` distinct keys.
pub fn cycling_records(count: u64, keys: u64) -> Vec<MutationRecord> {
    (1..=count)
        .map(|seq| record(seq, &format!("key-{}", seq % keys.max(1))))
        .collect()
}
