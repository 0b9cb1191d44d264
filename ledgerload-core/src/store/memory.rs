use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use ledgerload_model::{ActorId, ContainerId, Entity, EntityId, LogicalKey};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    error::ContextError,
    import::{ContextProvider, ExecutionContext},
};

/// Account known to the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub email: String,
}

/// Remembers which entity a logical key produced, and from which source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMapping {
    pub entity_id: EntityId,
    #[serde(default)]
    pub source_ref: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    entities: HashMap<EntityId, Entity>,
    mappings: HashMap<LogicalKey, ImportMapping>,
    actors: HashMap<ActorId, Actor>,
    containers: HashSet<ContainerId>,
    indexed: Vec<EntityId>,
    commits: usize,
}

/// In-memory backing store. Writes only land through a committed
/// [`MemoryContext`].
#[derive(Debug, Default)]
pub struct EntityStore {
    state: RwLock<StoreState>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_actor(&self, actor: Actor) {
        self.state.write().await.actors.insert(actor.id, actor);
    }

    pub async fn register_container(&self, container: ContainerId) {
        self.state.write().await.containers.insert(container);
    }

    /// Seed an existing entity together with its key mapping.
    pub async fn insert_entity(&self, entity: Entity) {
        let mut state = self.state.write().await;
        state.mappings.insert(
            entity.logical_key.clone(),
            ImportMapping {
                entity_id: entity.id,
                source_ref: entity.source_ref.clone(),
            },
        );
        state.entities.insert(entity.id, entity);
    }

    pub async fn entity(&self, id: EntityId) -> Option<Entity> {
        self.state.read().await.entities.get(&id).cloned()
    }

    pub async fn entity_for_key(&self, key: &LogicalKey) -> Option<Entity> {
        let state = self.state.read().await;
        state
            .mappings
            .get(key)
            .and_then(|mapping| state.entities.get(&mapping.entity_id))
            .cloned()
    }

    pub async fn mapping(&self, key: &LogicalKey) -> Option<ImportMapping> {
        self.state.read().await.mappings.get(key).cloned()
    }

    pub async fn actor(&self, id: ActorId) -> Option<Actor> {
        self.state.read().await.actors.get(&id).cloned()
    }

    pub async fn actor_by_email(&self, email: &str) -> Option<Actor> {
        self.state
            .read()
            .await
            .actors
            .values()
            .find(|actor| actor.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    /// Resolve the account a batch runs as: the given email, or the first
    /// `batchjob@` account when none is given.
    pub async fn batch_actor(&self, email: Option<&str>) -> Option<Actor> {
        if let Some(email) = email {
            return self.actor_by_email(email).await;
        }
        let state = self.state.read().await;
        let mut candidates: Vec<&Actor> = state
            .actors
            .values()
            .filter(|actor| actor.email.to_ascii_lowercase().starts_with("batchjob@"))
            .collect();
        candidates.sort_by(|a, b| a.email.cmp(&b.email));
        candidates.first().map(|actor| (*actor).clone())
    }

    pub async fn container_exists(&self, id: ContainerId) -> bool {
        self.state.read().await.containers.contains(&id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entities pushed to the search index, in commit order.
    pub async fn indexed(&self) -> Vec<EntityId> {
        self.state.read().await.indexed.clone()
    }

    pub async fn commit_count(&self) -> usize {
        self.state.read().await.commits
    }

    /// Every entity, ordered by logical key.
    pub async fn snapshot(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> =
            self.state.read().await.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.logical_key.cmp(&b.logical_key));
        entities
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Put(Entity),
    Remove(EntityId),
    Map(LogicalKey, ImportMapping),
    Unmap(LogicalKey),
}

/// Transactional view over an [`EntityStore`].
///
/// Reads see this context's staged writes layered over committed state.
/// `abort` discards staged writes and invalidates the context.
#[derive(Debug)]
pub struct MemoryContext {
    store: Arc<EntityStore>,
    staged: Vec<StagedWrite>,
    valid: bool,
    index: bool,
}

impl MemoryContext {
    pub fn new(store: Arc<EntityStore>, index: bool) -> Self {
        Self {
            store,
            staged: Vec::new(),
            valid: true,
            index,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub async fn actor(&self, id: ActorId) -> Option<Actor> {
        self.store.actor(id).await
    }

    pub async fn container_exists(&self, id: ContainerId) -> bool {
        self.store.container_exists(id).await
    }

    pub async fn entity(&self, id: EntityId) -> Option<Entity> {
        for write in self.staged.iter().rev() {
            match write {
                StagedWrite::Put(entity) if entity.id == id => return Some(entity.clone()),
                StagedWrite::Remove(removed) if *removed == id => return None,
                _ => {}
            }
        }
        self.store.entity(id).await
    }

    pub async fn mapping(&self, key: &LogicalKey) -> Option<ImportMapping> {
        for write in self.staged.iter().rev() {
            match write {
                StagedWrite::Map(mapped, mapping) if mapped == key => {
                    return Some(mapping.clone());
                }
                StagedWrite::Unmap(unmapped) if unmapped == key => return None,
                _ => {}
            }
        }
        self.store.mapping(key).await
    }

    pub fn put_entity(&mut self, entity: Entity) {
        self.staged.push(StagedWrite::Put(entity));
    }

    pub fn remove_entity(&mut self, id: EntityId) {
        self.staged.push(StagedWrite::Remove(id));
    }

    pub fn map_key(&mut self, key: LogicalKey, mapping: ImportMapping) {
        self.staged.push(StagedWrite::Map(key, mapping));
    }

    pub fn unmap_key(&mut self, key: LogicalKey) {
        self.staged.push(StagedWrite::Unmap(key));
    }
}

#[async_trait]
impl ExecutionContext for MemoryContext {
    async fn commit(&mut self) -> Result<(), ContextError> {
        if !self.valid {
            return Err(ContextError::Invalid);
        }
        let writes = std::mem::take(&mut self.staged);
        let mut state = self.store.state.write().await;
        for write in writes {
            match write {
                StagedWrite::Put(entity) => {
                    if self.index {
                        state.indexed.push(entity.id);
                    }
                    state.entities.insert(entity.id, entity);
                }
                StagedWrite::Remove(id) => {
                    state.entities.remove(&id);
                }
                StagedWrite::Map(key, mapping) => {
                    state.mappings.insert(key, mapping);
                }
                StagedWrite::Unmap(key) => {
                    state.mappings.remove(&key);
                }
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn abort(&mut self) {
        self.staged.clear();
        self.valid = false;
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Hands out [`MemoryContext`]s over one shared store.
#[derive(Debug, Clone)]
pub struct MemoryContextProvider {
    store: Arc<EntityStore>,
    index: bool,
}

impl MemoryContextProvider {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store, index: true }
    }

    /// Disable search-index updates on commit.
    pub fn without_index(mut self) -> Self {
        self.index = false;
        self
    }
}

#[async_trait]
impl ContextProvider for MemoryContextProvider {
    type Context = MemoryContext;

    async fn new_context(&self) -> Result<MemoryContext, ContextError> {
        Ok(MemoryContext::new(Arc::clone(&self.store), self.index))
    }
}
