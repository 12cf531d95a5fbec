use async_trait::async_trait;
use ledger_core::{
    models::{BillableEntity, EntityKind},
    traits::EntityDirectory,
    AppError, AppResult,
};
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

struct StoreEntry {
    id: Uuid,
    owner: Option<Uuid>,
    name: String,
    published: bool,
    reason: Option<String>,
}

struct DomainEntry {
    id: Uuid,
    store_id: Uuid,
    domain: String,
    active: bool,
    verified: bool,
    reason: Option<String>,
}

#[derive(Default)]
struct DirectoryState {
    stores: Vec<StoreEntry>,
    domains: Vec<DomainEntry>,
}

/// In-memory stand-in for the platform's store and domain tables
#[derive(Default)]
pub struct InMemoryEntityDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryEntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a published store owned by `owner`
    pub fn add_store(&self, owner: Uuid, name: &str) -> Uuid {
        self.insert_store(Some(owner), name)
    }

    /// Add a published store whose owner cannot be resolved
    pub fn add_orphan_store(&self, name: &str) -> Uuid {
        self.insert_store(None, name)
    }

    fn insert_store(&self, owner: Option<Uuid>, name: &str) -> Uuid {
        let id = Uuid::now_v7();
        self.state.lock().stores.push(StoreEntry {
            id,
            owner,
            name: name.to_string(),
            published: true,
            reason: None,
        });
        id
    }

    /// Attach a custom domain to a store
    pub fn add_domain(&self, store_id: Uuid, domain: &str, active: bool, verified: bool) -> Uuid {
        let id = Uuid::now_v7();
        self.state.lock().domains.push(DomainEntry {
            id,
            store_id,
            domain: domain.to_string(),
            active,
            verified,
            reason: None,
        });
        id
    }

    pub fn is_store_published(&self, id: Uuid) -> bool {
        self.state
            .lock()
            .stores
            .iter()
            .any(|s| s.id == id && s.published)
    }

    pub fn is_domain_active(&self, id: Uuid) -> bool {
        self.state
            .lock()
            .domains
            .iter()
            .any(|d| d.id == id && d.active)
    }

    /// Reason recorded when the entity was switched off
    pub fn deactivation_reason(&self, id: Uuid) -> Option<String> {
        let state = self.state.lock();
        state
            .stores
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.reason.clone())
            .or_else(|| {
                state
                    .domains
                    .iter()
                    .find(|d| d.id == id)
                    .and_then(|d| d.reason.clone())
            })
    }
}

#[async_trait]
impl EntityDirectory for InMemoryEntityDirectory {
    async fn published_stores(&self) -> AppResult<Vec<BillableEntity>> {
        Ok(self
            .state
            .lock()
            .stores
            .iter()
            .filter(|s| s.published)
            .map(|s| BillableEntity::store(s.id, s.name.clone()))
            .collect())
    }

    async fn active_verified_domains(&self) -> AppResult<Vec<BillableEntity>> {
        Ok(self
            .state
            .lock()
            .domains
            .iter()
            .filter(|d| d.active && d.verified)
            .map(|d| BillableEntity::custom_domain(d.id, d.domain.clone(), d.store_id))
            .collect())
    }

    async fn resolve_owner(&self, entity: &BillableEntity) -> AppResult<Option<Uuid>> {
        let state = self.state.lock();
        let store_id = match entity.kind {
            EntityKind::Store => Some(entity.id),
            EntityKind::CustomDomain => state
                .domains
                .iter()
                .find(|d| d.id == entity.id)
                .map(|d| d.store_id),
        };

        Ok(store_id.and_then(|store_id| {
            state
                .stores
                .iter()
                .find(|s| s.id == store_id)
                .and_then(|s| s.owner)
        }))
    }

    async fn deactivate(&self, entity: &BillableEntity, reason: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        let found = match entity.kind {
            EntityKind::Store => state.stores.iter_mut().find(|s| s.id == entity.id).map(|s| {
                s.published = false;
                s.reason = Some(reason.to_string());
            }),
            EntityKind::CustomDomain => {
                state.domains.iter_mut().find(|d| d.id == entity.id).map(|d| {
                    d.active = false;
                    d.reason = Some(reason.to_string());
                })
            }
        };

        if found.is_none() {
            return Err(AppError::EntityNotFound(entity.id.to_string()));
        }

        info!("Deactivated {} {} ({})", entity.kind, entity.id, reason);
        Ok(())
    }
}
