//! Bandit arm persistence.
//!
//! Arms are grouped by scope (the organization id) so one organization's
//! traffic never shapes another's selection. Mutation of a single arm is
//! serialized; reads of other arms do not wait on it.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use router_core::{BanditArm, ProviderKey, RouterResult};
use router_store::LedgerStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// In-place arm mutation
pub type ArmUpdate<'a> = &'a (dyn Fn(&mut BanditArm) + Send + Sync);

const STORE: &str = "arm";

/// Storage for bandit arms
#[async_trait]
pub trait ArmStore: Send + Sync {
    /// Every arm in a scope, ordered by key
    async fn snapshot(&self, scope: &str) -> RouterResult<Vec<BanditArm>>;

    /// One arm, if it exists
    async fn get(&self, scope: &str, key: &ProviderKey) -> RouterResult<Option<BanditArm>>;

    /// Apply a mutation to one arm, creating it when missing
    async fn update(
        &self,
        scope: &str,
        key: &ProviderKey,
        apply: ArmUpdate<'_>,
    ) -> RouterResult<BanditArm>;

    /// Apply a mutation to every arm in a scope
    async fn update_all(&self, scope: &str, apply: ArmUpdate<'_>) -> RouterResult<Vec<BanditArm>>;

    /// Remove one arm, returning whether it existed
    async fn remove(&self, scope: &str, key: &ProviderKey) -> RouterResult<bool>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Process-local arm store
#[derive(Debug, Default)]
pub struct MemoryArmStore {
    arms: DashMap<(String, ProviderKey), BanditArm>,
}

impl MemoryArmStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of arms across every scope
    #[must_use]
    pub fn len(&self) -> usize {
        self.arms.len()
    }

    /// Whether the store holds no arms
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }

    fn insert_if_absent(&self, scope: &str, arm: BanditArm) {
        self.arms
            .entry((scope.to_string(), arm.key()))
            .or_insert(arm);
    }

    fn put(&self, scope: &str, arm: BanditArm) {
        self.arms.insert((scope.to_string(), arm.key()), arm);
    }
}

#[async_trait]
impl ArmStore for MemoryArmStore {
    async fn snapshot(&self, scope: &str) -> RouterResult<Vec<BanditArm>> {
        let mut arms: Vec<BanditArm> = self
            .arms
            .iter()
            .filter(|entry| entry.key().0 == scope)
            .map(|entry| entry.value().clone())
            .collect();
        arms.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(arms)
    }

    async fn get(&self, scope: &str, key: &ProviderKey) -> RouterResult<Option<BanditArm>> {
        Ok(self
            .arms
            .get(&(scope.to_string(), key.clone()))
            .map(|arm| arm.value().clone()))
    }

    async fn update(
        &self,
        scope: &str,
        key: &ProviderKey,
        apply: ArmUpdate<'_>,
    ) -> RouterResult<BanditArm> {
        let mut arm = self
            .arms
            .entry((scope.to_string(), key.clone()))
            .or_insert_with(|| BanditArm::new(key));
        apply(arm.value_mut());
        Ok(arm.value().clone())
    }

    async fn update_all(&self, scope: &str, apply: ArmUpdate<'_>) -> RouterResult<Vec<BanditArm>> {
        let mut updated = Vec::new();
        for mut entry in self.arms.iter_mut() {
            if entry.key().0 == scope {
                apply(entry.value_mut());
                updated.push(entry.value().clone());
            }
        }
        updated.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(updated)
    }

    async fn remove(&self, scope: &str, key: &ProviderKey) -> RouterResult<bool> {
        Ok(self.arms.remove(&(scope.to_string(), key.clone())).is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Arm store that writes through to the ledger
///
/// Each scope is loaded from the ledger on first use and served from memory
/// afterwards. Writes to the same arm are ordered so the ledger ends up with
/// the latest value.
pub struct LedgerArmStore {
    cache: MemoryArmStore,
    ledger: Arc<dyn LedgerStore>,
    hydrated: DashSet<String>,
    hydrate_lock: Mutex<()>,
    write_locks: DashMap<(String, ProviderKey), Arc<Mutex<()>>>,
}

impl LedgerArmStore {
    /// Create a store over a ledger
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            cache: MemoryArmStore::new(),
            ledger,
            hydrated: DashSet::new(),
            hydrate_lock: Mutex::new(()),
            write_locks: DashMap::new(),
        }
    }

    #[instrument(skip(self), fields(store = self.ledger.name()))]
    async fn hydrate(&self, scope: &str) -> RouterResult<()> {
        if self.hydrated.contains(scope) {
            return Ok(());
        }
        let _guard = self.hydrate_lock.lock().await;
        if self.hydrated.contains(scope) {
            return Ok(());
        }

        let arms = self
            .ledger
            .load_arms(scope)
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        debug!(count = arms.len(), "Loaded bandit arms");
        for arm in arms {
            self.cache.insert_if_absent(scope, arm);
        }
        self.hydrated.insert(scope.to_string());
        Ok(())
    }

    fn write_lock(&self, scope: &str, key: &ProviderKey) -> Arc<Mutex<()>> {
        self.write_locks
            .entry((scope.to_string(), key.clone()))
            .or_default()
            .clone()
    }

    async fn persist(&self, scope: &str, arm: &BanditArm) -> RouterResult<()> {
        self.ledger
            .save_arm(scope, arm)
            .await
            .map_err(|e| e.into_router_error(STORE))
    }
}

#[async_trait]
impl ArmStore for LedgerArmStore {
    async fn snapshot(&self, scope: &str) -> RouterResult<Vec<BanditArm>> {
        self.hydrate(scope).await?;
        self.cache.snapshot(scope).await
    }

    async fn get(&self, scope: &str, key: &ProviderKey) -> RouterResult<Option<BanditArm>> {
        self.hydrate(scope).await?;
        self.cache.get(scope, key).await
    }

    async fn update(
        &self,
        scope: &str,
        key: &ProviderKey,
        apply: ArmUpdate<'_>,
    ) -> RouterResult<BanditArm> {
        self.hydrate(scope).await?;
        let lock = self.write_lock(scope, key);
        let _guard = lock.lock().await;
        let mut arm = self
            .cache
            .get(scope, key)
            .await?
            .unwrap_or_else(|| BanditArm::new(key));
        apply(&mut arm);
        // The cache only takes the new value once the ledger has it
        self.persist(scope, &arm).await?;
        self.cache.put(scope, arm.clone());
        Ok(arm)
    }

    async fn update_all(&self, scope: &str, apply: ArmUpdate<'_>) -> RouterResult<Vec<BanditArm>> {
        self.hydrate(scope).await?;
        let keys: Vec<ProviderKey> = self
            .cache
            .snapshot(scope)
            .await?
            .iter()
            .map(BanditArm::key)
            .collect();

        let mut updated = Vec::with_capacity(keys.len());
        for key in keys {
            updated.push(self.update(scope, &key, apply).await?);
        }
        Ok(updated)
    }

    async fn remove(&self, scope: &str, key: &ProviderKey) -> RouterResult<bool> {
        self.hydrate(scope).await?;
        let lock = self.write_lock(scope, key);
        let _guard = lock.lock().await;
        self.ledger
            .delete_arm(scope, &key.provider, &key.model)
            .await
            .map_err(|e| e.into_router_error(STORE))?;
        self.cache.remove(scope, key).await
    }

    fn name(&self) -> &'static str {
        "ledger"
    }
}

impl std::fmt::Debug for LedgerArmStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerArmStore")
            .field("ledger", &self.ledger.name())
            .field("hydrated_scopes", &self.hydrated.len())
            .finish_non_exhaustive()
    }
}
