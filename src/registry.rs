//! Account registry -- registration, disable, and enumeration.
//!
//! Validation and the per-owner ceiling live here and in the store; task
//! lifecycle is delegated to the supervisor (registration admits a task,
//! disable nudges the task so it stops at its next checkpoint).

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::storage::{Account, AccountStatus, CredentialBlob, NewAccount, Store, StoreError};
use crate::supervisor::Supervisor;

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Bad registration data; nothing was persisted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The owner already holds the configured maximum number of accounts.
    #[error("owner {owner_id} already holds the maximum of {limit} accounts")]
    LimitExceeded { owner_id: i64, limit: u32 },

    /// Unknown account id.
    #[error("account {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => RegistryError::NotFound(id),
            StoreError::LimitExceeded { owner_id, limit } => {
                RegistryError::LimitExceeded { owner_id, limit }
            }
            other => RegistryError::Store(other),
        }
    }
}

/// Owns account identity and lifecycle.
#[derive(Clone)]
pub struct Registry {
    store: Store,
    supervisor: Supervisor,
}

impl Registry {
    pub fn new(store: Store, supervisor: Supervisor) -> Self {
        Self { store, supervisor }
    }

    /// Register an owner (idempotent).
    pub fn add_owner(&self, owner_id: i64, display_name: &str) -> Result<(), RegistryError> {
        if display_name.trim().is_empty() {
            return Err(RegistryError::InvalidInput("owner name is empty".into()));
        }
        self.store.put_owner(owner_id, display_name.trim())?;
        Ok(())
    }

    /// Register a new account and admit its boost task.
    ///
    /// The first deadline is seeded at creation, so the schedule survives even
    /// if the process dies before the task runs.
    pub async fn register(
        &self,
        owner_id: i64,
        name: &str,
        credential_blob: CredentialBlob,
    ) -> Result<i64, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidInput("account name is empty".into()));
        }
        if !self.store.owner_exists(owner_id).map_err(RegistryError::Store)? {
            return Err(RegistryError::InvalidInput(format!(
                "unknown owner {owner_id}"
            )));
        }

        let interval = self.supervisor.interval_generator().next_interval();
        let id = self.store.create(&NewAccount {
            owner_id,
            display_name: name.to_string(),
            credential_blob,
            interval_seconds: interval.as_secs(),
            next_run_at: Utc::now() + chrono::Duration::seconds(interval.as_secs() as i64),
        })?;

        info!(
            account = id,
            owner = owner_id,
            name,
            first_boost_secs = interval.as_secs(),
            "account registered"
        );
        self.supervisor.admit(id).await;
        Ok(id)
    }

    /// Disable an account.  Idempotent; the boost task observes the status at
    /// its next checkpoint and stops.
    pub async fn disable(&self, id: i64) -> Result<(), RegistryError> {
        self.store.set_status(id, AccountStatus::Disabled)?;
        self.supervisor.wake(id).await;
        info!(account = id, "account disabled");
        Ok(())
    }

    /// All accounts of one owner for display, newest first.
    pub fn list(&self, owner_id: i64) -> Result<Vec<Account>, RegistryError> {
        Ok(self.store.list_for_owner(owner_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoostdConfig;
    use crate::executor::{BoostExecutor, BoostReport, BoostRequest};
    use crate::storage;
    use std::sync::Arc;

    struct InertExecutor;

    #[async_trait::async_trait]
    impl BoostExecutor for InertExecutor {
        async fn execute(&self, _request: &BoostRequest) -> anyhow::Result<BoostReport> {
            Ok(BoostReport {
                renewed: true,
                detail: "ok".into(),
                diagnostic_ref: None,
            })
        }
    }

    fn test_registry(limit: u32) -> (tempfile::TempDir, Store, Registry) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("registry-test.db");
        let pool = storage::open_pool(path.to_str().unwrap()).unwrap();
        let store = Store::new(pool, limit);

        let mut cfg = BoostdConfig::default();
        cfg.limits.max_accounts_per_owner = limit;
        let supervisor = Supervisor::new(store.clone(), Arc::new(InertExecutor), &cfg);
        let registry = Registry::new(store.clone(), supervisor);
        (dir, store, registry)
    }

    #[tokio::test]
    async fn test_register_creates_active_account_with_bounded_deadline() {
        let (_dir, store, registry) = test_registry(10);
        registry.add_owner(1, "tester").unwrap();

        let before = Utc::now();
        let id = registry
            .register(1, "main shop", CredentialBlob::new("cookies"))
            .await
            .unwrap();

        let account = store.load(id).unwrap();
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.run_count, 0);

        let next = account.next_run_at.expect("deadline seeded at creation");
        let delta = (next - before).num_seconds();
        assert!(
            (13 * 60..=17 * 60 + 60).contains(&delta),
            "first deadline {delta}s outside the interval bound"
        );
    }

    #[tokio::test]
    async fn test_register_rejects_empty_name() {
        let (_dir, _store, registry) = test_registry(10);
        registry.add_owner(1, "tester").unwrap();

        let result = registry.register(1, "   ", CredentialBlob::new("c")).await;
        assert!(matches!(result, Err(RegistryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_owner() {
        let (_dir, _store, registry) = test_registry(10);

        let result = registry.register(99, "shop", CredentialBlob::new("c")).await;
        assert!(matches!(result, Err(RegistryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_eleventh_registration_hits_ceiling() {
        let (_dir, store, registry) = test_registry(10);
        registry.add_owner(1, "tester").unwrap();

        for i in 0..10 {
            registry
                .register(1, &format!("shop {i}"), CredentialBlob::new("c"))
                .await
                .unwrap();
        }

        let result = registry.register(1, "one too many", CredentialBlob::new("c")).await;
        assert!(matches!(
            result,
            Err(RegistryError::LimitExceeded { owner_id: 1, limit: 10 })
        ));
        assert_eq!(store.list_for_owner(1).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_disable_is_idempotent_and_unknown_is_not_found() {
        let (_dir, store, registry) = test_registry(10);
        registry.add_owner(1, "tester").unwrap();
        let id = registry
            .register(1, "shop", CredentialBlob::new("c"))
            .await
            .unwrap();

        registry.disable(id).await.unwrap();
        registry.disable(id).await.unwrap();
        assert_eq!(store.load(id).unwrap().status, AccountStatus::Disabled);

        assert!(matches!(
            registry.disable(777).await,
            Err(RegistryError::NotFound(777))
        ));
    }

    #[tokio::test]
    async fn test_add_owner_rejects_blank_name() {
        let (_dir, _store, registry) = test_registry(10);
        assert!(matches!(
            registry.add_owner(1, "  "),
            Err(RegistryError::InvalidInput(_))
        ));
    }
}
