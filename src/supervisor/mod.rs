//! Task supervision -- one boost task per active account.
//!
//! The supervisor owns the admission map from account id to the task's
//! cancellation token, wake notifier, and execution gate.  Tasks run
//! independently; a failing account never blocks or crashes a sibling.
//! Durable scheduling state lives in the store, so the map holds nothing
//! that cannot be rebuilt by [`Supervisor::recover`] after a restart.

mod task;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BoostdConfig;
use crate::executor::{BoostExecutor, SessionPool};
use crate::interval::IntervalGenerator;
use crate::storage::{BoostRecord, Store, StoreError};

/// Errors surfaced by a manual boost trigger.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// A boost is already executing for this account; retry later.
    #[error("a boost is already executing for account {0}")]
    Busy(i64),

    /// Unknown or disabled account.
    #[error("account {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TriggerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => TriggerError::NotFound(id),
            other => TriggerError::Store(other),
        }
    }
}

/// Shared context handed to every boost task.
pub(crate) struct Shared {
    pub(crate) store: Store,
    pub(crate) executor: Arc<dyn BoostExecutor>,
    pub(crate) sessions: SessionPool,
    pub(crate) intervals: IntervalGenerator,
    pub(crate) failure_cooldown: Duration,
    pub(crate) error_cooldown: Duration,
    pub(crate) store_retry: Duration,
}

/// Transient per-task handles, keyed by account id in the admission map.
struct TaskHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    gate: Arc<AsyncMutex<()>>,
    join: JoinHandle<()>,
}

/// Spawns and tracks one boost task per active account.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
    tasks: Arc<AsyncMutex<HashMap<i64, TaskHandle>>>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(store: Store, executor: Arc<dyn BoostExecutor>, cfg: &BoostdConfig) -> Self {
        let shared = Shared {
            store,
            executor,
            sessions: SessionPool::new(cfg.limits.execution_concurrency_ceiling),
            intervals: IntervalGenerator::new(cfg.scheduler.min_minutes, cfg.scheduler.max_minutes),
            failure_cooldown: Duration::from_secs(cfg.scheduler.failure_cooldown_secs),
            error_cooldown: Duration::from_secs(cfg.scheduler.error_cooldown_secs),
            store_retry: Duration::from_secs(cfg.scheduler.store_retry_secs),
        };
        Self {
            shared: Arc::new(shared),
            tasks: Arc::new(AsyncMutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Admit a boost task for an account.
    ///
    /// Idempotent: admitting an id that already has a live task is a no-op,
    /// so racing registrations never produce a second task.
    pub async fn admit(&self, account_id: i64) {
        let mut tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.get(&account_id) {
            if !handle.join.is_finished() {
                debug!(account = account_id, "task already admitted");
                return;
            }
        }

        let cancel = self.shutdown.child_token();
        let wake = Arc::new(Notify::new());
        let gate = Arc::new(AsyncMutex::new(()));

        let join = tokio::spawn(task::run(
            self.shared.clone(),
            account_id,
            cancel.clone(),
            wake.clone(),
            gate.clone(),
        ));

        tasks.insert(
            account_id,
            TaskHandle {
                cancel,
                wake,
                gate,
                join,
            },
        );
        info!(account = account_id, "boost task admitted");
    }

    /// Admit a task for every active account in the store.
    ///
    /// Idempotent with respect to downtime: past-due deadlines run
    /// immediately, future ones wait out the remaining delta.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let accounts = self.shared.store.list_active(None)?;
        let count = accounts.len();
        for account in accounts {
            self.admit(account.id).await;
        }
        info!(count, "recovered boost tasks for active accounts");
        Ok(count)
    }

    /// Nudge a waiting task to re-read its account row (after a disable or a
    /// schedule change).  Unknown ids are ignored.
    pub async fn wake(&self, account_id: i64) {
        let tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.get(&account_id) {
            handle.wake.notify_one();
        }
    }

    /// Run one boost attempt immediately, outside the task's normal cadence.
    ///
    /// The account's execution gate is try-locked: if a boost is already in
    /// flight the caller gets [`TriggerError::Busy`] instead of being queued.
    /// The waiting task is woken afterwards so it picks up the new deadline.
    pub async fn trigger_now(&self, account_id: i64) -> Result<BoostRecord, TriggerError> {
        let account = self.shared.store.load(account_id)?;
        if !account.is_active() {
            return Err(TriggerError::NotFound(account_id));
        }

        // The gate lives in the admission map; make sure the task exists.
        self.admit(account_id).await;
        let (gate, wake) = {
            let tasks = self.tasks.lock().await;
            let handle = tasks.get(&account_id).ok_or(TriggerError::NotFound(account_id))?;
            (handle.gate.clone(), handle.wake.clone())
        };

        let record = {
            let _slot = gate.try_lock().map_err(|_| TriggerError::Busy(account_id))?;
            task::run_attempt(&self.shared, &account).await
        };

        wake.notify_one();
        Ok(record)
    }

    /// Generator used to seed first deadlines at registration time.
    pub fn interval_generator(&self) -> IntervalGenerator {
        self.shared.intervals
    }

    /// Number of admitted tasks that have not finished.
    pub async fn live_task_count(&self) -> usize {
        let tasks = self.tasks.lock().await;
        tasks.values().filter(|h| !h.join.is_finished()).count()
    }

    /// Cancel all tasks and wait up to `grace` for them to stop.
    ///
    /// Cancellation is observed at waiting checkpoints only; an in-flight
    /// boost attempt runs to completion and its outcome is still recorded.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();

        let handles: Vec<(i64, TaskHandle)> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain().collect()
        };
        for (_, handle) in &handles {
            handle.cancel.cancel();
        }

        let join_all = async {
            for (account_id, handle) in handles {
                if handle.join.await.is_err() {
                    warn!(account = account_id, "boost task panicked");
                }
            }
        };

        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!("grace period exceeded, abandoning remaining boost tasks");
        } else {
            info!("all boost tasks stopped");
        }
    }
}
