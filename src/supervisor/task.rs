//! The per-account boost task state machine.
//!
//! A task cycles Waiting -> Executing -> Waiting until its account is
//! disabled or the daemon shuts down.  The only suspension points are the
//! deadline sleep and the executor call; cancellation is observed at the
//! sleep, never mid-execution, so an in-flight attempt always gets its
//! outcome recorded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::executor::BoostRequest;
use crate::storage::{Account, BoostOutcome, BoostRecord, StoreError};

use super::Shared;

enum Step<T> {
    Ready(T),
    Retry,
    Stop,
}

/// Drive one account's boost loop until the account is disabled or the task
/// is cancelled.
pub(super) async fn run(
    shared: Arc<Shared>,
    account_id: i64,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    gate: Arc<AsyncMutex<()>>,
) {
    info!(account = account_id, "boost task started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let account = match load_checked(&shared, account_id, &cancel).await {
            Step::Ready(account) => account,
            Step::Retry => continue,
            Step::Stop => break,
        };

        let next_run = match ensure_deadline(&shared, &account, &cancel).await {
            Step::Ready(next_run) => next_run,
            Step::Retry => continue,
            Step::Stop => break,
        };

        // Waiting: sleep out the remaining delta, or be woken early by a
        // manual trigger or a disable nudge.
        let now = Utc::now();
        if next_run > now {
            let remaining = (next_run - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = wake.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
            // Status and deadline are re-read at the top of the loop.
            continue;
        }

        // Executing: single-flight per account via the gate.
        {
            let _slot = gate.lock().await;

            // Re-read under the gate: a manual trigger may have just run and
            // pushed the deadline out, or the account may have been disabled
            // while this task waited.
            let account = match load_checked(&shared, account_id, &cancel).await {
                Step::Ready(account) => account,
                Step::Retry => continue,
                Step::Stop => break,
            };
            match account.next_run_at {
                Some(next) if next > Utc::now() => continue,
                _ => {}
            }

            run_attempt(&shared, &account).await;
        }
    }

    info!(account = account_id, "boost task stopped");
}

/// Load the account row; only an Active row lets the loop proceed.
async fn load_checked(
    shared: &Shared,
    account_id: i64,
    cancel: &CancellationToken,
) -> Step<Account> {
    match shared.store.load(account_id) {
        Ok(account) if account.is_active() => Step::Ready(account),
        Ok(_) => {
            info!(account = account_id, "account disabled, stopping task");
            Step::Stop
        }
        Err(StoreError::NotFound(_)) => {
            warn!(account = account_id, "account row vanished, stopping task");
            Step::Stop
        }
        Err(e) => {
            warn!(account = account_id, error = %e, "store unavailable, backing off");
            if wait_or_cancelled(cancel, shared.store_retry).await {
                Step::Stop
            } else {
                Step::Retry
            }
        }
    }
}

/// Return the account's deadline, generating and persisting one first if the
/// row has none yet (fresh registration or recovered partial write).
async fn ensure_deadline(
    shared: &Shared,
    account: &Account,
    cancel: &CancellationToken,
) -> Step<DateTime<Utc>> {
    if let Some(next_run) = account.next_run_at {
        return Step::Ready(next_run);
    }

    let interval = shared.intervals.next_interval();
    let next_run = Utc::now() + chrono::Duration::seconds(interval.as_secs() as i64);
    match shared
        .store
        .update_schedule(account.id, next_run, interval.as_secs())
    {
        Ok(()) => {
            info!(
                account = account.id,
                interval_secs = interval.as_secs(),
                "seeded boost deadline"
            );
            Step::Ready(next_run)
        }
        Err(StoreError::NotFound(_)) => Step::Stop,
        Err(e) => {
            warn!(account = account.id, error = %e, "store unavailable, backing off");
            if wait_or_cancelled(cancel, shared.store_retry).await {
                Step::Stop
            } else {
                Step::Retry
            }
        }
    }
}

/// Execute one boost attempt and apply the outcome: append the log record,
/// then persist the next deadline (jittered interval on success, fixed
/// cooldown otherwise).
///
/// Callers must hold the account's execution gate.
pub(super) async fn run_attempt(shared: &Shared, account: &Account) -> BoostRecord {
    let request = BoostRequest {
        account_id: account.id,
        display_name: account.display_name.clone(),
        credential_blob: account.credential_blob.clone(),
    };

    let session = shared.sessions.acquire().await;
    info!(account = account.id, name = %account.display_name, "boost attempt starting");
    let started = std::time::Instant::now();
    let result = shared.executor.execute(&request).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    drop(session);

    let occurred_at = Utc::now();
    let (outcome, detail, diagnostic_ref) = match result {
        Ok(report) if report.renewed => (BoostOutcome::Success, report.detail, report.diagnostic_ref),
        Ok(report) => (BoostOutcome::Failure, report.detail, report.diagnostic_ref),
        Err(e) => (BoostOutcome::Error, format!("{e:#}"), None),
    };

    match outcome {
        BoostOutcome::Success => {
            info!(account = account.id, elapsed_ms, detail = %detail, "boost succeeded")
        }
        BoostOutcome::Failure => {
            warn!(account = account.id, elapsed_ms, detail = %detail, "boost failed")
        }
        BoostOutcome::Error => {
            warn!(account = account.id, elapsed_ms, error = %detail, "boost errored")
        }
    }

    let record = BoostRecord {
        account_id: account.id,
        outcome,
        detail,
        diagnostic_ref,
        occurred_at,
    };

    // Record first, then reschedule; recovery repairs a crash in between.
    persist_with_retry(
        shared,
        account.id,
        "record outcome",
        || shared.store.record_outcome(&record),
    )
    .await;

    let (delay, interval_seconds) = match outcome {
        BoostOutcome::Success => {
            let interval = shared.intervals.next_interval();
            (interval, interval.as_secs())
        }
        BoostOutcome::Failure => (shared.failure_cooldown, account.interval_seconds),
        BoostOutcome::Error => (shared.error_cooldown, account.interval_seconds),
    };
    let next_run = occurred_at + chrono::Duration::seconds(delay.as_secs() as i64);
    persist_with_retry(shared, account.id, "reschedule", || {
        shared.store.update_schedule(account.id, next_run, interval_seconds)
    })
    .await;

    info!(
        account = account.id,
        wait_secs = delay.as_secs(),
        next_run = %next_run.to_rfc3339(),
        "next boost scheduled"
    );

    record
}

/// Run a store write, retrying a few times if the backend is unreachable.
async fn persist_with_retry<F>(shared: &Shared, account_id: i64, what: &str, mut op: F)
where
    F: FnMut() -> Result<(), StoreError>,
{
    for attempt in 0..3u32 {
        match op() {
            Ok(()) => return,
            Err(StoreError::NotFound(_)) => {
                warn!(account = account_id, what, "row vanished while persisting");
                return;
            }
            Err(e) => {
                warn!(account = account_id, what, attempt, error = %e, "store write failed, retrying");
                tokio::time::sleep(shared.store_retry).await;
            }
        }
    }
    warn!(account = account_id, what, "store write abandoned after retries");
}

/// Returns true if the token was cancelled before the delay elapsed.
async fn wait_or_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
