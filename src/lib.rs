//! boostd -- scheduled auto-renewal for marketplace listing accounts.
//!
//! This crate provides the core library for the boost scheduler: randomized
//! interval generation, durable account storage, per-account task
//! supervision, and the registration/status API.

pub mod api;
pub mod config;
pub mod executor;
pub mod interval;
pub mod registry;
pub mod storage;
pub mod supervisor;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::BoostdConfig;

/// Start the boostd daemon: storage, task supervisor, and API server.
pub async fn serve(cfg: BoostdConfig, db_path: &str) -> Result<()> {
    // 1. Initialize Storage
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(db_path)?;
    let store = storage::Store::new(pool, cfg.limits.max_accounts_per_owner);

    // 2. Executor and supervisor
    let executor = Arc::new(executor::AgentExecutor::new(
        cfg.executor.agent_url.clone(),
        Duration::from_secs(cfg.executor.request_timeout_secs),
    ));
    let supervisor = supervisor::Supervisor::new(store.clone(), executor, &cfg);

    // 3. Re-admit boost tasks for accounts that were active before the restart
    supervisor.recover().await?;

    // 4. Start API Server
    let registry = registry::Registry::new(store.clone(), supervisor.clone());
    let state = api::state::AppState {
        store,
        registry,
        supervisor: supervisor.clone(),
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = cfg.api.bind.parse()?;
    tracing::info!(%addr, "boostd listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Stop boost tasks; an in-flight attempt runs to completion and its
    // outcome is still recorded.
    supervisor.shutdown(Duration::from_secs(30)).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
