//! Boost execution -- the seam between the scheduler and the automation
//! backend that actually renews a listing.
//!
//! The scheduler treats the executor as a black box with unspecified latency
//! (seconds to low tens of seconds).  Retries at the UI-action level are the
//! backend's concern, never the scheduler's.

use anyhow::Result;

use crate::storage::CredentialBlob;

pub mod agent;
pub mod session;

pub use agent::AgentExecutor;
pub use session::SessionPool;

/// One boost attempt for one account.
#[derive(Debug, Clone)]
pub struct BoostRequest {
    pub account_id: i64,
    pub display_name: String,
    /// Opaque credentials, forwarded verbatim.
    pub credential_blob: CredentialBlob,
}

/// What the automation backend reports back for a completed attempt.
///
/// `renewed = false` means the attempt ran to completion but the listing could
/// not be boosted (no renewable listing, login expired).  Transport-level
/// breakage is an `Err` from [`BoostExecutor::execute`] instead.
#[derive(Debug, Clone)]
pub struct BoostReport {
    pub renewed: bool,
    pub detail: String,
    /// Opaque pointer to a diagnostic artifact (e.g. a screenshot path).
    pub diagnostic_ref: Option<String>,
}

/// Trait for boost execution backends.
#[async_trait::async_trait]
pub trait BoostExecutor: Send + Sync {
    /// Perform one boost attempt for the given account.
    async fn execute(&self, request: &BoostRequest) -> Result<BoostReport>;
}
