//! HTTP adapter for the external automation agent.
//!
//! The agent owns the browser sessions, selector tables, and screenshot
//! capture.  This adapter only ships the credentials over and maps the reply.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{BoostExecutor, BoostReport, BoostRequest};

/// Executes boosts by POSTing to the automation agent's boost endpoint.
pub struct AgentExecutor {
    client: Client,
    url: String,
}

impl AgentExecutor {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("Failed to build HTTP client"),
            url: url.into(),
        }
    }
}

/// Wire format of the agent's reply.
#[derive(Debug, Deserialize)]
struct AgentReply {
    renewed: bool,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    screenshot: Option<String>,
}

impl From<AgentReply> for BoostReport {
    fn from(reply: AgentReply) -> Self {
        BoostReport {
            renewed: reply.renewed,
            detail: if reply.detail.is_empty() {
                if reply.renewed { "listing renewed".to_string() } else { "boost not performed".to_string() }
            } else {
                reply.detail
            },
            diagnostic_ref: reply.screenshot,
        }
    }
}

#[async_trait::async_trait]
impl BoostExecutor for AgentExecutor {
    async fn execute(&self, request: &BoostRequest) -> Result<BoostReport> {
        let body = serde_json::json!({
            "account_id": request.account_id,
            "account_name": request.display_name,
            "credentials": request.credential_blob.as_str(),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("automation agent unreachable at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("automation agent returned {status}");
        }

        let reply: AgentReply = response
            .json()
            .await
            .context("automation agent returned malformed reply")?;

        Ok(reply.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_maps_to_report() {
        let reply: AgentReply = serde_json::from_str(
            r#"{"renewed": true, "detail": "bumped 2 listings", "screenshot": "shots/42.png"}"#,
        )
        .unwrap();
        let report: BoostReport = reply.into();

        assert!(report.renewed);
        assert_eq!(report.detail, "bumped 2 listings");
        assert_eq!(report.diagnostic_ref.as_deref(), Some("shots/42.png"));
    }

    #[test]
    fn test_reply_defaults() {
        let reply: AgentReply = serde_json::from_str(r#"{"renewed": false}"#).unwrap();
        let report: BoostReport = reply.into();

        assert!(!report.renewed);
        assert_eq!(report.detail, "boost not performed");
        assert!(report.diagnostic_ref.is_none());
    }

    #[test]
    fn test_malformed_reply_is_rejected() {
        let parsed: std::result::Result<AgentReply, _> =
            serde_json::from_str(r#"{"detail": "missing renewed flag"}"#);
        assert!(parsed.is_err());
    }
}
