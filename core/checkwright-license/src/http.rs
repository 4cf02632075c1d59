//! HTTP activation authority.
//!
//! Speaks the JSON contract of the license server:
//!
//! - `POST {base}/activate` with `{license_key, device_id, product}`
//! - `POST {base}/transfer` with `{license_key, new_device_id, product}`
//!
//! The `status` field of the response body decides the outcome. HTTP status
//! codes alone never turn into a rejection, so a proxy error page or a
//! flaky gateway reads as a network failure rather than an invalid key.

use crate::activation::{ActivationAuthority, ActivationOutcome};
use crate::config::LicenseConfig;
use crate::device::DeviceId;
use crate::error::{LicenseError, LicenseResult};
use crate::key::LicenseKey;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct ActivateRequest<'a> {
    license_key: &'a str,
    device_id: &'a str,
    product: &'a str,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    license_key: &'a str,
    new_device_id: &'a str,
    product: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthorityResponse {
    status: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    requires_transfer: Option<bool>,
    #[serde(default)]
    plan_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Activation authority reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
    product: String,
}

impl HttpAuthority {
    /// Creates a client for the authority configured in `config`.
    pub fn new(config: &LicenseConfig) -> LicenseResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LicenseError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.authority_url.trim_end_matches('/').to_string(),
            product: config.product.clone(),
        })
    }

    /// Returns the authority base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<AuthorityResponse, String> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!("POST {url}");

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                format!("{endpoint} request timed out")
            } else {
                format!("{endpoint} request failed: {e}")
            }
        })?;

        let code = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("failed to read {endpoint} response: {e}"))?;

        serde_json::from_str(&text)
            .map_err(|_| format!("unexpected {endpoint} response (HTTP {})", code.as_u16()))
    }
}

fn map_activate(resp: AuthorityResponse) -> ActivationOutcome {
    if let Some(mode) = &resp.mode {
        debug!("Authority mode: {mode}");
    }
    match resp.status.as_str() {
        "activated" => ActivationOutcome::Activated {
            plan_type: resp.plan_type,
        },
        "device_mismatch" => ActivationOutcome::DeviceMismatch {
            requires_transfer: resp.requires_transfer.unwrap_or(true),
        },
        "invalid" => ActivationOutcome::Invalid,
        "revoked" => ActivationOutcome::Revoked,
        "transfer_limit_reached" => ActivationOutcome::TransferLimitReached,
        other => server_error(other, resp.error),
    }
}

fn map_transfer(resp: AuthorityResponse) -> ActivationOutcome {
    match resp.status.as_str() {
        "transferred" => ActivationOutcome::Activated {
            plan_type: resp.plan_type,
        },
        "transfer_limit_reached" => ActivationOutcome::TransferLimitReached,
        "invalid" => ActivationOutcome::Invalid,
        "revoked" => ActivationOutcome::Revoked,
        other => server_error(other, resp.error),
    }
}

fn server_error(status: &str, error: Option<String>) -> ActivationOutcome {
    let reason = match (status, error) {
        ("error", Some(msg)) => format!("authority error: {msg}"),
        ("error", None) => "authority error".to_string(),
        (other, _) => format!("unexpected authority status: {other}"),
    };
    ActivationOutcome::NetworkError(reason)
}

#[async_trait]
impl ActivationAuthority for HttpAuthority {
    async fn activate(&self, key: &LicenseKey, device: &DeviceId) -> ActivationOutcome {
        let body = ActivateRequest {
            license_key: key.as_str(),
            device_id: device.as_str(),
            product: &self.product,
        };
        let outcome = match self.post("activate", &body).await {
            Ok(resp) => map_activate(resp),
            Err(reason) => {
                warn!("Activation request failed: {reason}");
                ActivationOutcome::NetworkError(reason)
            }
        };
        info!(key = %key.masked(), outcome = outcome.label(), "Activation response");
        outcome
    }

    async fn transfer(&self, key: &LicenseKey, new_device: &DeviceId) -> ActivationOutcome {
        let body = TransferRequest {
            license_key: key.as_str(),
            new_device_id: new_device.as_str(),
            product: &self.product,
        };
        let outcome = match self.post("transfer", &body).await {
            Ok(resp) => map_transfer(resp),
            Err(reason) => {
                warn!("Transfer request failed: {reason}");
                ActivationOutcome::NetworkError(reason)
            }
        };
        info!(key = %key.masked(), outcome = outcome.label(), "Transfer response");
        outcome
    }
}
