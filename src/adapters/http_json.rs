// =============================================================================
// adapters/http_json.rs — THE POLITE CARRIER
// =============================================================================
//
// Some carriers (and most in-house tracking proxies) just answer a GET with
// JSON. For those we don't need a bespoke adapter, only a URL template:
//
//   https://tracking.example/api/{value}
//
// The body is decoded straight into a `TrackingResult` (camelCase keys).
// 404 means "never heard of it", which is a no-result, not a failure.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CarrierAdapter, Tier};
use crate::config::HttpAdapterDef;
use crate::error::AdapterError;
use crate::models::TrackingResult;

pub struct HttpJsonAdapter {
    def: HttpAdapterDef,
    client: reqwest::Client,
}

impl HttpJsonAdapter {
    pub fn new(def: HttpAdapterDef, timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("FreightTraceEngine/0.1 (container-tracking)")
            .build()?;
        Ok(Self { def, client })
    }

    fn url_for(&self, value: &str) -> String {
        self.def
            .url_template
            .replace("{value}", &urlencoding::encode(value.trim()))
    }

    async fn fetch(&self, value: &str) -> Result<Option<TrackingResult>, AdapterError> {
        let url = self.url_for(value);
        debug!(adapter = %self.def.id, url = %url, "HTTP adapter request");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }

        let mut result: TrackingResult = serde_json::from_str(&body)?;
        if result.carrier.is_empty() {
            result.carrier = self.def.name.clone();
        }
        Ok(Some(result))
    }
}

#[async_trait]
impl CarrierAdapter for HttpJsonAdapter {
    fn id(&self) -> &str {
        &self.def.id
    }

    fn display_name(&self) -> &str {
        &self.def.name
    }

    fn tier(&self) -> Tier {
        self.def.tier
    }

    async fn track(
        &self,
        value: &str,
        cancel: CancellationToken,
    ) -> Result<Option<TrackingResult>, AdapterError> {
        tokio::select! {
            outcome = self.fetch(value) => outcome,
            _ = cancel.cancelled() => {
                debug!(adapter = %self.def.id, "HTTP adapter cancelled mid-request");
                Ok(None)
            }
        }
    }
}
