//! HTTP delivery sink.

use async_trait::async_trait;
use engine_core::error::TransportErrorCode;
use engine_core::{EnrichedEvent, Error, Result};
use tracing::{debug, warn};

use crate::config::DeliveryConfig;
use crate::sink::EventSink;

/// Posts events as JSON to the analytics endpoint.
#[derive(Clone)]
pub struct HttpSink {
    url: String,
    http_client: reqwest::Client,
}

impl HttpSink {
    /// Creates a new HTTP sink.
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: config.events_url(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn deliver(&self, event: &EnrichedEvent) -> Result<()> {
        post_event(&self.http_client, &self.url, event).await
    }

    fn beacon(&self, event: &EnrichedEvent) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::transport(
                TransportErrorCode::RequestFailed,
                format!("no runtime for beacon: {}", e),
                None,
            )
        })?;

        let client = self.http_client.clone();
        let url = self.url.clone();
        let event = event.clone();

        runtime.spawn(async move {
            if let Err(e) = post_event(&client, &url, &event).await {
                warn!(error = %e, event_type = %event.event_type, "Beacon delivery failed");
            }
        });
        Ok(())
    }
}

async fn post_event(client: &reqwest::Client, url: &str, event: &EnrichedEvent) -> Result<()> {
    let response = client.post(url).json(event).send().await.map_err(|e| {
        Error::transport(TransportErrorCode::RequestFailed, e.to_string(), None)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::transport(
            TransportErrorCode::BadStatus,
            format!("analytics endpoint returned {}: {}", status, body),
            Some(status.as_u16()),
        ));
    }

    debug!(url = %url, event_type = %event.event_type, "Event delivered");
    Ok(())
}
