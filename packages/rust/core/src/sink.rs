//! Delivery of finished records to the downstream automation endpoint.
//!
//! Delivery is best effort: a failure is reported back as a value and
//! counted by the pipeline, never raised as an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use tenderflow_shared::{EmittedRecord, Result, SinkConfig, TenderflowError};

/// A record could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery of {reference} failed: {reason}")]
pub struct SinkDeliveryFailed {
    pub reference: String,
    pub reason: String,
}

/// Receives each finished record once.
#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, record: &EmittedRecord) -> std::result::Result<(), SinkDeliveryFailed>;
}

/// Build the sink named by the configuration: a webhook, or nothing.
pub fn sink_from_config(config: &SinkConfig) -> Result<Box<dyn RecordSink>> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Box::new(WebhookSink::new(
            url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        _ => Ok(Box::new(NullSink)),
    }
}

// ---------------------------------------------------------------------------
// WebhookSink
// ---------------------------------------------------------------------------

/// POSTs each record as a JSON body.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| TenderflowError::config(format!("invalid webhook URL: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TenderflowError::Network(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RecordSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(reference = %record.reference))]
    async fn deliver(&self, record: &EmittedRecord) -> std::result::Result<(), SinkDeliveryFailed> {
        let failed = |reason: String| {
            warn!(reason = %reason, "record delivery failed");
            SinkDeliveryFailed {
                reference: record.reference.clone(),
                reason,
            }
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(record)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("endpoint answered {status}")));
        }

        info!(status = status.as_u16(), "record delivered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NullSink
// ---------------------------------------------------------------------------

/// Used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl RecordSink for NullSink {
    fn name(&self) -> &str {
        "none"
    }

    async fn deliver(&self, record: &EmittedRecord) -> std::result::Result<(), SinkDeliveryFailed> {
        debug!(reference = %record.reference, "delivery skipped, no endpoint configured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tenderflow_shared::TenderStatus;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn record() -> EmittedRecord {
        EmittedRecord {
            reference: "AO-7/2026".into(),
            subject: "Etude".into(),
            buyer: "Commune".into(),
            location: "Tanger".into(),
            deadline: "02/04/2026 11:00".into(),
            merged_text: "--- Content from file: rc.pdf ---\nTexte".into(),
            status: TenderStatus::Extracted,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn posts_record_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/tenders"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "reference": "AO-7/2026",
                "status": "extracted",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookSink::new(
            &format!("{}/webhook/tenders", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        sink.deliver(&record()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_a_failed_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookSink::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = sink.deliver(&record()).await.unwrap_err();
        assert_eq!(err.reference, "AO-7/2026");
        assert!(err.reason.contains("500"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_failed_delivery() {
        let sink = WebhookSink::new("http://127.0.0.1:9/hook", Duration::from_secs(2)).unwrap();
        assert!(sink.deliver(&record()).await.is_err());
    }

    #[test]
    fn config_without_endpoint_gives_null_sink() {
        let sink = sink_from_config(&SinkConfig::default()).unwrap();
        assert_eq!(sink.name(), "none");

        let config = SinkConfig {
            webhook_url: Some("not a url".into()),
            ..SinkConfig::default()
        };
        assert!(sink_from_config(&config).is_err());
    }
}
