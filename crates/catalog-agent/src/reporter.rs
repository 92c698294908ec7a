//! Report sinks: the firehose HTTP endpoint, or stdout for local runs.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use catalog_core::Batch;

pub const REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the collector in the firehose path.
pub const LOG_COLLECTOR_NAME: &str = "log";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("firehose request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fields sent with every report: node and cluster identity plus the
/// installation secret.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonFields(Map<String, Value>);

impl CommonFields {
    pub fn new(
        node_uuid: Option<String>,
        cluster_uuid: Option<String>,
        secret: Option<String>,
    ) -> Self {
        let mut fields = Map::new();
        for (key, value) in [
            ("node-uuid", node_uuid),
            ("cluster-uuid", cluster_uuid),
            ("secret", secret),
        ] {
            if let Some(value) = value {
                fields.insert(key.to_string(), Value::String(value));
            }
        }
        Self(fields)
    }
}

/// `{ <common fields>..., "result": { source: [lines] } }`
#[derive(Debug, Serialize)]
pub struct ReportPayload<'a> {
    #[serde(flatten)]
    common: &'a Map<String, Value>,
    result: &'a Batch,
}

impl<'a> ReportPayload<'a> {
    pub fn new(common: &'a CommonFields, result: &'a Batch) -> Self {
        Self {
            common: &common.0,
            result,
        }
    }
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, payload: &ReportPayload<'_>) -> Result<(), ReportError>;
}

/// Posts each report as JSON to `<protocol>://<host>:<port>/v1/firehose/<name>`.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    client: reqwest::Client,
    location: String,
}

impl HttpReporter {
    pub fn new(protocol: &str, hostname: &str, port: u16, collector: &str) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder().timeout(REPORT_TIMEOUT).build()?;
        Ok(Self {
            client,
            location: firehose_location(protocol, hostname, port, collector),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

pub fn firehose_location(protocol: &str, hostname: &str, port: u16, collector: &str) -> String {
    format!("{protocol}://{hostname}:{port}/v1/firehose/{collector}")
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn report(&self, payload: &ReportPayload<'_>) -> Result<(), ReportError> {
        self.client
            .post(&self.location)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Writes each report as one JSON line on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutReporter;

#[async_trait]
impl Reporter for StdoutReporter {
    async fn report(&self, payload: &ReportPayload<'_>) -> Result<(), ReportError> {
        let line = serde_json::to_string(payload)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::Fragment;
    use serde_json::json;

    #[test]
    fn payload_flattens_common_fields_next_to_result() {
        let common = CommonFields::new(
            Some("node-1".to_string()),
            Some("cluster-1".to_string()),
            Some("s3cret".to_string()),
        );
        let mut batch = Batch::default();
        batch.push("flocker-control".into(), Fragment::new(vec!["a".into(), "b".into()]));

        let value = serde_json::to_value(ReportPayload::new(&common, &batch)).expect("test");
        assert_eq!(
            value,
            json!({
                "node-uuid": "node-1",
                "cluster-uuid": "cluster-1",
                "secret": "s3cret",
                "result": {"flocker-control": ["a", "b"]},
            })
        );
    }

    #[test]
    fn absent_identity_fields_are_omitted() {
        let common = CommonFields::new(None, None, None);
        let batch = Batch::default();
        let value = serde_json::to_value(ReportPayload::new(&common, &batch)).expect("test");
        assert_eq!(value, json!({"result": {}}));
    }

    #[test]
    fn firehose_location_format() {
        assert_eq!(
            firehose_location("https", "firehose.example.com", 443, LOG_COLLECTOR_NAME),
            "https://firehose.example.com:443/v1/firehose/log"
        );
    }
}
