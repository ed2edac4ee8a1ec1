//! Delivery of finished reports to the presentation layer.

use crate::report::IdentifiedReport;
use crate::store::KeyValueStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

const CURRENT_REPORT_KEY: &str = "current_report";

/// Hands a validated report to whatever displays it.
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &IdentifiedReport) -> Result<()>;
}

/// Keeps the most recent report in a [`KeyValueStore`] for the viewer to fetch.
#[derive(Clone)]
pub struct StoreReportSink {
    store: Arc<dyn KeyValueStore>,
}

impl StoreReportSink {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The last delivered report, if any.
    pub fn current(&self) -> Result<Option<IdentifiedReport>> {
        let Some(raw) = self.store.get(CURRENT_REPORT_KEY)? else {
            return Ok(None);
        };
        let report = serde_json::from_str(&raw).context("Failed to parse stored report")?;
        Ok(Some(report))
    }
}

#[async_trait::async_trait]
impl ReportSink for StoreReportSink {
    async fn deliver(&self, report: &IdentifiedReport) -> Result<()> {
        let json = serde_json::to_string(report).context("Failed to serialize report")?;
        self.store.set(CURRENT_REPORT_KEY, json)?;
        info!(
            "Report {} delivered ({} components)",
            report.id,
            report.report.infographic.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportDocument;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_deliver_then_read_back() {
        let sink = StoreReportSink::new(Arc::new(MemoryStore::new()));
        assert!(sink.current().unwrap().is_none());

        let doc = ReportDocument::from(json!({
            "title": "T",
            "infographic": [{"type": "header", "title": "H"}]
        }));
        let report = IdentifiedReport::new(doc);
        sink.deliver(&report).await.unwrap();

        assert_eq!(sink.current().unwrap(), Some(report));
    }
}
