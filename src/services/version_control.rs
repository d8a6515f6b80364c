//! Version control for exported configuration
//!
//! An export signs the freshly generated payload and compares the signature
//! with the latest ledger row of its topic. Unchanged content keeps the last
//! version; changed content gets a newly minted one. Locking the topic,
//! comparing and appending share one unit of work, so concurrent exporters of
//! the same topic are linearized.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

use crate::domain::version::{mint_version, sign};
use crate::domain::{ConfigVersion, Versioned, ZERO_VERSION};
use crate::errors::Result;
use crate::export_span;
use crate::observability::MetricsRecorder;
use crate::storage::{Store, StoreTx};

/// Builds one topic's payload from the current store state
#[async_trait]
pub trait Exporter: Send + Sync {
    type Payload: Versioned + Serialize + Send;

    /// Ledger key, e.g. `route_rule` or `gslb.<bfe cluster>`
    fn topic(&self) -> String;

    /// Read-only; the returned payload is stamped afterwards
    async fn generate(&self, tx: &mut dyn StoreTx) -> Result<Self::Payload>;
}

pub struct VersionControlService {
    store: Arc<dyn Store>,
    metrics: MetricsRecorder,
}

impl VersionControlService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, metrics: MetricsRecorder::new() }
    }

    /// Generate, sign and stamp the exporter's payload
    pub async fn export_config<E: Exporter>(&self, exporter: &E) -> Result<E::Payload> {
        let topic = exporter.topic();
        let span = export_span!(topic);
        self.export_in_span(exporter, topic).instrument(span).await
    }

    async fn export_in_span<E: Exporter>(&self, exporter: &E, topic: String) -> Result<E::Payload> {
        let mut tx = self.store.begin().await?;
        tx.lock_topic(&topic).await?;

        let mut payload = exporter.generate(&mut *tx).await?;
        payload.set_version(ZERO_VERSION.to_string());
        let signature = sign(&payload)?;

        let latest = tx.latest_config_version(&topic).await?;
        let (version, minted) = match latest {
            Some(last) if last.signature == signature => (last.version, false),
            last => {
                let version = mint_version(Utc::now(), last.as_ref().map(|v| v.version.as_str()))?;
                tx.append_config_version(&ConfigVersion {
                    topic: topic.clone(),
                    signature: signature.clone(),
                    version: version.clone(),
                    created_at: Utc::now(),
                })
                .await?;
                (version, true)
            }
        };
        tx.commit().await?;

        self.metrics.record_export(&topic, minted);
        if minted {
            info!(version = %version, signature = %signature, "New config version minted");
        } else {
            debug!(version = %version, "Config unchanged, version reused");
        }

        payload.set_version(version);
        Ok(payload)
    }

    /// Latest ledger row of a topic
    pub async fn latest_version(&self, topic: &str) -> Result<Option<ConfigVersion>> {
        let mut tx = self.store.begin().await?;
        tx.latest_config_version(topic).await
    }

    /// Every ledger row of a topic, oldest first
    pub async fn version_history(&self, topic: &str) -> Result<Vec<ConfigVersion>> {
        let mut tx = self.store.begin().await?;
        tx.config_version_history(topic).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Serialize)]
    struct Payload {
        #[serde(rename = "Version")]
        version: String,
        #[serde(rename = "Config")]
        config: BTreeMap<String, i32>,
    }

    impl Versioned for Payload {
        fn version(&self) -> &str {
            &self.version
        }

        fn set_version(&mut self, version: String) {
            self.version = version;
        }
    }

    struct FixedExporter {
        content: Mutex<BTreeMap<String, i32>>,
    }

    #[async_trait]
    impl Exporter for FixedExporter {
        type Payload = Payload;

        fn topic(&self) -> String {
            "test_topic".to_string()
        }

        async fn generate(&self, _tx: &mut dyn StoreTx) -> Result<Payload> {
            let config = self.content.lock().unwrap().clone();
            Ok(Payload { version: "stale".to_string(), config })
        }
    }

    fn setup() -> (VersionControlService, FixedExporter) {
        let exporter = FixedExporter {
            content: Mutex::new(BTreeMap::from([("a".to_string(), 1)])),
        };
        (VersionControlService::new(Arc::new(MemoryStore::new())), exporter)
    }

    #[tokio::test]
    async fn test_unchanged_content_reuses_version() {
        let (service, exporter) = setup();
        let first = service.export_config(&exporter).await.unwrap();
        let second = service.export_config(&exporter).await.unwrap();

        assert_ne!(first.version(), ZERO_VERSION);
        assert_eq!(first.version(), second.version());
    }

    #[tokio::test]
    async fn test_changed_content_mints_greater_version() {
        let (service, exporter) = setup();
        let first = service.export_config(&exporter).await.unwrap();

        exporter.content.lock().unwrap().insert("b".to_string(), 2);
        let second = service.export_config(&exporter).await.unwrap();

        let first: u64 = first.version().parse().unwrap();
        let second: u64 = second.version().parse().unwrap();
        assert!(second > first);

        let latest = service.latest_version("test_topic").await.unwrap().unwrap();
        assert_eq!(latest.version, second.to_string());
    }

    #[tokio::test]
    async fn test_concurrent_exports_share_one_version() {
        let (service, exporter) = setup();

        let (a, b, c) = tokio::join!(
            service.export_config(&exporter),
            service.export_config(&exporter),
            service.export_config(&exporter)
        );
        let versions = [a.unwrap().version, b.unwrap().version, c.unwrap().version];
        assert!(versions.iter().all(|v| v == &versions[0]));

        let history = service.version_history("test_topic").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, versions[0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_exports_across_threads() {
        let (service, exporter) = setup();
        let service = Arc::new(service);
        let exporter = Arc::new(exporter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let exporter = exporter.clone();
                tokio::spawn(async move {
                    service.export_config(exporter.as_ref()).await.unwrap().version
                })
            })
            .collect();

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap());
        }
        assert!(versions.iter().all(|v| v == &versions[0]));
        assert_eq!(service.version_history("test_topic").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reverting_content_mints_again() {
        let (service, exporter) = setup();
        let original = service.export_config(&exporter).await.unwrap().version;

        exporter.content.lock().unwrap().insert("b".to_string(), 2);
        service.export_config(&exporter).await.unwrap();

        exporter.content.lock().unwrap().remove("b");
        let reverted = service.export_config(&exporter).await.unwrap().version;
        assert_ne!(original, reverted);
    }
}
