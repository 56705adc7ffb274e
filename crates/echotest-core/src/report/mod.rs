//! Result reporting
//!
//! Each trial is first appended to a local results file ([`store`]) and then
//! delivered to a webhook with retry ([`webhook`]). Local persistence failures
//! propagate; webhook failures are logged and only reflected in the outcome.

pub mod store;
pub mod webhook;

use crate::audio::analyzer::Metrics;
use crate::device::SystemInfoProvider;
use async_trait::async_trait;
use std::sync::Arc;
use store::ResultStore;
use thiserror::Error;
use webhook::{WebhookClient, WebhookPayload};

/// Errors that abort reporting of a trial
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to persist result: {0}")]
    Persist(#[from] std::io::Error),

    #[error("System info worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Consumes the metrics of each finished trial
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist and deliver one trial
    ///
    /// # Returns
    /// Whether the remote delivery succeeded; local persistence errors are returned as `Err`
    async fn report(&self, metrics: &Metrics) -> Result<bool, ReportError>;
}

/// Local store plus optional webhook delivery
pub struct ReportPipeline {
    store: ResultStore,
    webhook: Option<WebhookClient>,
    system: Arc<dyn SystemInfoProvider>,
}

impl ReportPipeline {
    pub fn new(
        store: ResultStore,
        webhook: Option<WebhookClient>,
        system: Arc<dyn SystemInfoProvider>,
    ) -> Self {
        Self {
            store,
            webhook,
            system,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }
}

#[async_trait]
impl ResultSink for ReportPipeline {
    async fn report(&self, metrics: &Metrics) -> Result<bool, ReportError> {
        self.store.append(metrics)?;

        let Some(webhook) = &self.webhook else {
            tracing::debug!("No webhook configured, skipping delivery");
            return Ok(false);
        };

        tracing::info!(url = %webhook.config().url, "Sending result to webhook");
        // Snapshots shell out to system tools
        let provider = Arc::clone(&self.system);
        let system = tokio::task::spawn_blocking(move || provider.snapshot()).await?;
        Ok(webhook.send(&WebhookPayload::new(&system, metrics)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SystemInfo;
    use chrono::Local;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use webhook::WebhookConfig;

    #[derive(Default)]
    struct CountingSystem {
        snapshots: AtomicU32,
        threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl SystemInfoProvider for CountingSystem {
        fn snapshot(&self) -> SystemInfo {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            self.threads
                .lock()
                .unwrap()
                .push(std::thread::current().id());
            SystemInfo {
                hostname: "host".to_string(),
                serial_number: "Unknown".to_string(),
                os: "linux".to_string(),
                os_version: "6.1".to_string(),
                platform: "linux".to_string(),
                machine: "x86_64".to_string(),
                processor: "x86_64".to_string(),
                app_version: "0.1.0".to_string(),
                user: "tester".to_string(),
            }
        }
    }

    fn metrics() -> Metrics {
        Metrics {
            timestamp: Local::now(),
            erl_db: 100.0,
            erle_db: 105.0,
            tclw_db: 0.0,
            echo_tail_length_s: 0.0,
            latency_s: 0.0,
            output_device: "Speakers".to_string(),
            input_device: "Mic".to_string(),
            volume_percent: 88,
        }
    }

    #[tokio::test]
    async fn test_local_only_without_webhook() {
        let tmp = tempfile::tempdir().unwrap();
        let system = Arc::new(CountingSystem::default());
        let pipeline = ReportPipeline::new(ResultStore::new(tmp.path()), None, system.clone());

        let delivered = pipeline.report(&metrics()).await.unwrap();

        assert!(!delivered);
        assert!(pipeline.store().path_for(88).exists());
        assert_eq!(system.snapshots.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let webhook = WebhookClient::new(WebhookConfig {
            url: format!("http://{}/hook", addr),
            token: None,
            retries: 2,
            retry_delay: Duration::from_millis(5),
        })
        .unwrap();
        let system = Arc::new(CountingSystem::default());
        let pipeline =
            ReportPipeline::new(ResultStore::new(tmp.path()), Some(webhook), system.clone());

        let delivered = pipeline.report(&metrics()).await.unwrap();

        assert!(!delivered);
        assert_eq!(system.snapshots.load(Ordering::SeqCst), 1);
        let contents = std::fs::read_to_string(pipeline.store().path_for(88)).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    fn unreachable_webhook() -> WebhookClient {
        WebhookClient::new(WebhookConfig {
            url: "http://127.0.0.1:1/hook".to_string(),
            token: None,
            retries: 1,
            retry_delay: Duration::from_millis(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_taken_off_async_task() {
        let tmp = tempfile::tempdir().unwrap();
        let system = Arc::new(CountingSystem::default());
        let pipeline = ReportPipeline::new(
            ResultStore::new(tmp.path()),
            Some(unreachable_webhook()),
            system.clone(),
        );

        pipeline.report(&metrics()).await.unwrap();

        let threads = system.threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn test_panicking_snapshot_is_an_error_after_persisting() {
        struct BrokenSystem;

        impl SystemInfoProvider for BrokenSystem {
            fn snapshot(&self) -> SystemInfo {
                panic!("system_profiler vanished");
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let pipeline = ReportPipeline::new(
            ResultStore::new(tmp.path()),
            Some(unreachable_webhook()),
            Arc::new(BrokenSystem),
        );

        let result = pipeline.report(&metrics()).await;

        assert!(matches!(result, Err(ReportError::Worker(_))));
        assert!(pipeline.store().path_for(88).exists());
    }

    #[tokio::test]
    async fn test_persist_error_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the results directory should be
        let blocker = tmp.path().join("results");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let pipeline = ReportPipeline::new(
            ResultStore::new(&blocker),
            None,
            Arc::new(CountingSystem::default()),
        );

        let result = pipeline.report(&metrics()).await;
        assert!(matches!(result, Err(ReportError::Persist(_))));
    }
}
