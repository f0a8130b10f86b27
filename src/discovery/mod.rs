//! Executor discovery.
//!
//! There is no membership table. Each query publishes a fresh correlation id
//! on the register topic; live workers write themselves into a TTL map named
//! after that id and release one permit on a semaphore of the same name. The
//! caller waits, bounded, for as many permits as there were subscribers at
//! publish time and then reads whatever arrived.
//!
//! Results are a lower bound: workers that are slow, disconnect, or subscribe
//! after the publish are not counted.

use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::backend::{Backend, Keys};
use crate::models::{JobExecutor, StoreConfig};
use crate::storage::{decode, encode};

/// Produces correlation ids for discovery rounds.
pub trait CorrelationAllocator: Send + Sync {
    fn allocate(&self) -> String;
}

/// Random 128-bit ids.
pub struct UuidAllocator;

impl CorrelationAllocator for UuidAllocator {
    fn allocate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

pub struct ExecutorDiscovery {
    backend: Arc<dyn Backend>,
    keys: Keys,
    allocator: Arc<dyn CorrelationAllocator>,
    timeout: Duration,
}

/// How a discovery wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    AllResponded,
    TimedOut,
    Cancelled,
}

impl ExecutorDiscovery {
    pub fn new(backend: Arc<dyn Backend>, config: &StoreConfig) -> Self {
        Self::with_allocator(backend, config, Arc::new(UuidAllocator))
    }

    pub fn with_allocator(
        backend: Arc<dyn Backend>,
        config: &StoreConfig,
        allocator: Arc<dyn CorrelationAllocator>,
    ) -> Self {
        Self {
            backend,
            keys: Keys::new(config.namespace.clone()),
            allocator,
            timeout: config.discovery_timeout(),
        }
    }

    pub async fn count_executors(&self) -> Result<usize> {
        self.count_executors_until(future::pending()).await
    }

    pub async fn list_executors(&self) -> Result<Vec<JobExecutor>> {
        self.list_executors_until(future::pending()).await
    }

    /// Like `count_executors`, but stops waiting once `cancel` resolves and
    /// counts whoever answered so far.
    pub async fn count_executors_until<F>(&self, cancel: F) -> Result<usize>
    where
        F: Future<Output = ()> + Send,
    {
        Ok(self.gather(cancel).await?.len())
    }

    /// Like `list_executors`, but stops waiting once `cancel` resolves.
    pub async fn list_executors_until<F>(&self, cancel: F) -> Result<Vec<JobExecutor>>
    where
        F: Future<Output = ()> + Send,
    {
        let executors: Vec<JobExecutor> = self
            .gather(cancel)
            .await?
            .iter()
            .filter_map(|raw| match decode::<JobExecutor>(raw) {
                Ok(executor) => Some(executor),
                Err(e) => {
                    tracing::warn!("Skipping undecodable executor response: {}", e);
                    None
                }
            })
            .collect();
        Ok(executors)
    }

    async fn gather<F>(&self, cancel: F) -> Result<Vec<String>>
    where
        F: Future<Output = ()> + Send,
    {
        let correlation_id = self.allocator.allocate();
        let subscribers = self
            .backend
            .publish(&self.keys.worker_register(), correlation_id.clone())
            .await
            .context("Failed to publish discovery request")?;
        if subscribers == 0 {
            tracing::debug!("No workers subscribed to discovery");
            return Ok(Vec::new());
        }

        let outcome = self.wait_for(&correlation_id, subscribers, cancel).await?;

        let response_key = self.keys.worker_response(&correlation_id);
        let responses = self.backend.map_values(&response_key).await?;
        self.backend.delete(&response_key).await?;

        match outcome {
            WaitOutcome::AllResponded => tracing::info!(
                "Discovery {}: all {} workers responded",
                correlation_id,
                subscribers
            ),
            WaitOutcome::TimedOut => tracing::warn!(
                "Discovery {} timed out after {:?}: {} of {} workers responded",
                correlation_id,
                self.timeout,
                responses.len(),
                subscribers
            ),
            WaitOutcome::Cancelled => tracing::info!(
                "Discovery {} cancelled: {} of {} workers responded",
                correlation_id,
                responses.len(),
                subscribers
            ),
        }
        Ok(responses)
    }

    /// Waits for `subscribers` permits, then always deletes the semaphore.
    async fn wait_for<F>(
        &self,
        correlation_id: &str,
        subscribers: usize,
        cancel: F,
    ) -> Result<WaitOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        let semaphore_key = self.keys.worker_request(correlation_id);
        let acquired = tokio::select! {
            acquired = self.backend.semaphore_try_acquire(&semaphore_key, subscribers, self.timeout) => {
                acquired.map(|all| {
                    if all {
                        WaitOutcome::AllResponded
                    } else {
                        WaitOutcome::TimedOut
                    }
                })
            }
            _ = cancel => Ok(WaitOutcome::Cancelled),
        };

        let deleted = self
            .backend
            .delete(&semaphore_key)
            .await
            .context("Failed to delete discovery semaphore");
        let outcome = acquired.context("Failed waiting for discovery responses")?;
        deleted?;
        Ok(outcome)
    }
}

/// The worker side of a discovery round: record `executor` in the response
/// map of `correlation_id` for `executor_ttl` and release one permit.
pub async fn report_presence(
    backend: &dyn Backend,
    config: &StoreConfig,
    correlation_id: &str,
    executor: &JobExecutor,
) -> Result<()> {
    let keys = Keys::new(config.namespace.clone());
    let ttl = config.executor_ttl();
    backend
        .map_put_with_ttl(
            &keys.worker_response(correlation_id),
            &executor.id,
            encode(executor)?,
            ttl,
        )
        .await
        .context("Failed to write discovery response")?;
    backend
        .semaphore_release(&keys.worker_request(correlation_id), 1)
        .await
        .context("Failed to release discovery semaphore")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct SequenceAllocator {
        next: AtomicUsize,
    }

    impl CorrelationAllocator for SequenceAllocator {
        fn allocate(&self) -> String {
            format!("q{}", self.next.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn short_config() -> StoreConfig {
        StoreConfig {
            discovery_timeout_secs: 1,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_uuid_allocator_is_unique() {
        let a = UuidAllocator.allocate();
        let b = UuidAllocator.allocate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_no_subscribers_returns_immediately() {
        let backend = Arc::new(MemoryBackend::new());
        let discovery = ExecutorDiscovery::new(backend, &StoreConfig::default());
        let start = Instant::now();
        assert_eq!(discovery.count_executors().await.expect("count"), 0);
        assert!(discovery.list_executors().await.expect("list").is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_silent_subscriber_times_out_and_cleans_up() {
        let backend = Arc::new(MemoryBackend::new());
        let keys = Keys::default();
        let _silent = backend.subscribe(&keys.worker_register()).await;
        let discovery = ExecutorDiscovery::with_allocator(
            backend.clone(),
            &short_config(),
            Arc::new(SequenceAllocator {
                next: AtomicUsize::new(0),
            }),
        );

        let start = Instant::now();
        let count = discovery.count_executors().await.expect("count");
        assert_eq!(count, 0);
        assert!(start.elapsed() >= Duration::from_millis(900));
        assert!(!backend.exists(&keys.worker_request("q0")).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_responder_is_listed() {
        let backend = Arc::new(MemoryBackend::new());
        let keys = Keys::default();
        let mut rx = backend.subscribe(&keys.worker_register()).await;

        let worker_backend = backend.clone();
        let worker = tokio::spawn(async move {
            let correlation_id = rx.recv().await.expect("recv");
            let me = JobExecutor::new("w1", "worker-1", "10.0.0.1:9000");
            report_presence(
                worker_backend.as_ref(),
                &StoreConfig::default(),
                &correlation_id,
                &me,
            )
            .await
            .expect("report");
        });

        let discovery = ExecutorDiscovery::new(backend, &short_config());
        let executors = discovery.list_executors().await.expect("list");
        worker.await.expect("worker");

        assert_eq!(executors.len(), 1);
        assert_eq!(executors[0].id, "w1");
        assert_eq!(executors[0].address, "10.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_undecodable_response_is_skipped() {
        let backend = Arc::new(MemoryBackend::new());
        let keys = Keys::default();
        let mut good_rx = backend.subscribe(&keys.worker_register()).await;
        let mut legacy_rx = backend.subscribe(&keys.worker_register()).await;

        let good_backend = backend.clone();
        let good = tokio::spawn(async move {
            let correlation_id = good_rx.recv().await.expect("recv");
            let me = JobExecutor::new("w1", "worker-1", "10.0.0.1:9000");
            report_presence(
                good_backend.as_ref(),
                &StoreConfig::default(),
                &correlation_id,
                &me,
            )
            .await
            .expect("report");
        });
        let legacy_backend = backend.clone();
        let legacy_keys = keys.clone();
        let legacy = tokio::spawn(async move {
            let correlation_id = legacy_rx.recv().await.expect("recv");
            legacy_backend
                .map_put_with_ttl(
                    &legacy_keys.worker_response(&correlation_id),
                    "old",
                    r#"{"legacy":1}"#.to_string(),
                    Duration::from_secs(60),
                )
                .await
                .expect("put");
            legacy_backend
                .semaphore_release(&legacy_keys.worker_request(&correlation_id), 1)
                .await
                .expect("release");
        });

        let discovery = ExecutorDiscovery::new(backend, &short_config());
        let executors = discovery.list_executors().await.expect("list");
        good.await.expect("good worker");
        legacy.await.expect("legacy worker");

        assert_eq!(executors.len(), 1);
        assert_eq!(executors[0].id, "w1");
    }

    #[tokio::test]
    async fn test_report_presence_uses_configured_ttl() {
        let backend = MemoryBackend::new();
        let config = StoreConfig {
            namespace: "ttl".to_string(),
            executor_ttl_secs: 1,
            ..StoreConfig::default()
        };
        let keys = Keys::new("ttl");
        let me = JobExecutor::new("w1", "worker-1", "10.0.0.1:9000");
        report_presence(&backend, &config, "q", &me)
            .await
            .expect("report");

        let response = keys.worker_response("q");
        assert_eq!(backend.map_size(&response).await.expect("size"), 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(backend.map_size(&response).await.expect("size"), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_wait_without_error() {
        let backend = Arc::new(MemoryBackend::new());
        let keys = Keys::default();
        let _silent = backend.subscribe(&keys.worker_register()).await;
        let config = StoreConfig {
            discovery_timeout_secs: 30,
            ..StoreConfig::default()
        };
        let discovery = ExecutorDiscovery::new(backend, &config);

        let start = Instant::now();
        let count = discovery
            .count_executors_until(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .expect("count");
        assert_eq!(count, 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_backend_down_is_an_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);
        let discovery = ExecutorDiscovery::new(backend, &StoreConfig::default());
        assert!(discovery.count_executors().await.is_err());
    }
}
