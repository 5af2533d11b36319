//! Periodic flag refresh.

use crate::config::MIN_POLLING_INTERVAL;
use crate::error::{ClientError, ClientResult};
use crate::requestor::FeatureRequestor;
use flagship_eval::{FlagStore, WriteOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Background task that replaces the store contents with a fresh snapshot
/// every polling interval.
///
/// A failed fetch leaves the previous snapshot in place.
pub struct PollingProcessor {
    requestor: Arc<dyn FeatureRequestor>,
    store: Arc<dyn FlagStore>,
    interval: Duration,
    ready: Arc<watch::Sender<bool>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollingProcessor {
    /// Create a stopped processor.
    ///
    /// `interval` is raised to [`MIN_POLLING_INTERVAL`] when shorter.
    pub fn new(
        requestor: Arc<dyn FeatureRequestor>,
        store: Arc<dyn FlagStore>,
        interval: Duration,
    ) -> Self {
        let (ready, _) = watch::channel(store.initialized());
        Self {
            requestor,
            store,
            interval: interval.max(MIN_POLLING_INTERVAL),
            ready: Arc::new(ready),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the polling loop on the current tokio runtime.
    ///
    /// The first fetch happens immediately.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("Polling processor already running");
            return;
        }

        info!(interval = ?self.interval, "Starting flag polling");

        let requestor = Arc::clone(&self.requestor);
        let store = Arc::clone(&self.store);
        let ready = Arc::clone(&self.ready);
        let period = self.interval;

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                refresh(requestor.as_ref(), store.as_ref(), &ready).await;
            }
        }));
    }

    /// Fetch and apply one snapshot outside the loop.
    pub async fn poll_once(&self) -> ClientResult<()> {
        let flags = self.requestor.fetch_all().await?;
        apply(self.store.as_ref(), &self.ready, flags);
        Ok(())
    }

    /// Wait until the store has received its first snapshot.
    pub async fn wait_for_initialization(&self, timeout: Duration) -> ClientResult<()> {
        let mut ready = self.ready.subscribe();
        match tokio::time::timeout(timeout, ready.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(ClientError::InitializationTimeout(timeout)),
        }
    }

    pub fn initialized(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Stop the polling loop. The store keeps its last snapshot.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            info!("Flag polling stopped");
        }
    }
}

impl Drop for PollingProcessor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

async fn refresh(
    requestor: &dyn FeatureRequestor,
    store: &dyn FlagStore,
    ready: &watch::Sender<bool>,
) {
    match requestor.fetch_all().await {
        Ok(flags) => apply(store, ready, flags),
        Err(e) => error!(error = %e, "Flag refresh failed, keeping previous flags"),
    }
}

fn apply(
    store: &dyn FlagStore,
    ready: &watch::Sender<bool>,
    flags: std::collections::HashMap<String, flagship_eval::Flag>,
) {
    let count = flags.len();
    match store.init(flags) {
        WriteOutcome::Applied => {
            debug!(count, "Flag snapshot applied");
            ready.send_if_modified(|ready| !std::mem::replace(ready, true));
        }
        outcome => warn!(?outcome, "Flag snapshot not applied"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flagship_eval::{Flag, InMemoryFlagStore};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Succeeds on the calls listed in `succeed_on`, fails otherwise.
    struct ScriptedRequestor {
        calls: AtomicUsize,
        succeed_on: Vec<usize>,
    }

    #[async_trait]
    impl FeatureRequestor for ScriptedRequestor {
        async fn fetch_all(&self) -> ClientResult<HashMap<String, Flag>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed_on.contains(&call) {
                let flag = Flag::new("f", "salt").with_version(call as u64 + 1);
                Ok(HashMap::from([("f".to_string(), flag)]))
            } else {
                Err(ClientError::Status {
                    status: 500,
                    message: "boom".to_string(),
                })
            }
        }
    }

    fn processor(succeed_on: Vec<usize>) -> (PollingProcessor, Arc<InMemoryFlagStore>) {
        processor_with_interval(succeed_on, Duration::from_secs(1))
    }

    fn processor_with_interval(
        succeed_on: Vec<usize>,
        interval: Duration,
    ) -> (PollingProcessor, Arc<InMemoryFlagStore>) {
        let store = Arc::new(InMemoryFlagStore::new());
        let requestor = Arc::new(ScriptedRequestor {
            calls: AtomicUsize::new(0),
            succeed_on,
        });
        let processor = PollingProcessor::new(requestor, store.clone(), interval);
        (processor, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let (processor, store) = processor_with_interval(vec![0], Duration::ZERO);
        assert_eq!(processor.interval, MIN_POLLING_INTERVAL);

        processor.start();
        processor
            .wait_for_initialization(Duration::from_secs(2))
            .await
            .unwrap();
        assert!(store.initialized());
        assert!(processor.is_running());

        processor.stop();
    }

    #[tokio::test]
    async fn test_poll_once_initializes_store() {
        let (processor, store) = processor(vec![0]);
        assert!(!processor.initialized());

        processor.poll_once().await.unwrap();

        assert!(processor.initialized());
        assert!(store.initialized());
        assert_eq!(store.get("f").unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_previous_snapshot() {
        let (processor, store) = processor(vec![0]);
        processor.poll_once().await.unwrap();

        assert!(processor.poll_once().await.is_err());
        assert_eq!(store.get("f").unwrap().version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_recovers_after_failures() {
        let (processor, store) = processor(vec![2]);
        processor.start();

        let result = processor
            .wait_for_initialization(Duration::from_millis(1500))
            .await;
        assert!(matches!(result, Err(ClientError::InitializationTimeout(_))));

        processor
            .wait_for_initialization(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("f").unwrap().version, 3);

        processor.stop();
        assert!(!processor.is_running());
    }
}
