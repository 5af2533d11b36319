//! Analytics event buffering and delivery.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::requestor::{http_client, status_error};
use async_trait::async_trait;
use flagship_eval::{Event, EventSink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use url::Url;

/// Delivers a batch of events.
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn send(&self, events: &[Event]) -> ClientResult<()>;
}

/// [`EventSender`] posting JSON arrays to the bulk events endpoint.
#[derive(Debug, Clone)]
pub struct HttpEventSender {
    http: reqwest::Client,
    url: Url,
}

impl HttpEventSender {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            http: http_client(config)?,
            url: config.bulk_events_url()?,
        })
    }
}

#[async_trait]
impl EventSender for HttpEventSender {
    async fn send(&self, events: &[Event]) -> ClientResult<()> {
        let response = self.http.post(self.url.clone()).json(events).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }
}

struct Shared {
    buffer: Mutex<Vec<Event>>,
    capacity: usize,
    sender: Arc<dyn EventSender>,
}

impl Shared {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.buffer.lock())
    }

    async fn flush(&self) -> ClientResult<usize> {
        let batch = self.take();
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        debug!(count, "Flushing events");
        self.sender.send(&batch).await?;
        Ok(count)
    }
}

/// Bounded event buffer flushed on a fixed interval.
///
/// When the buffer is full new events are dropped. A failed delivery drops
/// its batch.
pub struct EventProcessor {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventProcessor {
    /// Create a processor without a flush loop.
    pub fn new(sender: Arc<dyn EventSender>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
                sender,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the periodic flush loop on the current tokio runtime.
    pub fn start(&self, flush_interval: Duration) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("Event processor already running");
            return;
        }

        info!(interval = ?flush_interval, "Starting event delivery");
        let shared = Arc::clone(&self.shared);

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing is buffered yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = shared.flush().await {
                    error!(error = %e, "Event delivery failed, batch dropped");
                }
            }
        }));
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        self.shared.buffer.lock().len()
    }

    /// Deliver everything buffered now. Returns how many events were sent.
    pub async fn flush(&self) -> ClientResult<usize> {
        self.shared.flush().await
    }

    /// Stop the flush loop and deliver what is left.
    pub async fn close(&self) -> ClientResult<()> {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.flush().await?;
        info!("Event processor closed");
        Ok(())
    }
}

impl EventSink for EventProcessor {
    fn record(&self, event: Event) {
        let mut buffer = self.shared.buffer.lock();
        if buffer.len() >= self.shared.capacity {
            warn!(key = event.key(), "Event queue full, dropping event");
            return;
        }
        buffer.push(event);
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
