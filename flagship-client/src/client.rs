//! The flag client.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::events::{EventProcessor, EventSender, HttpEventSender};
use crate::polling::PollingProcessor;
use crate::requestor::{FeatureRequestor, HttpFeatureRequestor};
use flagship_eval::{
    CustomEvent, EvaluationContext, EvaluationDetail, Evaluator, Event, EventSink,
    InMemoryFlagStore,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Polls flags in the background, evaluates them locally, and reports
/// analytics events.
///
/// Evaluation never waits on the network. Until the first snapshot arrives
/// every flag evaluates to the caller's default.
///
/// # Examples
///
/// ```no_run
/// use flagship_client::{ClientConfig, FlagClient};
/// use flagship_eval::EvaluationContext;
///
/// # async fn run() -> flagship_client::ClientResult<()> {
/// let client = FlagClient::new(ClientConfig::new("sdk-key")).await?;
/// let user = EvaluationContext::builder("user-123").country("CA").build()?;
///
/// if client.toggle("new-checkout", &user, false)? {
///     // ...
/// }
///
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct FlagClient {
    config: ClientConfig,
    evaluator: Evaluator<InMemoryFlagStore>,
    polling: PollingProcessor,
    events: Arc<EventProcessor>,
}

impl FlagClient {
    /// Create a client talking to the configured endpoints.
    ///
    /// Waits up to `start_wait_time` for the first flag snapshot.
    pub async fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let requestor = Arc::new(HttpFeatureRequestor::new(&config)?);
        let sender = Arc::new(HttpEventSender::new(&config)?);
        Self::with_components(config, requestor, sender).await
    }

    /// Create a client with custom fetch and delivery collaborators.
    pub async fn with_components(
        config: ClientConfig,
        requestor: Arc<dyn FeatureRequestor>,
        sender: Arc<dyn EventSender>,
    ) -> ClientResult<Self> {
        config.validate()?;

        let store = Arc::new(InMemoryFlagStore::with_lock_timeout(config.store_lock_timeout));
        let events = Arc::new(EventProcessor::new(sender, config.event_queue_capacity));
        events.start(config.event_flush_interval);

        let polling = PollingProcessor::new(requestor, store.clone(), config.polling_interval);
        polling.start();

        let evaluator = Evaluator::new(store).with_event_sink(events.clone());

        if let Err(e) = polling.wait_for_initialization(config.start_wait_time).await {
            warn!(error = %e, "Continuing without flags; evaluations return defaults");
        } else {
            info!("Flag client initialized");
        }

        Ok(Self {
            config,
            evaluator,
            polling,
            events,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a flag snapshot has been received.
    pub fn initialized(&self) -> bool {
        self.polling.initialized()
    }

    /// Evaluate a boolean flag.
    pub fn toggle(
        &self,
        key: &str,
        context: &EvaluationContext,
        default: bool,
    ) -> ClientResult<bool> {
        Ok(self.evaluator.toggle(key, context, default)?)
    }

    /// Evaluate a flag of any JSON type.
    pub fn variation(
        &self,
        key: &str,
        context: &EvaluationContext,
        default: Value,
    ) -> ClientResult<Value> {
        Ok(self.evaluator.variation(key, context, default)?)
    }

    /// Evaluate a flag and explain the outcome.
    pub fn variation_detail(
        &self,
        key: &str,
        context: &EvaluationContext,
        default: Value,
    ) -> ClientResult<EvaluationDetail> {
        Ok(self.evaluator.variation_detail(key, context, default)?)
    }

    /// Evaluate every flag for `context` without emitting events.
    pub fn all_flags(&self, context: &EvaluationContext) -> ClientResult<HashMap<String, Value>> {
        Ok(self.evaluator.all_flags(context)?)
    }

    /// Record a custom analytics event.
    pub fn track(&self, event_key: &str, context: &EvaluationContext, data: Option<Value>) {
        self.events.record(Event::Custom(CustomEvent::new(
            event_key,
            context.clone(),
            data,
        )));
    }

    /// Deliver buffered events now.
    pub async fn flush(&self) -> ClientResult<usize> {
        self.events.flush().await
    }

    /// Stop polling and deliver any remaining events.
    pub async fn close(&self) -> ClientResult<()> {
        self.polling.stop();
        self.events.close().await?;
        info!("Flag client closed");
        Ok(())
    }
}

impl fmt::Debug for FlagClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagClient")
            .field("base_uri", &self.config.base_uri.as_str())
            .field("initialized", &self.initialized())
            .field("pending_events", &self.events.pending())
            .finish()
    }
}
