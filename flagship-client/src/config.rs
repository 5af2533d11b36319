//! Client configuration.

use crate::error::{ClientError, ClientResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default flag service base URI.
pub const DEFAULT_BASE_URI: &str = "https://app.launchdarkly.com/";

/// Default analytics events URI.
pub const DEFAULT_EVENTS_URI: &str = "https://events.launchdarkly.com/";

/// Lower bound (and default) for the polling interval.
pub const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Client configuration.
///
/// # Examples
///
/// ```
/// use flagship_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("sdk-key")
///     .with_event_queue_capacity(1000)
///     .with_polling_interval(Duration::from_secs(30));
///
/// assert_eq!(config.polling_interval, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Flag service base URI
    pub base_uri: Url,

    /// Analytics events URI
    pub events_uri: Url,

    /// API key sent with every request
    pub api_key: String,

    /// Maximum buffered events before new ones are dropped
    pub event_queue_capacity: usize,

    /// Time between event flushes
    pub event_flush_interval: Duration,

    /// Time between flag refreshes; never below [`MIN_POLLING_INTERVAL`]
    pub polling_interval: Duration,

    /// How long client construction waits for the first flag snapshot
    pub start_wait_time: Duration,

    /// Bound on flag store lock waits
    pub store_lock_timeout: Duration,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_uri: default_url(DEFAULT_BASE_URI),
            events_uri: default_url(DEFAULT_EVENTS_URI),
            api_key: String::new(),
            event_queue_capacity: 500,
            event_flush_interval: Duration::from_secs(2),
            polling_interval: MIN_POLLING_INTERVAL,
            start_wait_time: Duration::from_secs(5),
            store_lock_timeout: flagship_eval::DEFAULT_LOCK_TIMEOUT,
            request_timeout: Duration::from_secs(10),
            user_agent: format!("FlagshipRustClient/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn default_url(raw: &str) -> Url {
    // Both defaults are static, well-formed URLs.
    Url::parse(raw).unwrap_or_else(|_| unreachable!("invalid built-in URL {raw}"))
}

impl ClientConfig {
    /// Create a default configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file when one exists, then overrides defaults from
    /// `FLAGSHIP_BASE_URI`, `FLAGSHIP_EVENTS_URI`, `FLAGSHIP_API_KEY`,
    /// `FLAGSHIP_EVENT_QUEUE_CAPACITY`, `FLAGSHIP_EVENT_FLUSH_INTERVAL_SECS`,
    /// `FLAGSHIP_POLLING_INTERVAL_SECS` and `FLAGSHIP_START_WAIT_SECS`.
    pub fn from_env() -> ClientResult<Self> {
        dotenvy::dotenv().ok(); // Ignore if .env doesn't exist
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(uri) = lookup("FLAGSHIP_BASE_URI") {
            config = config.with_base_uri(&uri)?;
        }
        if let Some(uri) = lookup("FLAGSHIP_EVENTS_URI") {
            config = config.with_events_uri(&uri)?;
        }
        if let Some(key) = lookup("FLAGSHIP_API_KEY") {
            config = config.with_api_key(key);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "FLAGSHIP_EVENT_QUEUE_CAPACITY")? {
            config = config.with_event_queue_capacity(capacity);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "FLAGSHIP_EVENT_FLUSH_INTERVAL_SECS")? {
            config = config.with_event_flush_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "FLAGSHIP_POLLING_INTERVAL_SECS")? {
            config = config.with_polling_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "FLAGSHIP_START_WAIT_SECS")? {
            config = config.with_start_wait_time(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the flag service base URI.
    pub fn with_base_uri(mut self, uri: &str) -> ClientResult<Self> {
        self.base_uri = parse_base(uri)?;
        Ok(self)
    }

    /// Set the analytics events URI.
    pub fn with_events_uri(mut self, uri: &str) -> ClientResult<Self> {
        self.events_uri = parse_base(uri)?;
        Ok(self)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    pub fn with_event_flush_interval(mut self, interval: Duration) -> Self {
        self.event_flush_interval = interval;
        self
    }

    /// Set the polling interval, clamped to at least [`MIN_POLLING_INTERVAL`].
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval.max(MIN_POLLING_INTERVAL);
        self
    }

    pub fn with_start_wait_time(mut self, wait: Duration) -> Self {
        self.start_wait_time = wait;
        self
    }

    pub fn with_store_lock_timeout(mut self, timeout: Duration) -> Self {
        self.store_lock_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check values that the setters cannot reject on their own.
    pub fn validate(&self) -> ClientResult<()> {
        if self.event_queue_capacity == 0 {
            return Err(ClientError::Config(
                "event queue capacity must be greater than zero".to_string(),
            ));
        }
        if self.event_flush_interval.is_zero() {
            return Err(ClientError::Config(
                "event flush interval must be greater than zero".to_string(),
            ));
        }
        if self.polling_interval < MIN_POLLING_INTERVAL {
            return Err(ClientError::Config(format!(
                "polling interval must be at least {MIN_POLLING_INTERVAL:?}"
            )));
        }
        Ok(())
    }

    pub(crate) fn flags_url(&self) -> ClientResult<Url> {
        Ok(self.base_uri.join("api/eval/latest-features")?)
    }

    pub(crate) fn bulk_events_url(&self) -> ClientResult<Url> {
        Ok(self.events_uri.join("bulk")?)
    }
}

/// Parse a base URI, making sure relative joins append to its path.
fn parse_base(uri: &str) -> ClientResult<Url> {
    if uri.ends_with('/') {
        Ok(Url::parse(uri)?)
    } else {
        Ok(Url::parse(&format!("{uri}/"))?)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> ClientResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ClientError::Config(format!("{name}='{raw}': {e}")))
        })
        .transpose()
}
