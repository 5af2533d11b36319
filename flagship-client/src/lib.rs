//! Flag Client for Flagship
//!
//! Keeps an in-memory copy of every flag fresh by polling the flag service,
//! evaluates flags locally through [`flagship_eval`], and ships analytics
//! events in batches.
//!
//! # Features
//!
//! - 🔄 **Polling** - Full snapshot refresh on a fixed interval
//! - 🛟 **Graceful Degradation** - Failed refreshes keep the last good flags
//! - 📦 **Batched Events** - Bounded queue, periodic bulk delivery
//! - 🔌 **Pluggable Transport** - Swap the fetcher or event sender for tests
//!
//! # Configuration
//!
//! ```
//! use flagship_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("sdk-key")
//!     .with_base_uri("http://localhost:8080")
//!     .unwrap()
//!     .with_start_wait_time(Duration::from_secs(1));
//!
//! assert_eq!(config.base_uri.as_str(), "http://localhost:8080/");
//! ```
//!
//! Configuration can also be read from `FLAGSHIP_*` environment variables
//! with [`ClientConfig::from_env`].

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod polling;
pub mod requestor;

pub use client::FlagClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use events::{EventProcessor, EventSender, HttpEventSender};
pub use polling::PollingProcessor;
pub use requestor::{FeatureRequestor, HttpFeatureRequestor};
