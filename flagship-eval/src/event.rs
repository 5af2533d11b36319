//! Analytics event descriptors.
//!
//! Evaluation only describes what happened; batching and delivery belong to
//! whatever [`EventSink`] the caller plugs in.

use crate::context::EvaluationContext;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// An analytics event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Event {
    /// A flag was evaluated
    Feature(FeatureEvent),
    /// Application-defined event recorded via `track`
    Custom(CustomEvent),
}

impl Event {
    pub fn key(&self) -> &str {
        match self {
            Event::Feature(e) => &e.key,
            Event::Custom(e) => &e.key,
        }
    }
}

/// Record of one flag evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureEvent {
    #[serde(serialize_with = "unix_millis")]
    pub creation_date: DateTime<Utc>,
    /// Flag key
    pub key: String,
    pub user: EvaluationContext,
    /// Value served
    pub value: Value,
    /// Default supplied by the caller
    pub default: Value,
    /// Version of the evaluated flag, absent when it was not found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl FeatureEvent {
    pub fn new(
        key: impl Into<String>,
        user: EvaluationContext,
        value: Value,
        default: Value,
        version: Option<u64>,
    ) -> Self {
        Self {
            creation_date: Utc::now(),
            key: key.into(),
            user,
            value,
            default,
            version,
        }
    }
}

/// Application-defined event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    #[serde(serialize_with = "unix_millis")]
    pub creation_date: DateTime<Utc>,
    pub key: String,
    pub user: EvaluationContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CustomEvent {
    pub fn new(key: impl Into<String>, user: EvaluationContext, data: Option<Value>) -> Self {
        Self {
            creation_date: Utc::now(),
            key: key.into(),
            user,
            data,
        }
    }
}

fn unix_millis<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(date.timestamp_millis())
}

/// Destination for analytics events.
///
/// Called on the evaluating thread, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}
