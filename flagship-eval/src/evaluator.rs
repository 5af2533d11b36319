//! Evaluation entry point.
//!
//! Looks flags up in a [`FlagStore`], evaluates them, and falls back to the
//! caller's default whenever the flag is unknown, deleted, or the store has
//! not been initialized yet. Only corrupt flag data is reported as an error.

use crate::context::EvaluationContext;
use crate::error::EvalResult;
use crate::event::{Event, EventSink, FeatureEvent};
use crate::flag::Reason;
use crate::store::FlagStore;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Owned result of an evaluation through [`Evaluator`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationDetail {
    pub value: Value,
    pub variation_index: Option<usize>,
    pub reason: Reason,
    /// Version of the flag that was evaluated
    pub version: Option<u64>,
}

/// Evaluates flags held in a store.
pub struct Evaluator<S: FlagStore + ?Sized> {
    store: Arc<S>,
    sink: Option<Arc<dyn EventSink>>,
}

impl<S: FlagStore + ?Sized> Evaluator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, sink: None }
    }

    /// Send a [`FeatureEvent`] to `sink` for every evaluation.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Evaluate `key` and explain the outcome.
    pub fn variation_detail(
        &self,
        key: &str,
        context: &EvaluationContext,
        default: Value,
    ) -> EvalResult<EvaluationDetail> {
        match self.evaluate(key, context, default.clone()) {
            Ok(detail) => {
                self.emit(key, context, detail.value.clone(), detail.version, default);
                Ok(detail)
            }
            Err(e) => {
                // The caller falls back to its default; record that as served.
                let version = self.store.get(key).map(|flag| flag.version);
                self.emit(key, context, default.clone(), version, default);
                Err(e)
            }
        }
    }

    /// Evaluate `key`, falling back to `default`.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagship_eval::{EvaluationContext, Evaluator, InMemoryFlagStore};
    /// use serde_json::json;
    /// use std::sync::Arc;
    ///
    /// let evaluator = Evaluator::new(Arc::new(InMemoryFlagStore::new()));
    /// let user = EvaluationContext::new("anyUser");
    ///
    /// let value = evaluator.variation("a.non.feature", &user, json!("fallback")).unwrap();
    /// assert_eq!(value, json!("fallback"));
    /// ```
    pub fn variation(
        &self,
        key: &str,
        context: &EvaluationContext,
        default: Value,
    ) -> EvalResult<Value> {
        Ok(self.variation_detail(key, context, default)?.value)
    }

    /// Evaluate a boolean flag.
    ///
    /// A flag serving a non-boolean value yields `default`.
    pub fn toggle(
        &self,
        key: &str,
        context: &EvaluationContext,
        default: bool,
    ) -> EvalResult<bool> {
        let value = self.variation(key, context, Value::Bool(default))?;
        match value {
            Value::Bool(enabled) => Ok(enabled),
            other => {
                warn!(key, value = %other, "Flag served a non-boolean value to toggle");
                Ok(default)
            }
        }
    }

    /// Evaluate every live flag for `context`.
    ///
    /// Flags that fall through map to `Value::Null`. A flag that fails to
    /// evaluate is logged and left out. No events are emitted.
    pub fn all_flags(&self, context: &EvaluationContext) -> EvalResult<HashMap<String, Value>> {
        if !self.store.initialized() {
            return Ok(HashMap::new());
        }

        let values = self
            .store
            .all()
            .into_iter()
            .filter_map(|(key, flag)| match flag.evaluate_detail(context) {
                Ok(evaluation) => {
                    let value = evaluation.value.cloned().unwrap_or(Value::Null);
                    Some((key, value))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping flag that failed to evaluate");
                    None
                }
            })
            .collect();
        Ok(values)
    }

    fn evaluate(
        &self,
        key: &str,
        context: &EvaluationContext,
        default: Value,
    ) -> EvalResult<EvaluationDetail> {
        let flag = match self.store.get(key) {
            Some(flag) if self.store.initialized() => flag,
            _ => {
                return Ok(EvaluationDetail {
                    value: default,
                    variation_index: None,
                    reason: Reason::NotFound,
                    version: None,
                });
            }
        };

        let evaluation = flag.evaluate_detail(context)?;
        Ok(EvaluationDetail {
            value: evaluation.value.cloned().unwrap_or(default),
            variation_index: evaluation.variation_index,
            reason: evaluation.reason,
            version: Some(flag.version),
        })
    }

    fn emit(
        &self,
        key: &str,
        context: &EvaluationContext,
        value: Value,
        version: Option<u64>,
        default: Value,
    ) {
        if let Some(ref sink) = self.sink {
            sink.record(Event::Feature(FeatureEvent::new(
                key,
                context.clone(),
                value,
                default,
                version,
            )));
        }
    }
}

impl<S: FlagStore + ?Sized> Clone for Evaluator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sink: self.sink.clone(),
        }
    }
}

impl<S: FlagStore + ?Sized> fmt::Debug for Evaluator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("initialized", &self.store.initialized())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
