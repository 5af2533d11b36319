//! Flag Definitions
//!
//! Defines flags, their weighted variations, and evaluation logic.

use crate::bucket::bucket;
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::rule::TargetRule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feature flag definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    /// Flag key
    pub key: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Per-flag bucketing seed
    #[serde(default)]
    pub salt: String,

    /// Whether targeting is on; an off flag always serves the caller's default
    #[serde(default)]
    pub on: bool,

    /// Variations, in the order rollout walks them
    #[serde(default)]
    pub variations: Vec<Variation>,

    /// Monotonic per-key version
    #[serde(default)]
    pub version: u64,

    /// Tombstone marker
    #[serde(default)]
    pub deleted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_date: Option<DateTime<Utc>>,
}

impl Flag {
    /// Create an enabled flag with no variations at version 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagship_eval::{Flag, Variation};
    ///
    /// let flag = Flag::new("engine.enable", "ZW5naW5lLmVuYWJsZQ==")
    ///     .with_variation(Variation::new(true, 93.0))
    ///     .with_variation(Variation::new(false, 7.0));
    /// ```
    pub fn new(key: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            kind: None,
            salt: salt.into(),
            on: true,
            variations: Vec::new(),
            version: 1,
            deleted: false,
            creation_date: None,
            commit_date: None,
        }
    }

    /// Deleted placeholder that keeps `version` so stale writes stay rejected.
    pub fn tombstone(key: impl Into<String>, version: u64) -> Self {
        Self {
            on: false,
            deleted: true,
            version,
            ..Self::new(key, "")
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_variation(mut self, variation: Variation) -> Self {
        self.variations.push(variation);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn with_on(mut self, on: bool) -> Self {
        self.on = on;
        self
    }

    /// Evaluate the flag, returning `default` when nothing is served.
    pub fn evaluate<'a>(
        &'a self,
        context: &EvaluationContext,
        default: &'a Value,
    ) -> EvalResult<&'a Value> {
        Ok(self.evaluate_detail(context)?.value.unwrap_or(default))
    }

    /// Evaluate the flag and explain which path decided the outcome.
    ///
    /// Explicit targeting is checked first, variation by variation; only when
    /// no target matches does the context's bucket pick a variation by
    /// cumulative weight.
    pub fn evaluate_detail(&self, context: &EvaluationContext) -> EvalResult<Evaluation<'_>> {
        if !self.on {
            return Ok(Evaluation::fallback(Reason::Off));
        }

        for (index, variation) in self.variations.iter().enumerate() {
            if let Some(reason) = variation.target_match(context)? {
                return Ok(Evaluation {
                    value: Some(&variation.value),
                    variation_index: Some(index),
                    reason,
                });
            }
        }

        self.check_weights()?;

        let point = bucket(context, &self.key, &self.salt);
        let mut cumulative = 0.0;
        for (index, variation) in self.variations.iter().enumerate() {
            cumulative += variation.weight / 100.0;
            if point < cumulative {
                return Ok(Evaluation {
                    value: Some(&variation.value),
                    variation_index: Some(index),
                    reason: Reason::Rollout { bucket: point },
                });
            }
        }

        Ok(Evaluation::fallback(Reason::Fallthrough))
    }

    /// Every weight must lie in [0, 100]; NaN is rejected too.
    fn check_weights(&self) -> EvalResult<()> {
        match self
            .variations
            .iter()
            .enumerate()
            .find(|(_, variation)| !(0.0..=100.0).contains(&variation.weight))
        {
            Some((index, variation)) => Err(EvalError::MalformedFlag(format!(
                "variation {} of '{}' has weight {} outside [0, 100]",
                index, self.key, variation.weight
            ))),
            None => Ok(()),
        }
    }
}

/// One possible outcome of a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    /// Value served to the caller
    pub value: Value,

    /// Rollout weight in percent (0-100)
    #[serde(default)]
    pub weight: f64,

    /// Attribute rules; any match serves this variation
    #[serde(default)]
    pub targets: Vec<TargetRule>,

    /// Explicit per-user override, checked before `targets`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_target: Option<TargetRule>,
}

impl Variation {
    pub fn new(value: impl Into<Value>, weight: f64) -> Self {
        Self {
            value: value.into(),
            weight,
            targets: Vec::new(),
            user_target: None,
        }
    }

    pub fn with_target(mut self, rule: TargetRule) -> Self {
        self.targets.push(rule);
        self
    }

    pub fn with_user_target(mut self, rule: TargetRule) -> Self {
        self.user_target = Some(rule);
        self
    }

    fn target_match(&self, context: &EvaluationContext) -> EvalResult<Option<Reason>> {
        if let Some(ref user_target) = self.user_target
            && user_target.matches(context)?
        {
            return Ok(Some(Reason::TargetMatch { rule_index: None }));
        }

        for (index, rule) in self.targets.iter().enumerate() {
            if rule.matches(context)? {
                return Ok(Some(Reason::TargetMatch {
                    rule_index: Some(index),
                }));
            }
        }

        Ok(None)
    }
}

/// Why an evaluation produced its result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reason {
    /// The flag is switched off
    Off,
    /// The flag is missing, deleted, or the store is not initialized
    NotFound,
    /// A target rule matched; `None` means the variation's user target
    TargetMatch {
        #[serde(rename = "ruleIndex")]
        rule_index: Option<usize>,
    },
    /// The context's bucket fell inside a variation's cumulative weight
    Rollout { bucket: f64 },
    /// Weights did not cover the context's bucket
    Fallthrough,
}

/// Outcome of [`Flag::evaluate_detail`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<'a> {
    /// Served value, `None` when the caller's default applies
    pub value: Option<&'a Value>,
    pub variation_index: Option<usize>,
    pub reason: Reason,
}

impl Evaluation<'_> {
    fn fallback(reason: Reason) -> Self {
        Self {
            value: None,
            variation_index: None,
            reason,
        }
    }
}
