//! Target Rules
//!
//! Attribute/operator/value-set rules and the matcher that checks a context
//! against them.

use crate::context::{AttributeValue, EvaluationContext, KEY_ATTRIBUTE};
use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};

/// Scalar a rule compares attributes against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl RuleValue {
    fn matches_str(&self, value: &str) -> bool {
        matches!(self, RuleValue::String(s) if s == value)
    }

    // Compared by value: 55 and 55.0 are the same number.
    fn matches_number(&self, value: f64) -> bool {
        matches!(self, RuleValue::Number(n) if *n == value)
    }

    fn matches_bool(&self, value: bool) -> bool {
        matches!(self, RuleValue::Bool(b) if *b == value)
    }
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for RuleValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for RuleValue {
    fn from(value: f32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for RuleValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for RuleValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<bool> for RuleValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Comparison operator.
///
/// Unknown operators survive deserialization so that a flag using one fails
/// at evaluation time instead of poisoning the whole fetched flag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    In,
    Unrecognized(String),
}

impl From<String> for Operator {
    fn from(op: String) -> Self {
        match op.as_str() {
            "in" => Operator::In,
            _ => Operator::Unrecognized(op),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::In => "in".to_string(),
            Operator::Unrecognized(op) => op,
        }
    }
}

/// Targeting rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRule {
    /// Attribute to check; `"key"` targets the context key
    pub attribute: String,

    #[serde(rename = "op")]
    pub operator: Operator,

    /// Values to compare against
    #[serde(default)]
    pub values: Vec<RuleValue>,
}

impl TargetRule {
    /// Create an `in` rule.
    pub fn is_in(attribute: impl Into<String>, values: Vec<RuleValue>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: Operator::In,
            values,
        }
    }

    /// Create an `in` rule on the context key.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::is_in(
            KEY_ATTRIBUTE,
            keys.into_iter().map(|k| RuleValue::String(k.into())).collect(),
        )
    }

    /// Check whether `context` satisfies this rule.
    ///
    /// An attribute the context does not carry only matches when the rule has
    /// no values at all.
    pub fn matches(&self, context: &EvaluationContext) -> EvalResult<bool> {
        if let Operator::Unrecognized(ref op) = self.operator {
            return Err(EvalError::UnrecognizedOperator(op.clone()));
        }

        if self.attribute == KEY_ATTRIBUTE {
            return Ok(self.contains_str(context.key()));
        }

        let Some(value) = context.get(&self.attribute) else {
            return Ok(self.values.is_empty());
        };

        let matched = match value {
            AttributeValue::String(s) => self.contains_str(s),
            AttributeValue::Number(n) => self.contains_number(*n),
            AttributeValue::Bool(b) => self.values.iter().any(|v| v.matches_bool(*b)),
            AttributeValue::StringList(items) => items.iter().any(|s| self.contains_str(s)),
            AttributeValue::NumberList(items) => items.iter().any(|n| self.contains_number(*n)),
        };
        Ok(matched)
    }

    fn contains_str(&self, value: &str) -> bool {
        self.values.iter().any(|v| v.matches_str(value))
    }

    fn contains_number(&self, value: f64) -> bool {
        self.values.iter().any(|v| v.matches_number(value))
    }
}
