//! Evaluation Context
//!
//! The identity and attribute bag flags are evaluated against.

use crate::error::{EvalError, EvalResult};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Attribute names with a dedicated builder method.
pub const BUILT_IN_ATTRIBUTES: [&str; 8] = [
    "ip",
    "country",
    "firstName",
    "lastName",
    "name",
    "avatar",
    "email",
    "anonymous",
];

/// Reserved attribute name that targets the context key itself.
pub const KEY_ATTRIBUTE: &str = "key";

/// Attribute value attached to a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Number(f64),
    StringList(Vec<String>),
    NumberList(Vec<f64>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        Self::Number(value.into())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        Self::StringList(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(value: Vec<i64>) -> Self {
        Self::NumberList(value.into_iter().map(|n| n as f64).collect())
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(value: Vec<f64>) -> Self {
        Self::NumberList(value)
    }
}

/// Evaluation context (user).
///
/// Immutable once built; share it freely across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    key: String,
    secondary: Option<String>,
    attributes: BTreeMap<String, AttributeValue>,
}

impl EvaluationContext {
    /// Create a context carrying only a key.
    ///
    /// The key must be non-empty. This is only checked in debug builds;
    /// use [`EvaluationContextBuilder::build`] when the key comes from
    /// untrusted input, since it reports an empty key as an error.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        debug_assert!(!key.is_empty(), "evaluation context key must be non-empty");
        Self {
            key,
            secondary: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Start building a context.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagship_eval::EvaluationContext;
    ///
    /// let context = EvaluationContext::builder("user-123")
    ///     .email("ada@example.com")
    ///     .country("GB")
    ///     .custom("groups", vec!["beta", "staff"])
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(context.key(), "user-123");
    /// ```
    pub fn builder(key: impl Into<String>) -> EvaluationContextBuilder {
        EvaluationContextBuilder::new(key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn secondary(&self) -> Option<&str> {
        self.secondary.as_deref()
    }

    /// Look up an attribute by name, built-in or custom.
    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Identity fed into bucketing: the key, suffixed with `.secondary` when set.
    pub fn bucketing_id(&self) -> String {
        match self.secondary.as_deref() {
            Some(secondary) if !secondary.is_empty() => format!("{}.{}", self.key, secondary),
            _ => self.key.clone(),
        }
    }
}

impl Serialize for EvaluationContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let custom: BTreeMap<&str, &AttributeValue> = self
            .attributes
            .iter()
            .filter(|(name, _)| !BUILT_IN_ATTRIBUTES.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value))
            .collect();

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("key", &self.key)?;
        if let Some(ref secondary) = self.secondary {
            map.serialize_entry("secondary", secondary)?;
        }
        for name in BUILT_IN_ATTRIBUTES {
            if let Some(value) = self.attributes.get(name) {
                map.serialize_entry(name, value)?;
            }
        }
        if !custom.is_empty() {
            map.serialize_entry("custom", &custom)?;
        }
        map.end()
    }
}

/// Builder for [`EvaluationContext`].
///
/// Validation problems are collected and reported by [`build`](Self::build),
/// so the chain never panics midway.
#[derive(Debug)]
pub struct EvaluationContextBuilder {
    key: String,
    secondary: Option<String>,
    attributes: BTreeMap<String, AttributeValue>,
    problems: Vec<String>,
}

impl EvaluationContextBuilder {
    fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secondary: None,
            attributes: BTreeMap::new(),
            problems: Vec::new(),
        }
    }

    /// Secondary key; only influences bucketing.
    pub fn secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn ip(self, ip: impl Into<String>) -> Self {
        self.set("ip", AttributeValue::String(ip.into()))
    }

    /// Two-letter ISO 3166-1 alpha-2 country code, e.g. `"US"`.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        let country = country.into();
        if country.chars().count() != 2 {
            self.problems.push(format!(
                "country should be a 2 character ISO 3166-1 alpha-2 code, got '{}'",
                country
            ));
            return self;
        }
        self.set("country", AttributeValue::String(country))
    }

    pub fn first_name(self, first_name: impl Into<String>) -> Self {
        self.set("firstName", AttributeValue::String(first_name.into()))
    }

    pub fn last_name(self, last_name: impl Into<String>) -> Self {
        self.set("lastName", AttributeValue::String(last_name.into()))
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.set("name", AttributeValue::String(name.into()))
    }

    pub fn avatar(self, avatar: impl Into<String>) -> Self {
        self.set("avatar", AttributeValue::String(avatar.into()))
    }

    pub fn email(self, email: impl Into<String>) -> Self {
        self.set("email", AttributeValue::String(email.into()))
    }

    pub fn anonymous(self, anonymous: bool) -> Self {
        self.set("anonymous", AttributeValue::Bool(anonymous))
    }

    /// Attach a custom attribute.
    pub fn custom(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        let name = name.into();
        if name == KEY_ATTRIBUTE || BUILT_IN_ATTRIBUTES.contains(&name.as_str()) {
            self.problems
                .push(format!("'{}' is a reserved attribute name", name));
            return self;
        }
        self.set(name, value.into())
    }

    fn set(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        let name = name.into();
        if name.is_empty() {
            self.problems
                .push("attribute name can not be empty".to_string());
        } else if self.attributes.contains_key(&name) {
            self.problems
                .push(format!("attribute '{}' was set more than once", name));
        } else {
            self.attributes.insert(name, value);
        }
        self
    }

    /// Validate and freeze the context.
    pub fn build(self) -> EvalResult<EvaluationContext> {
        if self.key.is_empty() {
            return Err(EvalError::InvalidContext(
                "context key can not be empty".to_string(),
            ));
        }
        if let Some(problem) = self.problems.into_iter().next() {
            return Err(EvalError::InvalidContext(problem));
        }

        Ok(EvaluationContext {
            key: self.key,
            secondary: self.secondary,
            attributes: self.attributes,
        })
    }
}
