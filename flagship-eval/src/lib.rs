//! Flag Evaluation for Flagship
//!
//! Deterministic, local flag evaluation over a thread-safe flag cache. No
//! network round trip happens here: flags are fed into a [`FlagStore`] by a
//! fetcher and evaluated against an [`EvaluationContext`] on demand.
//!
//! # Features
//!
//! - 🎯 **Targeting Rules** - Per-user overrides and attribute rules
//! - 🎲 **Weighted Rollout** - Stable SHA-1 bucketing across runs and platforms
//! - 🗄️ **Versioned Store** - Stale writes are rejected, deletes leave tombstones
//! - ⏱️ **Bounded Locking** - Lock waits are capped; reads degrade to "not found"
//! - 📨 **Event Descriptors** - Every evaluation can be reported to an [`EventSink`]
//!
//! # Quick Start
//!
//! ```
//! use flagship_eval::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryFlagStore::new());
//! let flag = Flag::new("new-ui", "bmV3LXVp")
//!     .with_variation(Variation::new(true, 100.0))
//!     .with_variation(Variation::new(false, 0.0));
//! store.init([(flag.key.clone(), flag)].into_iter().collect());
//!
//! let evaluator = Evaluator::new(store);
//! let user = EvaluationContext::new("user-123");
//!
//! assert!(evaluator.toggle("new-ui", &user, false).unwrap());
//! assert!(!evaluator.toggle("unknown", &user, false).unwrap());
//! ```
//!
//! # Targeting
//!
//! ```
//! use flagship_eval::*;
//!
//! let flag = Flag::new("beta-feature", "YmV0YQ==")
//!     .with_variation(
//!         Variation::new(true, 0.0)
//!             .with_user_target(TargetRule::keys(["user-123"]))
//!             .with_target(TargetRule::is_in("groups", vec!["beta".into()])),
//!     )
//!     .with_variation(Variation::new(false, 100.0));
//!
//! let tester = EvaluationContext::builder("user-456")
//!     .custom("groups", vec!["beta", "staff"])
//!     .build()
//!     .unwrap();
//!
//! let default = serde_json::json!(false);
//! assert_eq!(flag.evaluate(&tester, &default).unwrap(), &serde_json::json!(true));
//! ```

pub mod bucket;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod flag;
pub mod rule;
pub mod store;

pub use bucket::bucket;
pub use context::{AttributeValue, EvaluationContext, EvaluationContextBuilder};
pub use error::{EvalError, EvalResult};
pub use evaluator::{EvaluationDetail, Evaluator};
pub use event::{CustomEvent, Event, EventSink, FeatureEvent};
pub use flag::{Evaluation, Flag, Reason, Variation};
pub use rule::{Operator, RuleValue, TargetRule};
pub use store::{DEFAULT_LOCK_TIMEOUT, FlagStore, InMemoryFlagStore, WriteOutcome};
