// Flagship - Feature flags for Rust
//
// This library bundles local flag evaluation with an optional polling client
// that keeps flags fresh and reports analytics events.

// Re-export evaluation core
pub use flagship_eval::*;

// Re-export the client
#[cfg(feature = "client")]
pub use flagship_client;

#[cfg(feature = "client")]
pub use flagship_client::{ClientConfig, ClientError, ClientResult, FlagClient};

pub mod prelude {
    pub use crate::{
        AttributeValue,
        EvalError,
        EvalResult,
        EvaluationContext,
        EvaluationContextBuilder,
        EvaluationDetail,
        Evaluator,
        Event,
        EventSink,
        Flag,
        FlagStore,
        InMemoryFlagStore,
        Reason,
        RuleValue,
        TargetRule,
        Variation,
        WriteOutcome,
    };

    #[cfg(feature = "client")]
    pub use crate::{ClientConfig, ClientError, ClientResult, FlagClient};

    pub use serde_json::{Value, json};
}
