//! ask-core: Core types and traits for ask
//!
//! This crate holds everything that does not depend on a particular backend:
//! the history-retaining result channel, the normalized result taxonomy, the
//! provider trait, the streaming normalization state machine and the
//! tool-call loop that drives a provider until the model stops calling tools.

pub mod agent;
pub mod blocking;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod result;
pub mod subscriber;
pub mod tool;
pub mod tool_loop;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{Agent, AgentBuilder};
pub use blocking::run_blocking;
pub use error::Error;
pub use normalize::{DeltaTracker, SegmentKind};
pub use provider::{
    EventStream, Provider, ProviderConfig, ReasoningEffort, ReasoningSummary, ResultSink,
    DEVELOPER_DIRECTIVE, SYSTEM_DIRECTIVE,
};
pub use result::{AgentResult, DeltaStream, FunctionCall, Results};
pub use subscriber::{Delivery, Subscriber, Subscription};
pub use tool::{FunctionCallEntry, FunctionCallInput, PropertySchema, Tool, ToolOutput, ToolParameters};
pub use tool_loop::{execute_function_calls, run_tool_loop, RoundInput, RoundTrip};

pub type Result<T> = std::result::Result<T, Error>;
