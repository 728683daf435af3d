use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::AgentResult;
use crate::tool::Tool;

/// Native event stream produced by a backend transport.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, Error>> + Send>>;

/// Sent once per conversation, ahead of the first question.
pub const SYSTEM_DIRECTIVE: &str = "1. [MUST] Provide answers and reasoning in the language the user speaks to you in. Example: If asked in Japanese, respond in Japanese.\n2. [MUST] Never answer with speculation.";

/// Sent after every fresh user question.
pub const DEVELOPER_DIRECTIVE: &str = "If tools are available, use them to investigate. If there are no tools or tool calls are not needed, answer directly.";

/// Receives results as a provider produces them.
///
/// Returning false asks the provider to stop; the round then fails with
/// [`Error::Cancelled`].
pub trait ResultSink: Send {
    fn emit(&mut self, result: AgentResult) -> bool;
}

impl<F> ResultSink for F
where
    F: FnMut(AgentResult) -> bool + Send,
{
    fn emit(&mut self, result: AgentResult) -> bool {
        self(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    Auto,
    Concise,
    Detailed,
    None,
}

impl ReasoningSummary {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningSummary::Auto => "auto",
            ReasoningSummary::Concise => "concise",
            ReasoningSummary::Detailed => "detailed",
            ReasoningSummary::None => "none",
        }
    }
}

impl fmt::Display for ReasoningSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningSummary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ReasoningSummary::Auto),
            "concise" => Ok(ReasoningSummary::Concise),
            "detailed" => Ok(ReasoningSummary::Detailed),
            "none" => Ok(ReasoningSummary::None),
            other => Err(Error::config(format!("unknown reasoning summary: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    None,
    Minimal,
    Low,
    Medium,
    High,
    #[serde(rename = "xhigh")]
    XHigh,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::None => "none",
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::XHigh => "xhigh",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ReasoningEffort::None),
            "minimal" => Ok(ReasoningEffort::Minimal),
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            "xhigh" => Ok(ReasoningEffort::XHigh),
            other => Err(Error::config(format!("unknown reasoning effort: {}", other))),
        }
    }
}

/// Per-provider generation settings. Each backend fills in its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_summary: Option<ReasoningSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default)]
    pub include_thoughts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ProviderConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reasoning_summary: None,
            reasoning_effort: None,
            include_thoughts: false,
            thinking_budget: None,
            temperature: None,
        }
    }

    pub fn with_reasoning_summary(mut self, summary: ReasoningSummary) -> Self {
        self.reasoning_summary = Some(summary);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_include_thoughts(mut self, include: bool) -> Self {
        self.include_thoughts = include;
        self
    }

    pub fn with_thinking_budget(mut self, budget: i32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A conversational backend.
///
/// One call to [`Provider::process_message`] covers a whole question: every
/// tool-call round runs inside it, and each normalized result is handed to
/// the sink as soon as it exists. Setters take `&mut self` and therefore
/// cannot overlap an in-flight question.
#[async_trait]
pub trait Provider: Send {
    fn name(&self) -> &str;

    async fn process_message(
        &mut self,
        question: &str,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error>;

    fn set_tools(&mut self, tools: Vec<Tool>);

    fn set_reasoning_summary(&mut self, summary: ReasoningSummary);

    fn set_reasoning_effort(&mut self, effort: ReasoningEffort);

    fn set_model(&mut self, model: String);

    fn config(&self) -> &ProviderConfig;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_names_round_trip() {
        for name in ["auto", "concise", "detailed", "none"] {
            let summary: ReasoningSummary = name.parse().unwrap();
            assert_eq!(summary.to_string(), name);
        }
        for name in ["none", "minimal", "low", "medium", "high", "xhigh"] {
            let effort: ReasoningEffort = name.parse().unwrap();
            assert_eq!(effort.to_string(), name);
        }
        assert_eq!("HIGH".parse::<ReasoningEffort>().unwrap(), ReasoningEffort::High);
        assert!("extreme".parse::<ReasoningEffort>().is_err());
    }

    #[test]
    fn test_reasoning_serde_names() {
        assert_eq!(
            serde_json::to_string(&ReasoningEffort::XHigh).unwrap(),
            "\"xhigh\""
        );
        let summary: ReasoningSummary = serde_json::from_str("\"detailed\"").unwrap();
        assert_eq!(summary, ReasoningSummary::Detailed);
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new("gpt-5-nano")
            .with_reasoning_summary(ReasoningSummary::Auto)
            .with_reasoning_effort(ReasoningEffort::Low)
            .with_temperature(0.5);

        assert_eq!(config.model, "gpt-5-nano");
        assert_eq!(config.reasoning_summary, Some(ReasoningSummary::Auto));
        assert_eq!(config.reasoning_effort, Some(ReasoningEffort::Low));
        assert_eq!(config.temperature, Some(0.5));
        assert_eq!(config.thinking_budget, None);
    }

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |r: AgentResult| {
                seen.push(r.type_name());
                seen.len() < 2
            };
            let sink: &mut dyn ResultSink = &mut sink;
            assert!(sink.emit(AgentResult::Message("a".into())));
            assert!(!sink.emit(AgentResult::Reasoning("b".into())));
        }
        assert_eq!(seen, vec!["message", "think"]);
    }
}
