//! Normalized results produced by every provider.
//!
//! Whatever wire format a backend speaks, a conversation turn surfaces as a
//! sequence of [`AgentResult`] values: streaming deltas, their complete
//! counterparts, function-call requests and at most one terminal error.

use std::fmt;

use crate::error::Error;
use crate::subscriber::{Subscriber, Subscription};

/// Live queue capacity of a delta's fragment stream.
pub const DELTA_QUEUE_CAPACITY: usize = 1000;

/// An in-progress text segment (message or reasoning).
///
/// The accumulated text is the concatenation of the fragment history, and a
/// fragment is recorded and queued under one lock, so [`DeltaStream::text`]
/// always agrees with what has been published on the fragment stream.
#[derive(Clone)]
pub struct DeltaStream {
    fragments: Subscriber<String>,
}

impl DeltaStream {
    pub(crate) fn open(initial: &str) -> Self {
        let delta = Self {
            fragments: Subscriber::new(DELTA_QUEUE_CAPACITY),
        };
        if !initial.is_empty() {
            delta.fragments.publish(initial.to_string());
        }
        delta
    }

    pub(crate) fn push(&self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.fragments.publish(fragment.to_string());
    }

    pub(crate) fn close(&self) {
        self.fragments.close();
    }

    /// Text accumulated so far.
    pub fn text(&self) -> String {
        self.fragments.with_history(|fragments| fragments.concat())
    }

    /// Live fragment stream. Ends when the segment is closed.
    pub fn subscribe(&self) -> Subscription<String> {
        self.fragments.subscribe()
    }

    /// Every fragment published so far, in order.
    pub fn fragments(&self) -> Vec<String> {
        self.fragments.history()
    }

    /// Fragments published from index `start` on.
    ///
    /// A consumer that fell behind the live queue can use the subscription as
    /// a wake-up and read from here, since history never drops fragments.
    pub fn fragments_from(&self, start: usize) -> Vec<String> {
        self.fragments
            .with_history(|fragments| fragments.get(start..).map(<[String]>::to_vec).unwrap_or_default())
    }

    pub fn is_closed(&self) -> bool {
        self.fragments.is_closed()
    }
}

impl fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaStream")
            .field("text", &self.text())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A request from the model to invoke a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// Correlates the tool output with this request. Empty when the backend
    /// has no call ids.
    pub call_id: String,
    pub name: String,
    /// JSON-encoded arguments, passed to the tool verbatim.
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AgentResult {
    /// Complete assistant text for one segment.
    Message(String),
    /// Assistant text still being generated.
    MessageDelta(DeltaStream),
    /// Complete reasoning summary.
    Reasoning(String),
    /// Reasoning summary still being generated.
    ReasoningDelta(DeltaStream),
    FunctionCall(FunctionCall),
    /// Terminal: nothing follows on the same stream.
    Error(Error),
}

impl AgentResult {
    pub fn type_name(&self) -> &'static str {
        match self {
            AgentResult::Message(_) => "message",
            AgentResult::MessageDelta(_) => "message_delta",
            AgentResult::Reasoning(_) => "think",
            AgentResult::ReasoningDelta(_) => "reasoning_delta",
            AgentResult::FunctionCall(_) => "function_call",
            AgentResult::Error(_) => "error",
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            AgentResult::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AgentResult::Error(_))
    }
}

impl fmt::Display for AgentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentResult::Message(text) | AgentResult::Reasoning(text) => f.write_str(text),
            AgentResult::MessageDelta(delta) | AgentResult::ReasoningDelta(delta) => {
                f.write_str(&delta.text())
            }
            AgentResult::FunctionCall(call) => {
                write!(f, "FunctionToolCall: {} args:{}", call.name, call.arguments)
            }
            AgentResult::Error(err) => write!(f, "Error: {}", err),
        }
    }
}

/// Everything one backend round produced, in emission order.
#[derive(Debug, Clone, Default)]
pub struct Results(Vec<AgentResult>);

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: AgentResult) {
        self.0.push(result);
    }

    pub fn has_function_calls(&self) -> bool {
        self.0.iter().any(|r| r.as_function_call().is_some())
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.0.iter().filter_map(AgentResult::as_function_call)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<AgentResult>> for Results {
    fn from(results: Vec<AgentResult>) -> Self {
        Self(results)
    }
}

impl IntoIterator for Results {
    type Item = AgentResult;
    type IntoIter = std::vec::IntoIter<AgentResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_delta_text_matches_published_fragments() {
        let delta = DeltaStream::open("");
        let mut live = delta.subscribe();

        let mut seen = String::new();
        for fragment in ["The ", "answer ", "is 4"] {
            delta.push(fragment);
            seen.push_str(&live.next().await.unwrap());
            assert_eq!(delta.text(), seen);
        }

        delta.close();
        assert_eq!(live.next().await, None);
        assert_eq!(delta.fragments(), vec!["The ", "answer ", "is 4"]);
        assert_eq!(delta.fragments_from(2), vec!["is 4"]);
        assert!(delta.fragments_from(3).is_empty());
        assert!(delta.fragments_from(9).is_empty());
    }

    #[test]
    fn test_delta_initial_text() {
        assert!(DeltaStream::open("").fragments().is_empty());
        assert_eq!(DeltaStream::open("Hi").text(), "Hi");
    }

    #[test]
    fn test_closed_delta_ignores_fragments() {
        let delta = DeltaStream::open("done");
        delta.close();
        delta.push(" late");
        assert_eq!(delta.text(), "done");
        assert!(delta.is_closed());
    }

    #[test]
    fn test_display() {
        let call = AgentResult::FunctionCall(FunctionCall::new("c1", "search", r#"{"q":"rust"}"#));
        assert_eq!(call.to_string(), r#"FunctionToolCall: search args:{"q":"rust"}"#);
        assert_eq!(call.type_name(), "function_call");

        let err = AgentResult::Error(Error::Cancelled);
        assert_eq!(err.to_string(), "Error: Cancelled");
        assert!(err.is_error());

        assert_eq!(AgentResult::Reasoning("hmm".into()).type_name(), "think");
    }

    #[test]
    fn test_results_function_calls() {
        let results = Results::from(vec![
            AgentResult::Message("checking".into()),
            AgentResult::FunctionCall(FunctionCall::new("a", "first", "{}")),
            AgentResult::FunctionCall(FunctionCall::new("b", "second", "{}")),
        ]);

        assert!(results.has_function_calls());
        let names: Vec<&str> = results.function_calls().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(!Results::new().has_function_calls());
    }
}
