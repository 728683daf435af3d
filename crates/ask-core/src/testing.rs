//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Error;
use crate::provider::{
    Provider, ProviderConfig, ReasoningEffort, ReasoningSummary, ResultSink,
};
use crate::result::{AgentResult, DeltaStream, Results};
use crate::tool::Tool;
use crate::tool_loop::{run_tool_loop, RoundInput, RoundTrip};

/// A finished message delta carrying `text` as a single fragment.
pub fn message_delta(text: &str) -> AgentResult {
    let delta = DeltaStream::open(text);
    delta.close();
    AgentResult::MessageDelta(delta)
}

/// A finished reasoning delta carrying `text` as a single fragment.
pub fn reasoning_delta(text: &str) -> AgentResult {
    let delta = DeltaStream::open(text);
    delta.close();
    AgentResult::ReasoningDelta(delta)
}

/// Shared record of every input a scripted backend received.
#[derive(Debug, Clone, Default)]
pub struct RoundLog(Arc<Mutex<Vec<RoundInput>>>);

impl RoundLog {
    pub fn inputs(&self) -> Vec<RoundInput> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, input: RoundInput) {
        self.0.lock().unwrap().push(input);
    }
}

/// A backend that replays pre-configured rounds.
///
/// Each round emits its results to the sink in order, honouring
/// cancellation. Once the script runs out, rounds fail.
pub struct ScriptedRounds {
    script: VecDeque<Vec<AgentResult>>,
    exhausted: Option<Error>,
    log: RoundLog,
}

impl ScriptedRounds {
    pub fn new(script: Vec<Vec<AgentResult>>) -> Self {
        Self {
            script: script.into(),
            exhausted: None,
            log: RoundLog::default(),
        }
    }

    /// Error returned by rounds past the end of the script.
    pub fn with_error_after(mut self, error: Error) -> Self {
        self.exhausted = Some(error);
        self
    }

    pub fn inputs(&self) -> Vec<RoundInput> {
        self.log.inputs()
    }

    pub fn log(&self) -> RoundLog {
        self.log.clone()
    }
}

#[async_trait]
impl RoundTrip for ScriptedRounds {
    async fn round(
        &mut self,
        input: RoundInput,
        _tools: &[Tool],
        sink: &mut dyn ResultSink,
    ) -> Result<Results, Error> {
        self.log.push(input);
        let Some(round) = self.script.pop_front() else {
            return Err(self
                .exhausted
                .clone()
                .unwrap_or_else(|| Error::Unknown("No scripted round left".to_string())));
        };

        let mut results = Results::new();
        for result in round {
            results.push(result.clone());
            if !sink.emit(result) {
                return Err(Error::Cancelled);
            }
        }
        Ok(results)
    }
}

/// A provider driving [`ScriptedRounds`] through the real tool loop.
pub struct MockProvider {
    rounds: ScriptedRounds,
    tools: Vec<Tool>,
    config: ProviderConfig,
}

impl MockProvider {
    pub fn new(rounds: ScriptedRounds) -> Self {
        Self {
            rounds,
            tools: Vec::new(),
            config: ProviderConfig::new("mock-model"),
        }
    }

    pub fn log(&self) -> RoundLog {
        self.rounds.log()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn process_message(
        &mut self,
        question: &str,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        let tools = self.tools.clone();
        run_tool_loop(&mut self.rounds, &tools, question, sink).await
    }

    fn set_tools(&mut self, tools: Vec<Tool>) {
        self.tools = tools;
    }

    fn set_reasoning_summary(&mut self, summary: ReasoningSummary) {
        self.config.reasoning_summary = Some(summary);
    }

    fn set_reasoning_effort(&mut self, effort: ReasoningEffort) {
        self.config.reasoning_effort = Some(effort);
    }

    fn set_model(&mut self, model: String) {
        self.config.model = model;
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
