//! OpenAI Responses API provider.
//!
//! Each round is one streaming `POST /responses`. Conversation state lives on
//! the server: after the first round every request names the previous
//! response id instead of resending history.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use ask_core::{
    run_tool_loop, DeltaTracker, Error, EventStream, FunctionCall, Provider,
    ProviderConfig, ReasoningEffort, ReasoningSummary, ResultSink, Results, RoundInput, RoundTrip,
    SegmentKind, Tool, DEVELOPER_DIRECTIVE, SYSTEM_DIRECTIVE,
};

use crate::sse::event_stream;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Sends a Responses request and yields the decoded stream events.
#[async_trait]
pub trait ResponsesTransport: Send + Sync {
    async fn stream(
        &self,
        request: &ResponsesRequest,
    ) -> Result<EventStream<ResponseStreamEvent>, Error>;
}

pub struct HttpResponsesTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpResponsesTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ResponsesTransport for HttpResponsesTransport {
    async fn stream(
        &self,
        request: &ResponsesRequest,
    ) -> Result<EventStream<ResponseStreamEvent>, Error> {
        trace!(request = %serde_json::to_string(request).unwrap_or_default(), "OpenAI request payload");

        let builder = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(request);

        event_stream(builder, "openai")
    }
}

pub struct OpenAIProvider {
    transport: Box<dyn ResponsesTransport>,
    config: ProviderConfig,
    tools: Vec<Tool>,
    previous_response_id: Option<String>,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_transport(HttpResponsesTransport::new(api_key))
    }

    pub fn with_transport(transport: impl ResponsesTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            config: ProviderConfig::new(DEFAULT_MODEL),
            tools: Vec::new(),
            previous_response_id: None,
        }
    }

    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Id of the last completed response, if any round has completed.
    pub fn previous_response_id(&self) -> Option<&str> {
        self.previous_response_id.as_deref()
    }

    fn build_request(&self, input: RoundInput, tools: &[Tool]) -> ResponsesRequest {
        let mut items = Vec::new();
        if self.previous_response_id.is_none() {
            items.push(InputItem::message("system", SYSTEM_DIRECTIVE));
        }

        match input {
            RoundInput::Question(question) => {
                if !question.is_empty() {
                    items.push(InputItem::message("user", question));
                }
                items.push(InputItem::message("developer", DEVELOPER_DIRECTIVE));
            }
            RoundInput::ToolOutputs(outputs) => {
                items.extend(outputs.into_iter().map(|o| InputItem::FunctionCallOutput {
                    call_id: o.call_id,
                    output: o.output,
                }));
            }
        }

        let summary = self
            .config
            .reasoning_summary
            .filter(|s| *s != ReasoningSummary::None);
        let reasoning = if summary.is_some() || self.config.reasoning_effort.is_some() {
            Some(ReasoningParams {
                summary,
                effort: self.config.reasoning_effort,
            })
        } else {
            None
        };

        ResponsesRequest {
            model: self.config.model.clone(),
            input: items,
            tools: tools.iter().map(ResponsesTool::from_tool).collect(),
            tool_choice: "auto",
            stream: true,
            reasoning,
            previous_response_id: self.previous_response_id.clone(),
        }
    }

    fn handle_event(
        &mut self,
        event: ResponseStreamEvent,
        tracker: &mut DeltaTracker,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        match event {
            ResponseStreamEvent::ContentPartAdded { part } => {
                tracker.open(SegmentKind::Message, part.text(), sink)?;
            }
            ResponseStreamEvent::OutputTextDelta { delta } => {
                tracker.append(SegmentKind::Message, &delta);
            }
            ResponseStreamEvent::ContentPartDone => {
                tracker.close(SegmentKind::Message, sink)?;
            }
            ResponseStreamEvent::OutputTextDone { text } => {
                tracker.complete(SegmentKind::Message, text, sink)?;
            }
            ResponseStreamEvent::ReasoningSummaryPartAdded { part } => {
                tracker.open(SegmentKind::Reasoning, part.text(), sink)?;
            }
            ResponseStreamEvent::ReasoningSummaryTextDelta { delta } => {
                tracker.append(SegmentKind::Reasoning, &delta);
            }
            ResponseStreamEvent::ReasoningSummaryPartDone => {
                tracker.close(SegmentKind::Reasoning, sink)?;
            }
            ResponseStreamEvent::ReasoningSummaryTextDone { text } => {
                tracker.complete(SegmentKind::Reasoning, text, sink)?;
            }
            ResponseStreamEvent::OutputItemDone { item } => {
                if let OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } = item
                {
                    debug!(name = %name, call_id = %call_id, "Function call requested");
                    tracker.function_call(FunctionCall::new(call_id, name, arguments), sink)?;
                }
            }
            ResponseStreamEvent::Completed { response } => {
                debug!(response_id = %response.id, "Response completed");
                self.previous_response_id = Some(response.id);
            }
            ResponseStreamEvent::Failed { response } => {
                let message = response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "response failed".to_string());
                warn!(error = %message, "Response failed");
                return Err(Error::stream(message));
            }
            ResponseStreamEvent::Error { message, code } => {
                warn!(error = %message, code = ?code, "Error event");
                return Err(Error::stream(message));
            }
            ResponseStreamEvent::Unknown => {
                trace!("Ignoring unhandled event");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RoundTrip for OpenAIProvider {
    async fn round(
        &mut self,
        input: RoundInput,
        tools: &[Tool],
        sink: &mut dyn ResultSink,
    ) -> Result<Results, Error> {
        let request = self.build_request(input, tools);
        debug!(
            model = %request.model,
            items = request.input.len(),
            tools = request.tools.len(),
            continued = request.previous_response_id.is_some(),
            "OpenAI stream request"
        );

        let mut events = self.transport.stream(&request).await?;
        let mut tracker = DeltaTracker::new();
        while let Some(event) = events.next().await {
            self.handle_event(event?, &mut tracker, sink)?;
        }
        tracker.finish(sink)?;

        let results = tracker.into_results();
        debug!(results = results.len(), "OpenAI round complete");
        Ok(results)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn process_message(
        &mut self,
        question: &str,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        let tools = self.tools.clone();
        run_tool_loop(self, &tools, question, sink).await
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

// ── Request types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ResponsesTool>,
    pub tool_choice: &'static str,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: String,
        content: Vec<InputContent>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

impl InputItem {
    fn message(role: &str, text: impl Into<String>) -> Self {
        InputItem::Message {
            role: role.to_string(),
            content: vec![InputContent::InputText { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    InputText { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ResponsesTool {
    fn from_tool(tool: &Tool) -> Self {
        Self {
            tool_type: "function",
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool
                .parameters
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReasoningSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
}

// ── Stream event types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEvent {
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded { part: EventPart },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone,
    #[serde(rename = "response.output_text.done")]
    OutputTextDone { text: String },
    #[serde(rename = "response.reasoning_summary_part.added")]
    ReasoningSummaryPartAdded { part: EventPart },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_part.done")]
    ReasoningSummaryPartDone,
    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone { text: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },
    #[serde(rename = "response.completed")]
    Completed { response: CompletedResponse },
    #[serde(rename = "response.failed")]
    Failed { response: FailedResponse },
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPart {
    #[serde(default)]
    pub text: Option<String>,
}

impl EventPart {
    fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletedResponse {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailedResponse {
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    pub message: String,
}

// ── Tests ────────────────────────────────────────────────────────────────────
