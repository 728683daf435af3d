//! Google Gemini provider.
//!
//! Gemini has no server-side conversation state, so the provider keeps the
//! chat history itself and resends it with every `streamGenerateContent`
//! request. Thoughts are streamed as reasoning but never written back into
//! history.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use ask_core::{
    run_tool_loop, DeltaTracker, Error, EventStream, FunctionCall, PropertySchema,
    Provider, ProviderConfig, ReasoningEffort, ReasoningSummary, ResultSink, Results, RoundInput,
    RoundTrip, SegmentKind, Tool, ToolOutput, ToolParameters, SYSTEM_DIRECTIVE,
};

use crate::sse::event_stream;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Sends a generate request and yields each streamed response chunk.
#[async_trait]
pub trait GeminiTransport: Send + Sync {
    async fn stream(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<EventStream<GenerateContentResponse>, Error>;
}

pub struct HttpGeminiTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpGeminiTransport {
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
impl GeminiTransport for HttpGeminiTransport {
    async fn stream(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<EventStream<GenerateContentResponse>, Error> {
        trace!(request = %serde_json::to_string(request).unwrap_or_default(), "Gemini request payload");

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, self.api_key
        );
        let builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request);

        event_stream(builder, "gemini")
    }
}

pub struct GeminiProvider {
    transport: Box<dyn GeminiTransport>,
    config: ProviderConfig,
    tools: Vec<Tool>,
    history: Vec<Content>,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_transport(HttpGeminiTransport::new(api_key))
    }

    pub fn with_transport(transport: impl GeminiTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            config: ProviderConfig::new(DEFAULT_MODEL).with_temperature(DEFAULT_TEMPERATURE),
            tools: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Turns sent and received so far, oldest first.
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    fn build_request(&self, turn: &Content, tools: &[Tool]) -> GenerateContentRequest {
        let mut contents = self.history.clone();
        contents.push(turn.clone());

        let tools = if tools.is_empty() {
            None
        } else {
            Some(vec![ToolsEntry {
                function_declarations: tools.iter().map(FunctionDeclaration::from_tool).collect(),
            }])
        };

        let thinking_config = (self.config.include_thoughts || self.config.thinking_budget.is_some())
            .then(|| ThinkingConfig {
                include_thoughts: self.config.include_thoughts,
                thinking_budget: self.config.thinking_budget,
            });

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(SYSTEM_DIRECTIVE)],
            }),
            tools,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                thinking_config,
            },
        }
    }

    fn handle_response(
        &self,
        response: GenerateContentResponse,
        tracker: &mut DeltaTracker,
        model_parts: &mut Vec<Part>,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        if let Some(err) = response.error {
            warn!(code = err.code, error = %err.message, "Gemini error payload");
            return Err(Error::from_status(err.code, err.message));
        }

        let Some(candidates) = response.candidates else {
            if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
                warn!(reason = %reason, "Prompt blocked");
                return Err(Error::api(400, format!("Blocked by safety filter: {}", reason)));
            }
            return Ok(());
        };

        for candidate in candidates {
            if let Some(reason) = &candidate.finish_reason {
                debug!(finish_reason = %reason, "Gemini candidate finished");
            }
            let Some(content) = candidate.content else {
                continue;
            };

            for part in content.parts {
                if let Some(call) = &part.function_call {
                    let arguments = if call.args.is_null() {
                        "{}".to_string()
                    } else {
                        serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string())
                    };
                    debug!(name = %call.name, "Function call requested");
                    tracker.function_call(
                        FunctionCall::new(call.id.clone().unwrap_or_default(), call.name.clone(), arguments),
                        sink,
                    )?;
                    model_parts.push(part);
                    continue;
                }

                let text = match part.text.as_deref() {
                    Some(text) if !text.is_empty() => text,
                    _ => continue,
                };

                if part.thought.unwrap_or(false) {
                    tracker.write(SegmentKind::Reasoning, text, sink)?;
                } else {
                    tracker.write(SegmentKind::Message, text, sink)?;
                    push_text(model_parts, part);
                }
            }
        }
        Ok(())
    }
}

/// Append a text part to the model turn, merging consecutive text runs.
fn push_text(parts: &mut Vec<Part>, part: Part) {
    if let Some(last) = parts.last_mut() {
        if last.is_plain_text() {
            if let (Some(existing), Some(more)) = (last.text.as_mut(), part.text.as_deref()) {
                existing.push_str(more);
                if last.thought_signature.is_none() {
                    last.thought_signature = part.thought_signature;
                }
                return;
            }
        }
    }
    parts.push(Part {
        thought: None,
        ..part
    });
}

fn tool_output_part(output: ToolOutput) -> Part {
    let response = match serde_json::from_str::<Value>(&output.output) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ "result": output.output }),
    };
    Part {
        function_response: Some(FunctionResponsePart {
            name: output.name,
            id: (!output.call_id.is_empty()).then_some(output.call_id),
            response,
        }),
        ..Part::default()
    }
}

#[async_trait]
impl RoundTrip for GeminiProvider {
    async fn round(
        &mut self,
        input: RoundInput,
        tools: &[Tool],
        sink: &mut dyn ResultSink,
    ) -> Result<Results, Error> {
        let turn = match input {
            RoundInput::Question(question) => Content::user(vec![Part::text(question)]),
            RoundInput::ToolOutputs(outputs) => {
                Content::user(outputs.into_iter().map(tool_output_part).collect())
            }
        };

        let request = self.build_request(&turn, tools);
        debug!(
            model = %self.config.model,
            contents = request.contents.len(),
            has_tools = request.tools.is_some(),
            "Gemini stream request"
        );

        let mut responses = self.transport.stream(&self.config.model, &request).await?;
        let mut tracker = DeltaTracker::new();
        let mut model_parts = Vec::new();
        while let Some(response) = responses.next().await {
            self.handle_response(response?, &mut tracker, &mut model_parts, sink)?;
        }
        tracker.finish(sink)?;

        self.history.push(turn);
        if !model_parts.is_empty() {
            self.history.push(Content {
                role: Some("model".to_string()),
                parts: model_parts,
            });
        }

        let results = tracker.into_results();
        debug!(results = results.len(), history = self.history.len(), "Gemini round complete");
        Ok(results)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
        self.config.include_thoughts = summary != ReasoningSummary::None;
    }

    fn set_reasoning_effort(&mut self, effort: ReasoningEffort) {
        self.config.reasoning_effort = Some(effort);
        self.config.thinking_budget = Some(thinking_budget(effort));
    }

    fn set_model(&mut self, model: String) {
        self.config.model = model;
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Thinking token budget for an effort level; `-1` lets the model decide.
pub fn thinking_budget(effort: ReasoningEffort) -> i32 {
    match effort {
        ReasoningEffort::None => 0,
        ReasoningEffort::Minimal => 512,
        ReasoningEffort::Low => 1024,
        ReasoningEffort::Medium => 8192,
        ReasoningEffort::High => 24576,
        ReasoningEffort::XHigh => -1,
    }
}

// ── Schema conversion ────────────────────────────────────────────────────────

/// Gemini spells JSON Schema types in upper case.
fn gemini_type(schema_type: &str) -> String {
    schema_type.to_ascii_uppercase()
}

fn parameters_schema(params: &ToolParameters) -> Value {
    let mut schema = serde_json::json!({
        "type": gemini_type(&params.schema_type),
        "properties": properties_schema(&params.properties),
    });
    if !params.required.is_empty() {
        schema["required"] = serde_json::json!(params.required);
    }
    schema
}

fn properties_schema(properties: &HashMap<String, PropertySchema>) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|(name, prop)| (name.clone(), property_schema(prop)))
            .collect(),
    )
}

fn property_schema(prop: &PropertySchema) -> Value {
    let mut schema = serde_json::json!({ "type": gemini_type(&prop.schema_type) });
    if let Some(description) = &prop.description {
        schema["description"] = serde_json::json!(description);
    }
    if let Some(values) = &prop.enum_values {
        schema["enum"] = serde_json::json!(values);
    }
    if let Some(items) = &prop.items {
        schema["items"] = property_schema(items);
    }
    if let Some(properties) = &prop.properties {
        schema["properties"] = properties_schema(properties);
    }
    schema
}

// ── Gemini API types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolsEntry>>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponsePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    fn is_plain_text(&self) -> bool {
        self.text.is_some()
            && !self.thought.unwrap_or(false)
            && self.function_call.is_none()
            && self.function_response.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallPart {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponsePart {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsEntry {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl FunctionDeclaration {
    fn from_tool(tool: &Tool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.as_ref().map(parameters_schema),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub include_thoughts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    pub message: String,
}

// ── Tests ────────────────────────────────────────────────────────────────────
