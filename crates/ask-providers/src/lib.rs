//! ask-providers: backend implementations for ask
//!
//! Each provider speaks its backend's native streaming format over
//! server-sent events and normalizes it into `ask_core::AgentResult`s.

pub mod gemini;
pub mod openai;
mod sse;

pub use gemini::{GeminiProvider, GeminiTransport, HttpGeminiTransport};
pub use openai::{HttpResponsesTransport, OpenAIProvider, ResponsesTransport};
