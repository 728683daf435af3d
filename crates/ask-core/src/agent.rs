use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::provider::{Provider, ProviderConfig, ReasoningEffort, ReasoningSummary};
use crate::result::AgentResult;
use crate::subscriber::Subscriber;
use crate::tool::Tool;

/// Live queue capacity of the result channel returned by [`Agent::ask`].
pub const RESULT_QUEUE_CAPACITY: usize = 100;

/// Entry point for asking questions of one provider.
///
/// Cloning an agent shares the provider. Questions asked while another is
/// still running wait for it to finish.
#[derive(Clone)]
pub struct Agent {
    provider: Arc<Mutex<Box<dyn Provider>>>,
}

impl Agent {
    pub fn new(provider: impl Provider + 'static) -> Self {
        Self::from_boxed(Box::new(provider))
    }

    pub fn from_boxed(provider: Box<dyn Provider>) -> Self {
        Self {
            provider: Arc::new(Mutex::new(provider)),
        }
    }

    pub fn builder(provider: impl Provider + 'static) -> AgentBuilder {
        AgentBuilder {
            provider: Box::new(provider),
        }
    }

    pub async fn set_tools(&self, tools: Vec<Tool>) {
        self.provider.lock().await.set_tools(tools);
    }

    pub async fn set_model(&self, model: impl Into<String>) {
        self.provider.lock().await.set_model(model.into());
    }

    pub async fn set_reasoning_summary(&self, summary: ReasoningSummary) {
        self.provider.lock().await.set_reasoning_summary(summary);
    }

    pub async fn set_reasoning_effort(&self, effort: ReasoningEffort) {
        self.provider.lock().await.set_reasoning_effort(effort);
    }

    pub async fn config(&self) -> ProviderConfig {
        self.provider.lock().await.config().clone()
    }

    pub async fn provider_name(&self) -> String {
        self.provider.lock().await.name().to_string()
    }

    /// Ask a question. Results arrive on the returned channel while the
    /// answer is generated on a spawned task.
    ///
    /// The channel is closed once the answer is complete. A failure shows up
    /// as a final [`AgentResult::Error`]. Dropping the subscription stops
    /// generation at the next result.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn ask(&self, question: impl Into<String>) -> Subscriber<AgentResult> {
        let channel = Subscriber::new(RESULT_QUEUE_CAPACITY);
        let producer = channel.clone();
        let provider = Arc::clone(&self.provider);
        let question = question.into();

        tokio::spawn(async move {
            let _guard = CloseGuard(producer.clone());
            let mut provider = provider.lock().await;
            debug!(provider = provider.name(), len = question.len(), "Asking");

            let sink_channel = producer.clone();
            let mut sink = move |result: AgentResult| sink_channel.deliver(result).is_accepted();

            match provider.process_message(&question, &mut sink).await {
                Ok(()) => debug!("Answer complete"),
                Err(e) if e.is_cancelled() => debug!("Answer cancelled by consumer"),
                Err(e) => {
                    warn!(error = %e, "Answer failed");
                    producer.publish(AgentResult::Error(e));
                }
            }
        });

        channel
    }
}

/// Closes the result channel however the producer task ends, panics included.
struct CloseGuard(Subscriber<AgentResult>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub struct AgentBuilder {
    provider: Box<dyn Provider>,
}

impl AgentBuilder {
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.provider.set_tools(tools);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.provider.set_model(model.into());
        self
    }

    pub fn with_reasoning_summary(mut self, summary: ReasoningSummary) -> Self {
        self.provider.set_reasoning_summary(summary);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.provider.set_reasoning_effort(effort);
        self
    }

    pub fn build(self) -> Agent {
        Agent::from_boxed(self.provider)
    }
}
