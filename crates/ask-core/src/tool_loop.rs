//! Multi-round tool calling on top of any backend.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::blocking::run_blocking;
use crate::error::Error;
use crate::provider::ResultSink;
use crate::result::Results;
use crate::tool::{FunctionCallInput, Tool, ToolOutput};

/// What a round sends to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundInput {
    /// Fresh user text. Only the first round of a question carries one.
    Question(String),
    /// Outputs for the previous round's function calls.
    ToolOutputs(Vec<ToolOutput>),
}

/// One request/response exchange with a backend.
#[async_trait]
pub trait RoundTrip: Send {
    /// Send `input`, normalize the streamed reply into `sink`, and return
    /// everything the round produced.
    async fn round(
        &mut self,
        input: RoundInput,
        tools: &[Tool],
        sink: &mut dyn ResultSink,
    ) -> Result<Results, Error>;
}

/// Ask `question`, then keep answering function calls until a round
/// produces none.
///
/// There is no bound on the number of rounds: the loop ends when the model
/// stops calling tools, or on the first error or cancellation.
pub async fn run_tool_loop<R>(
    backend: &mut R,
    tools: &[Tool],
    question: &str,
    sink: &mut dyn ResultSink,
) -> Result<(), Error>
where
    R: RoundTrip + ?Sized,
{
    let mut round = 1usize;
    debug!(round, tools = tools.len(), "Submitting question");
    let mut results = backend
        .round(RoundInput::Question(question.to_string()), tools, sink)
        .await?;

    while results.has_function_calls() {
        let calls = FunctionCallInput::from_results(&results);
        let outputs = execute_function_calls(tools, &calls).await?;

        round += 1;
        debug!(round, outputs = outputs.len(), "Submitting tool outputs");
        results = backend
            .round(RoundInput::ToolOutputs(outputs), tools, sink)
            .await?;
    }

    debug!(rounds = round, "Tool loop finished");
    Ok(())
}

/// Run each call's tool in order, one at a time.
///
/// The first registered tool with a matching name wins; a call naming no
/// known tool gets an empty output.
pub async fn execute_function_calls(
    tools: &[Tool],
    calls: &FunctionCallInput,
) -> Result<Vec<ToolOutput>, Error> {
    let names: Vec<&str> = calls.iter().map(|c| c.function_name.as_str()).collect();
    debug!(count = calls.len(), tools = ?names, "Executing function calls");

    let mut outputs = Vec::with_capacity(calls.len());
    for call in calls.iter() {
        let output = match tools.iter().find(|t| t.name == call.function_name) {
            Some(tool) => {
                let function = tool.function();
                let arguments = call.arguments.clone();
                run_blocking(move || function(&arguments)).await?
            }
            None => {
                debug!(name = %call.function_name, "No tool registered under this name");
                String::new()
            }
        };
        trace!(name = %call.function_name, call_id = %call.call_id, len = output.len(), "Tool returned");
        outputs.push(ToolOutput::new(
            call.call_id.clone(),
            call.function_name.clone(),
            output,
        ));
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{AgentResult, FunctionCall};
    use crate::testing::ScriptedRounds;
    use crate::tool::FunctionCallEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn call_round(name: &str, args: &str) -> Vec<AgentResult> {
        vec![AgentResult::FunctionCall(FunctionCall::new("id", name, args))]
    }

    #[tokio::test]
    async fn test_loop_runs_until_no_function_calls() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&invocations);
        let tools = vec![Tool::new("lookup", "Look something up", move |args: &str| {
            seen.lock().unwrap().push(args.to_string());
            "found".to_string()
        })];

        let mut backend = ScriptedRounds::new(vec![
            call_round("lookup", r#"{"n":1}"#),
            call_round("lookup", r#"{"n":2}"#),
            call_round("lookup", r#"{"n":3}"#),
            vec![AgentResult::Message("done".into())],
        ]);
        let mut sink = |_r: AgentResult| true;

        run_tool_loop(&mut backend, &tools, "go", &mut sink).await.unwrap();

        let inputs = backend.inputs();
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[0], RoundInput::Question("go".into()));
        assert_eq!(
            inputs[1],
            RoundInput::ToolOutputs(vec![ToolOutput::new("id", "lookup", "found")])
        );
        assert_eq!(
            *invocations.lock().unwrap(),
            vec![r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":3}"#]
        );
    }

    #[tokio::test]
    async fn test_outputs_keep_call_order() {
        let tools = vec![
            Tool::new("slow", "", |_: &str| {
                std::thread::sleep(Duration::from_millis(30));
                "A".to_string()
            }),
            Tool::new("fast", "", |_: &str| "B".to_string()),
        ];
        let calls = FunctionCallInput(vec![
            FunctionCallEntry {
                call_id: "1".into(),
                function_name: "slow".into(),
                arguments: "{}".into(),
            },
            FunctionCallEntry {
                call_id: "2".into(),
                function_name: "fast".into(),
                arguments: "{}".into(),
            },
        ]);

        let outputs = execute_function_calls(&tools, &calls).await.unwrap();
        let texts: Vec<&str> = outputs.iter().map(|o| o.output.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
        assert_eq!(outputs[0].call_id, "1");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_duplicate_names() {
        let first_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&first_hits);
        let tools = vec![
            Tool::new("dup", "", move |_: &str| {
                hits.fetch_add(1, Ordering::SeqCst);
                "first".to_string()
            }),
            Tool::new("dup", "", |_: &str| "second".to_string()),
        ];
        let calls = FunctionCallInput(vec![
            FunctionCallEntry {
                call_id: String::new(),
                function_name: "dup".into(),
                arguments: "{}".into(),
            },
            FunctionCallEntry {
                call_id: String::new(),
                function_name: "missing".into(),
                arguments: "{}".into(),
            },
        ]);

        let outputs = execute_function_calls(&tools, &calls).await.unwrap();
        assert_eq!(outputs[0].output, "first");
        assert_eq!(outputs[1].output, "");
        assert_eq!(outputs[1].name, "missing");
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_round_error_ends_loop() {
        let mut backend = ScriptedRounds::new(vec![call_round("lookup", "{}")])
            .with_error_after(Error::network("connection reset"));
        let tools = vec![Tool::new("lookup", "", |_: &str| "x".to_string())];
        let mut sink = |_r: AgentResult| true;

        let err = run_tool_loop(&mut backend, &tools, "q", &mut sink)
            .await
            .unwrap_err();
        assert_eq!(err, Error::network("connection reset"));
        assert_eq!(backend.inputs().len(), 2);
    }
}
