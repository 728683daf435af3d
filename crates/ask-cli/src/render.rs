//! Terminal rendering of agent results.

use std::io::{self, Write};

use futures::StreamExt;

use ask_core::{AgentResult, DeltaStream, Subscriber};

const BOLD_UNDERLINE: &str = "\x1b[1;4m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Writes results as labelled sections, e.g. `[Message]` followed by text.
///
/// In streaming mode deltas are printed fragment by fragment and the complete
/// results that follow them are skipped. Otherwise only complete results are
/// printed.
pub struct Renderer<W: Write> {
    out: W,
    stream: bool,
    color: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, stream: bool, color: bool) -> Self {
        Self { out, stream, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn question(&mut self, question: &str) -> io::Result<()> {
        self.header("Question")?;
        writeln!(self.out, "{}", question)?;
        writeln!(self.out)
    }

    pub async fn render(&mut self, result: &AgentResult) -> io::Result<()> {
        match (result, self.stream) {
            (AgentResult::MessageDelta(delta), true) => {
                self.header("Message")?;
                self.stream_delta(delta, false).await?;
            }
            (AgentResult::ReasoningDelta(delta), true) => {
                self.header("Reasoning")?;
                self.stream_delta(delta, true).await?;
            }
            (AgentResult::Message(text), false) => {
                self.header("Message")?;
                writeln!(self.out, "{}", text)?;
            }
            (AgentResult::Reasoning(text), false) => {
                self.header("Reasoning")?;
                self.dimmed(text)?;
                writeln!(self.out)?;
            }
            (AgentResult::FunctionCall(_), _) => {
                self.header("FunctionCall")?;
                self.dimmed(&result.to_string())?;
                writeln!(self.out)?;
            }
            _ => return Ok(()),
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Print fragments until the delta closes.
    ///
    /// The live subscription only signals progress; fragments are read back
    /// from the delta's history so a full live queue never loses text.
    async fn stream_delta(&mut self, delta: &DeltaStream, dim: bool) -> io::Result<()> {
        let mut live = delta.subscribe();
        let mut next = 0;
        if dim && self.color {
            write!(self.out, "{}", DIM)?;
        }
        loop {
            let more = live.next().await.is_some();
            let fresh = delta.fragments_from(next);
            next += fresh.len();
            for fragment in &fresh {
                write!(self.out, "{}", fragment)?;
            }
            self.out.flush()?;
            if !more {
                break;
            }
        }
        if dim && self.color {
            write!(self.out, "{}", RESET)?;
        }
        writeln!(self.out)
    }

    fn header(&mut self, label: &str) -> io::Result<()> {
        if self.color {
            writeln!(self.out, "{}[{}]{}", BOLD_UNDERLINE, label, RESET)
        } else {
            writeln!(self.out, "[{}]", label)
        }
    }

    fn dimmed(&mut self, text: &str) -> io::Result<()> {
        if self.color {
            write!(self.out, "{}{}{}", DIM, text, RESET)
        } else {
            write!(self.out, "{}", text)
        }
    }
}

/// Render every result of one answer.
///
/// Returns the answer's error, if it ended with one. A consumer slower than
/// the producer can miss the error on the live queue, so the channel's
/// history is checked once the stream ends.
pub async fn render_answer<W: Write>(
    renderer: &mut Renderer<W>,
    answer: &Subscriber<AgentResult>,
) -> anyhow::Result<Option<ask_core::Error>> {
    let mut results = answer.subscribe();
    while let Some(result) = results.next().await {
        if let AgentResult::Error(err) = result {
            return Ok(Some(err));
        }
        renderer.render(&result).await?;
    }
    match answer.history_at(-1) {
        Some(AgentResult::Error(err)) => Ok(Some(err)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ask_core::testing::{message_delta, reasoning_delta};
    use ask_core::{Error, FunctionCall};

    fn answer() -> Vec<AgentResult> {
        vec![
            reasoning_delta("Checking the forecast"),
            AgentResult::Reasoning("Checking the forecast".into()),
            AgentResult::FunctionCall(FunctionCall::new("c1", "getWeather", "{}")),
            message_delta("Take an umbrella."),
            AgentResult::Message("Take an umbrella.".into()),
        ]
    }

    fn closed_channel(results: Vec<AgentResult>) -> Subscriber<AgentResult> {
        let channel = Subscriber::new(100);
        for result in results {
            channel.publish(result);
        }
        channel.close();
        channel
    }

    async fn render_all(stream: bool, color: bool, results: Vec<AgentResult>) -> String {
        let mut renderer = Renderer::new(Vec::new(), stream, color);
        let outcome = render_answer(&mut renderer, &closed_channel(results))
            .await
            .unwrap();
        assert!(outcome.is_none());
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_mode_prints_deltas_once() {
        let output = render_all(true, false, answer()).await;
        assert_eq!(
            output,
            "[Reasoning]\nChecking the forecast\n\n\
             [FunctionCall]\nFunctionToolCall: getWeather args:{}\n\n\
             [Message]\nTake an umbrella.\n\n"
        );
    }

    #[tokio::test]
    async fn test_complete_mode_prints_full_results() {
        let output = render_all(false, false, answer()).await;
        assert_eq!(
            output,
            "[Reasoning]\nChecking the forecast\n\n\
             [FunctionCall]\nFunctionToolCall: getWeather args:{}\n\n\
             [Message]\nTake an umbrella.\n\n"
        );
    }

    #[tokio::test]
    async fn test_color_decoration() {
        let output = render_all(false, true, vec![AgentResult::Reasoning("hmm".into())]).await;
        assert_eq!(output, "\x1b[1;4m[Reasoning]\x1b[0m\n\x1b[2mhmm\x1b[0m\n\n");
    }

    #[tokio::test]
    async fn test_question_header() {
        let mut renderer = Renderer::new(Vec::new(), true, false);
        renderer.question("What is 2+2?").unwrap();
        assert_eq!(String::from_utf8(renderer.into_inner()).unwrap(), "[Question]\nWhat is 2+2?\n\n");
    }

    #[tokio::test]
    async fn test_error_stops_rendering() {
        let results = vec![
            AgentResult::Message("partial".into()),
            AgentResult::Error(Error::network("connection reset")),
            AgentResult::Message("never shown".into()),
        ];
        let mut renderer = Renderer::new(Vec::new(), false, false);
        let err = render_answer(&mut renderer, &closed_channel(results))
            .await
            .unwrap();

        assert_eq!(err, Some(Error::network("connection reset")));
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(output, "[Message]\npartial\n\n");
    }

    #[tokio::test]
    async fn test_renders_from_agent_channel() {
        let channel = closed_channel(vec![message_delta("4"), AgentResult::Message("4".into())]);

        let mut renderer = Renderer::new(Vec::new(), true, false);
        render_answer(&mut renderer, &channel).await.unwrap();
        assert_eq!(String::from_utf8(renderer.into_inner()).unwrap(), "[Message]\n4\n\n");
    }

    #[tokio::test]
    async fn test_error_missed_by_full_queue_is_reported() {
        let channel = Subscriber::new(1);
        assert!(channel.publish(AgentResult::Message("partial".into())));
        assert!(!channel.publish(AgentResult::Error(Error::network("connection reset"))));
        channel.close();

        let mut renderer = Renderer::new(Vec::new(), false, false);
        let err = render_answer(&mut renderer, &channel).await.unwrap();

        assert_eq!(err, Some(Error::network("connection reset")));
        assert_eq!(String::from_utf8(renderer.into_inner()).unwrap(), "[Message]\npartial\n\n");
    }
}
