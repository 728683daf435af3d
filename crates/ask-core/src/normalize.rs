//! Turning a backend's native stream into normalized results.
//!
//! Each backend maps its own events onto the handful of operations on
//! [`DeltaTracker`]; the tracker owns the open segments and enforces the
//! ordering rules every consumer relies on:
//!
//! - at most one segment is open at a time; opening one closes the other,
//! - a new delta is emitted the moment its segment opens,
//! - a function call closes whatever is open before it is emitted,
//! - every delta is closed exactly once, even when the round fails,
//! - every segment yields exactly one complete result.

use tracing::trace;

use crate::error::Error;
use crate::provider::ResultSink;
use crate::result::{AgentResult, DeltaStream, FunctionCall, Results};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Message,
    Reasoning,
}

struct Segment {
    delta: DeltaStream,
    /// The backend already sent the final text.
    completed: bool,
}

/// Per-round normalization state.
///
/// A segment's complete result is the backend's final text when it sends
/// one ([`DeltaTracker::complete`]). Otherwise closing the segment, for
/// whatever reason, emits the accumulated text.
pub struct DeltaTracker {
    message: Option<Segment>,
    reasoning: Option<Segment>,
    results: Results,
}

impl Default for DeltaTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self {
            message: None,
            reasoning: None,
            results: Results::new(),
        }
    }

    pub fn is_open(&self, kind: SegmentKind) -> bool {
        self.slot(kind).is_some()
    }

    /// Start a segment of `kind`, closing anything already open.
    pub fn open(
        &mut self,
        kind: SegmentKind,
        initial: &str,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        self.close(other(kind), sink)?;
        self.close(kind, sink)?;

        let delta = DeltaStream::open(initial);
        *self.slot_mut(kind) = Some(Segment {
            delta: delta.clone(),
            completed: false,
        });
        let result = match kind {
            SegmentKind::Message => AgentResult::MessageDelta(delta),
            SegmentKind::Reasoning => AgentResult::ReasoningDelta(delta),
        };
        self.emit(result, sink)
    }

    /// Append a fragment to the open segment of `kind`.
    ///
    /// Never opens a segment: a fragment with nothing open is dropped.
    pub fn append(&mut self, kind: SegmentKind, fragment: &str) {
        match self.slot(kind) {
            Some(segment) => segment.delta.push(fragment),
            None => trace!(?kind, len = fragment.len(), "Fragment with no open segment"),
        }
    }

    /// Append to the open segment of `kind`, opening one if needed.
    pub fn write(
        &mut self,
        kind: SegmentKind,
        text: &str,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        if self.is_open(kind) {
            self.append(kind, text);
            Ok(())
        } else {
            self.open(kind, text, sink)
        }
    }

    /// End the segment of `kind`, if one is open, emitting its accumulated
    /// text unless the final text was already sent.
    pub fn close(&mut self, kind: SegmentKind, sink: &mut dyn ResultSink) -> Result<(), Error> {
        let Some(segment) = self.slot_mut(kind).take() else {
            return Ok(());
        };
        segment.delta.close();
        if segment.completed {
            return Ok(());
        }
        self.emit(complete_result(kind, segment.delta.text()), sink)
    }

    /// Emit the backend's final text for a segment.
    pub fn complete(
        &mut self,
        kind: SegmentKind,
        text: impl Into<String>,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        if let Some(segment) = self.slot_mut(kind).as_mut() {
            segment.completed = true;
        }
        self.emit(complete_result(kind, text.into()), sink)
    }

    pub fn function_call(
        &mut self,
        call: FunctionCall,
        sink: &mut dyn ResultSink,
    ) -> Result<(), Error> {
        self.close(SegmentKind::Message, sink)?;
        self.close(SegmentKind::Reasoning, sink)?;
        self.emit(AgentResult::FunctionCall(call), sink)
    }

    /// End of the native stream: anything still open is closed, message
    /// first.
    pub fn finish(&mut self, sink: &mut dyn ResultSink) -> Result<(), Error> {
        self.close(SegmentKind::Message, sink)?;
        self.close(SegmentKind::Reasoning, sink)
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn into_results(mut self) -> Results {
        std::mem::take(&mut self.results)
    }

    fn emit(&mut self, result: AgentResult, sink: &mut dyn ResultSink) -> Result<(), Error> {
        self.results.push(result.clone());
        if sink.emit(result) {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }

    fn slot(&self, kind: SegmentKind) -> Option<&Segment> {
        match kind {
            SegmentKind::Message => self.message.as_ref(),
            SegmentKind::Reasoning => self.reasoning.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: SegmentKind) -> &mut Option<Segment> {
        match kind {
            SegmentKind::Message => &mut self.message,
            SegmentKind::Reasoning => &mut self.reasoning,
        }
    }
}

impl Drop for DeltaTracker {
    fn drop(&mut self) {
        for segment in [self.message.take(), self.reasoning.take()].into_iter().flatten() {
            segment.delta.close();
        }
    }
}

fn other(kind: SegmentKind) -> SegmentKind {
    match kind {
        SegmentKind::Message => SegmentKind::Reasoning,
        SegmentKind::Reasoning => SegmentKind::Message,
    }
}

fn complete_result(kind: SegmentKind, text: String) -> AgentResult {
    match kind {
        SegmentKind::Message => AgentResult::Message(text),
        SegmentKind::Reasoning => AgentResult::Reasoning(text),
    }
}
