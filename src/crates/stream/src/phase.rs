//! Phase tracking for one streaming session
//!
//! Interprets decoded events in order and routes their text into the
//! reasoning or the answer channel of the accumulator.
//!
//! A `token` that arrives while reasoning is still open stays in the
//! reasoning channel: some backends omit `thinking_end`, and routing those
//! tokens to the answer would mix deliberation into the reply.

use crate::accumulator::MessageAccumulator;
use crate::errors::StreamResult;
use crate::sanitizer::{sanitize_final, sanitize_fragment};
use log::{debug, trace, warn};
use parley_core_types::{
    EventKind, FileRef, MessageChannel, MessageSnapshot, PhaseState, StreamEvent,
};
use tokio::time::Instant;

const DEFAULT_SERVER_ERROR: &str = "stream reported an error";

/// What the read loop should do after one event.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseStep {
    Continue,
    /// `done` received; the finalized message.
    Finished(MessageSnapshot),
    /// `error` received; the message was discarded.
    Failed(String),
}

#[derive(Debug)]
pub struct PhaseTracker {
    state: PhaseState,
    reasoning_started_at: Option<Instant>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            state: PhaseState::Idle,
            reasoning_started_at: None,
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    pub fn apply(
        &mut self,
        event: &StreamEvent,
        accumulator: &mut MessageAccumulator,
    ) -> StreamResult<PhaseStep> {
        if self.state.is_terminal() {
            trace!(
                "Ignoring event after terminal phase: phase={:?}, kind={}",
                self.state,
                event.kind
            );
            return Ok(PhaseStep::Continue);
        }

        match (self.state, event.kind) {
            (_, EventKind::Done) => return self.finish(accumulator).map(PhaseStep::Finished),
            (_, EventKind::Error) => {
                let message = server_error_message(event);
                self.fail(accumulator)?;
                return Ok(PhaseStep::Failed(message));
            }
            (_, EventKind::FileReady) => match parse_file_ref(event) {
                Some(file) => accumulator.attach_artifact(file)?,
                None => warn!("Ignoring file_ready event with unreadable payload"),
            },
            (_, EventKind::Heartbeat | EventKind::Status | EventKind::Unknown) => {
                trace!("Ignoring informational event: kind={}", event.kind);
            }

            (PhaseState::Idle, EventKind::ThinkingStart) => self.open_reasoning(accumulator)?,
            (PhaseState::Idle, EventKind::Token | EventKind::ResponseStart) => {
                self.state = PhaseState::Answering;
                append(accumulator, MessageChannel::Answer, &event.payload)?;
            }

            (PhaseState::Reasoning, EventKind::ThinkingToken | EventKind::Token) => {
                append(accumulator, MessageChannel::Reasoning, &event.payload)?;
            }
            (PhaseState::Reasoning, EventKind::ThinkingEnd | EventKind::ResponseStart) => {
                self.close_reasoning(accumulator)?;
                self.state = PhaseState::Answering;
            }

            (PhaseState::Answering, EventKind::Token) => {
                append(accumulator, MessageChannel::Answer, &event.payload)?;
            }

            (state, kind) => {
                debug!("Ignoring out-of-order event: phase={:?}, kind={}", state, kind);
            }
        }

        Ok(PhaseStep::Continue)
    }

    /// Finalize with the sanitized answer. Used for `done` and for end of input.
    pub fn finish(
        &mut self,
        accumulator: &mut MessageAccumulator,
    ) -> StreamResult<MessageSnapshot> {
        if self.state == PhaseState::Reasoning {
            self.close_reasoning(accumulator)?;
        }
        let answer = sanitize_final(accumulator.answer_text().unwrap_or_default());
        let message = accumulator.finalize(answer)?;
        self.state = PhaseState::Finished;
        Ok(message)
    }

    /// Protocol or transport failure: the partial message is dropped.
    pub fn fail(&mut self, accumulator: &mut MessageAccumulator) -> StreamResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        accumulator.discard()?;
        self.state = PhaseState::Failed;
        Ok(())
    }

    /// External cancellation. No-op once terminal.
    pub fn abort(&mut self, accumulator: &mut MessageAccumulator) -> StreamResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        accumulator.discard()?;
        self.state = PhaseState::Aborted;
        Ok(())
    }

    fn open_reasoning(&mut self, accumulator: &mut MessageAccumulator) -> StreamResult<()> {
        self.reasoning_started_at = Some(Instant::now());
        accumulator.set_reasoning_active(true, None)?;
        self.state = PhaseState::Reasoning;
        Ok(())
    }

    fn close_reasoning(&mut self, accumulator: &mut MessageAccumulator) -> StreamResult<()> {
        let elapsed_ms = self
            .reasoning_started_at
            .take()
            .map(|started| started.elapsed().as_millis() as u64);
        accumulator.set_reasoning_active(false, elapsed_ms)
    }
}

fn append(
    accumulator: &mut MessageAccumulator,
    channel: MessageChannel,
    text: &str,
) -> StreamResult<()> {
    accumulator.append(channel, &sanitize_fragment(text))
}

fn server_error_message(event: &StreamEvent) -> String {
    let message = event.payload.trim();
    if message.is_empty() {
        DEFAULT_SERVER_ERROR.to_string()
    } else {
        message.to_string()
    }
}

fn parse_file_ref(event: &StreamEvent) -> Option<FileRef> {
    if let Ok(file) = serde_json::from_str::<FileRef>(&event.payload) {
        return Some(file);
    }
    let metadata = event.metadata.clone()?;
    serde_json::from_value(serde_json::Value::Object(metadata)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StreamError;
    use crate::observer::NoopObserver;
    use std::sync::Arc;
    use std::time::Duration;

    fn event(kind: EventKind, payload: &str) -> StreamEvent {
        StreamEvent::new(kind, payload)
    }

    fn run(events: &[StreamEvent]) -> (PhaseTracker, MessageAccumulator, Vec<PhaseStep>) {
        let mut tracker = PhaseTracker::new();
        let mut acc = MessageAccumulator::new(Arc::new(NoopObserver));
        let steps = events
            .iter()
            .map(|e| tracker.apply(e, &mut acc).expect("event applies"))
            .collect();
        (tracker, acc, steps)
    }

    #[tokio::test(start_paused = true)]
    async fn reasoning_then_answer() {
        let mut tracker = PhaseTracker::new();
        let mut acc = MessageAccumulator::new(Arc::new(NoopObserver));

        tracker.apply(&event(EventKind::ThinkingStart, ""), &mut acc).unwrap();
        assert_eq!(tracker.state(), PhaseState::Reasoning);
        assert!(acc.snapshot().reasoning_active);

        tracker
            .apply(&event(EventKind::ThinkingToken, "Let me check"), &mut acc)
            .unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        tracker.apply(&event(EventKind::ThinkingEnd, ""), &mut acc).unwrap();
        assert_eq!(tracker.state(), PhaseState::Answering);

        let live = acc.snapshot();
        assert!(!live.reasoning_active);
        assert_eq!(live.reasoning_elapsed_ms, Some(1500));

        tracker.apply(&event(EventKind::Token, "Hello"), &mut acc).unwrap();
        tracker.apply(&event(EventKind::Token, " world"), &mut acc).unwrap();
        let step = tracker.apply(&event(EventKind::Done, ""), &mut acc).unwrap();

        let PhaseStep::Finished(message) = step else {
            panic!("expected finished step, got {:?}", step);
        };
        assert_eq!(message.reasoning_text, "Let me check");
        assert_eq!(message.answer_text, "Hello world");
        assert!(!message.is_open);
        assert_eq!(tracker.state(), PhaseState::Finished);
    }

    #[tokio::test]
    async fn token_without_thinking_end_stays_in_reasoning() {
        let (tracker, acc, _) = run(&[
            event(EventKind::ThinkingStart, ""),
            event(EventKind::ThinkingToken, "step one. "),
            event(EventKind::Token, "step two"),
        ]);
        assert_eq!(tracker.state(), PhaseState::Reasoning);
        let snapshot = acc.snapshot();
        assert_eq!(snapshot.reasoning_text, "step one. step two");
        assert_eq!(snapshot.answer_text, "");
    }

    #[tokio::test]
    async fn done_while_reasoning_closes_reasoning_first() {
        let (tracker, _, steps) = run(&[
            event(EventKind::ThinkingStart, ""),
            event(EventKind::ThinkingToken, "hmm"),
            event(EventKind::Done, ""),
        ]);
        assert_eq!(tracker.state(), PhaseState::Finished);
        let Some(PhaseStep::Finished(message)) = steps.last() else {
            panic!("expected finished step");
        };
        assert!(!message.reasoning_active);
        assert!(message.reasoning_elapsed_ms.is_some());
        assert_eq!(message.answer_text, "");
    }

    #[tokio::test]
    async fn answer_only_session_never_touches_reasoning() {
        let (_, _, steps) = run(&[
            event(EventKind::Status, "warming up"),
            event(EventKind::ResponseStart, ""),
            event(EventKind::Token, "Hi"),
            event(EventKind::Heartbeat, ""),
            event(EventKind::ThinkingEnd, ""),
            event(EventKind::ResponseEnd, ""),
            event(EventKind::Done, ""),
        ]);
        let Some(PhaseStep::Finished(message)) = steps.last() else {
            panic!("expected finished step");
        };
        assert_eq!(message.reasoning_text, "");
        assert!(!message.reasoning_active);
        assert!(message.reasoning_elapsed_ms.is_none());
        assert_eq!(message.answer_text, "Hi");
    }

    #[tokio::test]
    async fn control_marker_token_contributes_nothing() {
        let (tracker, acc, _) = run(&[
            event(EventKind::Token, "Hi"),
            event(EventKind::Token, "<|im_end|>"),
        ]);
        assert_eq!(tracker.state(), PhaseState::Answering);
        assert_eq!(acc.snapshot().answer_text, "Hi");
    }

    #[tokio::test]
    async fn final_answer_is_sanitized() {
        let (_, _, steps) = run(&[
            event(EventKind::Token, "  Hello"),
            event(EventKind::Token, "\n\n\n\nthere /en"),
            event(EventKind::Done, ""),
        ]);
        let Some(PhaseStep::Finished(message)) = steps.last() else {
            panic!("expected finished step");
        };
        assert_eq!(message.answer_text, "Hello\n\nthere");
    }

    #[tokio::test]
    async fn error_discards_partial_message() {
        let (tracker, mut acc, steps) = run(&[
            event(EventKind::Token, "partial"),
            event(EventKind::Error, "boom"),
        ]);
        assert_eq!(steps.last(), Some(&PhaseStep::Failed("boom".to_string())));
        assert_eq!(tracker.state(), PhaseState::Failed);
        assert!(!acc.is_open());
        assert!(matches!(
            acc.append(MessageChannel::Answer, "late"),
            Err(StreamError::ClosedSession)
        ));
    }

    #[tokio::test]
    async fn empty_error_payload_gets_default_message() {
        let (_, _, steps) = run(&[event(EventKind::Error, "  ")]);
        assert_eq!(
            steps.last(),
            Some(&PhaseStep::Failed(DEFAULT_SERVER_ERROR.to_string()))
        );
    }

    #[tokio::test]
    async fn events_after_terminal_state_are_ignored() {
        let (tracker, _, steps) = run(&[
            event(EventKind::Done, ""),
            event(EventKind::Token, "late"),
            event(EventKind::Error, "late"),
        ]);
        assert_eq!(tracker.state(), PhaseState::Finished);
        assert_eq!(steps[1], PhaseStep::Continue);
        assert_eq!(steps[2], PhaseStep::Continue);
    }

    #[tokio::test]
    async fn unknown_events_leave_phase_and_message_untouched() {
        let (tracker, acc, steps) = run(&[
            event(EventKind::Token, "a"),
            event(EventKind::from_wire("citation_added"), "ref-1"),
            event(EventKind::Token, "b"),
        ]);
        assert_eq!(tracker.state(), PhaseState::Answering);
        assert_eq!(steps[1], PhaseStep::Continue);
        assert_eq!(acc.snapshot().answer_text, "ab");
    }

    #[tokio::test]
    async fn file_ready_attaches_artifact_from_payload_or_metadata() {
        let (_, acc, _) = run(&[event(
            EventKind::FileReady,
            r#"{"file_id":"f-1","filename":"out.pdf","mime_type":"application/pdf"}"#,
        )]);
        let file = acc.snapshot().attached_artifact.expect("artifact attached");
        assert_eq!(file.id, "f-1");
        assert_eq!(file.mime_type.as_deref(), Some("application/pdf"));

        let mut metadata = serde_json::Map::new();
        metadata.insert("id".to_string(), serde_json::json!("f-2"));
        metadata.insert("name".to_string(), serde_json::json!("chart.png"));
        let (tracker, acc, _) = run(&[
            event(EventKind::Token, "see file"),
            event(EventKind::FileReady, "chart ready").with_metadata(metadata),
        ]);
        assert_eq!(tracker.state(), PhaseState::Answering);
        assert_eq!(acc.snapshot().attached_artifact.map(|f| f.id), Some("f-2".to_string()));
    }

    #[tokio::test]
    async fn unreadable_file_ready_is_ignored() {
        let (tracker, acc, _) = run(&[event(EventKind::FileReady, "not a file")]);
        assert_eq!(tracker.state(), PhaseState::Idle);
        assert!(acc.snapshot().attached_artifact.is_none());
    }

    #[tokio::test]
    async fn reasoning_stays_empty_without_thinking_start() {
        let (tracker, _, steps) = run(&[
            event(EventKind::ThinkingToken, "stray"),
            event(EventKind::ThinkingEnd, ""),
            event(EventKind::Token, "answer"),
            event(EventKind::ThinkingToken, "late"),
            event(EventKind::Done, ""),
        ]);
        assert_eq!(tracker.state(), PhaseState::Finished);
        let Some(PhaseStep::Finished(message)) = steps.last() else {
            panic!("expected finished step");
        };
        assert_eq!(message.reasoning_text, "");
        assert!(!message.reasoning_active);
        assert_eq!(message.answer_text, "answer");
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_respects_terminal_state() {
        let mut tracker = PhaseTracker::new();
        let mut acc = MessageAccumulator::new(Arc::new(NoopObserver));
        tracker.apply(&event(EventKind::ThinkingStart, ""), &mut acc).unwrap();
        tracker.abort(&mut acc).unwrap();
        tracker.abort(&mut acc).unwrap();
        assert_eq!(tracker.state(), PhaseState::Aborted);
        assert!(!acc.is_open());

        let (mut tracker, mut acc, _) = run(&[event(EventKind::Done, "")]);
        tracker.abort(&mut acc).unwrap();
        assert_eq!(tracker.state(), PhaseState::Finished);
    }
}
