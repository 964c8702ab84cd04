//! Stream session controller
//!
//! Drives one request/response lifecycle per conversation: opens the
//! transport, feeds chunks through the decoder and the phase tracker, and
//! reports exactly one terminal outcome.
//!
//! The read loop suspends only while waiting for the next chunk; each chunk is
//! processed to completion before the next wait, so observers always see a
//! consistent phase/message pair. Cancellation is cooperative and takes effect
//! at that suspension point.

use crate::accumulator::MessageAccumulator;
use crate::config::StreamConfig;
use crate::decoder::FrameDecoder;
use crate::errors::{StreamError, StreamResult};
use crate::observer::SessionObserver;
use crate::phase::{PhaseStep, PhaseTracker};
use crate::transport::{AuthProvider, TransportOpener, TransportRequest};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use log::{debug, warn};
use parley_core_types::{MessageSnapshot, PhaseState, StreamOptions, StreamRequest};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Handle of the open session of one conversation.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub cancel_token: CancellationToken,
    pub started_at_ms: i64,
    phase: watch::Receiver<PhaseState>,
}

impl SessionHandle {
    pub fn phase(&self) -> PhaseState {
        *self.phase.borrow()
    }
}

/// Non-error end of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(MessageSnapshot),
    /// Cancelled by the user. The partial message was discarded.
    Aborted,
}

/// Mutable state of one running session, owned by the read loop.
struct SessionRun {
    tracker: PhaseTracker,
    accumulator: MessageAccumulator,
    phase_tx: watch::Sender<PhaseState>,
}

impl SessionRun {
    fn publish_phase(&self) {
        self.phase_tx.send_replace(self.tracker.state());
    }

    fn abort(&mut self) -> StreamResult<SessionOutcome> {
        self.tracker.abort(&mut self.accumulator)?;
        Ok(SessionOutcome::Aborted)
    }
}

/// An open session between the busy check and its terminal report.
///
/// Owns the conversation's map entry and the observer. If it is dropped
/// before `report` (the `start` future was dropped mid-stream) the session
/// is aborted, so the observer still sees exactly one terminal callback.
struct OpenSession<'a> {
    sessions: &'a DashMap<String, SessionHandle>,
    conversation_id: String,
    session_id: String,
    observer: Arc<dyn SessionObserver>,
    run: SessionRun,
    reported: bool,
}

impl OpenSession<'_> {
    fn release(&self) {
        self.sessions
            .remove_if(&self.conversation_id, |_, handle| handle.session_id == self.session_id);
    }

    /// Settle the phase, free the conversation, then fire the terminal callback.
    fn report(&mut self, result: &StreamResult<SessionOutcome>, elapsed_ms: i64) {
        if result.is_err() {
            if let Err(e) = self.run.tracker.fail(&mut self.run.accumulator) {
                warn!("Failed to discard in-flight message: error={}", e);
            }
        }
        self.run.publish_phase();
        self.release();
        self.reported = true;

        match result {
            Ok(SessionOutcome::Completed(message)) => {
                debug!(
                    "Stream session finished: conversation_id={}, answer_chars={}, elapsed_ms={}",
                    self.conversation_id,
                    message.answer_text.chars().count(),
                    elapsed_ms
                );
                self.observer.on_finalized(message);
            }
            Ok(SessionOutcome::Aborted) => {
                debug!(
                    "Stream session aborted: conversation_id={}, elapsed_ms={}",
                    self.conversation_id, elapsed_ms
                );
                self.observer.on_aborted();
            }
            Err(e) => {
                warn!(
                    "Stream session failed: conversation_id={}, error={}",
                    self.conversation_id, e
                );
                self.observer.on_failed(e);
            }
        }
    }
}

impl Drop for OpenSession<'_> {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        debug!(
            "Stream session dropped before completion: conversation_id={}, session_id={}",
            self.conversation_id, self.session_id
        );
        if let Err(e) = self.run.abort() {
            warn!("Failed to discard in-flight message: error={}", e);
        }
        self.run.publish_phase();
        self.release();
        self.reported = true;
        self.observer.on_aborted();
    }
}

pub struct StreamSessionController {
    config: StreamConfig,
    transport: Arc<dyn TransportOpener>,
    auth: Arc<dyn AuthProvider>,
    sessions: DashMap<String, SessionHandle>,
}

impl StreamSessionController {
    pub fn new(
        config: StreamConfig,
        transport: Arc<dyn TransportOpener>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            config,
            transport,
            auth,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_busy(&self, conversation_id: &str) -> bool {
        self.sessions.contains_key(conversation_id)
    }

    /// Phase of the open session, `None` when nothing is streaming.
    pub fn phase(&self, conversation_id: &str) -> Option<PhaseState> {
        self.sessions.get(conversation_id).map(|handle| handle.phase())
    }

    pub fn handle(&self, conversation_id: &str) -> Option<SessionHandle> {
        self.sessions.get(conversation_id).map(|handle| handle.clone())
    }

    /// Request cancellation of the conversation's open session.
    ///
    /// Idempotent; a no-op when the session already ended. Returns whether a
    /// session was open.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.sessions.get(conversation_id) {
            Some(handle) => {
                if !handle.cancel_token.is_cancelled() {
                    debug!(
                        "Cancelling stream session: conversation_id={}, session_id={}",
                        conversation_id, handle.session_id
                    );
                    handle.cancel_token.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Stream one assistant reply for `content`.
    ///
    /// Fails with `SessionBusy` (and no side effect) when the conversation
    /// already has an open session. Otherwise exactly one of the observer's
    /// terminal callbacks fires, before this returns or, if the future is
    /// dropped first, as `on_aborted` during the drop.
    pub async fn start(
        &self,
        conversation_id: &str,
        content: &str,
        options: StreamOptions,
        observer: Arc<dyn SessionObserver>,
    ) -> StreamResult<SessionOutcome> {
        let (phase_tx, phase_rx) = watch::channel(PhaseState::Idle);
        let handle = SessionHandle {
            session_id: uuid::Uuid::new_v4().to_string(),
            cancel_token: CancellationToken::new(),
            started_at_ms: chrono::Utc::now().timestamp_millis(),
            phase: phase_rx,
        };

        match self.sessions.entry(conversation_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(StreamError::SessionBusy {
                    conversation_id: conversation_id.to_string(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(handle.clone());
            }
        }
        debug!(
            "Stream session started: conversation_id={}, session_id={}",
            conversation_id, handle.session_id
        );

        let mut session = OpenSession {
            sessions: &self.sessions,
            conversation_id: conversation_id.to_string(),
            session_id: handle.session_id.clone(),
            run: SessionRun {
                tracker: PhaseTracker::new(),
                accumulator: MessageAccumulator::new(Arc::clone(&observer)),
                phase_tx,
            },
            observer,
            reported: false,
        };

        let result = self
            .drive(
                conversation_id,
                content,
                options,
                &handle.cancel_token,
                &mut session.run,
            )
            .await;

        let elapsed_ms = chrono::Utc::now().timestamp_millis() - handle.started_at_ms;
        session.report(&result, elapsed_ms);
        result
    }

    async fn drive(
        &self,
        conversation_id: &str,
        content: &str,
        options: StreamOptions,
        cancel: &CancellationToken,
        run: &mut SessionRun,
    ) -> StreamResult<SessionOutcome> {
        let body = StreamRequest::new(
            conversation_id,
            content,
            options
                .include_reasoning
                .unwrap_or(self.config.include_reasoning),
            options.max_tokens.unwrap_or(self.config.default_max_tokens),
            options.attachment_ids,
        );
        let request = TransportRequest::new(
            self.config.endpoint_url.clone(),
            body,
            self.auth.current_token(),
        );

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return run.abort(),
            opened = self.transport.open(request, cancel.clone()) => opened?,
        };

        let idle_timeout = self.config.idle_timeout();
        let mut decoder = FrameDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drop(stream);
                    return run.abort();
                }
                next = tokio::time::timeout(idle_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => {
                    decoder.flush();
                    debug!(
                        "Stream ended without done event: conversation_id={}",
                        conversation_id
                    );
                    return run
                        .tracker
                        .finish(&mut run.accumulator)
                        .map(SessionOutcome::Completed);
                }
                Err(_) => {
                    return Err(StreamError::transport(
                        None,
                        format!(
                            "idle timeout after {}s waiting for stream data",
                            idle_timeout.as_secs()
                        ),
                    ));
                }
            };

            for event in decoder.decode(&chunk) {
                let step = run.tracker.apply(&event, &mut run.accumulator)?;
                run.publish_phase();
                match step {
                    PhaseStep::Continue => {}
                    PhaseStep::Finished(message) => {
                        return Ok(SessionOutcome::Completed(message))
                    }
                    PhaseStep::Failed(message) => return Err(StreamError::Server(message)),
                }
            }
        }
    }
}
