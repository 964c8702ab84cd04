//! In-flight message accumulator
//!
//! Sole owner of the message being streamed. Writers go through the
//! append-only mutators; readers only ever see owned snapshots.

use crate::errors::{StreamError, StreamResult};
use crate::observer::SessionObserver;
use parley_core_types::{FileRef, MessageChannel, MessageSnapshot};
use std::sync::Arc;

pub struct MessageAccumulator {
    /// `None` once finalized or discarded.
    message: Option<MessageSnapshot>,
    observer: Arc<dyn SessionObserver>,
}

impl MessageAccumulator {
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            message: Some(MessageSnapshot {
                is_open: true,
                ..Default::default()
            }),
            observer,
        }
    }

    pub fn is_open(&self) -> bool {
        self.message.is_some()
    }

    /// Deep copy of the live message. After close, an empty closed message.
    pub fn snapshot(&self) -> MessageSnapshot {
        self.message.clone().unwrap_or_default()
    }

    /// Answer text received so far, `None` once closed.
    pub fn answer_text(&self) -> Option<&str> {
        self.message.as_ref().map(|message| message.answer_text.as_str())
    }

    fn live(&mut self) -> StreamResult<&mut MessageSnapshot> {
        self.message.as_mut().ok_or(StreamError::ClosedSession)
    }

    fn notify(&self) {
        if let Some(message) = &self.message {
            self.observer.on_mutation(message);
        }
    }

    pub fn append(&mut self, channel: MessageChannel, text: &str) -> StreamResult<()> {
        let message = self.live()?;
        if text.is_empty() {
            return Ok(());
        }
        match channel {
            MessageChannel::Reasoning => message.reasoning_text.push_str(text),
            MessageChannel::Answer => message.answer_text.push_str(text),
        }
        self.notify();
        Ok(())
    }

    pub fn set_reasoning_active(
        &mut self,
        active: bool,
        elapsed_ms: Option<u64>,
    ) -> StreamResult<()> {
        let message = self.live()?;
        message.reasoning_active = active;
        if elapsed_ms.is_some() {
            message.reasoning_elapsed_ms = elapsed_ms;
        }
        self.notify();
        Ok(())
    }

    pub fn attach_artifact(&mut self, file: FileRef) -> StreamResult<()> {
        self.live()?.attached_artifact = Some(file);
        self.notify();
        Ok(())
    }

    /// Close the message with its final answer text and hand back the result.
    pub fn finalize(&mut self, result_text: String) -> StreamResult<MessageSnapshot> {
        let mut message = self.message.take().ok_or(StreamError::ClosedSession)?;
        message.answer_text = result_text;
        message.is_open = false;
        Ok(message)
    }

    /// Close the message and drop whatever was received.
    pub fn discard(&mut self) -> StreamResult<()> {
        self.message.take().map(|_| ()).ok_or(StreamError::ClosedSession)
    }
}
