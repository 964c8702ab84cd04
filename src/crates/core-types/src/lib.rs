//! Parley shared low-level stream DTOs.
//!
//! Wire events, phase states and the message snapshot handed to observers.
//! Kept free of behavior so the UI layer and persistence collaborators can
//! depend on it without pulling in the ingestion engine.

pub mod event;
pub mod message;
pub mod request;

pub use event::{EventKind, StreamEvent};
pub use message::{FileRef, MessageChannel, MessageRole, MessageSnapshot, PhaseState};
pub use request::{StreamOptions, StreamRequest};
