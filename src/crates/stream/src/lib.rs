// Parley stream - ingestion engine for incremental model responses
// Layers, leaves first: sanitizer -> decoder -> accumulator -> phase -> session

pub mod accumulator;
pub mod config;
pub mod decoder;
pub mod errors;
pub mod observer;
pub mod phase;
pub mod sanitizer;
pub mod session;
pub mod transport;

pub use accumulator::MessageAccumulator;
pub use config::StreamConfig;
pub use decoder::FrameDecoder;
pub use errors::{StreamError, StreamResult};
pub use observer::{ChannelObserver, NoopObserver, SessionObserver, SessionUpdate};
pub use phase::{PhaseStep, PhaseTracker};
pub use sanitizer::{sanitize_final, sanitize_fragment};
pub use session::{SessionHandle, SessionOutcome, StreamSessionController};
pub use transport::{
    AuthProvider, ChunkStream, HttpTransport, StaticTokenProvider, TransportOpener,
    TransportRequest,
};

pub use parley_core_types as types;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
