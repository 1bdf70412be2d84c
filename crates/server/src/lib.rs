//! Server session engine.
//!
//! Accepts one long-lived bidirectional connection at a time, runs a read
//! loop dispatching [`edgesight_protocol::Command`] values, and emits
//! periodic `device_status` telemetry per session. Inference and the image
//! codec are explicit collaborator handles passed into the session — never
//! globals.

mod engine;
mod server;
mod session;
mod status;

pub use engine::{InferError, InferOutput, InferenceEngine, ResultMode, WakeHook};
pub use server::{Server, ServerConfig};
pub use session::Sender;

/// Send buffer capacity for the per-session write pump.
///
/// Status messages and detection results are small and infrequent relative
/// to the buffer; annotated frames are the largest payloads and still leave
/// plenty of headroom before `try_send` starts failing.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the server session engine.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
