//! Client session engine.
//!
//! Owns one outbound connection to the device: a dedicated reader task
//! decodes inbound server messages into a detection queue and a bounded
//! frame buffer, while all writes are funnelled through a single write
//! pump. A failed session is terminal — the host application restarts it
//! explicitly; there is no reconnect policy here.

mod frame_buffer;
mod session;

pub use frame_buffer::{FRAME_BUFFER_CAPACITY, FrameBuffer};
pub use session::{Client, ClientConfig, TerminateCallback};

/// Send buffer capacity for the write pump.
///
/// Camera frames dominate the traffic at well under 30 per second; 256
/// gives comfortable headroom before `try_send` starts failing.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the client session engine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection not ready within the deadline")]
    ConnectTimeout,
}
