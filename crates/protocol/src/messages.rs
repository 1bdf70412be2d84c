use serde::{Deserialize, Serialize};

use crate::constants::TERMINATE_ACK;

// ---------------------------------------------------------------------------
// Control payloads
// ---------------------------------------------------------------------------

/// Control actions a client can request from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlKind {
    StartStreaming,
    StopStreaming,
    Reboot,
}

/// Requests a control action (`control_action`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlActionRequest {
    pub action: ControlKind,
}

/// Liveness signal (`heartbeat`). Logged by the server, never answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub timestamp_ms: i64,
}

// ---------------------------------------------------------------------------
// Frame payloads
// ---------------------------------------------------------------------------

/// Metadata accompanying a camera frame. The image bytes travel in the
/// binary framing (see [`crate::binary`]), never inside the JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub camera_id: u32,
}

// ---------------------------------------------------------------------------
// Detection payloads
// ---------------------------------------------------------------------------

/// Detection payload as JSON text (`detection_result` text frames).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResultPayload {
    pub payload: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub camera_id: u32,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub frame_timestamp_ms: i64,
}

/// Detection payload data, as carried on the wire.
///
/// The text form is the canonical detections-report JSON; the binary form
/// is a raw per-class output tensor forwarded without interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionData {
    Text(String),
    Binary(Vec<u8>),
}

/// A decoded `detection_result` message, text or binary.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub data: DetectionData,
    pub camera_id: u32,
    pub frame_timestamp_ms: i64,
}

impl DetectionResult {
    /// Wraps a literal text payload with no frame association.
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            data: DetectionData::Text(payload.into()),
            camera_id: 0,
            frame_timestamp_ms: 0,
        }
    }

    /// Returns the text payload, if this is the text form.
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            DetectionData::Text(s) => Some(s),
            DetectionData::Binary(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Status payloads
// ---------------------------------------------------------------------------

/// Coarse device state reported in `device_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Ready,
    Streaming,
    ShuttingDown,
}

/// Periodic telemetry event (`device_status`), one per second per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusEvent {
    pub device_id: String,
    pub state: DeviceState,
    pub fps_estimate: f32,
    pub cpu_temp_c: f32,
    pub latency_ms: u32,
}

/// Acknowledgement payload (`config_response`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigResponsePayload {
    pub success: bool,
    pub message: String,
}

impl ConfigResponsePayload {
    /// The session-termination handshake payload.
    pub fn terminate_ack() -> Self {
        Self {
            success: true,
            message: TERMINATE_ACK.into(),
        }
    }

    /// Returns `true` if this payload acknowledges termination.
    pub fn is_terminate_ack(&self) -> bool {
        self.message == TERMINATE_ACK
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}
