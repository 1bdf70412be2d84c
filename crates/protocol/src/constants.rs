use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time allowed for the transport to reach a ready state during client start.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a session emits a `device_status` message.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// How often keepalive pings are sent.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Time to wait for a pong response (or any incoming frame).
///
/// Acts as a read deadline: if *nothing* arrives within this window the
/// connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Bounded wait for session tasks to exit during server shutdown.
///
/// A task that does not exit in time is abandoned rather than blocking
/// shutdown indefinitely.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded wait for the reader task to exit during client stop.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum message size in bytes (16 MB) — a full camera frame fits
/// comfortably.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Sentinel `config_response` message acknowledging session termination.
///
/// Upon receipt the client may disconnect and halt; the server sends it
/// once in reply to a stop/reboot control action.
pub const TERMINATE_ACK: &str = "terminate_ack";

/// WebSocket message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Device to controller (and loopback echo)
    #[serde(rename = "control_action")]
    ControlAction,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "camera_frame")]
    CameraFrame,
    #[serde(rename = "detection_result")]
    DetectionResult,

    // Controller to device
    #[serde(rename = "device_status")]
    DeviceStatus,
    #[serde(rename = "config_response")]
    ConfigResponse,

    /// Forward compatibility: unknown message types deserialize here and
    /// are treated as no-ops by both session engines.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::ControlAction).unwrap(),
            "\"control_action\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::DeviceStatus).unwrap(),
            "\"device_status\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::ConfigResponse).unwrap(),
            "\"config_response\""
        );
    }

    #[test]
    fn message_type_deserialization() {
        let mt: MessageType = serde_json::from_str("\"heartbeat\"").unwrap();
        assert_eq!(mt, MessageType::Heartbeat);
    }

    #[test]
    fn unknown_message_type() {
        let mt: MessageType = serde_json::from_str("\"some_future_type\"").unwrap();
        assert_eq!(mt, MessageType::Unknown);
    }
}
