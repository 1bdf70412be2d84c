//! Typed views over incoming frames.
//!
//! Both session engines read raw WebSocket frames and convert them here
//! into exhaustively matchable sum types. An envelope with an unknown type
//! or a missing payload decodes to `Noop` — a legal frame that dispatches
//! to nothing, never an error.

use crate::binary::{self, BinaryMessage, ParseError};
use crate::constants::MessageType;
use crate::envelope::Envelope;
use crate::messages::{
    ConfigResponsePayload, ControlActionRequest, DetectionData, DetectionResult,
    DetectionResultPayload, DeviceStatusEvent, FrameMeta, HeartbeatRequest,
};

/// A client-to-server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ControlAction(ControlActionRequest),
    Heartbeat(HeartbeatRequest),
    CameraFrame { meta: FrameMeta, data: Vec<u8> },
    DetectionResult(DetectionResult),
    Noop,
}

impl Command {
    /// Decodes a JSON text frame into a command.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        let env: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(&env)
    }

    /// Decodes an envelope into a command.
    pub fn from_envelope(env: &Envelope) -> Result<Self, serde_json::Error> {
        Ok(match env.msg_type {
            MessageType::ControlAction => env
                .parse_payload::<ControlActionRequest>()?
                .map_or(Self::Noop, Self::ControlAction),
            MessageType::Heartbeat => env
                .parse_payload::<HeartbeatRequest>()?
                .map_or(Self::Noop, Self::Heartbeat),
            MessageType::DetectionResult => env
                .parse_payload::<DetectionResultPayload>()?
                .map_or(Self::Noop, |p| {
                    Self::DetectionResult(DetectionResult {
                        data: DetectionData::Text(p.payload),
                        camera_id: p.camera_id,
                        frame_timestamp_ms: p.frame_timestamp_ms,
                    })
                }),
            // Camera frames travel in the binary framing; everything else
            // is not a command.
            _ => Self::Noop,
        })
    }

    /// Decodes a binary frame into a command.
    pub fn from_binary(data: &[u8]) -> Result<Self, ParseError> {
        Ok(match binary::parse_binary_message(data)? {
            BinaryMessage::CameraFrame { meta, data } => Self::CameraFrame { meta, data },
            BinaryMessage::DetectionBlob {
                camera_id,
                frame_timestamp_ms,
                data,
            } => Self::DetectionResult(DetectionResult {
                data: DetectionData::Binary(data),
                camera_id,
                frame_timestamp_ms,
            }),
        })
    }
}

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    DetectionResult(DetectionResult),
    CameraFrame { meta: FrameMeta, data: Vec<u8> },
    DeviceStatus(DeviceStatusEvent),
    ConfigResponse(ConfigResponsePayload),
    Noop,
}

impl ServerMessage {
    /// Decodes a JSON text frame into a server message.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        let env: Envelope = serde_json::from_str(text)?;
        Ok(match env.msg_type {
            MessageType::DetectionResult => env
                .parse_payload::<DetectionResultPayload>()?
                .map_or(Self::Noop, |p| {
                    Self::DetectionResult(DetectionResult {
                        data: DetectionData::Text(p.payload),
                        camera_id: p.camera_id,
                        frame_timestamp_ms: p.frame_timestamp_ms,
                    })
                }),
            MessageType::DeviceStatus => env
                .parse_payload::<DeviceStatusEvent>()?
                .map_or(Self::Noop, Self::DeviceStatus),
            MessageType::ConfigResponse => env
                .parse_payload::<ConfigResponsePayload>()?
                .map_or(Self::Noop, Self::ConfigResponse),
            _ => Self::Noop,
        })
    }

    /// Decodes a binary frame into a server message.
    pub fn from_binary(data: &[u8]) -> Result<Self, ParseError> {
        Ok(match binary::parse_binary_message(data)? {
            BinaryMessage::CameraFrame { meta, data } => Self::CameraFrame { meta, data },
            BinaryMessage::DetectionBlob {
                camera_id,
                frame_timestamp_ms,
                data,
            } => Self::DetectionResult(DetectionResult {
                data: DetectionData::Binary(data),
                camera_id,
                frame_timestamp_ms,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ControlKind;

    #[test]
    fn command_control_action_from_text() {
        let json = r#"{"id":"c1","type":"control_action","payload":{"action":"STOP_STREAMING"}}"#;
        let cmd = Command::from_text(json).unwrap();
        assert_eq!(
            cmd,
            Command::ControlAction(ControlActionRequest {
                action: ControlKind::StopStreaming
            })
        );
    }

    #[test]
    fn command_heartbeat_from_text() {
        let json = r#"{"id":"c2","type":"heartbeat","payload":{"timestampMs":42}}"#;
        let cmd = Command::from_text(json).unwrap();
        assert_eq!(cmd, Command::Heartbeat(HeartbeatRequest { timestamp_ms: 42 }));
    }

    #[test]
    fn command_missing_payload_is_noop() {
        let json = r#"{"id":"c3","type":"control_action"}"#;
        let cmd = Command::from_text(json).unwrap();
        assert_eq!(cmd, Command::Noop);
    }

    #[test]
    fn command_unknown_type_is_noop() {
        let json = r#"{"id":"c4","type":"some_future_type","payload":{"x":1}}"#;
        let cmd = Command::from_text(json).unwrap();
        assert_eq!(cmd, Command::Noop);
    }

    #[test]
    fn command_malformed_payload_is_error() {
        let json = r#"{"id":"c5","type":"heartbeat","payload":{"timestampMs":"not a number"}}"#;
        assert!(Command::from_text(json).is_err());
    }

    #[test]
    fn command_camera_frame_from_binary() {
        let meta = FrameMeta {
            width: 8,
            height: 8,
            format: "JPEG".into(),
            timestamp_ms: 7,
            camera_id: 0,
        };
        let frame = binary::encode_camera_frame(&meta, b"bytes").unwrap();
        let cmd = Command::from_binary(&frame).unwrap();
        match cmd {
            Command::CameraFrame { meta, data } => {
                assert_eq!(meta.width, 8);
                assert_eq!(data, b"bytes");
            }
            other => panic!("expected CameraFrame, got {other:?}"),
        }
    }

    #[test]
    fn server_message_terminate_ack_from_text() {
        let json = r#"{"id":"s1","type":"config_response","payload":{"success":true,"message":"terminate_ack"}}"#;
        let msg = ServerMessage::from_text(json).unwrap();
        match msg {
            ServerMessage::ConfigResponse(cr) => assert!(cr.is_terminate_ack()),
            other => panic!("expected ConfigResponse, got {other:?}"),
        }
    }

    #[test]
    fn server_message_detection_result_from_text() {
        let json = r#"{"id":"s2","type":"detection_result","payload":{"payload":"{\"detections\":[]}","cameraId":1}}"#;
        let msg = ServerMessage::from_text(json).unwrap();
        match msg {
            ServerMessage::DetectionResult(dr) => {
                assert_eq!(dr.camera_id, 1);
                assert!(dr.as_text().unwrap().contains("detections"));
            }
            other => panic!("expected DetectionResult, got {other:?}"),
        }
    }

    #[test]
    fn server_message_binary_detection_blob() {
        let frame = binary::encode_detection_blob(0, 0, &[1, 2, 3]).unwrap();
        let msg = ServerMessage::from_binary(&frame).unwrap();
        match msg {
            ServerMessage::DetectionResult(dr) => {
                assert_eq!(dr.data, DetectionData::Binary(vec![1, 2, 3]));
            }
            other => panic!("expected DetectionResult, got {other:?}"),
        }
    }

    #[test]
    fn server_message_unknown_is_noop() {
        let json = r#"{"id":"s3","type":"telemetry_data","payload":{}}"#;
        let msg = ServerMessage::from_text(json).unwrap();
        assert_eq!(msg, ServerMessage::Noop);
    }
}
