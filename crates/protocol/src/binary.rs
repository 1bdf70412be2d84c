//! Binary framing: 4-byte big-endian header length + JSON header + raw payload.
//!
//! Used for camera frames (JPEG bytes) and raw detection tensors, where
//! base64-in-JSON would roughly double the frame size.

use serde::{Deserialize, Serialize};

use crate::messages::FrameMeta;

/// Header for a binary camera frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFrameHeader {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub meta: FrameMeta,
}

/// Header for a raw binary detection payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionBlobHeader {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub camera_id: u32,
    #[serde(default)]
    pub frame_timestamp_ms: i64,
}

/// Parsed binary frame — a camera frame or a raw detection tensor.
#[derive(Debug)]
pub enum BinaryMessage {
    CameraFrame { meta: FrameMeta, data: Vec<u8> },
    DetectionBlob {
        camera_id: u32,
        frame_timestamp_ms: i64,
        data: Vec<u8>,
    },
}

/// Parses a raw binary WebSocket frame into a [`BinaryMessage`].
///
/// Wire format: `[4 bytes: header_len (big-endian)][header_len bytes: JSON][rest: payload]`
pub fn parse_binary_message(data: &[u8]) -> Result<BinaryMessage, ParseError> {
    if data.len() < 4 {
        return Err(ParseError::TooShort);
    }

    let header_len = (data[0] as usize) << 24
        | (data[1] as usize) << 16
        | (data[2] as usize) << 8
        | (data[3] as usize);

    if data.len() < 4 + header_len {
        return Err(ParseError::HeaderTruncated {
            expected: header_len,
            got: data.len() - 4,
        });
    }

    let header_bytes = &data[4..4 + header_len];
    let payload = data[4 + header_len..].to_vec();

    // Peek at the JSON to determine type.
    let peek: HeaderPeek =
        serde_json::from_slice(header_bytes).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    match peek.msg_type.as_deref() {
        Some("camera_frame") => {
            let header: CameraFrameHeader = serde_json::from_slice(header_bytes)
                .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
            Ok(BinaryMessage::CameraFrame {
                meta: header.meta,
                data: payload,
            })
        }
        Some("detection_result") => {
            let header: DetectionBlobHeader = serde_json::from_slice(header_bytes)
                .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
            Ok(BinaryMessage::DetectionBlob {
                camera_id: header.camera_id,
                frame_timestamp_ms: header.frame_timestamp_ms,
                data: payload,
            })
        }
        other => Err(ParseError::UnknownType(
            other.unwrap_or("<missing>").to_string(),
        )),
    }
}

/// Encodes a camera frame for sending over the wire.
pub fn encode_camera_frame(meta: &FrameMeta, jpeg: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    let header = CameraFrameHeader {
        msg_type: "camera_frame".into(),
        meta: meta.clone(),
    };
    encode_binary_message(&header, jpeg)
}

/// Encodes a raw detection tensor for sending over the wire.
pub fn encode_detection_blob(
    camera_id: u32,
    frame_timestamp_ms: i64,
    tensor: &[u8],
) -> Result<Vec<u8>, serde_json::Error> {
    let header = DetectionBlobHeader {
        msg_type: "detection_result".into(),
        camera_id,
        frame_timestamp_ms,
    };
    encode_binary_message(&header, tensor)
}

/// Encodes a binary message for sending over the wire.
pub fn encode_binary_message<T: Serialize>(
    header: &T,
    payload: &[u8],
) -> Result<Vec<u8>, serde_json::Error> {
    let header_json = serde_json::to_vec(header)?;
    let header_len = header_json.len() as u32;

    let mut buf = Vec::with_capacity(4 + header_json.len() + payload.len());
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[derive(Deserialize)]
struct HeaderPeek {
    #[serde(rename = "type")]
    msg_type: Option<String>,
}

/// Errors from binary frame parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("message too short (need at least 4 bytes)")]
    TooShort,

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("invalid header JSON: {0}")]
    InvalidJson(String),

    #[error("unknown binary message type: {0}")]
    UnknownType(String),
}
