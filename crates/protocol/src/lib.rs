//! Wire protocol shared by the device and the controller.
//!
//! One long-lived WebSocket connection carries two kinds of frames:
//! JSON text frames wrapped in an [`Envelope`], and binary frames using a
//! `[4-byte header length][JSON header][raw payload]` layout for camera
//! frames and raw detection tensors. [`Command`] and [`ServerMessage`] are
//! the typed views the session engines dispatch on.

pub mod binary;
pub mod command;
pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use binary::{BinaryMessage, ParseError};
pub use command::{Command, ServerMessage};
pub use constants::MessageType;
pub use envelope::{Envelope, unix_millis};
pub use messages::{
    ConfigResponsePayload, ControlActionRequest, ControlKind, DetectionData, DetectionResult,
    DetectionResultPayload, DeviceState, DeviceStatusEvent, FrameMeta, HeartbeatRequest,
};
