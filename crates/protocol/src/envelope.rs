use serde::{Deserialize, Serialize};

use crate::constants::MessageType;

/// Envelope for all JSON text frames.
///
/// The `payload` field uses `serde_json::value::RawValue` to defer
/// deserialization until the message type has been dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<serde_json::value::RawValue>>,
}

impl Envelope {
    /// Creates a new envelope with the given type and payload.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match payload {
            Some(p) => {
                let json = serde_json::to_string(p)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            id: id.into(),
            msg_type,
            payload: raw,
        })
    }

    /// Deserializes the payload into the given type.
    ///
    /// Returns `Ok(None)` when the envelope carries no payload at all —
    /// a legal wire state that callers map to a no-op.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.payload {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::HeartbeatRequest;

    #[test]
    fn envelope_new_with_payload() {
        let payload = serde_json::json!({"key": "value"});
        let env = Envelope::new("msg-1", MessageType::DetectionResult, Some(&payload)).unwrap();
        assert_eq!(env.id, "msg-1");
        assert_eq!(env.msg_type, MessageType::DetectionResult);
        assert!(env.payload.is_some());
    }

    #[test]
    fn envelope_new_without_payload() {
        let env = Envelope::new::<()>("msg-2", MessageType::Heartbeat, None).unwrap();
        assert!(env.payload.is_none());
    }

    #[test]
    fn envelope_parse_payload() {
        let hb = HeartbeatRequest {
            timestamp_ms: 1_700_000_000_000,
        };
        let env = Envelope::new("m1", MessageType::Heartbeat, Some(&hb)).unwrap();
        let parsed: Option<HeartbeatRequest> = env.parse_payload().unwrap();
        assert_eq!(parsed.unwrap(), hb);
    }

    #[test]
    fn envelope_parse_missing_payload_is_none() {
        let env = Envelope::new::<()>("m2", MessageType::ControlAction, None).unwrap();
        let parsed: Option<HeartbeatRequest> = env.parse_payload().unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn envelope_json_roundtrip() {
        let env = Envelope::new::<()>("e1", MessageType::ControlAction, None).unwrap();
        let json = serde_json::to_string(&env).unwrap();
        let parsed: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "e1");
        assert_eq!(parsed.msg_type, MessageType::ControlAction);
        assert!(parsed.payload.is_none());
    }

    #[test]
    fn envelope_omits_null_payload() {
        let env = Envelope::new::<()>("m1", MessageType::Heartbeat, None).unwrap();
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("payload"));
    }

    #[test]
    fn unix_millis_is_positive() {
        assert!(unix_millis() > 0);
    }
}
