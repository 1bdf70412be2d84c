fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file as raw text.
    fn load_raw(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&load_raw(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// A fixture written as `30` and a Rust `f32` re-serialized as `30.0`
    /// are semantically the same wire value.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    serde_json::json!(f)
                } else {
                    v.clone()
                }
            }
            serde_json::Value::Object(map) => {
                let normalized: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect();
                serde_json::Value::Object(normalized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and
    /// compares the JSON values (order-independent, float-normalized).
    ///
    /// Guards the wire format against accidental drift: a renamed field or
    /// changed serde attribute fails here before it breaks a deployment.
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        // Deserialize from the raw text: `RawValue` payloads only work on
        // string input, not on an intermediate `Value`.
        let parsed: T = serde_json::from_str(&load_raw(name))
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        let norm_fixture = normalize_value(&fixture);
        let norm_reserialized = normalize_value(&reserialized);
        assert_eq!(
            norm_fixture, norm_reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
    }

    // --- Envelope fixtures ---

    #[test]
    fn fixture_envelope_control_action() {
        roundtrip_test::<edgesight_protocol::Envelope>("envelope_control_action.json");
    }

    #[test]
    fn fixture_envelope_heartbeat() {
        roundtrip_test::<edgesight_protocol::Envelope>("envelope_heartbeat.json");
    }

    // --- Payload fixtures ---

    #[test]
    fn fixture_device_status() {
        roundtrip_test::<edgesight_protocol::DeviceStatusEvent>("device_status.json");
    }

    #[test]
    fn fixture_detection_result() {
        roundtrip_test::<edgesight_protocol::DetectionResultPayload>("detection_result.json");
    }

    #[test]
    fn fixture_config_response_terminate() {
        roundtrip_test::<edgesight_protocol::ConfigResponsePayload>(
            "config_response_terminate.json",
        );
    }

    #[test]
    fn fixture_frame_meta() {
        roundtrip_test::<edgesight_protocol::FrameMeta>("frame_meta.json");
    }

    // --- Semantic checks on the fixtures themselves ---

    #[test]
    fn terminate_fixture_is_the_handshake() {
        let value = load_fixture("config_response_terminate.json");
        let payload: edgesight_protocol::ConfigResponsePayload =
            serde_json::from_value(value).unwrap();
        assert!(payload.is_terminate_ack());
    }

    #[test]
    fn control_action_fixture_dispatches() {
        let value = load_fixture("envelope_control_action.json");
        let cmd = edgesight_protocol::Command::from_text(&value.to_string()).unwrap();
        match cmd {
            edgesight_protocol::Command::ControlAction(req) => {
                assert_eq!(req.action, edgesight_protocol::ControlKind::Reboot);
            }
            other => panic!("expected ControlAction, got {other:?}"),
        }
    }
}
