//! Inference seam.
//!
//! The neural accelerator lives behind [`InferenceEngine`]; the server owns
//! exactly one handle and passes it by reference into each session.

use serde::{Deserialize, Serialize};

/// What the session writes back for each processed frame.
///
/// Mirrors the accelerator's return-image flag: `Detections` asks for the
/// detections report, `AnnotatedFrame` for the enhanced/annotated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    Detections,
    AnnotatedFrame,
}

/// One inference response.
#[derive(Debug, Clone)]
pub enum InferOutput<Img> {
    /// Detections-report JSON for the processed frame.
    Detections(String),
    /// Raw per-class output tensor, forwarded without interpretation.
    RawTensor(Vec<u8>),
    /// Enhanced or annotated image to forward instead.
    Enhanced(Img),
}

/// Errors from the inference collaborator.
#[derive(Debug, thiserror::Error)]
pub enum InferError {
    /// The model has not been initialised yet.
    #[error("model not ready")]
    NotReady,

    #[error("inference failed: {0}")]
    Failed(String),
}

/// Synchronous, bounded-latency inference over decoded images.
pub trait InferenceEngine: Send + Sync + 'static {
    /// Decoded image type, matching the codec in use.
    type Image;

    fn infer(
        &self,
        image: &Self::Image,
        mode: ResultMode,
    ) -> Result<InferOutput<Self::Image>, InferError>;
}

/// Hook fired when a client requests streaming to start.
///
/// Seam for the display/wake collaborator; the default is no hook.
pub type WakeHook = Box<dyn Fn() + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&ResultMode::Detections).unwrap(),
            "\"detections\""
        );
        assert_eq!(
            serde_json::to_string(&ResultMode::AnnotatedFrame).unwrap(),
            "\"annotated_frame\""
        );
    }

    #[test]
    fn infer_error_display() {
        assert_eq!(InferError::NotReady.to_string(), "model not ready");
        assert!(
            InferError::Failed("timeout".into())
                .to_string()
                .contains("timeout")
        );
    }
}
