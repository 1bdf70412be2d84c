use serde::{Deserialize, Serialize};

use crate::labels;

/// An axis-aligned bounding box: top-left corner plus size, in the
/// coordinate space of the payload it was decoded from (normalized for
/// model output, pixels for debug payloads).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
}

/// One decoded inference response: the boxes plus the decode timestamp.
///
/// Consumed once by the host application via a destructive pop.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub boxes: Vec<BBox>,
    pub timestamp_ms: i64,
}

/// A box from the per-class binary decoder.
///
/// `class_id` is 1-based; 0 is reserved for background. Corners are
/// normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassBox {
    pub class_id: u32,
    pub score: f32,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl ClassBox {
    /// Converts to a top-left + size box labelled with the class name.
    pub fn to_bbox(self) -> BBox {
        BBox {
            x: self.x_min,
            y: self.y_min,
            w: self.x_max - self.x_min,
            h: self.y_max - self.y_min,
            score: self.score,
            label: labels::class_name(self.class_id).to_string(),
        }
    }
}
