//! Bounding-box decoders for detection payloads.
//!
//! Two paths, both producing [`BBox`] lists:
//!
//! - [`nms::parse_class_list`] reads the raw per-class output tensor the
//!   inference collaborator hands back (float count per class followed by
//!   fixed-size box records).
//! - [`text::extract_boxes`] reads detection payload strings. The canonical
//!   form is the detections-report JSON; anything else goes through a
//!   tolerant best-effort extractor kept as a compatibility shim.

pub mod labels;
pub mod nms;
pub mod text;
mod types;

pub use nms::parse_class_list;
pub use text::extract_boxes;
pub use types::{BBox, ClassBox, Detection};

/// Class count of the default COCO-trained detection model.
pub const COCO_CLASS_COUNT: usize = 80;
