//! COCO class names for labelling per-class decoder output.

/// The 80 COCO class names, in model output order.
const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Returns the class name for a 1-based class id (0 = background).
///
/// Ids beyond the table map to `"unknown"` rather than failing — payload
/// class counts are model-dependent.
pub fn class_name(class_id: u32) -> &'static str {
    if class_id == 0 {
        return "background";
    }
    COCO_NAMES
        .get(class_id as usize - 1)
        .copied()
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_classes() {
        assert_eq!(class_name(1), "person");
        assert_eq!(class_name(3), "car");
        assert_eq!(class_name(80), "toothbrush");
    }

    #[test]
    fn background_and_out_of_range() {
        assert_eq!(class_name(0), "background");
        assert_eq!(class_name(81), "unknown");
        assert_eq!(class_name(u32::MAX), "unknown");
    }
}
