//! Per-class detection list decoder for raw model output tensors.
//!
//! The buffer layout is one record per class, in class order: a 32-bit
//! float holding the detection count for that class, followed by that many
//! fixed-size box records `{score, x_min, y_min, x_max, y_max}` (all
//! little-endian f32).

use tracing::debug;

use crate::types::ClassBox;

/// Size of one box record in bytes.
const BOX_RECORD_SIZE: usize = 5 * 4;

/// Parses a per-class detection list.
///
/// Classes are iterated in order `0..max_class_count`; the emitted
/// `class_id` is the class index plus one, reserving 0 for background.
///
/// Declared counts are trusted, but a buffer that runs out early ends the
/// parse cleanly with the boxes decoded so far instead of reading out of
/// bounds.
pub fn parse_class_list(data: &[u8], max_class_count: usize) -> Vec<ClassBox> {
    let mut boxes = Vec::new();
    let mut offset = 0usize;

    for class_index in 0..max_class_count {
        let Some(count) = read_f32(data, &mut offset) else {
            debug!(
                class_index,
                decoded = boxes.len(),
                "class list truncated at count field"
            );
            return boxes;
        };
        let count = count as u32;

        for _ in 0..count {
            if data.len() < offset + BOX_RECORD_SIZE {
                debug!(
                    class_index,
                    decoded = boxes.len(),
                    "class list truncated inside box record"
                );
                return boxes;
            }
            // Length checked above; the fallbacks never fire.
            let score = read_f32(data, &mut offset).unwrap_or(0.0);
            let x_min = read_f32(data, &mut offset).unwrap_or(0.0);
            let y_min = read_f32(data, &mut offset).unwrap_or(0.0);
            let x_max = read_f32(data, &mut offset).unwrap_or(0.0);
            let y_max = read_f32(data, &mut offset).unwrap_or(0.0);

            boxes.push(ClassBox {
                class_id: class_index as u32 + 1,
                score,
                x_min,
                y_min,
                x_max,
                y_max,
            });
        }
    }

    boxes
}

fn read_f32(data: &[u8], offset: &mut usize) -> Option<f32> {
    let bytes: [u8; 4] = data.get(*offset..*offset + 4)?.try_into().ok()?;
    *offset += 4;
    Some(f32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_f32(buf: &mut Vec<u8>, v: f32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_box(buf: &mut Vec<u8>, score: f32) {
        push_f32(buf, score);
        push_f32(buf, 0.1); // x_min
        push_f32(buf, 0.2); // y_min
        push_f32(buf, 0.3); // x_max
        push_f32(buf, 0.4); // y_max
    }

    #[test]
    fn three_classes_mixed_counts() {
        // [count=2, box, box, count=0, count=1, box] with 3 classes.
        let mut buf = Vec::new();
        push_f32(&mut buf, 2.0);
        push_box(&mut buf, 0.9);
        push_box(&mut buf, 0.8);
        push_f32(&mut buf, 0.0);
        push_f32(&mut buf, 1.0);
        push_box(&mut buf, 0.7);

        let boxes = parse_class_list(&buf, 3);
        assert_eq!(boxes.len(), 3);
        let ids: Vec<u32> = boxes.iter().map(|b| b.class_id).collect();
        assert_eq!(ids, vec![1, 1, 3]);
        assert!((boxes[0].score - 0.9).abs() < 1e-6);
        assert!((boxes[2].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn box_fields_in_order() {
        let mut buf = Vec::new();
        push_f32(&mut buf, 1.0);
        push_f32(&mut buf, 0.95);
        push_f32(&mut buf, 0.10);
        push_f32(&mut buf, 0.20);
        push_f32(&mut buf, 0.30);
        push_f32(&mut buf, 0.50);

        let boxes = parse_class_list(&buf, 1);
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!((b.score - 0.95).abs() < 1e-6);
        assert!((b.x_min - 0.10).abs() < 1e-6);
        assert!((b.y_min - 0.20).abs() < 1e-6);
        assert!((b.x_max - 0.30).abs() < 1e-6);
        assert!((b.y_max - 0.50).abs() < 1e-6);
    }

    #[test]
    fn empty_buffer() {
        assert!(parse_class_list(&[], 80).is_empty());
    }

    #[test]
    fn truncated_inside_record_keeps_earlier_boxes() {
        let mut buf = Vec::new();
        push_f32(&mut buf, 2.0);
        push_box(&mut buf, 0.9);
        // Second box cut short after two fields.
        push_f32(&mut buf, 0.8);
        push_f32(&mut buf, 0.1);

        let boxes = parse_class_list(&buf, 1);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_id, 1);
    }

    #[test]
    fn buffer_shorter_than_class_count() {
        // Only one class record present, three declared.
        let mut buf = Vec::new();
        push_f32(&mut buf, 1.0);
        push_box(&mut buf, 0.6);

        let boxes = parse_class_list(&buf, 3);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_id, 1);
    }
}
