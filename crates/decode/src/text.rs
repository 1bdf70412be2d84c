//! Best-effort extraction of bounding boxes from detection payload strings.
//!
//! The canonical encoding is the detections-report JSON the device emits:
//! `{"detections":[{"class":"car","score":0.9,"bbox":{"x_min":..,"y_min":..,
//! "x_max":..,"y_max":..}}],"count":1}`. That path is parsed strictly.
//!
//! Everything else goes through a tolerant extractor kept as a
//! compatibility shim: upstream payloads are not contractually a fixed
//! schema and occasionally arrive as raw debug text. The shim looks for
//! `bbox` blocks first, then falls back to any bare 4/5-number bracketed
//! array anywhere in the string. A box is accepted only if its width and
//! height are strictly positive; x/y are clamped to be non-negative.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::trace;

use crate::types::BBox;

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(x_min|y_min|x_max|y_max|score)"\s*:\s*(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#)
        .expect("valid field regex")
});

static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""class"\s*:\s*"([^"]*)""#).expect("valid class regex"));

static ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*-?\d+(?:\.\d+)?(?:\s*,\s*-?\d+(?:\.\d+)?){3,4}\s*\]")
        .expect("valid array regex")
});

/// Canonical detections report.
#[derive(Deserialize)]
struct Report {
    detections: Vec<ReportEntry>,
}

#[derive(Deserialize)]
struct ReportEntry {
    #[serde(default)]
    class: String,
    #[serde(default)]
    score: f32,
    bbox: ReportBox,
}

#[derive(Deserialize)]
struct ReportBox {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
}

/// Extracts bounding boxes from a detection payload string.
///
/// Returns an empty vector when nothing decodable is found; the caller
/// decides whether that is worth logging.
pub fn extract_boxes(payload: &str) -> Vec<BBox> {
    if let Ok(report) = serde_json::from_str::<Report>(payload) {
        return report
            .detections
            .into_iter()
            .filter_map(|e| {
                accept(
                    e.bbox.x_min,
                    e.bbox.y_min,
                    e.bbox.x_max - e.bbox.x_min,
                    e.bbox.y_max - e.bbox.y_min,
                    e.score,
                    e.class,
                )
            })
            .collect();
    }

    trace!("payload is not a canonical report, using tolerant extraction");
    tolerant(payload)
}

/// Tolerant path: `bbox` blocks first, bare arrays as a last resort.
fn tolerant(payload: &str) -> Vec<BBox> {
    let mut boxes = Vec::new();
    let mut seen: Vec<(usize, usize)> = Vec::new();

    for (key_idx, _) in payload.match_indices("\"bbox\"") {
        let Some((start, end)) = enclosing_block(payload, key_idx) else {
            continue;
        };
        if seen.contains(&(start, end)) {
            continue;
        }
        seen.push((start, end));

        if let Some(bbox) = block_box(&payload[start..=end]) {
            boxes.push(bbox);
        }
    }

    if !boxes.is_empty() {
        return boxes;
    }

    // No block matched anywhere: scan the whole string for bare arrays.
    ARRAY_RE
        .find_iter(payload)
        .filter_map(|m| {
            let nums = parse_numbers(m.as_str())?;
            let score = nums.get(4).copied().unwrap_or(0.0);
            accept(nums[0], nums[1], nums[2], nums[3], score, String::new())
        })
        .collect()
}

/// Finds the object block enclosing the byte at `key_idx`: the nearest `{`
/// before it through its matching `}`. Brace counting only — good enough
/// for the payloads this shim exists for.
fn enclosing_block(s: &str, key_idx: usize) -> Option<(usize, usize)> {
    let start = s[..key_idx].rfind('{')?;
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some((start, i));
                }
            }
            _ => {}
        }
    }
    None
}

/// Decodes one candidate block into a box, if it holds usable geometry.
fn block_box(block: &str) -> Option<BBox> {
    let mut x_min = None;
    let mut y_min = None;
    let mut x_max = None;
    let mut y_max = None;
    let mut score = None;

    for cap in FIELD_RE.captures_iter(block) {
        let value: f32 = cap[2].parse().ok()?;
        let slot = match &cap[1] {
            "x_min" => &mut x_min,
            "y_min" => &mut y_min,
            "x_max" => &mut x_max,
            "y_max" => &mut y_max,
            _ => &mut score,
        };
        slot.get_or_insert(value);
    }

    let label = CLASS_RE
        .captures(block)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    // Corner fields first; a bracketed [x, y, w, h, score?] array otherwise.
    if let (Some(x0), Some(y0), Some(x1), Some(y1)) = (x_min, y_min, x_max, y_max) {
        return accept(x0, y0, x1 - x0, y1 - y0, score.unwrap_or(0.0), label);
    }

    let nums = parse_numbers(ARRAY_RE.find(block)?.as_str())?;
    let array_score = nums.get(4).copied();
    accept(
        nums[0],
        nums[1],
        nums[2],
        nums[3],
        score.or(array_score).unwrap_or(0.0),
        label,
    )
}

/// Parses a `[n, n, n, n]` or `[n, n, n, n, n]` match into its numbers.
fn parse_numbers(array: &str) -> Option<Vec<f32>> {
    let inner = array.trim().strip_prefix('[')?.strip_suffix(']')?;
    let nums: Vec<f32> = inner
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .ok()?;
    (nums.len() == 4 || nums.len() == 5).then_some(nums)
}

/// Acceptance rule: width and height strictly positive, x/y clamped to 0.
fn accept(x: f32, y: f32, w: f32, h: f32, score: f32, label: String) -> Option<BBox> {
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some(BBox {
        x: x.max(0.0),
        y: y.max(0.0),
        w,
        h,
        score,
        label,
    })
}
