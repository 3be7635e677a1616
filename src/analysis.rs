//! Per-frame analysis records.
//!
//! A `FrameAnalysis` is produced exactly once per sampled frame by the
//! orchestrator/normalizer pair and is never mutated afterwards. Every
//! `Defect` inside it carries a well-formed bounding box.

use serde::{Deserialize, Serialize};

use crate::taxonomy::{DefectType, Severity};

/// Upper bound of the normalized coordinate space used by hosted oracles.
pub const NORMALIZED_EXTENT: f64 = 1000.0;

/// Bounding box in one of the two coordinate spaces.
///
/// The variant records which producing path created the box so the two spaces
/// are never mixed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundingBox {
    /// `[y_min, x_min, y_max, x_max]` in the 0..=1000 normalized space.
    Normalized([f64; 4]),
    /// `[x1, y1, x2, y2]` in source pixels.
    Pixel([f64; 4]),
}

impl BoundingBox {
    pub const FULL_IMAGE: BoundingBox = BoundingBox::Normalized([0.0, 0.0, 1000.0, 1000.0]);

    /// Map into pixel space for an image of the given size, clamped to
    /// `[0, width-1] x [0, height-1]`. Returns `(x1, y1, x2, y2)`.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (x1, y1, x2, y2) = match *self {
            BoundingBox::Normalized([y_min, x_min, y_max, x_max]) => {
                let w = width as f64;
                let h = height as f64;
                (
                    x_min * w / NORMALIZED_EXTENT,
                    y_min * h / NORMALIZED_EXTENT,
                    x_max * w / NORMALIZED_EXTENT,
                    y_max * h / NORMALIZED_EXTENT,
                )
            }
            BoundingBox::Pixel([x1, y1, x2, y2]) => (x1, y1, x2, y2),
        };
        (
            clamp_px(x1, width),
            clamp_px(y1, height),
            clamp_px(x2, width),
            clamp_px(y2, height),
        )
    }
}

fn clamp_px(value: f64, extent: u32) -> u32 {
    let max = extent.saturating_sub(1) as f64;
    if value.is_nan() {
        return 0;
    }
    value.trunc().clamp(0.0, max) as u32
}

/// One finding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    #[serde(rename = "type")]
    pub defect_type: DefectType,
    pub severity: Severity,
    pub description: String,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomCondition {
    Good,
    Fair,
    Poor,
    Critical,
    #[default]
    Unknown,
}

impl RoomCondition {
    pub fn normalize(value: &str) -> Self {
        match value {
            "good" => Self::Good,
            "fair" => Self::Fair,
            "poor" => Self::Poor,
            "critical" => Self::Critical,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }
}

/// Result for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub defects: Vec<Defect>,
    pub room_condition: RoomCondition,
    pub summary: String,
    /// Set when the oracle could not produce a result for this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameAnalysis {
    /// Placeholder result: no defects, unknown condition.
    pub fn degraded(summary: impl Into<String>, error: Option<String>) -> Self {
        Self {
            defects: Vec::new(),
            room_condition: RoomCondition::Unknown,
            summary: summary.into(),
            error,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// First `max_chars` characters of `text` (character, not byte, boundary).
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
