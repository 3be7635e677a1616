//! Defect normalizer.
//!
//! Turns whatever the oracle returned into a `FrameAnalysis` that satisfies the
//! defect invariants. `parse` is total: malformed input resolves to a degraded
//! analysis carrying the raw text, never to an error.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::analysis::{truncate_chars, BoundingBox, Defect, FrameAnalysis, RoomCondition};
use crate::detect::RawDetection;
use crate::taxonomy::{DefectType, Severity};

pub const NO_SUMMARY: &str = "No summary available.";
const RAW_EXCERPT_CHARS: usize = 300;

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```(?:json)?\s*").expect("static regex"))
}

fn fence_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*```$").expect("static regex"))
}

/// Parse hosted-oracle text into a normalized analysis.
pub fn parse(raw_text: &str) -> FrameAnalysis {
    let cleaned = strip_code_fence(raw_text);

    let document = decode_object(&cleaned).or_else(|| {
        log::debug!("oracle text is not a bare JSON object; trying outermost braces");
        outermost_object_span(&cleaned).and_then(decode_object)
    });

    match document {
        Some(object) => normalize_document(&object),
        None => {
            log::warn!("could not parse oracle response ({} bytes)", raw_text.len());
            FrameAnalysis {
                defects: Vec::new(),
                room_condition: RoomCondition::Unknown,
                summary: format!(
                    "Could not parse AI response. Raw: {}",
                    truncate_chars(raw_text, RAW_EXCERPT_CHARS)
                ),
                error: None,
            }
        }
    }
}

fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let opened = fence_open().replace(trimmed, "");
    let closed = fence_close().replace(&opened, "");
    closed.trim().to_string()
}

fn decode_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn outermost_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn normalize_document(doc: &Map<String, Value>) -> FrameAnalysis {
    let defects = match doc.get("defects") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::Object(fields) => Some(normalize_defect(fields)),
                other => {
                    log::debug!("dropping non-object defect entry: {}", other);
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let room_condition = doc
        .get("room_condition")
        .and_then(Value::as_str)
        .map(RoomCondition::normalize)
        .unwrap_or_default();

    let summary = doc
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or(NO_SUMMARY)
        .to_string();

    FrameAnalysis {
        defects,
        room_condition,
        summary,
        error: None,
    }
}

fn normalize_defect(fields: &Map<String, Value>) -> Defect {
    let defect_type = fields
        .get("type")
        .and_then(Value::as_str)
        .map(DefectType::normalize)
        .unwrap_or(DefectType::Other);
    let severity = fields
        .get("severity")
        .and_then(Value::as_str)
        .map(Severity::normalize)
        .unwrap_or(Severity::Medium);
    let description = fields
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let bbox = fields
        .get("bbox")
        .and_then(normalized_bbox)
        .unwrap_or(BoundingBox::FULL_IMAGE);
    let confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0) as f32);

    Defect {
        defect_type,
        severity,
        description,
        bbox,
        confidence,
    }
}

fn normalized_bbox(value: &Value) -> Option<BoundingBox> {
    let items = value.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut coords = [0.0f64; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(BoundingBox::Normalized(coords))
}

/// Severity assigned to a local-model detection from its confidence and the
/// base weight of its type.
pub fn detection_severity(confidence: f32, defect_type: DefectType) -> Severity {
    let weight = defect_type.weight();
    if confidence >= 0.7 && weight >= 0.85 {
        Severity::Critical
    } else if confidence >= 0.5 && weight >= 0.7 {
        Severity::High
    } else if confidence >= 0.3 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Normalize local-model detections. Boxes stay in pixel space.
pub fn from_detections(detections: &[RawDetection]) -> FrameAnalysis {
    let defects: Vec<Defect> = detections
        .iter()
        .map(|det| {
            let defect_type = DefectType::normalize(&det.class_name);
            let confidence = det.confidence.clamp(0.0, 1.0);
            Defect {
                defect_type,
                severity: detection_severity(confidence, defect_type),
                description: format!(
                    "{} detected with {:.0}% confidence",
                    defect_type.label(),
                    confidence * 100.0
                ),
                bbox: BoundingBox::Pixel(det.xyxy.map(f64::from)),
                confidence: Some(confidence),
            }
        })
        .collect();

    let summary = if defects.is_empty() {
        "Local model reported no defects.".to_string()
    } else {
        format!("Local model reported {} detection(s).", defects.len())
    };

    FrameAnalysis {
        defects,
        room_condition: RoomCondition::Unknown,
        summary,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(analysis: &FrameAnalysis) {
        for d in &analysis.defects {
            match d.bbox {
                BoundingBox::Normalized(c) | BoundingBox::Pixel(c) => {
                    assert!(c.iter().all(|v| v.is_finite()))
                }
            }
            if let Some(c) = d.confidence {
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn parses_clean_json() {
        let text = r#"{
            "defects": [
                {"type": "wall_crack", "severity": "high",
                 "description": "Diagonal crack", "bbox": [50, 100, 200, 300]}
            ],
            "room_condition": "poor",
            "summary": "Cracked wall."
        }"#;
        let a = parse(text);
        assert_eq!(a.defects.len(), 1);
        assert_eq!(a.defects[0].defect_type, DefectType::WallCrack);
        assert_eq!(a.defects[0].severity, Severity::High);
        assert_eq!(
            a.defects[0].bbox,
            BoundingBox::Normalized([50.0, 100.0, 200.0, 300.0])
        );
        assert_eq!(a.room_condition, RoomCondition::Poor);
        assert_eq!(a.summary, "Cracked wall.");
        assert!(a.error.is_none());
    }

    #[test]
    fn strips_code_fences() {
        let text = "```json\n{\"defects\": [], \"room_condition\": \"good\", \"summary\": \"Fine.\"}\n```";
        let a = parse(text);
        assert_eq!(a.room_condition, RoomCondition::Good);
        assert_eq!(a.summary, "Fine.");
    }

    #[test]
    fn recovers_object_embedded_in_prose() {
        let text = "Here is the result: {\"defects\": [{\"type\": \"mold\", \"severity\": \"low\"}]} hope it helps";
        let a = parse(text);
        assert_eq!(a.defects.len(), 1);
        assert_eq!(a.defects[0].defect_type, DefectType::Mold);
        assert_eq!(a.defects[0].bbox, BoundingBox::FULL_IMAGE);
        assert_eq!(a.summary, NO_SUMMARY);
        assert_eq!(a.room_condition, RoomCondition::Unknown);
    }

    #[test]
    fn unparseable_text_degrades_with_excerpt() {
        let raw = "x".repeat(500);
        let a = parse(&raw);
        assert!(a.defects.is_empty());
        assert_eq!(a.room_condition, RoomCondition::Unknown);
        let expected = format!("Could not parse AI response. Raw: {}", "x".repeat(300));
        assert_eq!(a.summary, expected);
    }

    #[test]
    fn non_object_json_degrades() {
        let a = parse("[1, 2, 3]");
        assert!(a.summary.starts_with("Could not parse AI response."));
        let a = parse("{ broken");
        assert!(a.summary.starts_with("Could not parse AI response."));
    }

    #[test]
    fn repairs_malformed_entries() {
        let text = r#"{"defects": [
            {"type": "alien_goo", "severity": "apocalyptic", "bbox": [1, 2, 3]},
            {"type": "mold", "severity": "critical", "bbox": "everywhere"},
            {"type": 7, "bbox": [1, "2", 3, 4], "description": 12, "confidence": 3.5},
            "not an object",
            {"severity": "low", "bbox": [10, 20, 30, 40.5], "confidence": 0.4}
        ], "room_condition": 3, "summary": null}"#;
        let a = parse(text);
        assert_eq!(a.defects.len(), 4);
        assert_well_formed(&a);

        assert_eq!(a.defects[0].defect_type, DefectType::Other);
        assert_eq!(a.defects[0].severity, Severity::Medium);
        assert_eq!(a.defects[0].bbox, BoundingBox::FULL_IMAGE);

        assert_eq!(a.defects[1].severity, Severity::Critical);
        assert_eq!(a.defects[1].bbox, BoundingBox::FULL_IMAGE);

        assert_eq!(a.defects[2].defect_type, DefectType::Other);
        assert_eq!(a.defects[2].description, "");
        assert_eq!(a.defects[2].bbox, BoundingBox::FULL_IMAGE);
        assert_eq!(a.defects[2].confidence, Some(1.0));

        assert_eq!(
            a.defects[3].bbox,
            BoundingBox::Normalized([10.0, 20.0, 30.0, 40.5])
        );
        assert_eq!(a.defects[3].confidence, Some(0.4));

        assert_eq!(a.room_condition, RoomCondition::Unknown);
        assert_eq!(a.summary, NO_SUMMARY);
    }

    #[test]
    fn missing_defects_field_yields_empty_list() {
        let a = parse(r#"{"summary": "nothing to report"}"#);
        assert!(a.defects.is_empty());
        let a = parse(r#"{"defects": {"type": "mold"}}"#);
        assert!(a.defects.is_empty());
    }

    #[test]
    fn local_detections_keep_pixel_boxes() {
        let dets = vec![
            RawDetection {
                class_id: 7,
                class_name: "electrical_hazard".into(),
                confidence: 0.82,
                xyxy: [10.0, 20.0, 110.0, 220.0],
            },
            RawDetection {
                class_id: 99,
                class_name: "class_99".into(),
                confidence: 0.2,
                xyxy: [0.0, 0.0, 5.0, 5.0],
            },
        ];
        let a = from_detections(&dets);
        assert_eq!(a.defects.len(), 2);
        assert_eq!(a.defects[0].defect_type, DefectType::ElectricalHazard);
        assert_eq!(a.defects[0].severity, Severity::Critical);
        assert_eq!(
            a.defects[0].bbox,
            BoundingBox::Pixel([10.0, 20.0, 110.0, 220.0])
        );
        assert_eq!(a.defects[1].defect_type, DefectType::Other);
        assert_eq!(a.defects[1].severity, Severity::Low);
    }

    #[test]
    fn detection_severity_tiers() {
        assert_eq!(
            detection_severity(0.75, DefectType::Mold),
            Severity::Critical
        );
        assert_eq!(
            detection_severity(0.75, DefectType::FloorDamage),
            Severity::High
        );
        assert_eq!(
            detection_severity(0.55, DefectType::PeelingPaint),
            Severity::Medium
        );
        assert_eq!(detection_severity(0.1, DefectType::Mold), Severity::Low);
    }
}
