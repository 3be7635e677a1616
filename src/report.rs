//! Inspection report aggregation.
//!
//! `InspectionReport` is the serializable hand-off to whatever renders the
//! final document (PDF, dashboard). It copies what it needs out of the
//! analyses and scores so it can outlive them.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::{truncate_chars, Defect, FrameAnalysis, RoomCondition};
use crate::frame::SampledFrame;
use crate::risk::{PropertyScore, RiskLevel};
use crate::taxonomy::{DefectType, Severity};

pub const MAX_REPORT_FRAMES: usize = 24;
pub const MAX_PRIORITY_LINES: usize = 10;
const FRAME_DESCRIPTION_CHARS: usize = 200;
const ACTION_DESCRIPTION_CHARS: usize = 180;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionMode {
    Video,
    Image,
    Camera,
}

impl InspectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
            Self::Camera => "camera",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreBlock {
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub total_defects: usize,
    pub critical_defects: usize,
    pub high_defects: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefectLine {
    #[serde(rename = "type")]
    pub defect_type: DefectType,
    pub label: String,
    pub severity: Severity,
    pub description: String,
}

impl DefectLine {
    fn from_defect(defect: &Defect, max_chars: usize) -> Self {
        Self {
            defect_type: defect.defect_type,
            label: defect.defect_type.label().to_string(),
            severity: defect.severity,
            description: truncate_chars(&defect.description, max_chars).to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameSection {
    pub frame_index: usize,
    pub timestamp_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    pub room_condition: RoomCondition,
    pub summary: String,
    pub has_error: bool,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub defects: Vec<DefectLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionLine {
    pub frame_index: usize,
    #[serde(flatten)]
    pub defect: DefectLine,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    /// Seconds since the Unix epoch.
    pub generated_at: u64,
    pub mode: InspectionMode,
    pub score: ScoreBlock,
    pub frames_analyzed: usize,
    pub failed_frames: usize,
    /// First `MAX_REPORT_FRAMES` frames only.
    pub frames: Vec<FrameSection>,
    pub priority_actions: Vec<ActionLine>,
}

impl InspectionReport {
    /// Assemble a report. `samples`, `analyses` and `score.frame_scores` are
    /// index-aligned; `room_names` may be shorter (camera captures name rooms,
    /// video frames do not).
    pub fn build(
        mode: InspectionMode,
        samples: &[SampledFrame],
        analyses: &[FrameAnalysis],
        score: &PropertyScore,
        room_names: &[String],
    ) -> Self {
        let included = analyses
            .len()
            .min(score.frame_scores.len())
            .min(MAX_REPORT_FRAMES);

        let frames = (0..included)
            .map(|i| {
                let analysis = &analyses[i];
                let frame_score = &score.frame_scores[i];
                FrameSection {
                    frame_index: samples.get(i).map(|s| s.frame_index).unwrap_or(i),
                    timestamp_sec: samples.get(i).map(|s| s.timestamp_sec).unwrap_or(0.0),
                    room_name: room_names.get(i).cloned(),
                    room_condition: analysis.room_condition,
                    summary: analysis.summary.clone(),
                    has_error: analysis.is_degraded(),
                    score: frame_score.score,
                    risk_level: frame_score.risk_level,
                    defects: analysis
                        .defects
                        .iter()
                        .map(|d| DefectLine::from_defect(d, FRAME_DESCRIPTION_CHARS))
                        .collect(),
                }
            })
            .collect();

        let priority_actions = score
            .priority_actions
            .iter()
            .take(MAX_PRIORITY_LINES)
            .map(|tagged| ActionLine {
                frame_index: tagged.frame_index,
                defect: DefectLine::from_defect(&tagged.defect, ACTION_DESCRIPTION_CHARS),
            })
            .collect();

        Self {
            generated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            mode,
            score: ScoreBlock {
                overall_score: score.overall_score,
                risk_level: score.risk_level,
                total_defects: score.total_defects,
                critical_defects: score.critical_defects,
                high_defects: score.high_defects,
            },
            frames_analyzed: analyses.len(),
            failed_frames: analyses.iter().filter(|a| a.is_degraded()).count(),
            frames,
            priority_actions,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize inspection report")
    }

    /// Plain-text rendering for terminals and logs.
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for InspectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Property Inspection Report")?;
        writeln!(
            f,
            "Mode: {} | Generated: {} (unix)",
            self.mode.as_str(),
            self.generated_at
        )?;
        writeln!(
            f,
            "Overall risk score: {:.1}/100 ({})",
            self.score.overall_score,
            self.score.risk_level.as_str().to_uppercase()
        )?;
        writeln!(
            f,
            "Defects: {} total, {} critical, {} high",
            self.score.total_defects, self.score.critical_defects, self.score.high_defects
        )?;
        writeln!(f, "Frames analyzed: {}", self.frames_analyzed)?;
        if self.failed_frames > 0 {
            writeln!(
                f,
                "Warning: {} frame(s) could not be analyzed; their results are incomplete.",
                self.failed_frames
            )?;
        }

        for section in &self.frames {
            writeln!(f)?;
            write!(
                f,
                "Frame {} (t = {:.1}s)",
                section.frame_index + 1,
                section.timestamp_sec
            )?;
            if let Some(room) = &section.room_name {
                write!(f, " [{}]", room)?;
            }
            writeln!(
                f,
                " condition: {}, score {:.1} ({})",
                section.room_condition.as_str(),
                section.score,
                section.risk_level
            )?;
            if section.has_error {
                writeln!(f, "  ! analysis failed")?;
            }
            writeln!(f, "  {}", section.summary)?;
            if section.defects.is_empty() {
                writeln!(f, "  No defects identified in this frame.")?;
            }
            for line in &section.defects {
                writeln!(
                    f,
                    "  - {} [{}] {}",
                    line.label,
                    line.severity.as_str().to_uppercase(),
                    line.description
                )?;
            }
        }

        if !self.priority_actions.is_empty() {
            writeln!(f)?;
            writeln!(f, "Priority actions")?;
            for (rank, action) in self.priority_actions.iter().enumerate() {
                writeln!(
                    f,
                    "  {}. {} [{}] (frame {}) {}",
                    rank + 1,
                    action.defect.label,
                    action.defect.severity.as_str().to_uppercase(),
                    action.frame_index + 1,
                    action.defect.description
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BoundingBox;
    use crate::risk::score_property;
    use image::RgbImage;

    fn defect(defect_type: DefectType, severity: Severity, description: &str) -> Defect {
        Defect {
            defect_type,
            severity,
            description: description.to_string(),
            bbox: BoundingBox::FULL_IMAGE,
            confidence: None,
        }
    }

    fn analysis(defects: Vec<Defect>) -> FrameAnalysis {
        FrameAnalysis {
            defects,
            room_condition: RoomCondition::Fair,
            summary: "Summary.".to_string(),
            error: None,
        }
    }

    fn samples(n: usize) -> Vec<SampledFrame> {
        (0..n)
            .map(|i| SampledFrame::new(RgbImage::new(2, 2), i, i as f64 * 2.0))
            .collect()
    }

    #[test]
    fn carries_scores_sections_and_actions() {
        let analyses = vec![
            analysis(vec![defect(
                DefectType::ElectricalHazard,
                Severity::Critical,
                "Scorched outlet",
            )]),
            FrameAnalysis::degraded("Analysis failed: boom", Some("boom".into())),
        ];
        let score = score_property(&analyses);
        let report = InspectionReport::build(
            InspectionMode::Video,
            &samples(2),
            &analyses,
            &score,
            &[],
        );

        assert_eq!(report.score.overall_score, 20.0);
        assert_eq!(report.score.risk_level, RiskLevel::High);
        assert_eq!(report.frames_analyzed, 2);
        assert_eq!(report.failed_frames, 1);
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.frames[1].timestamp_sec, 2.0);
        assert!(report.frames[1].has_error);
        assert_eq!(report.frames[0].defects[0].label, "Electrical Hazard");
        assert_eq!(report.priority_actions.len(), 1);
        assert_eq!(report.priority_actions[0].frame_index, 0);
        assert!(report.generated_at > 0);
    }

    #[test]
    fn caps_frames_and_truncates_descriptions() {
        let long = "x".repeat(500);
        let analyses: Vec<FrameAnalysis> = (0..30)
            .map(|_| analysis(vec![defect(DefectType::Mold, Severity::High, &long)]))
            .collect();
        let score = score_property(&analyses);
        let report = InspectionReport::build(
            InspectionMode::Video,
            &samples(30),
            &analyses,
            &score,
            &[],
        );
        assert_eq!(report.frames.len(), MAX_REPORT_FRAMES);
        assert_eq!(report.frames_analyzed, 30);
        assert_eq!(report.frames[0].defects[0].description.len(), 200);
        assert_eq!(report.priority_actions[0].defect.description.len(), 180);
    }

    #[test]
    fn room_names_attach_by_index() {
        let analyses = vec![analysis(vec![]), analysis(vec![])];
        let score = score_property(&analyses);
        let names = vec!["Kitchen".to_string()];
        let report = InspectionReport::build(
            InspectionMode::Camera,
            &samples(2),
            &analyses,
            &score,
            &names,
        );
        assert_eq!(report.frames[0].room_name.as_deref(), Some("Kitchen"));
        assert_eq!(report.frames[1].room_name, None);

        let text = report.render_text();
        assert!(text.contains("Frame 1 (t = 0.0s) [Kitchen]"));
        assert!(text.contains("No defects identified in this frame."));
        assert!(!text.contains("Priority actions"));
    }

    #[test]
    fn text_rendering_lists_priorities_and_failures() {
        let analyses = vec![
            analysis(vec![defect(DefectType::WallCrack, Severity::High, "Diagonal crack")]),
            FrameAnalysis::degraded("API error", Some("429".into())),
        ];
        let score = score_property(&analyses);
        let report = InspectionReport::build(
            InspectionMode::Video,
            &samples(2),
            &analyses,
            &score,
            &[],
        );
        let text = report.render_text();
        assert!(text.contains("Warning: 1 frame(s) could not be analyzed"));
        assert!(text.contains("  - Wall Crack [HIGH] Diagonal crack"));
        assert!(text.contains("  1. Wall Crack [HIGH] (frame 1) Diagonal crack"));
    }

    #[test]
    fn serializes_to_json() {
        let analyses = vec![analysis(vec![defect(
            DefectType::WaterDamage,
            Severity::Medium,
            "Stain",
        )])];
        let score = score_property(&analyses);
        let report =
            InspectionReport::build(InspectionMode::Image, &samples(1), &analyses, &score, &[]);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["mode"], "image");
        assert_eq!(json["priority_actions"][0]["type"], "water_damage");
        assert_eq!(json["frames"][0]["room_condition"], "fair");
    }
}
