//! Risk scoring engine.
//!
//! Pure functions from analyses to scores. Frame scores sum weighted defect
//! contributions; the property score blends the mean and the worst frame so a
//! single badly damaged room is not diluted by many clean ones.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::{Defect, FrameAnalysis};
use crate::taxonomy::{DefectType, Severity};

/// Points contributed by a weight-1.0 critical defect.
const CONTRIBUTION_SCALE: f64 = 25.0;
const MAX_SCORE: f64 = 100.0;
pub const PRIORITY_ACTION_LIMIT: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameScore {
    pub score: f64,
    pub risk_level: RiskLevel,
    pub critical_count: usize,
    pub high_count: usize,
    pub defect_counts: BTreeMap<DefectType, usize>,
}

impl FrameScore {
    fn safe() -> Self {
        Self {
            score: 0.0,
            risk_level: RiskLevel::Safe,
            critical_count: 0,
            high_count: 0,
            defect_counts: BTreeMap::new(),
        }
    }
}

/// A defect together with the index of the frame it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaggedDefect {
    pub frame_index: usize,
    #[serde(flatten)]
    pub defect: Defect,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyScore {
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub total_defects: usize,
    pub critical_defects: usize,
    pub high_defects: usize,
    /// Index-aligned with the scored analyses.
    pub frame_scores: Vec<FrameScore>,
    pub priority_actions: Vec<TaggedDefect>,
    pub all_defects: Vec<TaggedDefect>,
}

/// Score contribution of one defect.
pub fn contribution(defect: &Defect) -> f64 {
    defect.defect_type.weight() * defect.severity.multiplier() * CONTRIBUTION_SCALE
}

pub fn score_frame(analysis: &FrameAnalysis) -> FrameScore {
    if analysis.defects.is_empty() {
        return FrameScore::safe();
    }

    let mut weighted_sum = 0.0;
    let mut critical_count = 0;
    let mut high_count = 0;
    let mut defect_counts = BTreeMap::new();

    for defect in &analysis.defects {
        weighted_sum += contribution(defect);
        match defect.severity {
            Severity::Critical => critical_count += 1,
            Severity::High => high_count += 1,
            _ => {}
        }
        *defect_counts.entry(defect.defect_type).or_insert(0) += 1;
    }

    let raw_score = weighted_sum.clamp(0.0, MAX_SCORE);
    let risk_level = if raw_score >= 70.0 || critical_count >= 2 {
        RiskLevel::Critical
    } else if raw_score >= 45.0 || critical_count >= 1 {
        RiskLevel::High
    } else if raw_score >= 20.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    FrameScore {
        score: round1(raw_score),
        risk_level,
        critical_count,
        high_count,
        defect_counts,
    }
}

pub fn score_property(analyses: &[FrameAnalysis]) -> PropertyScore {
    if analyses.is_empty() {
        return PropertyScore {
            overall_score: 0.0,
            risk_level: RiskLevel::Safe,
            total_defects: 0,
            critical_defects: 0,
            high_defects: 0,
            frame_scores: Vec::new(),
            priority_actions: Vec::new(),
            all_defects: Vec::new(),
        };
    }

    let frame_scores: Vec<FrameScore> = analyses.iter().map(score_frame).collect();
    let all_defects: Vec<TaggedDefect> = analyses
        .iter()
        .enumerate()
        .flat_map(|(frame_index, analysis)| {
            analysis.defects.iter().map(move |defect| TaggedDefect {
                frame_index,
                defect: defect.clone(),
            })
        })
        .collect();

    let total_defects = all_defects.len();
    let critical_defects = count_severity(&all_defects, Severity::Critical);
    let high_defects = count_severity(&all_defects, Severity::High);

    let mean = frame_scores.iter().map(|f| f.score).sum::<f64>() / frame_scores.len() as f64;
    let worst = frame_scores
        .iter()
        .map(|f| f.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let overall = (0.4 * mean + 0.6 * worst).clamp(0.0, MAX_SCORE);

    // Count override is 3 here versus 2 per frame: isolated critical findings
    // spread across frames weigh less than ones concentrated in one frame.
    let risk_level = if overall >= 70.0 || critical_defects >= 3 {
        RiskLevel::Critical
    } else if overall >= 45.0 || critical_defects >= 1 {
        RiskLevel::High
    } else if overall >= 20.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let mut priority_actions = all_defects.clone();
    // Stable: equal severities keep frame/input order.
    priority_actions.sort_by(|a, b| b.defect.severity.cmp(&a.defect.severity));
    priority_actions.truncate(PRIORITY_ACTION_LIMIT);

    PropertyScore {
        overall_score: round1(overall),
        risk_level,
        total_defects,
        critical_defects,
        high_defects,
        frame_scores,
        priority_actions,
        all_defects,
    }
}

fn count_severity(defects: &[TaggedDefect], severity: Severity) -> usize {
    defects
        .iter()
        .filter(|d| d.defect.severity == severity)
        .count()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{BoundingBox, RoomCondition};

    fn defect(defect_type: DefectType, severity: Severity) -> Defect {
        Defect {
            defect_type,
            severity,
            description: format!("{} {}", defect_type, severity),
            bbox: BoundingBox::FULL_IMAGE,
            confidence: None,
        }
    }

    fn frame(defects: Vec<Defect>) -> FrameAnalysis {
        FrameAnalysis {
            defects,
            room_condition: RoomCondition::Unknown,
            summary: String::new(),
            error: None,
        }
    }

    #[test]
    fn empty_frame_is_safe() {
        let score = score_frame(&frame(vec![]));
        assert_eq!(score.score, 0.0);
        assert_eq!(score.risk_level, RiskLevel::Safe);
        assert!(score.defect_counts.is_empty());
    }

    #[test]
    fn contributions_sum_and_band() {
        // 0.8 * 0.75 * 25 = 15, plus 0.85 * 0.5 * 25 = 10.625
        let score = score_frame(&frame(vec![
            defect(DefectType::WallCrack, Severity::High),
            defect(DefectType::Mold, Severity::Medium),
        ]));
        assert_eq!(score.score, 25.6);
        assert_eq!(score.risk_level, RiskLevel::Medium);
        assert_eq!(score.high_count, 1);
        assert_eq!(score.critical_count, 0);
        assert_eq!(score.defect_counts[&DefectType::WallCrack], 1);
    }

    #[test]
    fn low_band_below_twenty() {
        let score = score_frame(&frame(vec![defect(DefectType::Other, Severity::Low)]));
        assert_eq!(score.score, 1.9);
        assert_eq!(score.risk_level, RiskLevel::Low);
    }

    #[test]
    fn two_criticals_override_to_critical() {
        let score = score_frame(&frame(vec![
            defect(DefectType::ElectricalHazard, Severity::Critical),
            defect(DefectType::ExposedWiring, Severity::Critical),
        ]));
        assert_eq!(score.score, 50.0);
        assert_eq!(score.critical_count, 2);
        assert_eq!(score.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn one_critical_forces_at_least_high() {
        let score = score_frame(&frame(vec![defect(DefectType::Other, Severity::Critical)]));
        assert_eq!(score.score, 7.5);
        assert_eq!(score.risk_level, RiskLevel::High);
    }

    #[test]
    fn frame_score_clamps_at_hundred() {
        let defects = (0..6)
            .map(|_| defect(DefectType::ElectricalHazard, Severity::Critical))
            .collect();
        let score = score_frame(&frame(defects));
        assert_eq!(score.score, 100.0);
        assert_eq!(score.defect_counts[&DefectType::ElectricalHazard], 6);
    }

    #[test]
    fn empty_property_is_safe() {
        let score = score_property(&[]);
        assert_eq!(score.overall_score, 0.0);
        assert_eq!(score.risk_level, RiskLevel::Safe);
        assert!(score.frame_scores.is_empty());
        assert!(score.priority_actions.is_empty());
    }

    #[test]
    fn property_blends_mean_and_worst() {
        let analyses = vec![
            frame(vec![defect(DefectType::ElectricalHazard, Severity::Critical)]),
            frame(vec![]),
        ];
        let score = score_property(&analyses);
        assert_eq!(score.critical_defects, 1);
        assert_eq!(score.total_defects, 1);
        assert_eq!(score.overall_score, 20.0);
        assert_eq!(score.risk_level, RiskLevel::High);
        assert_eq!(score.frame_scores.len(), 2);
        assert_eq!(score.frame_scores[0].score, 25.0);
        assert_eq!(score.frame_scores[1].risk_level, RiskLevel::Safe);
    }

    #[test]
    fn property_needs_three_criticals_for_count_override() {
        let spread: Vec<FrameAnalysis> = (0..2)
            .map(|_| frame(vec![defect(DefectType::Other, Severity::Critical)]))
            .chain(std::iter::repeat_with(|| frame(vec![])).take(8))
            .collect();
        let score = score_property(&spread);
        assert_eq!(score.critical_defects, 2);
        assert_eq!(score.risk_level, RiskLevel::High);

        let mut three = spread.clone();
        three.push(frame(vec![defect(DefectType::Other, Severity::Critical)]));
        assert_eq!(score_property(&three).risk_level, RiskLevel::Critical);
    }

    #[test]
    fn priority_actions_are_severity_ordered_and_stable() {
        let analyses = vec![
            frame(vec![
                defect(DefectType::Mold, Severity::Low),
                defect(DefectType::WallCrack, Severity::High),
            ]),
            frame(vec![
                defect(DefectType::WaterDamage, Severity::Critical),
                defect(DefectType::FloorDamage, Severity::High),
                defect(DefectType::PeelingPaint, Severity::Medium),
                defect(DefectType::BrokenFixture, Severity::High),
            ]),
        ];
        let score = score_property(&analyses);
        let order: Vec<(usize, DefectType)> = score
            .priority_actions
            .iter()
            .map(|t| (t.frame_index, t.defect.defect_type))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, DefectType::WaterDamage),
                (0, DefectType::WallCrack),
                (1, DefectType::FloorDamage),
                (1, DefectType::BrokenFixture),
                (1, DefectType::PeelingPaint),
            ]
        );
        assert_eq!(score.all_defects.len(), 6);
        assert_eq!(score.all_defects[0].frame_index, 0);
    }

    #[test]
    fn scoring_is_pure() {
        let analyses = vec![
            frame(vec![defect(DefectType::Mold, Severity::High)]),
            frame(vec![defect(DefectType::StaircaseDamage, Severity::Medium)]),
        ];
        assert_eq!(score_property(&analyses), score_property(&analyses));
        assert_eq!(score_frame(&analyses[0]), score_frame(&analyses[0]));
    }
}
