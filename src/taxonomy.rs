//! Defect taxonomy.
//!
//! The set of recognized defect types is fixed at build time. Each type carries
//! static metadata used by scoring (weight), reporting (label, priority tier)
//! and overlays (color). Strings that do not name a known type map to
//! [`DefectType::Other`]; strings that do not name a known severity map to
//! [`Severity::Medium`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Recognized defect categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectType {
    StructuralCrack,
    WallCrack,
    CeilingCrack,
    FloorDamage,
    WaterDamage,
    Mold,
    PeelingPaint,
    ElectricalHazard,
    ExposedWiring,
    BrokenFixture,
    PlumbingIssue,
    WindowDamage,
    StaircaseDamage,
    Other,
}

/// Static per-type metadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DefectMeta {
    pub label: &'static str,
    /// Base severity weight in `[0, 1]`.
    pub weight: f64,
    pub priority: Severity,
    /// Overlay color (RGB).
    pub color: [u8; 3],
}

impl DefectType {
    pub const ALL: [DefectType; 14] = [
        DefectType::StructuralCrack,
        DefectType::WallCrack,
        DefectType::CeilingCrack,
        DefectType::FloorDamage,
        DefectType::WaterDamage,
        DefectType::Mold,
        DefectType::PeelingPaint,
        DefectType::ElectricalHazard,
        DefectType::ExposedWiring,
        DefectType::BrokenFixture,
        DefectType::PlumbingIssue,
        DefectType::WindowDamage,
        DefectType::StaircaseDamage,
        DefectType::Other,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::StructuralCrack => "structural_crack",
            Self::WallCrack => "wall_crack",
            Self::CeilingCrack => "ceiling_crack",
            Self::FloorDamage => "floor_damage",
            Self::WaterDamage => "water_damage",
            Self::Mold => "mold",
            Self::PeelingPaint => "peeling_paint",
            Self::ElectricalHazard => "electrical_hazard",
            Self::ExposedWiring => "exposed_wiring",
            Self::BrokenFixture => "broken_fixture",
            Self::PlumbingIssue => "plumbing_issue",
            Self::WindowDamage => "window_damage",
            Self::StaircaseDamage => "staircase_damage",
            Self::Other => "other",
        }
    }

    /// Exact key lookup. Returns `None` for unrecognized keys.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.key() == key)
    }

    /// Lenient lookup used on oracle output: unknown keys become `Other`.
    pub fn normalize(key: &str) -> Self {
        Self::from_key(key).unwrap_or(Self::Other)
    }

    pub fn meta(self) -> DefectMeta {
        use Severity::*;
        let (label, weight, priority, color) = match self {
            Self::StructuralCrack => ("Structural Crack", 0.95, Critical, [220, 0, 0]),
            Self::WallCrack => ("Wall Crack", 0.80, High, [255, 50, 0]),
            Self::CeilingCrack => ("Ceiling Crack", 0.85, High, [255, 80, 0]),
            Self::FloorDamage => ("Floor / Tile Damage", 0.70, High, [255, 120, 0]),
            Self::WaterDamage => ("Water Leakage / Dampness", 0.90, Critical, [0, 100, 200]),
            Self::Mold => ("Mold / Fungal Growth", 0.85, High, [0, 150, 0]),
            Self::PeelingPaint => ("Paint Deterioration", 0.40, Medium, [200, 200, 0]),
            Self::ElectricalHazard => ("Electrical Hazard", 1.00, Critical, [255, 0, 0]),
            Self::ExposedWiring => ("Exposed Wiring", 1.00, Critical, [255, 0, 0]),
            Self::BrokenFixture => ("Broken Fixture", 0.55, Medium, [180, 0, 180]),
            Self::PlumbingIssue => ("Plumbing Issue", 0.75, High, [0, 100, 200]),
            Self::WindowDamage => ("Window / Door Damage", 0.50, Medium, [0, 150, 150]),
            Self::StaircaseDamage => ("Staircase Damage", 0.80, High, [200, 0, 100]),
            Self::Other => ("Other Defect", 0.30, Low, [128, 128, 128]),
        };
        DefectMeta {
            label,
            weight,
            priority,
            color,
        }
    }

    pub fn label(self) -> &'static str {
        self.meta().label
    }

    pub fn weight(self) -> f64 {
        self.meta().weight
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Finding severity. Variant order gives the total order (`Critical` highest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str_exact(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Lenient lookup used on oracle output: anything unrecognized is `Medium`.
    pub fn normalize(value: &str) -> Self {
        Self::from_str_exact(value).unwrap_or(Self::Medium)
    }

    /// Score multiplier applied to a type's base weight.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.75,
            Self::Medium => 0.5,
            Self::Low => 0.25,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
