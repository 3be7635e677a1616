//! Live-capture history.
//!
//! Camera sessions analyze one still at a time and accumulate the results in
//! an append-only history owned by the caller. Frames, analyses and room names
//! are kept index-aligned.

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::analysis::FrameAnalysis;
use crate::frame::SampledFrame;
use crate::report::{InspectionMode, InspectionReport};
use crate::risk::{score_property, PropertyScore};

#[derive(Debug, Default)]
pub struct InspectionHistory {
    frames: Vec<SampledFrame>,
    analyses: Vec<FrameAnalysis>,
    room_names: Vec<String>,
}

impl InspectionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a capture. Analyses that carry an oracle error are refused so a
    /// failed call never counts as a clean room. A blank `room_name` becomes
    /// `Capture N`.
    pub fn record(
        &mut self,
        image: RgbImage,
        analysis: FrameAnalysis,
        room_name: Option<&str>,
    ) -> Result<usize> {
        if let Some(error) = &analysis.error {
            return Err(anyhow!("capture not recorded, analysis failed: {}", error));
        }
        let index = self.analyses.len();
        let room_name = match room_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Capture {}", index + 1),
        };
        log::info!(
            "recorded capture {} ({}, {} defects)",
            index + 1,
            room_name,
            analysis.defects.len()
        );
        self.frames.push(SampledFrame::new(image, index, 0.0));
        self.analyses.push(analysis);
        self.room_names.push(room_name);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    pub fn frames(&self) -> &[SampledFrame] {
        &self.frames
    }

    pub fn analyses(&self) -> &[FrameAnalysis] {
        &self.analyses
    }

    pub fn room_names(&self) -> &[String] {
        &self.room_names
    }

    pub fn score(&self) -> PropertyScore {
        score_property(&self.analyses)
    }

    pub fn report(&self) -> InspectionReport {
        InspectionReport::build(
            InspectionMode::Camera,
            &self.frames,
            &self.analyses,
            &self.score(),
            &self.room_names,
        )
    }
}
