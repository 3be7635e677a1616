//! End-to-end inspection: sample, analyze, score.

use anyhow::Result;
use image::RgbImage;

use crate::analysis::FrameAnalysis;
use crate::annotate::annotate;
use crate::config::{InspectConfig, SamplingSettings};
use crate::detect::DefectOracle;
use crate::frame::SampledFrame;
use crate::ingest::{sample, VideoSource};
use crate::orchestrator::{CancelToken, Orchestrator};
use crate::report::{InspectionMode, InspectionReport};
use crate::risk::{score_property, PropertyScore};

/// Result of one inspection run. `samples`, `analyses` and
/// `score.frame_scores` are index-aligned.
#[derive(Debug)]
pub struct Inspection {
    pub mode: InspectionMode,
    pub samples: Vec<SampledFrame>,
    pub analyses: Vec<FrameAnalysis>,
    pub score: PropertyScore,
    /// Set when the run stopped early; only completed frames are kept.
    pub cancelled: bool,
}

impl Inspection {
    /// Overlay for frame `index`, if it exists.
    pub fn annotated(&self, index: usize) -> Option<RgbImage> {
        let sample = self.samples.get(index)?;
        let analysis = self.analyses.get(index)?;
        Some(annotate(&sample.image, analysis))
    }

    pub fn failed_frames(&self) -> usize {
        self.analyses.iter().filter(|a| a.is_degraded()).count()
    }

    pub fn report(&self) -> InspectionReport {
        InspectionReport::build(self.mode, &self.samples, &self.analyses, &self.score, &[])
    }
}

pub struct Inspector<O: DefectOracle> {
    orchestrator: Orchestrator<O>,
    model: String,
    sampling: SamplingSettings,
}

impl<O: DefectOracle> Inspector<O> {
    /// Build from configuration: model chain, retry policy and sampling
    /// settings all come from `config`.
    pub fn with_config(oracle: O, config: &InspectConfig) -> Result<Self> {
        let orchestrator = Orchestrator::new(oracle)
            .with_models(config.gemini.fallback_models.clone())
            .with_policy(config.retry);
        Self::from_orchestrator(
            orchestrator,
            config.gemini.model.clone(),
            config.sampling.clone(),
        )
    }

    /// Wrap a prepared orchestrator. The oracle is warmed up here so the first
    /// frame does not pay for model loading.
    pub fn from_orchestrator(
        mut orchestrator: Orchestrator<O>,
        model: impl Into<String>,
        sampling: SamplingSettings,
    ) -> Result<Self> {
        orchestrator.oracle_mut().warm_up()?;
        Ok(Self {
            orchestrator,
            model: model.into(),
            sampling,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn orchestrator(&self) -> &Orchestrator<O> {
        &self.orchestrator
    }

    /// Sample a video, analyze every sample and score the property.
    ///
    /// `progress(done, total)` is called after each frame. When `cancel` is
    /// set between frames the run stops and returns what it has.
    pub fn inspect_video<F>(
        &mut self,
        path: &str,
        progress: F,
        cancel: Option<&CancelToken>,
    ) -> Result<Inspection>
    where
        F: FnMut(usize, usize),
    {
        let mut source = VideoSource::open(path)?;
        let info = source.info();
        log::info!(
            "{}: {:.1}s at {:.2} fps, {}x{}",
            source.path(),
            info.duration_sec,
            info.fps,
            info.width,
            info.height
        );
        let samples = sample(
            &mut source,
            self.sampling.interval_sec,
            self.sampling.max_frames,
        )?;
        log::info!("sampled {} frames from {}", samples.len(), path);
        Ok(self.inspect_samples(InspectionMode::Video, samples, progress, cancel))
    }

    /// Analyze a set of already sampled frames in lenient mode.
    pub fn inspect_samples<F>(
        &mut self,
        mode: InspectionMode,
        mut samples: Vec<SampledFrame>,
        progress: F,
        cancel: Option<&CancelToken>,
    ) -> Inspection
    where
        F: FnMut(usize, usize),
    {
        let analyses = self.orchestrator.analyze_many_until(
            samples.iter().map(|s| &s.image),
            &self.model,
            progress,
            cancel,
        );
        let cancelled = analyses.len() < samples.len();
        samples.truncate(analyses.len());
        let score = score_property(&analyses);
        log::info!(
            "scored {} frames: {:.1}/100 ({})",
            analyses.len(),
            score.overall_score,
            score.risk_level
        );
        Inspection {
            mode,
            samples,
            analyses,
            score,
            cancelled,
        }
    }

    /// Analyze a single still image in strict mode. A non-retriable oracle
    /// failure is returned as `InspectError::OracleFailure`.
    pub fn inspect_image(&mut self, image: RgbImage) -> Result<Inspection> {
        let analysis = self.orchestrator.analyze(&image, &self.model)?;
        let analyses = vec![analysis];
        let score = score_property(&analyses);
        Ok(Inspection {
            mode: InspectionMode::Image,
            samples: vec![SampledFrame::still(image)],
            analyses,
            score,
            cancelled: false,
        })
    }

    /// Analyze one capture for a live session. Strict, like `inspect_image`,
    /// but returns the bare analysis for an `InspectionHistory`.
    pub fn analyze_capture(&mut self, image: &RgbImage) -> Result<FrameAnalysis> {
        self.orchestrator.analyze(image, &self.model)
    }
}
