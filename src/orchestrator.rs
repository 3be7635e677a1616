//! Request orchestrator.
//!
//! Drives a [`DefectOracle`] through an explicit fallback chain of model
//! variants. Each chain entry is a `(model, attempts_remaining)` pair consumed
//! front to back; the chain is exhausted when the queue is empty.
//!
//! Failure handling is decided by [`FailureKind::classify`] on the error text:
//!
//! | kind         | action                                                        |
//! |--------------|---------------------------------------------------------------|
//! | NotFound     | drop the model, advance                                       |
//! | RateLimited  | sleep `base_delay * (attempt + 1)`, retry; advance when spent |
//! | Other        | strict: fail the call. lenient: drop the model, advance       |
//!
//! Exhaustion never fails: it produces a degraded `FrameAnalysis`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use image::RgbImage;

use crate::analysis::{truncate_chars, FrameAnalysis};
use crate::detect::{DefectOracle, OracleKind, OracleResponse};
use crate::error::InspectError;
use crate::normalize;

pub const MAX_RETRIES: u32 = 2;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(12);

pub const DEFAULT_MODEL_CHAIN: [&str; 4] = [
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-pro",
];

const ERROR_EXCERPT_CHARS: usize = 200;

/// Classification of an oracle failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Model unavailable.
    NotFound,
    /// Quota or rate limit; transient.
    RateLimited,
    /// Anything else; not retried.
    Other,
}

impl FailureKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("404") || lower.contains("not found") {
            Self::NotFound
        } else if lower.contains("429") || lower.contains("quota") || lower.contains("resource") {
            Self::RateLimited
        } else {
            Self::Other
        }
    }
}

/// How non-retriable failures are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureMode {
    /// Single-call mode: `Other` failures abort the chain and surface to the caller.
    Strict,
    /// Batch / report mode: `Other` failures advance the chain.
    Lenient,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per model.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: RETRY_BASE_DELAY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainEntry {
    pub model: String,
    pub attempts_remaining: u32,
}

/// Ordered, finite list of model variants still to try.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackChain {
    entries: VecDeque<ChainEntry>,
}

impl FallbackChain {
    /// `preferred` first, then `models` in order with duplicates removed.
    pub fn new<S: AsRef<str>>(preferred: &str, models: &[S], attempts: u32) -> Self {
        let mut entries: VecDeque<ChainEntry> = VecDeque::new();
        let candidates = std::iter::once(preferred).chain(models.iter().map(|m| m.as_ref()));
        for model in candidates {
            let model = model.trim();
            if model.is_empty() || entries.iter().any(|e| e.model == model) {
                continue;
            }
            entries.push_back(ChainEntry {
                model: model.to_string(),
                attempts_remaining: attempts,
            });
        }
        Self { entries }
    }

    pub fn models(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.model.as_str()).collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.entries.is_empty()
    }

    fn front_mut(&mut self) -> Option<&mut ChainEntry> {
        self.entries.front_mut()
    }

    fn advance(&mut self) {
        self.entries.pop_front();
    }
}

/// Cooperative cancellation flag checked between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Sleeper = Box<dyn FnMut(Duration) + Send>;

pub struct Orchestrator<O: DefectOracle> {
    oracle: O,
    models: Vec<String>,
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl<O: DefectOracle> Orchestrator<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            models: DEFAULT_MODEL_CHAIN.iter().map(|m| m.to_string()).collect(),
            policy: RetryPolicy::default(),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the fallback model list.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the blocking sleep used for rate-limit backoff.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + Send + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn chain_for(&self, preferred_model: &str) -> FallbackChain {
        FallbackChain::new(preferred_model, &self.models, self.policy.max_retries.max(1))
    }

    /// Analyze one frame in strict mode.
    ///
    /// Returns `InspectError::OracleFailure` only for a non-retriable failure;
    /// chain exhaustion yields a degraded analysis instead.
    pub fn analyze(&mut self, image: &RgbImage, preferred_model: &str) -> Result<FrameAnalysis> {
        self.analyze_with_mode(image, preferred_model, FailureMode::Strict)
    }

    pub fn analyze_with_mode(
        &mut self,
        image: &RgbImage,
        preferred_model: &str,
        mode: FailureMode,
    ) -> Result<FrameAnalysis> {
        match self.oracle.kind() {
            OracleKind::Hosted => self.run_chain(image, preferred_model, mode),
            OracleKind::Local => self.run_local(image, preferred_model, mode),
        }
    }

    fn run_chain(
        &mut self,
        image: &RgbImage,
        preferred_model: &str,
        mode: FailureMode,
    ) -> Result<FrameAnalysis> {
        let mut chain = self.chain_for(preferred_model);
        let max_attempts = self.policy.max_retries.max(1);
        let mut last_error: Option<String> = None;

        while let Some(entry) = chain.front_mut() {
            let attempt = max_attempts - entry.attempts_remaining;
            let model = entry.model.clone();
            log::debug!(
                "calling {} model '{}' (attempt {}/{})",
                self.oracle.name(),
                model,
                attempt + 1,
                max_attempts
            );

            let err = match self.oracle.analyze(image, &model) {
                Ok(response) => return Ok(normalize_response(response)),
                Err(err) => err,
            };
            let message = format!("{:#}", err);

            match FailureKind::classify(&message) {
                FailureKind::NotFound => {
                    log::warn!("model '{}' unavailable, trying next: {}", model, message);
                    chain.advance();
                }
                FailureKind::RateLimited => {
                    entry.attempts_remaining -= 1;
                    if entry.attempts_remaining > 0 {
                        let wait = self.policy.base_delay * (attempt + 1);
                        log::warn!(
                            "model '{}' rate limited, retrying in {:?}: {}",
                            model,
                            wait,
                            message
                        );
                        (self.sleeper)(wait);
                    } else {
                        log::warn!("model '{}' rate limited, retries spent", model);
                        chain.advance();
                    }
                }
                FailureKind::Other => match mode {
                    FailureMode::Strict => {
                        return Err(InspectError::OracleFailure {
                            model,
                            message,
                        }
                        .into());
                    }
                    FailureMode::Lenient => {
                        log::warn!("model '{}' failed, trying next: {}", model, message);
                        chain.advance();
                    }
                },
            }
            last_error = Some(message);
        }

        let last_error = last_error.unwrap_or_else(|| "no models configured".to_string());
        log::error!("all models exhausted: {}", last_error);
        Ok(exhausted(&last_error))
    }

    fn run_local(
        &mut self,
        image: &RgbImage,
        model: &str,
        mode: FailureMode,
    ) -> Result<FrameAnalysis> {
        match self.oracle.analyze(image, model) {
            Ok(response) => Ok(normalize_response(response)),
            Err(err) => {
                let message = format!("{:#}", err);
                match mode {
                    FailureMode::Strict => Err(InspectError::OracleFailure {
                        model: self.oracle.name().to_string(),
                        message,
                    }
                    .into()),
                    FailureMode::Lenient => {
                        log::warn!("local oracle failed: {}", message);
                        Ok(exhausted(&message))
                    }
                }
            }
        }
    }

    /// Analyze frames in input order, lenient mode, reporting progress after
    /// every frame. A failing frame contributes its degraded analysis.
    pub fn analyze_many<'a, I, F>(
        &mut self,
        frames: I,
        preferred_model: &str,
        progress: F,
    ) -> Vec<FrameAnalysis>
    where
        I: IntoIterator<Item = &'a RgbImage>,
        F: FnMut(usize, usize),
    {
        self.analyze_many_until(frames, preferred_model, progress, None)
    }

    /// Like [`analyze_many`](Self::analyze_many), but stops before the next
    /// frame once `cancel` is set. Returns the analyses completed so far.
    pub fn analyze_many_until<'a, I, F>(
        &mut self,
        frames: I,
        preferred_model: &str,
        mut progress: F,
        cancel: Option<&CancelToken>,
    ) -> Vec<FrameAnalysis>
    where
        I: IntoIterator<Item = &'a RgbImage>,
        F: FnMut(usize, usize),
    {
        let frames: Vec<&RgbImage> = frames.into_iter().collect();
        let total = frames.len();
        let mut results = Vec::with_capacity(total);

        for image in frames {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                log::warn!("batch cancelled after {}/{} frames", results.len(), total);
                break;
            }
            let analysis = self
                .analyze_with_mode(image, preferred_model, FailureMode::Lenient)
                .unwrap_or_else(|err| {
                    let message = format!("{:#}", err);
                    FrameAnalysis::degraded(format!("Analysis failed: {}", message), Some(message))
                });
            results.push(analysis);
            progress(results.len(), total);
        }
        results
    }
}

fn normalize_response(response: OracleResponse) -> FrameAnalysis {
    match response {
        OracleResponse::Text(text) => normalize::parse(&text),
        OracleResponse::Detections(detections) => normalize::from_detections(&detections),
    }
}

fn exhausted(last_error: &str) -> FrameAnalysis {
    FrameAnalysis::degraded(
        format!(
            "API error after retries: {}. Check the API key quota or wait a minute before retrying.",
            truncate_chars(last_error, ERROR_EXCERPT_CHARS)
        ),
        Some(last_error.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RoomCondition;
    use crate::detect::{RawDetection, ScriptedOracle};
    use crate::taxonomy::DefectType;
    use std::sync::Mutex;

    const CRACK: &str = r#"{"defects": [{"type": "wall_crack", "severity": "high", "bbox": [0, 0, 10, 10]}], "room_condition": "fair", "summary": "Crack."}"#;

    fn recording(oracle: ScriptedOracle) -> (Orchestrator<ScriptedOracle>, Arc<Mutex<Vec<Duration>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let sink = sleeps.clone();
        let orchestrator = Orchestrator::new(oracle)
            .with_models(vec!["m1".into(), "m2".into(), "m3".into()])
            .with_sleeper(move |d| sink.lock().unwrap().push(d));
        (orchestrator, sleeps)
    }

    fn image() -> RgbImage {
        RgbImage::new(8, 8)
    }

    #[test]
    fn classifies_failures_by_message() {
        assert_eq!(FailureKind::classify("HTTP 404: model"), FailureKind::NotFound);
        assert_eq!(FailureKind::classify("Model Not Found"), FailureKind::NotFound);
        assert_eq!(FailureKind::classify("HTTP 429"), FailureKind::RateLimited);
        assert_eq!(FailureKind::classify("Quota exceeded"), FailureKind::RateLimited);
        assert_eq!(
            FailureKind::classify("RESOURCE_EXHAUSTED"),
            FailureKind::RateLimited
        );
        assert_eq!(FailureKind::classify("HTTP 500: boom"), FailureKind::Other);
    }

    #[test]
    fn chain_moves_preferred_model_to_front() {
        let chain = FallbackChain::new("b", &["a", "b", "c", "a"], 2);
        assert_eq!(chain.models(), vec!["b", "a", "c"]);
        assert!(!chain.is_exhausted());
    }

    #[test]
    fn first_success_is_normalized() {
        let (mut orch, sleeps) = recording(ScriptedOracle::new().then_text(CRACK));
        let analysis = orch.analyze(&image(), "m1").unwrap();
        assert_eq!(analysis.defects.len(), 1);
        assert_eq!(analysis.defects[0].defect_type, DefectType::WallCrack);
        assert_eq!(orch.oracle().calls(), ["m1"]);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn not_found_advances_immediately() {
        let oracle = ScriptedOracle::new()
            .then_error("HTTP 404 from model 'm2'")
            .then_text(CRACK);
        let (mut orch, sleeps) = recording(oracle);
        let analysis = orch.analyze(&image(), "m2").unwrap();
        assert_eq!(analysis.defects.len(), 1);
        assert_eq!(orch.oracle().calls(), ["m2", "m1"]);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn rate_limit_retries_same_model_with_backoff() {
        let oracle = ScriptedOracle::new()
            .then_error("HTTP 429: quota")
            .then_text(CRACK);
        let (mut orch, sleeps) = recording(oracle);
        orch.analyze(&image(), "m1").unwrap();
        assert_eq!(orch.oracle().calls(), ["m1", "m1"]);
        assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_secs(12)]);
    }

    #[test]
    fn rate_limit_exhaustion_advances_without_final_sleep() {
        let oracle = ScriptedOracle::new()
            .then_error("429")
            .then_error("429")
            .then_text(CRACK);
        let (mut orch, sleeps) = recording(oracle);
        orch.analyze(&image(), "m1").unwrap();
        assert_eq!(orch.oracle().calls(), ["m1", "m1", "m2"]);
        assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_secs(12)]);
    }

    #[test]
    fn other_failure_is_fatal_in_strict_mode() {
        let (mut orch, _) = recording(ScriptedOracle::new().then_error("HTTP 500: internal"));
        let err = orch.analyze(&image(), "m1").unwrap_err();
        match err.downcast_ref::<InspectError>() {
            Some(InspectError::OracleFailure { model, message }) => {
                assert_eq!(model, "m1");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(orch.oracle().calls(), ["m1"]);
    }

    #[test]
    fn other_failure_advances_in_lenient_mode() {
        let oracle = ScriptedOracle::new()
            .then_error("HTTP 500: internal")
            .then_text(CRACK);
        let (mut orch, _) = recording(oracle);
        let analysis = orch
            .analyze_with_mode(&image(), "m1", FailureMode::Lenient)
            .unwrap();
        assert_eq!(analysis.defects.len(), 1);
        assert_eq!(orch.oracle().calls(), ["m1", "m2"]);
    }

    #[test]
    fn exhaustion_returns_degraded_analysis() {
        let long = format!("HTTP 429: {}", "q".repeat(400));
        let oracle = ScriptedOracle::new().without_fallback();
        let oracle = (0..6).fold(oracle, |o, _| o.then_error(long.clone()));
        let (mut orch, sleeps) = recording(oracle);
        let analysis = orch.analyze(&image(), "m1").unwrap();

        assert!(analysis.defects.is_empty());
        assert_eq!(analysis.room_condition, RoomCondition::Unknown);
        assert_eq!(analysis.error.as_deref(), Some(long.as_str()));
        assert!(analysis
            .summary
            .contains(truncate_chars(&long, ERROR_EXCERPT_CHARS)));
        assert!(!analysis.summary.contains(&long));
        assert_eq!(orch.oracle().calls().len(), 6);
        assert_eq!(sleeps.lock().unwrap().len(), 3);
    }

    #[test]
    fn local_oracle_skips_chain() {
        let oracle = ScriptedOracle::local().then_response(OracleResponse::Detections(vec![
            RawDetection {
                class_id: 0,
                class_name: "mold".into(),
                confidence: 0.9,
                xyxy: [1.0, 1.0, 4.0, 4.0],
            },
        ]));
        let (mut orch, _) = recording(oracle.then_error("429"));
        let first = orch.analyze(&image(), "ignored").unwrap();
        assert_eq!(first.defects[0].defect_type, DefectType::Mold);

        let degraded = orch
            .analyze_with_mode(&image(), "ignored", FailureMode::Lenient)
            .unwrap();
        assert!(degraded.is_degraded());
        assert_eq!(orch.oracle().calls().len(), 2);
    }

    #[test]
    fn batch_reports_progress_and_never_aborts() {
        let oracle = ScriptedOracle::new()
            .then_text(CRACK)
            .then_error("HTTP 500: boom")
            .then_error("HTTP 500: boom")
            .then_error("HTTP 500: boom")
            .then_text("not json at all");
        let (mut orch, _) = recording(oracle);
        let frames = vec![image(), image(), image()];
        let mut seen = Vec::new();
        let results = orch.analyze_many(&frames, "m1", |done, total| seen.push((done, total)));

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].defects.len(), 1);
        assert!(results[1].is_degraded());
        assert!(results[2].summary.starts_with("Could not parse AI response."));
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn cancelled_batch_stops_between_frames() {
        let (mut orch, _) = recording(ScriptedOracle::new());
        let frames = vec![image(), image(), image()];
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut seen = Vec::new();
        let results = orch.analyze_many_until(
            &frames,
            "m1",
            |done, total| {
                seen.push((done, total));
                if done == 2 {
                    trigger.cancel();
                }
            },
            Some(&cancel),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(seen, vec![(1, 3), (2, 3)]);
    }
}
