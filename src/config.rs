use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::orchestrator::{RetryPolicy, DEFAULT_MODEL_CHAIN, MAX_RETRIES, RETRY_BASE_DELAY};
use crate::taxonomy::DefectType;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FRAME_INTERVAL_SEC: f64 = 2.0;
const DEFAULT_MAX_FRAMES: usize = 30;
const DEFAULT_MODEL_PATH: &str = "models/defects.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_OUTPUT_DIR: &str = "inspection_out";

/// Which oracle answers defect queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted multimodal model.
    Gemini,
    /// Local ONNX detector.
    Tract,
    /// Offline scripted oracle that reports clean rooms.
    Stub,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "tract" => Ok(Self::Tract),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!(
                "unknown backend '{}' (expected gemini, tract or stub)",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gemini => "gemini",
            Self::Tract => "tract",
            Self::Stub => "stub",
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct InspectConfigFile {
    backend: Option<BackendKind>,
    gemini: Option<GeminiConfigFile>,
    retry: Option<RetryConfigFile>,
    sampling: Option<SamplingConfigFile>,
    local_model: Option<LocalModelConfigFile>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct GeminiConfigFile {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    fallback_models: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RetryConfigFile {
    max_retries: Option<u32>,
    base_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    interval_sec: Option<f64>,
    max_frames: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct LocalModelConfigFile {
    path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    class_names: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct InspectConfig {
    pub backend: BackendKind,
    pub gemini: GeminiSettings,
    pub retry: RetryPolicy,
    pub sampling: SamplingSettings,
    pub local_model: LocalModelSettings,
    pub output_dir: PathBuf,
}

#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Preferred model; tried first.
    pub model: String,
    pub fallback_models: Vec<String>,
    pub timeout: Duration,
}

// The API key stays out of debug output.
impl fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("fallback_models", &self.fallback_models)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SamplingSettings {
    pub interval_sec: f64,
    pub max_frames: usize,
}

#[derive(Debug, Clone)]
pub struct LocalModelSettings {
    pub path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub class_names: Vec<String>,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self::from_file(InspectConfigFile::default())
    }
}

impl InspectConfig {
    /// Read the file named by `INSPECT_CONFIG` (if set), apply environment
    /// overrides, then validate.
    pub fn load() -> Result<Self> {
        Self::load_with(|_| {})
    }

    /// Like `load`, with caller overrides (command-line flags) applied after
    /// the environment and before validation.
    pub fn load_with(overrides: impl FnOnce(&mut Self)) -> Result<Self> {
        let config_path = std::env::var("INSPECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        overrides(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InspectConfigFile) -> Self {
        let gemini = file.gemini.unwrap_or_default();
        let retry = file.retry.unwrap_or_default();
        let sampling = file.sampling.unwrap_or_default();
        let local = file.local_model.unwrap_or_default();

        Self {
            backend: file.backend.unwrap_or(BackendKind::Gemini),
            gemini: GeminiSettings {
                api_key: gemini.api_key.filter(|key| !key.trim().is_empty()),
                endpoint: gemini
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
                model: gemini
                    .model
                    .unwrap_or_else(|| DEFAULT_MODEL_CHAIN[0].to_string()),
                fallback_models: gemini.fallback_models.unwrap_or_else(|| {
                    DEFAULT_MODEL_CHAIN.iter().map(|m| m.to_string()).collect()
                }),
                timeout: Duration::from_secs(gemini.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            },
            retry: RetryPolicy {
                max_retries: retry.max_retries.unwrap_or(MAX_RETRIES),
                base_delay: retry
                    .base_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(RETRY_BASE_DELAY),
            },
            sampling: SamplingSettings {
                interval_sec: sampling.interval_sec.unwrap_or(DEFAULT_FRAME_INTERVAL_SEC),
                max_frames: sampling.max_frames.unwrap_or(DEFAULT_MAX_FRAMES),
            },
            local_model: LocalModelSettings {
                path: local
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: local.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: local
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                iou_threshold: local.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                class_names: local.class_names.unwrap_or_else(|| {
                    DefectType::ALL.iter().map(|t| t.key().to_string()).collect()
                }),
            },
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(backend) = non_empty_var("INSPECT_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(key) = non_empty_var("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(model) = non_empty_var("INSPECT_MODEL") {
            self.gemini.model = model;
        }
        if let Some(delay) = non_empty_var("INSPECT_RETRY_BASE_DELAY_SECS") {
            let seconds: u64 = delay.parse().map_err(|_| {
                anyhow!("INSPECT_RETRY_BASE_DELAY_SECS must be an integer number of seconds")
            })?;
            self.retry.base_delay = Duration::from_secs(seconds);
        }
        if let Some(interval) = non_empty_var("INSPECT_FRAME_INTERVAL") {
            self.sampling.interval_sec = interval
                .parse()
                .map_err(|_| anyhow!("INSPECT_FRAME_INTERVAL must be a number of seconds"))?;
        }
        if let Some(max_frames) = non_empty_var("INSPECT_MAX_FRAMES") {
            self.sampling.max_frames = max_frames
                .parse()
                .map_err(|_| anyhow!("INSPECT_MAX_FRAMES must be a positive integer"))?;
        }
        if let Some(path) = non_empty_var("INSPECT_MODEL_PATH") {
            self.local_model.path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty_var("INSPECT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Check invariants. Called by `load`.
    pub fn validate(&self) -> Result<()> {
        if !self.sampling.interval_sec.is_finite() || self.sampling.interval_sec <= 0.0 {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        if self.sampling.max_frames == 0 {
            return Err(anyhow!("max frames must be at least 1"));
        }
        if self.retry.max_retries == 0 {
            return Err(anyhow!("max retries must be at least 1"));
        }
        for (name, value) in [
            ("confidence threshold", self.local_model.confidence_threshold),
            ("iou threshold", self.local_model.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.local_model.input_size == 0 {
            return Err(anyhow!("local model input size must be greater than zero"));
        }
        if self.gemini.model.trim().is_empty() {
            return Err(anyhow!("model name must not be empty"));
        }
        if self.backend == BackendKind::Gemini && self.gemini.api_key.is_none() {
            return Err(anyhow!(
                "gemini backend requires an API key (set GEMINI_API_KEY or gemini.api_key)"
            ));
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<InspectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = InspectConfig::default();
        assert_eq!(cfg.backend, BackendKind::Gemini);
        assert_eq!(cfg.gemini.model, "gemini-2.5-flash");
        assert_eq!(cfg.gemini.fallback_models.len(), 4);
        assert_eq!(cfg.gemini.timeout, Duration::from_secs(120));
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.retry.base_delay, Duration::from_secs(12));
        assert_eq!(cfg.sampling.interval_sec, 2.0);
        assert_eq!(cfg.sampling.max_frames, 30);
        assert_eq!(cfg.local_model.class_names.len(), 14);
        assert_eq!(cfg.local_model.class_names[0], "structural_crack");
        assert_eq!(cfg.output_dir, PathBuf::from("inspection_out"));
    }

    #[test]
    fn default_gemini_config_needs_a_key() {
        let mut cfg = InspectConfig::default();
        assert!(cfg.validate().is_err());
        cfg.gemini.api_key = Some("k".into());
        assert!(cfg.validate().is_ok());
        cfg.backend = BackendKind::Stub;
        cfg.gemini.api_key = None;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_ranges() {
        let base = InspectConfig {
            backend: BackendKind::Stub,
            ..InspectConfig::default()
        };

        let mut cfg = base.clone();
        cfg.sampling.interval_sec = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.sampling.max_frames = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.retry.max_retries = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.local_model.iou_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("Tract".parse::<BackendKind>().unwrap(), BackendKind::Tract);
        assert_eq!(" stub ".parse::<BackendKind>().unwrap(), BackendKind::Stub);
        assert!("opencv".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Gemini.to_string(), "gemini");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let mut cfg = InspectConfig::default();
        cfg.gemini.api_key = Some("secret-key".into());
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }
}
