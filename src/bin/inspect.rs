//! inspect - analyze a property walkthrough video or photo
//!
//! Samples the input, sends each frame to the configured defect oracle,
//! writes annotated overlays and `report.json` to the output directory and
//! prints the text report to stdout.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use property_inspect::frame;
use property_inspect::{
    BackendKind, CancelToken, DefectOracle, InspectConfig, Inspection, InspectionReport, Inspector,
    ScriptedOracle,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file, still image, or stub:// source to inspect.
    input: String,
    /// Oracle backend (gemini|tract|stub). Overrides INSPECT_BACKEND.
    #[arg(long)]
    backend: Option<String>,
    /// Preferred model for the hosted backend.
    #[arg(long)]
    model: Option<String>,
    /// Seconds of video between sampled frames.
    #[arg(long)]
    interval: Option<f64>,
    /// Maximum number of frames to analyze.
    #[arg(long)]
    max_frames: Option<usize>,
    /// Output directory for overlays and report.json.
    #[arg(long)]
    out: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let backend = args
        .backend
        .as_deref()
        .map(str::parse::<BackendKind>)
        .transpose()?;
    let cfg = {
        let _stage = ui.stage("Load configuration");
        InspectConfig::load_with(|cfg| {
            if let Some(backend) = backend {
                cfg.backend = backend;
            }
            if let Some(model) = args.model.clone() {
                cfg.gemini.model = model;
            }
            if let Some(interval) = args.interval {
                cfg.sampling.interval_sec = interval;
            }
            if let Some(max_frames) = args.max_frames {
                cfg.sampling.max_frames = max_frames;
            }
            if let Some(out) = args.out.clone() {
                cfg.output_dir = out;
            }
        })?
    };
    log::info!(
        "backend {}, model {}, every {}s, up to {} frames",
        cfg.backend,
        cfg.gemini.model,
        cfg.sampling.interval_sec,
        cfg.sampling.max_frames
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, finishing the current frame");
        handler_token.cancel();
    })
    .context("set Ctrl-C handler")?;

    let mut inspector = {
        let _stage = ui.stage(&format!("Prepare {} backend", cfg.backend));
        Inspector::with_config(build_oracle(&cfg)?, &cfg)?
    };

    let inspection = if frame::is_still_image(Path::new(&args.input)) {
        let image = {
            let _stage = ui.stage("Load image");
            frame::load_image(Path::new(&args.input))?
        };
        let _stage = ui.stage("Analyze image");
        inspector.inspect_image(image)?
    } else {
        let progress = ui.frames("Analyze frames");
        inspector.inspect_video(
            &args.input,
            |done, total| progress.update(done, total),
            Some(&cancel),
        )?
    };
    if inspection.cancelled {
        log::warn!(
            "inspection cancelled; reporting {} completed frames",
            inspection.analyses.len()
        );
    }

    let report = inspection.report();
    {
        let _stage = ui.stage("Write outputs");
        write_outputs(&inspection, &report, &cfg.output_dir)?;
    }

    print!("{}", report.render_text());
    Ok(())
}

fn build_oracle(cfg: &InspectConfig) -> Result<Box<dyn DefectOracle>> {
    match cfg.backend {
        BackendKind::Gemini => gemini_oracle(cfg),
        BackendKind::Tract => tract_oracle(cfg),
        BackendKind::Stub => {
            log::warn!("stub backend: every frame is reported as a clean room");
            Ok(Box::new(ScriptedOracle::new()))
        }
    }
}

#[cfg(feature = "backend-gemini")]
fn gemini_oracle(cfg: &InspectConfig) -> Result<Box<dyn DefectOracle>> {
    let api_key = cfg
        .gemini
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("gemini backend requires GEMINI_API_KEY"))?;
    let oracle = property_inspect::detect::GeminiOracle::new(
        &cfg.gemini.endpoint,
        api_key,
        cfg.gemini.timeout,
    )?;
    Ok(Box::new(oracle))
}

#[cfg(not(feature = "backend-gemini"))]
fn gemini_oracle(_cfg: &InspectConfig) -> Result<Box<dyn DefectOracle>> {
    Err(anyhow!(
        "this build lacks the backend-gemini feature; rebuild with --features backend-gemini"
    ))
}

#[cfg(feature = "backend-tract")]
fn tract_oracle(cfg: &InspectConfig) -> Result<Box<dyn DefectOracle>> {
    let local = &cfg.local_model;
    let oracle = property_inspect::detect::TractOracle::new(
        &local.path,
        local.input_size,
        local.class_names.clone(),
    )?
    .with_thresholds(local.confidence_threshold, local.iou_threshold);
    Ok(Box::new(oracle))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_oracle(_cfg: &InspectConfig) -> Result<Box<dyn DefectOracle>> {
    Err(anyhow!(
        "this build lacks the backend-tract feature; rebuild with --features backend-tract"
    ))
}

fn write_outputs(
    inspection: &Inspection,
    report: &InspectionReport,
    out_dir: &Path,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output dir {}", out_dir.display()))?;

    for index in 0..inspection.samples.len() {
        let Some(overlay) = inspection.annotated(index) else {
            continue;
        };
        let path = out_dir.join(format!("frame_{:03}.png", index));
        overlay
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let report_path = out_dir.join("report.json");
    fs::write(&report_path, report.to_json()?)
        .with_context(|| format!("failed to write {}", report_path.display()))?;
    log::info!(
        "wrote {} overlays and {} to {}",
        inspection.samples.len(),
        report_path.display(),
        out_dir.display()
    );
    Ok(())
}
