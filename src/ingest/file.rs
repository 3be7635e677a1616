//! Local video and image sources.
//!
//! `VideoSource::open` picks a decoder from the path:
//! - `stub://video?fps=..&frames=..&width=..&height=..` synthetic frames for tests
//! - `.jpg/.jpeg/.png/.bmp` a single still image
//! - anything else through FFmpeg (feature `ingest-file-ffmpeg`)
//!
//! Remote URL schemes are rejected; only local paths are read.

use std::path::Path;

use anyhow::Result;
use image::{Rgb, RgbImage};
use serde::Serialize;
use url::Url;

use super::sampler::{effective_fps, FrameStream};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegVideo;
use crate::error::InspectError;
use crate::frame;

/// Container metadata reported by `probe`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoInfo {
    pub fps: f64,
    pub total_frames: u64,
    pub duration_sec: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub(crate) fn new(native_fps: Option<f64>, total_frames: u64, width: u32, height: u32) -> Self {
        let fps = effective_fps(native_fps);
        Self {
            fps,
            total_frames,
            duration_sec: total_frames as f64 / fps,
            width,
            height,
        }
    }
}

/// An opened frame source.
pub struct VideoSource {
    path: String,
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticVideo),
    Still(StillImage),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegVideo),
}

impl VideoSource {
    pub fn open(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(InspectError::unreadable(path, "empty path").into());
        }
        let backend = if path.starts_with("stub://") {
            SourceBackend::Synthetic(SyntheticVideo::parse(path)?)
        } else if path.contains("://") {
            return Err(InspectError::unreadable(
                path,
                "only local paths and stub:// sources are supported",
            )
            .into());
        } else if frame::is_still_image(Path::new(path)) {
            SourceBackend::Still(StillImage::open(path)?)
        } else {
            open_container(path)?
        };

        let source = Self {
            path: path.to_string(),
            backend,
        };
        log::info!(
            "opened {} ({} source, {:?} fps)",
            source.path,
            source.kind(),
            source.native_fps()
        );
        Ok(source)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> &'static str {
        match &self.backend {
            SourceBackend::Synthetic(_) => "synthetic",
            SourceBackend::Still(_) => "still",
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(_) => "ffmpeg",
        }
    }

    pub fn info(&self) -> VideoInfo {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.info(),
            SourceBackend::Still(source) => source.info(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.info(),
        }
    }
}

impl FrameStream for VideoSource {
    fn native_fps(&self) -> Option<f64> {
        match &self.backend {
            SourceBackend::Synthetic(source) => Some(source.fps),
            SourceBackend::Still(_) => None,
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.native_fps(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => Ok(source.next_frame()),
            SourceBackend::Still(source) => Ok(source.image.take()),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn skip_frame(&mut self) -> Result<bool> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => Ok(source.skip_frame()),
            SourceBackend::Still(source) => Ok(source.image.take().is_some()),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(source) => Ok(source.next_frame()?.is_some()),
        }
    }
}

/// Report container metadata without sampling.
pub fn probe(path: &str) -> Result<VideoInfo> {
    Ok(VideoSource::open(path)?.info())
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_container(path: &str) -> Result<SourceBackend> {
    if !Path::new(path).is_file() {
        return Err(InspectError::unreadable(path, "no such file").into());
    }
    let video = FfmpegVideo::open(path)
        .map_err(|err| InspectError::unreadable(path, format!("{:#}", err)))?;
    Ok(SourceBackend::Ffmpeg(video))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_container(path: &str) -> Result<SourceBackend> {
    Err(InspectError::unreadable(
        path,
        "video decoding requires the ingest-file-ffmpeg feature",
    )
    .into())
}

// ----------------------------------------------------------------------------
// Still images
// ----------------------------------------------------------------------------

struct StillImage {
    width: u32,
    height: u32,
    image: Option<RgbImage>,
}

impl StillImage {
    fn open(path: &str) -> Result<Self> {
        let image = frame::load_image(Path::new(path))?;
        Ok(Self {
            width: image.width(),
            height: image.height(),
            image: Some(image),
        })
    }

    fn info(&self) -> VideoInfo {
        VideoInfo::new(None, 1, self.width, self.height)
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticVideo {
    fps: f64,
    total_frames: u64,
    width: u32,
    height: u32,
    position: u64,
}

impl SyntheticVideo {
    const DEFAULT_FPS: f64 = 30.0;
    const DEFAULT_FRAMES: u64 = 300;
    const DEFAULT_WIDTH: u32 = 64;
    const DEFAULT_HEIGHT: u32 = 48;

    fn parse(path: &str) -> Result<Self> {
        let url = Url::parse(path).map_err(|err| InspectError::unreadable(path, err))?;
        let mut video = Self {
            fps: Self::DEFAULT_FPS,
            total_frames: Self::DEFAULT_FRAMES,
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            position: 0,
        };
        for (key, value) in url.query_pairs() {
            let bad = || InspectError::unreadable(path, format!("invalid {}={}", key, value));
            match key.as_ref() {
                "fps" => video.fps = value.parse().map_err(|_| bad())?,
                "frames" => video.total_frames = value.parse().map_err(|_| bad())?,
                "width" => video.width = value.parse().map_err(|_| bad())?,
                "height" => video.height = value.parse().map_err(|_| bad())?,
                other => log::debug!("ignoring stub parameter '{}'", other),
            }
        }
        if video.width == 0 || video.height == 0 {
            return Err(InspectError::unreadable(path, "frame dimensions must be non-zero").into());
        }
        Ok(video)
    }

    fn info(&self) -> VideoInfo {
        VideoInfo::new(Some(self.fps), self.total_frames, self.width, self.height)
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        if self.position >= self.total_frames {
            return None;
        }
        let image = synthetic_frame(self.width, self.height, self.position);
        self.position += 1;
        Some(image)
    }

    fn skip_frame(&mut self) -> bool {
        if self.position >= self.total_frames {
            return false;
        }
        self.position += 1;
        true
    }
}

/// Deterministic gradient that shifts with the source position.
pub(crate) fn synthetic_frame(width: u32, height: u32, position: u64) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x as u64 + position) % 256) as u8,
            ((y as u64 + position) % 256) as u8,
            ((position * 7) % 256) as u8,
        ])
    })
}
