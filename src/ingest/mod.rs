//! Frame ingestion.
//!
//! Sources decode frames sequentially; the sampler picks one frame per
//! interval of source time. Only local files and synthetic `stub://` sources
//! are read.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod sampler;

pub use file::{probe, VideoInfo, VideoSource};
pub use sampler::{sample, FrameStream, FALLBACK_FPS};
