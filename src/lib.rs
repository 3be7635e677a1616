//! Property Inspection Kernel
//!
//! Turns walkthrough video or still photographs of a property into a
//! structured defect inventory and a quantitative risk score.
//!
//! # Architecture
//!
//! ```text
//! VideoSource ──sample──▶ SampledFrame ──Orchestrator──▶ FrameAnalysis ──risk──▶ PropertyScore
//!                                          │                  │
//!                                    DefectOracle         annotate / InspectionReport
//! ```
//!
//! - `ingest`: local video, still images and synthetic `stub://` sources; fixed-interval sampling
//! - `detect`: the `DefectOracle` capability and its backends (hosted, local ONNX, scripted)
//! - `orchestrator`: retry, rate-limit backoff and the model fallback chain
//! - `normalize`: turns unreliable oracle output into well-formed `FrameAnalysis` records
//! - `risk`: pure per-frame and per-property scoring
//! - `annotate`: defect overlays
//! - `report`, `session`, `pipeline`: aggregation and end-to-end runs
//!
//! Every frame is processed sequentially on the caller's thread.

pub mod analysis;
pub mod annotate;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod risk;
pub mod session;
pub mod taxonomy;

pub use analysis::{BoundingBox, Defect, FrameAnalysis, RoomCondition};
pub use annotate::annotate;
pub use config::{BackendKind, InspectConfig};
pub use detect::{DefectOracle, OracleKind, OracleResponse, RawDetection, ScriptedOracle};
pub use error::InspectError;
pub use frame::SampledFrame;
pub use ingest::{probe, sample, FrameStream, VideoInfo, VideoSource};
pub use orchestrator::{CancelToken, FailureKind, FailureMode, Orchestrator, RetryPolicy};
pub use pipeline::{Inspection, Inspector};
pub use report::{InspectionMode, InspectionReport};
pub use risk::{score_frame, score_property, FrameScore, PropertyScore, RiskLevel};
pub use session::InspectionHistory;
pub use taxonomy::{DefectType, Severity};
