use anyhow::Result;
use image::RgbImage;

use crate::detect::result::OracleResponse;

/// How an oracle is reached, which decides whether the fallback chain applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleKind {
    /// Network service addressed by model identifier. Calls may be retried and
    /// routed through the fallback chain.
    Hosted,
    /// In-process model. One call per frame, no retry.
    Local,
}

/// Defect detection capability.
///
/// The kernel treats implementations as opaque: an image goes in, unstructured
/// text or structured detections come out. Everything that makes the result
/// usable (retry, fallback, normalization, scoring) lives outside this trait.
///
/// Error messages matter: the orchestrator classifies failures by their text
/// (`404`/`not found`, `429`/`quota`/`resource`), so implementations should
/// keep the transport's status code and body in the message.
pub trait DefectOracle: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn kind(&self) -> OracleKind;

    /// Analyze one frame with the given model variant.
    ///
    /// Local oracles ignore `model`. Implementations must not retain the image
    /// beyond the call.
    fn analyze(&mut self, image: &RgbImage, model: &str) -> Result<OracleResponse>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: DefectOracle + ?Sized> DefectOracle for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn kind(&self) -> OracleKind {
        (**self).kind()
    }

    fn analyze(&mut self, image: &RgbImage, model: &str) -> Result<OracleResponse> {
        (**self).analyze(image, model)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
