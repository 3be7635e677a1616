mod backend;
mod backends;
mod result;

pub use backend::{DefectOracle, OracleKind};
#[cfg(feature = "backend-gemini")]
pub use backends::GeminiOracle;
pub use backends::ScriptedOracle;
#[cfg(feature = "backend-tract")]
pub use backends::TractOracle;
pub use result::{OracleResponse, RawDetection};
