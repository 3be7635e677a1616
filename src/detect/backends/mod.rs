#[cfg(feature = "backend-gemini")]
pub mod gemini;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

#[cfg(feature = "backend-gemini")]
pub use gemini::GeminiOracle;
pub use stub::ScriptedOracle;

#[cfg(feature = "backend-tract")]
pub use tract::TractOracle;
