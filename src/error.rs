use thiserror::Error;

/// Failures that callers are expected to act on.
///
/// Everything else inside the kernel travels as `anyhow::Error`; these variants
/// are wrapped in it and can be recovered with `downcast_ref::<InspectError>()`.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The video or image source could not be opened or decoded.
    #[error("source unreadable: {source_path}: {reason}")]
    SourceUnreadable { source_path: String, reason: String },

    /// A non-retriable oracle failure raised while analyzing in strict mode.
    #[error("oracle failure on model '{model}': {message}")]
    OracleFailure { model: String, message: String },
}

impl InspectError {
    pub fn unreadable(source_path: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnreadable {
            source_path: source_path.into(),
            reason: reason.to_string(),
        }
    }
}
