use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::{DefectOracle, OracleKind};
use crate::detect::result::OracleResponse;

/// Scripted oracle for tests and offline runs.
///
/// Replays queued outcomes in order; once the queue is empty it keeps
/// answering with the fallback response. Every call is recorded with the model
/// it was addressed to.
pub struct ScriptedOracle {
    kind: OracleKind,
    script: VecDeque<Result<OracleResponse, String>>,
    fallback: Option<OracleResponse>,
    calls: Vec<String>,
}

/// Response used when nothing else is scripted: a clean room.
pub const CLEAN_ROOM_RESPONSE: &str =
    r#"{"defects": [], "room_condition": "good", "summary": "No defects detected."}"#;

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            kind: OracleKind::Hosted,
            script: VecDeque::new(),
            fallback: Some(OracleResponse::Text(CLEAN_ROOM_RESPONSE.to_string())),
            calls: Vec::new(),
        }
    }

    /// Local-kind oracle (no fallback chain).
    pub fn local() -> Self {
        Self {
            kind: OracleKind::Local,
            ..Self::new()
        }
    }

    /// Queue a successful text response.
    pub fn then_text(mut self, text: impl Into<String>) -> Self {
        self.script.push_back(Ok(OracleResponse::Text(text.into())));
        self
    }

    /// Queue a successful response of any shape.
    pub fn then_response(mut self, response: OracleResponse) -> Self {
        self.script.push_back(Ok(response));
        self
    }

    /// Queue a failure with the given message.
    pub fn then_error(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }

    /// Fail every call once the script is exhausted.
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    /// Models addressed so far, in call order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl DefectOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn kind(&self) -> OracleKind {
        self.kind
    }

    fn analyze(&mut self, _image: &RgbImage, model: &str) -> Result<OracleResponse> {
        self.calls.push(model.to_string());
        match self.script.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted oracle has no response left")),
        }
    }
}
