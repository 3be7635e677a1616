#![cfg(feature = "backend-gemini")]

use std::io::Cursor;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::analysis::truncate_chars;
use crate::detect::backend::{DefectOracle, OracleKind};
use crate::detect::result::OracleResponse;

pub const DEFAULT_ENDPOINT: &str = crate::config::DEFAULT_GEMINI_ENDPOINT;

const TEMPERATURE: f32 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 4096;
const MAX_ERROR_BODY_CHARS: usize = 2048;

const INSPECTION_PROMPT: &str = r#"You are an expert property / building inspector.
Analyze the provided image for ANY building or property defects.

Defect categories you MUST check for:
- structural_crack: major cracks in load-bearing walls, beams, columns, foundation
- wall_crack: surface cracks on walls (hairline, diagonal, horizontal, vertical)
- ceiling_crack: cracks or sagging in ceilings
- floor_damage: cracked tiles, damaged flooring, uneven surfaces
- water_damage: water stains, dampness, leakage marks, wet patches, water seepage
- mold: mold spots, mildew, fungal growth (dark patches, green/black spots)
- peeling_paint: paint peeling, bubbling, flaking, discoloration
- electrical_hazard: damaged switches, outlets, sparking, burn marks
- exposed_wiring: visible/exposed electrical wires not properly insulated
- broken_fixture: broken door handles, taps, railings, fittings, light fixtures
- plumbing_issue: leaking pipes, damaged taps, blocked drains, rust on pipes
- window_damage: cracked glass, damaged window frames, broken locks
- staircase_damage: damaged steps, broken railings, uneven treads
- other: any other property defect not in the above list

For EACH defect found, return:
- "type": one of the category keys above
- "severity": "critical" | "high" | "medium" | "low"
- "description": one sentence describing the specific defect
- "bbox": [y_min, x_min, y_max, x_max] as integers 0-1000 (normalized coords)

Also provide:
- "room_condition": "good" | "fair" | "poor" | "critical"
- "summary": 2-3 sentence professional summary of findings

Rules:
- Only report real defects. Do not flag normal building features (windows, doors, furniture).
- If no defects are found, return an empty defects list and say the room is in good condition.
- Bounding boxes must tightly surround only the defect, not the whole image.

Return ONLY valid JSON in this format:
{
  "defects": [
    {"type": "wall_crack", "severity": "high",
     "description": "Diagonal crack approximately 30cm long on the upper left wall",
     "bbox": [50, 100, 200, 300]}
  ],
  "room_condition": "poor",
  "summary": "The room shows significant wall damage."
}"#;

/// Hosted multimodal oracle speaking the Generative Language REST API.
pub struct GeminiOracle {
    agent: ureq::Agent,
    endpoint: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiOracle {
    pub fn new(endpoint: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(anyhow!("gemini backend requires an API key"));
        }
        let mut endpoint = Url::parse(endpoint).context("parse gemini endpoint")?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            endpoint,
            api_key,
        })
    }

    fn request_url(&self, model: &str) -> Result<Url> {
        self.endpoint
            .join(&format!("models/{}:generateContent", model))
            .with_context(|| format!("build request url for model '{}'", model))
    }

    fn request_body(image: &RgbImage) -> Result<serde_json::Value> {
        let mut jpeg = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut jpeg, ImageFormat::Jpeg)
            .context("encode frame as jpeg")?;
        let data = BASE64.encode(jpeg.into_inner());

        Ok(json!({
            "contents": [{
                "parts": [
                    {"text": INSPECTION_PROMPT},
                    {"inline_data": {"mime_type": "image/jpeg", "data": data}}
                ]
            }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
                "responseMimeType": "application/json"
            }
        }))
    }
}

impl DefectOracle for GeminiOracle {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn kind(&self) -> OracleKind {
        OracleKind::Hosted
    }

    fn analyze(&mut self, image: &RgbImage, model: &str) -> Result<OracleResponse> {
        let url = self.request_url(model)?;
        let body = Self::request_body(image)?;

        let response = match self
            .agent
            .post(url.as_str())
            .set("x-goog-api-key", &self.api_key)
            .send_json(body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                return Err(anyhow!(
                    "HTTP {}: {} (model '{}')",
                    code,
                    truncate_chars(&text, MAX_ERROR_BODY_CHARS),
                    model
                ));
            }
            Err(err) => return Err(anyhow!("request to model '{}' failed: {}", model, err)),
        };

        let parsed: GenerateResponse = response
            .into_json()
            .context("decode generateContent response")?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        log::debug!("model '{}' answered with {} bytes", model, text.len());
        Ok(OracleResponse::Text(text))
    }
}
