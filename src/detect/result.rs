/// Raw output of one oracle call, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum OracleResponse {
    /// Hosted path: text expected to contain a JSON defect document.
    Text(String),
    /// Local path: structured detections in source pixel coordinates.
    Detections(Vec<RawDetection>),
}

/// One local-model detection.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in source pixels.
    pub xyxy: [f32; 4],
}
