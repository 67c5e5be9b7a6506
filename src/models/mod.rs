use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One detected change between the two design versions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignChange {
    /// layout, colors, typography, spacing, content, components or effects
    pub category: String,
    #[serde(default)]
    pub description_en: String,
    #[serde(default)]
    pub description_ar: String,
    /// minor, moderate or major
    pub severity: String,
    /// Where in the design the change sits
    #[serde(default)]
    pub location: Option<String>,
    /// What the designer needs to do next
    #[serde(default)]
    pub action_required: Option<String>,
}

/// Structured analysis produced by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnalysisData {
    /// 0-100 similarity percentage
    #[serde(default)]
    pub similarity_score: f64,
    #[serde(default)]
    pub summary_en: String,
    #[serde(default)]
    pub summary_ar: String,
    #[serde(default, alias = "changes")]
    pub changes_detected: Vec<DesignChange>,
    #[serde(default)]
    pub designer_notes_en: Vec<String>,
    #[serde(default)]
    pub designer_notes_ar: Vec<String>,
    #[serde(default)]
    pub next_steps_en: Vec<String>,
    #[serde(default)]
    pub next_steps_ar: Vec<String>,
    /// Kept for wire compatibility; nothing is persisted, so always null
    #[serde(default)]
    pub analysis_id: Option<String>,
}

/// Envelope returned by the analysis endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub data: AnalysisData,
    pub error: Option<String>,
}

impl AnalysisResponse {
    /// Successful analysis envelope stamped with the current time
    pub fn success(data: AnalysisData) -> Self {
        Self {
            success: true,
            timestamp: Utc::now(),
            data,
            error: None,
        }
    }
}

/// Request body for `POST /analyze-urls`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionComparisonRequest {
    /// URL to the first (older) image
    pub version1_url: Option<String>,
    /// URL to the second (newer) image
    pub version2_url: Option<String>,
    /// Additional context about the design
    pub context: Option<String>,
}
