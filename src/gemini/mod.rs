//! Client for the Gemini generateContent REST endpoint
//!
//! Sends the two design versions plus a feedback prompt in a single request
//! and parses the model's JSON answer into [`AnalysisData`]. No retries or
//! backoff: by the time this client runs, the admission gate has already
//! reserved the call, and a failed call is surfaced to the user as-is.

use crate::config::GeminiConfig;
use crate::error::{Result, ServiceError};
use crate::models::AnalysisData;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// One image ready to be embedded in the upstream payload
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub mime_type: &'static str,
    pub data: Bytes,
}

/// Gemini API client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Secret<String>,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    /// Create a new client from configuration and the API key
    pub fn new(config: &GeminiConfig, api_key: Secret<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Compare two design versions and return the structured change report
    pub async fn analyze_design_changes(
        &self,
        version1: &ImagePayload,
        version2: &ImagePayload,
        context: Option<&str>,
    ) -> Result<AnalysisData> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = request_body(&build_prompt(context), version1, version2);

        debug!(model = %self.model, "sending analysis request to Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Gemini API returned an error");
            return Err(ServiceError::Upstream(format!(
                "Gemini API returned status {}",
                status.as_u16()
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Invalid Gemini response: {}", e)))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| {
                ServiceError::Upstream("Gemini response contained no text".to_string())
            })?;

        let data: AnalysisData = serde_json::from_str(strip_code_fences(&text))
            .map_err(|e| ServiceError::ResponseParse(e.to_string()))?;

        debug!(
            changes = data.changes_detected.len(),
            similarity = data.similarity_score,
            "analysis parsed"
        );

        Ok(data)
    }
}

/// Build the generateContent payload: prompt first, then both images inline
fn request_body(
    prompt: &str,
    version1: &ImagePayload,
    version2: &ImagePayload,
) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                { "inline_data": {
                    "mime_type": version1.mime_type,
                    "data": BASE64.encode(&version1.data),
                }},
                { "inline_data": {
                    "mime_type": version2.mime_type,
                    "data": BASE64.encode(&version2.data),
                }},
            ]
        }]
    })
}

/// Design-feedback prompt sent alongside the two versions
fn build_prompt(context: Option<&str>) -> String {
    let context_line = context
        .map(|c| format!("Project Context: {}\n\n", c))
        .unwrap_or_default();

    format!(
        "You are a senior design lead reviewing two versions of the same design \
         (Version 1 = old, Version 2 = new). Focus on what changed and what the \
         team should do next, in both English and Arabic.\n\n{}\
         Return ONLY a JSON object with this shape:\n\
         {{\"changes\": [{{\"category\": \"layout|colors|typography|spacing|content|components|effects\", \
         \"description_en\": \"...\", \"description_ar\": \"...\", \
         \"severity\": \"minor|moderate|major\", \"location\": \"...\", \
         \"action_required\": \"...\"}}], \
         \"similarity_score\": 85.5, \
         \"summary_en\": \"...\", \"summary_ar\": \"...\", \
         \"designer_notes_en\": [\"...\"], \"designer_notes_ar\": [\"...\"], \
         \"next_steps_en\": [\"...\"], \"next_steps_ar\": [\"...\"]}}",
        context_line
    )
}

/// The model often wraps its JSON in markdown code fences; strip them
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}
