use crate::admission::{AdmissionDecision, AdmissionGate};
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::gemini::{GeminiClient, ImagePayload};
use crate::image;
use crate::models::{AnalysisResponse, VersionComparisonRequest};
use bytes::Bytes;
use axum::extract::{Multipart, State};
use axum::Json;
use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared handler state, constructed once at startup
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub gemini: Arc<GeminiClient>,
    pub config: Arc<ServiceConfig>,
    /// Client for fetching images by URL, separate timeout from the upstream
    download_client: reqwest::Client,
}

impl AppState {
    /// Create the shared state from configuration and the API key
    pub fn new(config: ServiceConfig, api_key: Secret<String>) -> Result<Self> {
        let gemini = GeminiClient::new(&config.gemini, api_key)?;
        let download_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.image.download_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            gate: Arc::new(AdmissionGate::new()),
            gemini: Arc::new(gemini),
            config: Arc::new(config),
            download_client,
        })
    }
}

/// `GET /` — health check and endpoint listing
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "active",
        "service": "Design Version AI",
        "endpoints": [
            "/analyze - Compare two design versions",
            "/analyze-urls - Compare designs from URLs",
            "/rate-limit - Check API rate limit status"
        ]
    }))
}

/// `GET /rate-limit` — current admission gate usage
pub async fn rate_limit_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.gate.status_snapshot();
    Json(serde_json::to_value(status).unwrap_or_default())
}

/// `POST /analyze` — compare two uploaded design versions
///
/// Multipart fields: `version1` and `version2` image files, plus an optional
/// `context` text field.
pub async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>> {
    let mut version1: Option<Bytes> = None;
    let mut version2: Option<Bytes> = None;
    let mut context: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "version1" => {
                let bytes = field.bytes().await.map_err(|e| {
                    ServiceError::BadRequest(format!("Failed to read version1: {}", e))
                })?;
                version1 = Some(bytes);
            }
            "version2" => {
                let bytes = field.bytes().await.map_err(|e| {
                    ServiceError::BadRequest(format!("Failed to read version2: {}", e))
                })?;
                version2 = Some(bytes);
            }
            "context" => {
                let text = field.text().await.map_err(|e| {
                    ServiceError::BadRequest(format!("Failed to read context: {}", e))
                })?;
                if !text.is_empty() {
                    context = Some(text);
                }
            }
            // Unknown fields are ignored rather than rejected.
            _ => {}
        }
    }

    let version1 =
        version1.ok_or_else(|| ServiceError::BadRequest("version1 file is required".to_string()))?;
    let version2 =
        version2.ok_or_else(|| ServiceError::BadRequest("version2 file is required".to_string()))?;

    run_analysis(&state, version1, version2, context.as_deref()).await
}

/// `POST /analyze-urls` — compare two design versions fetched by URL
pub async fn analyze_urls(
    State(state): State<AppState>,
    Json(request): Json<VersionComparisonRequest>,
) -> Result<Json<AnalysisResponse>> {
    let (url1, url2) = match (&request.version1_url, &request.version2_url) {
        (Some(u1), Some(u2)) => (u1, u2),
        _ => return Err(ServiceError::MissingUrl),
    };

    let version1 = download_image(&state, url1, "version 1").await?;
    let version2 = download_image(&state, url2, "version 2").await?;

    run_analysis(&state, version1, version2, request.context.as_deref()).await
}

async fn download_image(state: &AppState, url: &str, which: &str) -> Result<Bytes> {
    let response = state
        .download_client
        .get(url)
        .send()
        .await
        .map_err(|e| ServiceError::Download(format!("images: {}", e)))?;

    if !response.status().is_success() {
        return Err(ServiceError::Download(which.to_string()));
    }

    response
        .bytes()
        .await
        .map_err(|e| ServiceError::Download(format!("images: {}", e)))
}

/// Validate both images, pass the admission gate, then call the upstream
///
/// The gate check happens strictly before the upstream call: a denied
/// request returns 503 without any Gemini traffic, and an admitted request
/// is already counted by the time the upstream call starts.
async fn run_analysis(
    state: &AppState,
    version1: Bytes,
    version2: Bytes,
    context: Option<&str>,
) -> Result<Json<AnalysisResponse>> {
    let image_config = &state.config.image;

    let format1 = image::validate_image(
        &version1,
        image_config.max_size_bytes,
        &image_config.allowed_formats,
    )
    .map_err(|reason| ServiceError::InvalidImage {
        version: "Version 1",
        reason,
    })?;

    let format2 = image::validate_image(
        &version2,
        image_config.max_size_bytes,
        &image_config.allowed_formats,
    )
    .map_err(|reason| ServiceError::InvalidImage {
        version: "Version 2",
        reason,
    })?;

    match state.gate.check_and_reserve() {
        AdmissionDecision::Admitted => {}
        AdmissionDecision::Denied(reason) => {
            warn!(reason = reason.message(), "analysis request denied");
            return Err(ServiceError::RateLimited(reason));
        }
    }

    let payload1 = ImagePayload {
        mime_type: image::mime_type(format1),
        data: version1,
    };
    let payload2 = ImagePayload {
        mime_type: image::mime_type(format2),
        data: version2,
    };

    let data = state
        .gemini
        .analyze_design_changes(&payload1, &payload2, context)
        .await?;

    info!(
        changes = data.changes_detected.len(),
        similarity = data.similarity_score,
        "analysis complete"
    );

    Ok(Json(AnalysisResponse::success(data)))
}
