use std::{sync::Arc, time::Instant};

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stylist_core::{
    recommend, DeviceKind, Extraction, ModelSlot, SamplingOptions, ServiceError, StyleOption,
    TextGenerator, UserProfile,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const SERVICE_NAME: &str = "AI Recommendation Service";
const SOURCE: &str = "local_ai_model";
const FAILURE_DETAILS: &str =
    "Failed to generate recommendations. Make sure the model is loaded correctly.";
const NO_RESULT_ERROR: &str =
    "Failed to generate recommendations - model returned invalid response";

pub struct RecommenderState {
    pub slot: ModelSlot<dyn TextGenerator>,
    pub sampling: SamplingOptions,
}

#[derive(Deserialize, Debug, Default)]
pub struct RecommendRequest {
    #[serde(rename = "userData")]
    pub user_data: Option<Value>,
    #[serde(rename = "hairstyleOptions")]
    pub hairstyle_options: Option<Vec<StyleOption>>,
    pub model_path: Option<String>,
    pub github_token: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct RecommendResponse {
    pub success: bool,
    pub recommendations: Vec<Value>,
    pub source: &'static str,
    pub model: String,
}

#[derive(Serialize, Debug)]
pub struct RecommenderHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub model: String,
    pub device: DeviceKind,
    pub model_loaded: bool,
    pub tokenizer_loaded: bool,
}

/// Why a recommendation request did not produce a list.
#[derive(Debug)]
pub enum RecommendError {
    Service(ServiceError),
    /// The model answered but no list could be read from it; the caller
    /// should use its rule-based fallback.
    NoResult,
}

impl From<ServiceError> for RecommendError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl IntoResponse for RecommendError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            RecommendError::Service(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
            }
            RecommendError::Service(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "success": false,
                    "error": err.to_string(),
                    "details": FAILURE_DETAILS,
                    "recommendations": [],
                }),
            ),
            RecommendError::NoResult => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "success": false,
                    "error": NO_RESULT_ERROR,
                    "recommendations": [],
                    "will_fallback": true,
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<RecommenderState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/recommend", post(recommend_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<RecommenderState>>) -> Json<RecommenderHealth> {
    let current = state.slot.current();
    let loaded = current.is_some();
    Json(RecommenderHealth {
        status: "ok",
        service: SERVICE_NAME,
        model: current
            .map(|resident| resident.source.to_string())
            .unwrap_or_else(|| "Not loaded yet".to_string()),
        device: state.slot.device(),
        model_loaded: loaded,
        tokenizer_loaded: loaded,
    })
}

async fn recommend_handler(
    State(state): State<Arc<RecommenderState>>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, RecommendError> {
    let Json(request) =
        payload.map_err(|rejection| ServiceError::InvalidInput(rejection.body_text()))?;
    match recommend_styles(&state, request).await {
        Ok(response) => Ok(Json(response)),
        Err(RecommendError::Service(err)) if err.is_client_error() => {
            tracing::warn!(%err, "rejected recommendation request");
            Err(err.into())
        }
        Err(RecommendError::Service(err)) => {
            tracing::error!(%err, "recommendation failed");
            Err(err.into())
        }
        Err(RecommendError::NoResult) => {
            tracing::warn!("model reply had no recommendation list, client will fall back");
            Err(RecommendError::NoResult)
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Number(_) => false,
    }
}

/// Validates the request, prompts the model and extracts its ranking.
pub async fn recommend_styles(
    state: &RecommenderState,
    request: RecommendRequest,
) -> Result<RecommendResponse, RecommendError> {
    let user_data = request
        .user_data
        .filter(|value| !is_blank(value))
        .ok_or(ServiceError::MissingField("userData"))?;
    let catalog = request
        .hairstyle_options
        .filter(|options| !options.is_empty())
        .ok_or(ServiceError::MissingField("hairstyleOptions"))?;
    let profile: UserProfile = serde_json::from_value(user_data)
        .map_err(|err| ServiceError::InvalidInput(format!("userData: {err}")))?;
    tracing::info!(
        styles = catalog.len(),
        face_shape = profile.face_shape.as_deref().unwrap_or("unknown"),
        custom_model = request.model_path.is_some(),
        "recommendation requested"
    );

    let loaded = state
        .slot
        .get(request.model_path.as_deref(), request.github_token.as_deref())
        .await?;

    let model = Arc::clone(&loaded.model);
    let sampling = state.sampling.clone();
    let started = Instant::now();
    let extraction = tokio::task::spawn_blocking(move || {
        recommend::recommend(model.as_ref(), &profile, &catalog, &sampling)
    })
    .await
    .map_err(|err| ServiceError::Inference(err.into()))?
    .map_err(ServiceError::Inference)?;
    tracing::info!(elapsed = ?started.elapsed(), model = %loaded.source, "generation complete");

    match extraction {
        Extraction::Found(recommendations) => {
            for (rank, item) in recommendations.iter().enumerate() {
                tracing::info!(
                    rank = rank + 1,
                    id = %item.get("id").unwrap_or(&serde_json::Value::Null),
                    name = %item.get("name").unwrap_or(&serde_json::Value::Null),
                    score = %item.get("matchScore").unwrap_or(&serde_json::Value::Null),
                    "recommendation"
                );
            }
            Ok(RecommendResponse {
                success: true,
                recommendations,
                source: SOURCE,
                model: loaded.source.to_string(),
            })
        }
        Extraction::NoResult => Err(RecommendError::NoResult),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_count_as_missing() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!({})));
        assert!(is_blank(&json!("")));
        assert!(!is_blank(&json!({"faceShape": "oval"})));
    }

    #[test]
    fn request_fields_use_client_names() {
        let request: RecommendRequest = serde_json::from_value(json!({
            "userData": {"faceShape": "round"},
            "hairstyleOptions": [{"id": 1, "name": "Bob"}],
            "model_path": "acme/phi",
            "github_token": "secret"
        }))
        .unwrap();
        assert_eq!(request.hairstyle_options.map(|options| options.len()), Some(1));
        assert_eq!(request.model_path.as_deref(), Some("acme/phi"));
        assert!(request.user_data.is_some());
    }
}
