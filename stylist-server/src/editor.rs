use std::{sync::Arc, time::Instant};

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use stylist_core::{
    codec::{self, MAX_IMAGE_DIMENSION},
    DeviceKind, EditParams, ImageToImage, ModelSlot, ServiceError, ServiceResult,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const SERVICE_NAME: &str = "Stable Diffusion img2img Editor";
const MODEL_TYPE: &str = "StableDiffusionImg2ImgPipeline";
const FAILURE_DETAILS: &str = "Failed to edit image. Make sure the model is loaded correctly.";
/// Base64 photos easily exceed axum's default 2 MB body limit.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub struct EditorState {
    pub slot: ModelSlot<dyn ImageToImage>,
}

#[derive(Deserialize, Debug, Default)]
pub struct EditImageRequest {
    pub image: Option<String>,
    pub prompt: Option<String>,
    pub strength: Option<f64>,
    pub guidance_scale: Option<f64>,
    pub num_inference_steps: Option<usize>,
    pub seed: Option<u64>,
    pub model_path: Option<String>,
    pub github_token: Option<String>,
}

impl EditImageRequest {
    fn params(&self) -> EditParams {
        let defaults = EditParams::default();
        EditParams {
            strength: self.strength.unwrap_or(defaults.strength),
            guidance_scale: self.guidance_scale.unwrap_or(defaults.guidance_scale),
            num_inference_steps: self
                .num_inference_steps
                .unwrap_or(defaults.num_inference_steps),
            seed: self.seed,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct EditImageResponse {
    pub success: bool,
    pub image: String,
    pub model: String,
    pub parameters: EditParams,
}

#[derive(Serialize, Debug)]
pub struct EditorHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub model: String,
    pub device: DeviceKind,
    pub pipeline_loaded: bool,
    pub model_type: &'static str,
}

/// HTTP face of a [`ServiceError`] raised while editing.
#[derive(Debug)]
pub struct EditError(pub ServiceError);

impl From<ServiceError> for EditError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for EditError {
    fn into_response(self) -> Response {
        let error = self.0.to_string();
        if self.0.is_client_error() {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response()
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error, "details": FAILURE_DETAILS })),
            )
                .into_response()
        }
    }
}

pub fn router(state: Arc<EditorState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/edit-image", post(edit_image_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<EditorState>>) -> Json<EditorHealth> {
    let current = state.slot.current();
    Json(EditorHealth {
        status: "ok",
        service: SERVICE_NAME,
        model: current
            .as_ref()
            .map(|loaded| loaded.source.to_string())
            .unwrap_or_else(|| "Not loaded yet".to_string()),
        device: state.slot.device(),
        pipeline_loaded: current.is_some(),
        model_type: MODEL_TYPE,
    })
}

async fn edit_image_handler(
    State(state): State<Arc<EditorState>>,
    payload: Result<Json<EditImageRequest>, JsonRejection>,
) -> Result<Json<EditImageResponse>, EditError> {
    let Json(request) =
        payload.map_err(|rejection| ServiceError::InvalidInput(rejection.body_text()))?;
    match edit_image(&state, request).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            if err.is_client_error() {
                tracing::warn!(%err, "rejected edit request");
            } else {
                tracing::error!(%err, "image edit failed");
            }
            Err(err.into())
        }
    }
}

/// Validates the request, runs the pipeline and packages the result.
pub async fn edit_image(
    state: &EditorState,
    request: EditImageRequest,
) -> ServiceResult<EditImageResponse> {
    let params = request.params();
    let prompt = request
        .prompt
        .filter(|prompt| !prompt.is_empty())
        .ok_or(ServiceError::MissingField("Prompt"))?;
    let image = request
        .image
        .filter(|image| !image.is_empty())
        .ok_or(ServiceError::MissingField("Image"))?;
    let preview: String = prompt.chars().take(100).collect();
    tracing::info!(
        prompt = %preview,
        strength = params.strength,
        guidance_scale = params.guidance_scale,
        steps = params.num_inference_steps,
        "image edit requested"
    );

    let loaded = state
        .slot
        .get(request.model_path.as_deref(), request.github_token.as_deref())
        .await?;

    let model = Arc::clone(&loaded.model);
    let run_params = params.clone();
    let started = Instant::now();
    let edited = tokio::task::spawn_blocking(move || -> ServiceResult<String> {
        let input = codec::decode_data_url(&image).map_err(ServiceError::Codec)?;
        tracing::debug!(width = input.width(), height = input.height(), "decoded input image");
        let input = codec::downscale_to_fit(input, MAX_IMAGE_DIMENSION);
        let output = model
            .edit(&prompt, &input, &run_params)
            .map_err(ServiceError::Inference)?;
        codec::encode_png_data_url(&output).map_err(ServiceError::Codec)
    })
    .await
    .map_err(|err| ServiceError::Inference(err.into()))??;
    tracing::info!(elapsed = ?started.elapsed(), model = %loaded.source, "image edited");

    Ok(EditImageResponse {
        success: true,
        image: edited,
        model: loaded.source.to_string(),
        parameters: params,
    })
}
