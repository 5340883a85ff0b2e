use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::error::VerifyError;
use crate::matcher::{self, VerificationResult};
use crate::Embedding;

pub const SERVICE_NAME: &str = "face-verification";

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    #[serde(rename = "embA")]
    pub emb_a: Vec<f32>,
    #[serde(rename = "embB")]
    pub emb_b: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub verified: bool,
    pub distance: f64,
    pub threshold: f64,
    pub confidence: f64,
    pub model: String,
}

impl VerificationResponse {
    pub fn new(result: VerificationResult, model: &str) -> Self {
        Self {
            verified: result.verified,
            distance: round4(result.distance),
            threshold: result.threshold,
            confidence: round4(result.confidence),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub success: bool,
    pub embedding: Vec<f32>,
    pub model: String,
    pub embedding_size: usize,
    pub face_detected: bool,
}

pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let profile = state.provider.profile();
    Json(json!({
        "status": "running",
        "service": SERVICE_NAME,
        "model": profile.name(),
        "version": env!("CARGO_PKG_VERSION"),
        "embedding_size": profile.dimension(),
    }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ready = state.provider.ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "healthy" } else { "unavailable" },
            "service": SERVICE_NAME,
            "ready": ready,
            "embedding_size": state.provider.profile().dimension(),
        })),
    )
}

pub async fn get_embedding(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<EmbeddingResponse>> {
    let [image] = read_images(multipart, ["image"], "Image required").await?;
    let embedding = state.provider.embed(image).await?;

    log::info!("extracted embedding of size {}", embedding.len());
    Ok(Json(EmbeddingResponse {
        success: true,
        embedding_size: embedding.len(),
        embedding: embedding.to_vec(),
        model: state.provider.profile().name().to_string(),
        face_detected: true,
    }))
}

pub async fn compare_embeddings(
    State(state): State<AppState>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> ApiResult<Json<VerificationResponse>> {
    let Json(request) = payload.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            VerifyError::InvalidEmbedding(e.body_text()).into()
        }
    })?;

    let a = Embedding::new(request.emb_a);
    let b = Embedding::new(request.emb_b);
    respond(&state, &a, &b)
}

pub async fn verify_face(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<VerificationResponse>> {
    let [image_a, image_b] =
        read_images(multipart, ["imageA", "imageB"], "Two images required").await?;

    let (a, b) = tokio::try_join!(
        state.provider.embed(image_a),
        state.provider.embed(image_b)
    )?;
    respond(&state, &a, &b)
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn respond(
    state: &AppState,
    a: &Embedding,
    b: &Embedding,
) -> ApiResult<Json<VerificationResponse>> {
    let profile = state.provider.profile();
    let result = matcher::verify(a, b, profile)?;

    log::info!(
        "[{}] {} distance={:.4} threshold={} verified={}",
        uuid::Uuid::new_v4(),
        profile,
        result.distance,
        result.threshold,
        result.verified
    );
    Ok(Json(VerificationResponse::new(result, profile.name())))
}

fn upload_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Collect the named file fields, in the order given. Other fields are ignored.
async fn read_images<const N: usize>(
    multipart: Result<Multipart, MultipartRejection>,
    names: [&str; N],
    missing: &str,
) -> ApiResult<[Bytes; N]> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut found: [Option<Bytes>; N] = std::array::from_fn(|_| None);

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let Some(slot) = field
            .name()
            .and_then(|name| names.iter().position(|n| *n == name))
        else {
            continue;
        };
        found[slot] = Some(field.bytes().await.map_err(upload_error)?);
    }

    let mut images = Vec::with_capacity(N);
    for image in found {
        images.push(image.ok_or_else(|| ApiError::BadRequest(missing.to_string()))?);
    }
    images
        .try_into()
        .map_err(|_| ApiError::BadRequest(missing.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_four_places() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
        assert_eq!(round4(0.0), 0.0);
    }

    #[test]
    fn response_rounds_distance_and_confidence_only() {
        let result = VerificationResult {
            distance: 0.333333,
            verified: true,
            threshold: 0.38,
            confidence: 0.666667,
        };
        let response = VerificationResponse::new(result, "ArcFace-ONNX");
        assert_eq!(response.distance, 0.3333);
        assert_eq!(response.confidence, 0.6667);
        assert_eq!(response.threshold, 0.38);
        assert_eq!(response.model, "ArcFace-ONNX");
    }
}
