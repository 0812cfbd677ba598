//! HTTP boundary: `POST /predict`, `GET /status`, `GET /healthz`.

use crate::engine::EngineError;
use crate::state::AppState;
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures_util::TryStreamExt;
use thiserror::Error;
use tracing::Instrument;
use worth_core::PredictError;

/// Multipart field carrying the uploaded image.
const UPLOAD_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unsupported file type")]
    UnsupportedMediaType,
    #[error("missing multipart field \"file\"")]
    MissingFile,
    #[error("upload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("malformed upload: {0}")]
    Multipart(String),
    #[error("{0}")]
    Predict(PredictError),
    #[error("prediction engine unavailable")]
    EngineUnavailable,
    #[error("prediction timed out")]
    Timeout,
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Multipart(e.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Predict(e) => ApiError::Predict(e),
            EngineError::ChannelClosed | EngineError::Spawn(_) => ApiError::EngineUnavailable,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::MissingFile | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Predict(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Predict(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "detail": self.to_string(),
        }))
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/predict", web::post().to(predict))
        .route("/status", web::get().to(status))
        .route("/healthz", web::get().to(healthz));
}

async fn predict(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id);

    async move {
        let image = read_upload(payload, state.max_upload_bytes).await?;
        tracing::info!(bytes = image.len(), "image received");

        let result = tokio::time::timeout(state.request_timeout, state.engine.predict(image))
            .await
            .map_err(|_| ApiError::Timeout)?;

        match result {
            Ok(prediction) => Ok(HttpResponse::Ok().json(prediction)),
            Err(e) => {
                let e = ApiError::from(e);
                if e.status_code().is_server_error() {
                    tracing::error!(error = %e, "prediction failed");
                } else {
                    tracing::info!(error = %e, "prediction rejected");
                }
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Pull the image bytes out of the `file` field, rejecting non-image
/// content types before any decoding happens.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = payload.try_next().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            drain(field).await?;
            continue;
        }

        let is_image = field
            .content_type()
            .is_some_and(|m| m.essence_str().starts_with("image/"));
        if !is_image {
            tracing::info!(content_type = ?field.content_type(), "rejecting non-image upload");
            return Err(ApiError::UnsupportedMediaType);
        }

        return read_field(field, limit).await;
    }
    Err(ApiError::MissingFile)
}

async fn read_field(mut field: Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if data.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge(limit));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn drain(mut field: Field) -> Result<(), ApiError> {
    while field.try_next().await?.is_some() {}
    Ok(())
}

async fn status(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.status())
}

async fn healthz(state: web::Data<AppState>) -> HttpResponse {
    if state.engine.is_alive() {
        HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
    } else {
        tracing::error!("health check failed: engine thread is gone");
        HttpResponse::ServiceUnavailable().json(serde_json::json!({ "status": "engine unavailable" }))
    }
}
