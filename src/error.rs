use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::api::types::ErrorResponse;
use crate::prompts::{CHART_LABELS, DATA_LABELS};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Every failure leaves the server as a real status code with `{"error": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model not loaded")]
    ModelNotReady,

    #[error("Unsupported chart_type {0:?}; expected one of {labels:?}", labels = CHART_LABELS)]
    UnsupportedChartType(String),

    #[error("Unsupported data_type {0:?}; expected one of {labels:?}", labels = DATA_LABELS)]
    UnsupportedDataType(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("Generation failed: {0:#}")]
    Generation(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ModelNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnsupportedChartType(_) | Self::UnsupportedDataType(_) => StatusCode::BAD_REQUEST,
            Self::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Generation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Generation(err) = &self {
            error!(error = ?err, "generation failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
