//! `POST /print`: signed label submissions.

use actors::DeliveryError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use label_core::{FieldError, GateError, Job, LabelRequest, require_not_blank};
use serde::{Deserialize, Serialize};

use crate::init::AppState;

/// Request body: base64 JSON payload and its base64 HMAC tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintRequest {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub signature: String,
}

impl PrintRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("PrintRequest.data", &self.data),
            ("PrintRequest.signature", &self.signature),
        ] {
            if value.is_empty() {
                errors.push(FieldError::new(field, "required"));
            } else {
                require_not_blank(&mut errors, field, value);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Reasons a submission is turned away.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    Malformed(String),

    #[error(transparent)]
    Signature(#[from] GateError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        match self {
            SubmissionError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            SubmissionError::Malformed(_) | SubmissionError::Signature(_) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    message: self.to_string(),
                }),
            )
                .into_response(),
            SubmissionError::Delivery(e) => {
                tracing::error!("Submission failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        message: e.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// Admit a raw request body as a job.
///
/// Nothing reaches the job store unless the signature checks out and the
/// decoded label request is complete.
pub async fn submit(state: &AppState, body: &[u8]) -> Result<Job, SubmissionError> {
    let request: PrintRequest =
        serde_json::from_slice(body).map_err(|e| SubmissionError::Malformed(e.to_string()))?;
    request.validate().map_err(SubmissionError::Validation)?;

    state.gate.verify(&request.data, &request.signature)?;

    let decoded = B64
        .decode(&request.data)
        .map_err(|e| SubmissionError::Malformed(e.to_string()))?;
    let label: LabelRequest =
        serde_json::from_slice(&decoded).map_err(|e| SubmissionError::Malformed(e.to_string()))?;
    label.validate().map_err(SubmissionError::Validation)?;

    let job = state.coordinator.submit(label.render_zpl()).await?;
    Ok(job)
}

pub async fn print_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, SubmissionError> {
    let job = submit(&state, &body).await.inspect_err(|e| {
        if !matches!(e, SubmissionError::Delivery(_)) {
            tracing::warn!("Rejected submission: {}", e);
        }
    })?;
    tracing::debug!(job_id = %job.id, "Submission accepted");
    Ok(StatusCode::OK)
}
