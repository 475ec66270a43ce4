//! Upload Routes
//!
//! Endpoints:
//! - GET /api/v1/upload/form - Fields and advisory accepted file types
//! - POST /api/v1/upload - Upload a song (multipart: title, author, song, image)

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::SongId;
use crate::error::{AppError, Result};
use crate::session::MaybePrincipal;
use crate::state::AppState;
use crate::upload::{AcceptedTypes, FailureKind, Outcome, Payload, PreconditionError, Submission};

/// Multipart field names
const FIELD_TITLE: &str = "title";
const FIELD_AUTHOR: &str = "author";
const FIELD_SONG: &str = "song";
const FIELD_IMAGE: &str = "image";

/// Create the upload router
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(upload_song))
        .route("/form", get(upload_form))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    song_id: Option<SongId>,
}

fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Precondition(PreconditionError::Unauthenticated) => StatusCode::UNAUTHORIZED,
        FailureKind::Precondition(_) => StatusCode::BAD_REQUEST,
        FailureKind::AudioUpload | FailureKind::ImageUpload => StatusCode::BAD_GATEWAY,
        FailureKind::MetadataWrite => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Success { song_id, message } => (
                StatusCode::CREATED,
                Json(OutcomeBody {
                    status: "success",
                    code: None,
                    message,
                    song_id: Some(song_id),
                }),
            )
                .into_response(),
            Outcome::Failure { kind, message } => (
                status_for(kind),
                Json(OutcomeBody {
                    status: "failure",
                    code: Some(kind.code()),
                    message,
                    song_id: None,
                }),
            )
                .into_response(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadFormResponse {
    title: &'static str,
    description: &'static str,
    fields: [&'static str; 4],
    accept: AcceptedTypes,
    max_upload_bytes: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/upload/form
async fn upload_form(State(state): State<AppState>) -> Json<UploadFormResponse> {
    Json(UploadFormResponse {
        title: "Add a song",
        description: "Upload an mp3 file",
        fields: [FIELD_TITLE, FIELD_AUTHOR, FIELD_SONG, FIELD_IMAGE],
        accept: AcceptedTypes::default(),
        max_upload_bytes: state.config().upload.max_upload_bytes,
    })
}

/// POST /api/v1/upload
///
/// The principal comes from the session header, never from the form.
async fn upload_song(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    multipart: Multipart,
) -> Result<Outcome> {
    let Some(principal) = principal else {
        // Rejected as unauthenticated without reading the body
        return Ok(state.orchestrator().submit(Submission::default()).await);
    };

    let mut submission = read_submission(multipart).await?;
    submission.principal = Some(principal);

    Ok(state.orchestrator().submit(submission).await)
}

/// Body over the upload limit maps to 413, anything else to 400
fn multipart_error(context: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(format!("{}: {}", context, e.body_text()))
    }
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission> {
    let mut submission = Submission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_TITLE | FIELD_AUTHOR => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(&format!("Invalid {} field", name), e))?;
                if name == FIELD_TITLE {
                    submission.title = text;
                } else {
                    submission.author = text;
                }
            }
            FIELD_SONG | FIELD_IMAGE => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(&format!("Invalid {} field", name), e))?;
                let payload = Payload {
                    data,
                    file_name,
                    content_type,
                };
                if name == FIELD_SONG {
                    submission.audio = Some(payload);
                } else {
                    submission.image = Some(payload);
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown upload field");
            }
        }
    }

    Ok(submission)
}
