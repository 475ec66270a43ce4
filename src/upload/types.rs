//! Upload types

use axum::body::Bytes;
use serde::Serialize;

use crate::db::SongId;
use crate::session::PrincipalId;

// ============================================================================
// Constants
// ============================================================================

/// Success notification shown to the user
pub const SUCCESS_MESSAGE: &str = "Song uploaded";

/// Accepted audio files (advisory, passed to the upload form)
pub const ACCEPTED_AUDIO: &str = ".mp3";

/// Accepted image files (advisory, passed to the upload form)
pub const ACCEPTED_IMAGE: &str = "image/*";

// ============================================================================
// Submission
// ============================================================================

/// One uploaded file
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub data: Bytes,
    /// Name of the file on the client, if sent
    pub file_name: Option<String>,
    /// Content type announced by the client, if sent
    pub content_type: Option<String>,
}

impl Payload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            file_name: None,
            content_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Announced content type, else a guess from the file name
    pub fn resolved_content_type(&self) -> Option<String> {
        self.content_type
            .clone()
            .filter(|ct| !ct.trim().is_empty())
            .or_else(|| {
                self.file_name
                    .as_deref()
                    .and_then(|name| mime_guess::from_path(name).first())
                    .map(|mime| mime.essence_str().to_string())
            })
    }
}

/// A song upload as submitted by a user
///
/// Moved into [`super::UploadOrchestrator::submit`] and dropped when it
/// returns, so no form state outlives the request.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub title: String,
    pub author: String,
    pub audio: Option<Payload>,
    pub image: Option<Payload>,
    pub principal: Option<PrincipalId>,
}

// ============================================================================
// Phases
// ============================================================================

/// Where an upload currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "kind", rename_all = "camelCase")]
pub enum UploadPhase {
    Idle,
    Validating,
    UploadingAudio,
    UploadingImage,
    PersistingMetadata,
    Succeeded,
    Failed(FailureKind),
}

impl UploadPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadPhase::Succeeded | UploadPhase::Failed(_))
    }

    /// Whether `next` may follow `self`
    pub fn can_advance_to(&self, next: UploadPhase) -> bool {
        use UploadPhase::*;
        match (self, next) {
            (Idle, Validating) => true,
            (Validating, UploadingAudio) => true,
            (UploadingAudio, UploadingImage) => true,
            (UploadingImage, PersistingMetadata) => true,
            (PersistingMetadata, Succeeded) => true,
            (current, Failed(_)) => !current.is_terminal() && *current != Idle,
            _ => false,
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Why an upload failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Missing field or unauthenticated; nothing was written
    Precondition(PreconditionError),
    /// Audio put rejected; nothing was written
    AudioUpload,
    /// Image put rejected; the audio object is orphaned
    ImageUpload,
    /// Insert rejected; both objects are orphaned
    MetadataWrite,
}

impl FailureKind {
    /// Number of objects left in storage without a row
    pub fn orphaned_objects(&self) -> usize {
        match self {
            FailureKind::Precondition(_) | FailureKind::AudioUpload => 0,
            FailureKind::ImageUpload => 1,
            FailureKind::MetadataWrite => 2,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Precondition(PreconditionError::Unauthenticated) => "UNAUTHENTICATED",
            FailureKind::Precondition(_) => "MISSING_FIELDS",
            FailureKind::AudioUpload => "AUDIO_UPLOAD_FAILED",
            FailureKind::ImageUpload => "IMAGE_UPLOAD_FAILED",
            FailureKind::MetadataWrite => "METADATA_WRITE_FAILED",
        }
    }
}

/// Submission rejected before any remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
pub enum PreconditionError {
    #[error("no authenticated principal")]
    Unauthenticated,

    #[error("title is required")]
    MissingTitle,

    #[error("author is required")]
    MissingAuthor,

    #[error("song file is required")]
    MissingAudio,

    #[error("image file is required")]
    MissingImage,
}

/// Result of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        song_id: SongId,
        message: String,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Failure { kind, .. } => Some(*kind),
            Outcome::Success { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Success { message, .. } | Outcome::Failure { message, .. } => message,
        }
    }
}

/// Advisory file acceptance for the upload form
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTypes {
    pub audio: &'static str,
    pub image: &'static str,
}

impl Default for AcceptedTypes {
    fn default() -> Self {
        Self {
            audio: ACCEPTED_AUDIO,
            image: ACCEPTED_IMAGE,
        }
    }
}
