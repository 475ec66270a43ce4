//! Submission checks and object key derivation

use crate::ident::UploadToken;
use crate::session::PrincipalId;

use super::types::{Payload, PreconditionError, Submission};

/// Message shown for every precondition failure
pub const PRECONDITION_MESSAGE: &str = "Missing Fields";

/// A submission with every required field present
#[derive(Debug, Clone)]
pub struct ValidSubmission {
    pub title: String,
    pub author: String,
    pub audio: Payload,
    pub image: Payload,
    pub principal: PrincipalId,
}

/// Check required fields; file contents are not inspected
pub fn validate(submission: Submission) -> Result<ValidSubmission, PreconditionError> {
    let Submission {
        title,
        author,
        audio,
        image,
        principal,
    } = submission;

    let principal = principal
        .filter(|p| !p.is_empty())
        .ok_or(PreconditionError::Unauthenticated)?;

    // Blank text counts as missing; non-blank text is kept as entered
    if title.trim().is_empty() {
        return Err(PreconditionError::MissingTitle);
    }
    if author.trim().is_empty() {
        return Err(PreconditionError::MissingAuthor);
    }

    let audio = audio
        .filter(|p| !p.is_empty())
        .ok_or(PreconditionError::MissingAudio)?;
    let image = image
        .filter(|p| !p.is_empty())
        .ok_or(PreconditionError::MissingImage)?;

    Ok(ValidSubmission {
        title,
        author,
        audio,
        image,
        principal,
    })
}

/// Which of the two objects of a submission a key names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Song,
    Image,
}

impl ObjectKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ObjectKind::Song => "song",
            ObjectKind::Image => "image",
        }
    }
}

/// `<kind>-<title>-<token>`
pub fn object_key(kind: ObjectKind, title: &str, token: &UploadToken) -> String {
    format!("{}-{}-{}", kind.prefix(), title, token)
}
