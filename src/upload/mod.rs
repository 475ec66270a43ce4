//! Song Upload Module
//!
//! A song upload writes three things that live in different services:
//! - the audio file, into the audio bucket
//! - the cover image, into the image bucket
//! - a row in the `songs` table pointing at both
//!
//! There is no transaction across them. The orchestrator orders the writes
//! and classifies the first failure; objects written before it stay in
//! storage.

pub mod orchestrator;
pub mod types;
pub mod validation;

pub use orchestrator::{UploadBuckets, UploadOrchestrator};
pub use types::*;
pub use validation::{object_key, validate, ObjectKind, ValidSubmission, PRECONDITION_MESSAGE};
