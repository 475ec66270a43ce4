//! Upload Orchestrator
//!
//! Drives one submission through three independent remote writes:
//!
//! 1. audio object  -> audio bucket
//! 2. image object  -> image bucket
//! 3. song row      -> metadata store
//!
//! Steps run strictly in order and each starts only after the previous one
//! succeeded, so a failure leaves at most the objects written so far.
//! Those orphaned objects are logged and left in place.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::UploadConfig;
use crate::db::{MetadataStore, SongRecord};
use crate::events::LibraryEvents;
use crate::ident;
use crate::storage::{BlobStore, BlobWriteError, CacheControl, OverwritePolicy, PutOptions, StoredObjectRef};

use super::types::{FailureKind, Outcome, Payload, Submission, UploadPhase, SUCCESS_MESSAGE};
use super::validation::{object_key, validate, ObjectKind, ValidSubmission, PRECONDITION_MESSAGE};

const AUDIO_FAILURE_MESSAGE: &str = "Failed song upload";
const IMAGE_FAILURE_MESSAGE: &str = "Failed image upload";

/// Bucket names for the two objects of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBuckets {
    pub audio: String,
    pub image: String,
}

impl From<&UploadConfig> for UploadBuckets {
    fn from(config: &UploadConfig) -> Self {
        Self {
            audio: config.audio_bucket.clone(),
            image: config.image_bucket.clone(),
        }
    }
}

/// Runs song uploads
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    events: LibraryEvents,
    buckets: UploadBuckets,
    cache_control: CacheControl,
}

impl UploadOrchestrator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        events: LibraryEvents,
        buckets: UploadBuckets,
        cache_control: CacheControl,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                blobs,
                metadata,
                events,
                buckets,
                cache_control,
            }),
        }
    }

    pub fn from_config(
        config: &UploadConfig,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        events: LibraryEvents,
    ) -> Self {
        Self::new(
            blobs,
            metadata,
            events,
            UploadBuckets::from(config),
            CacheControl::max_age(config.cache_control_seconds),
        )
    }

    /// Upload a song
    ///
    /// Never returns early with an error: every failure is classified into
    /// an [`Outcome::Failure`].
    pub async fn submit(&self, submission: Submission) -> Outcome {
        self.run(submission, None).await
    }

    /// Like [`submit`](Self::submit), publishing every phase change to `observer`
    pub async fn submit_observed(
        &self,
        submission: Submission,
        observer: &watch::Sender<UploadPhase>,
    ) -> Outcome {
        self.run(submission, Some(observer)).await
    }

    async fn run(&self, submission: Submission, observer: Option<&watch::Sender<UploadPhase>>) -> Outcome {
        let mut tracker = PhaseTracker::new(observer);

        tracker.advance(UploadPhase::Validating);
        let ValidSubmission {
            title,
            author,
            audio,
            image,
            principal,
        } = match validate(submission) {
            Ok(valid) => valid,
            Err(reason) => {
                tracing::warn!(reason = %reason, "Upload rejected before any write");
                return tracker.fail(FailureKind::Precondition(reason), PRECONDITION_MESSAGE.to_string());
            }
        };

        let token = ident::generate();
        let song_key = object_key(ObjectKind::Song, &title, &token);
        let image_key = object_key(ObjectKind::Image, &title, &token);

        tracing::info!(
            token = %token,
            user_id = %principal,
            title = %title,
            audio_size = audio.data.len(),
            image_size = image.data.len(),
            "Starting song upload"
        );

        tracker.advance(UploadPhase::UploadingAudio);
        let song_ref = match self.put(&self.inner.buckets.audio, &song_key, audio).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    token = %token,
                    bucket = %self.inner.buckets.audio,
                    key = %song_key,
                    error = %e,
                    "Audio upload failed"
                );
                return tracker.fail(FailureKind::AudioUpload, AUDIO_FAILURE_MESSAGE.to_string());
            }
        };

        tracker.advance(UploadPhase::UploadingImage);
        let image_ref = match self.put(&self.inner.buckets.image, &image_key, image).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    token = %token,
                    bucket = %self.inner.buckets.image,
                    key = %image_key,
                    orphaned = %song_ref.path,
                    error = %e,
                    "Image upload failed, audio object left orphaned"
                );
                return tracker.fail(FailureKind::ImageUpload, IMAGE_FAILURE_MESSAGE.to_string());
            }
        };

        tracker.advance(UploadPhase::PersistingMetadata);
        let record = SongRecord::new(&principal, title, author, image_ref, song_ref);
        let song_id = match self.inner.metadata.insert_song(&record).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    token = %token,
                    orphaned_song = %record.song_path(),
                    orphaned_image = %record.image_path(),
                    error = %e,
                    "Song row insert failed, both objects left orphaned"
                );
                return tracker.fail(FailureKind::MetadataWrite, e.reason);
            }
        };

        tracker.advance(UploadPhase::Succeeded);
        self.inner.events.songs_changed(&principal);

        tracing::info!(
            token = %token,
            song_id = song_id.0,
            song_path = %record.song_path(),
            image_path = %record.image_path(),
            "Song uploaded"
        );

        Outcome::Success {
            song_id,
            message: SUCCESS_MESSAGE.to_string(),
        }
    }

    async fn put(&self, bucket: &str, key: &str, payload: Payload) -> Result<StoredObjectRef, BlobWriteError> {
        let mut options = PutOptions::new()
            .with_cache_control(self.inner.cache_control)
            .with_overwrite(OverwritePolicy::RejectIfExists);
        if let Some(content_type) = payload.resolved_content_type() {
            options = options.with_content_type(content_type);
        }

        self.inner.blobs.put(bucket, key, payload.data, &options).await
    }
}

/// Current phase of one run, mirrored to an optional observer
struct PhaseTracker<'a> {
    phase: UploadPhase,
    observer: Option<&'a watch::Sender<UploadPhase>>,
}

impl<'a> PhaseTracker<'a> {
    fn new(observer: Option<&'a watch::Sender<UploadPhase>>) -> Self {
        if let Some(tx) = observer {
            tx.send_replace(UploadPhase::Idle);
        }
        Self {
            phase: UploadPhase::Idle,
            observer,
        }
    }

    fn advance(&mut self, next: UploadPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal upload transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::debug!(from = ?self.phase, to = ?next, "Upload phase");
        self.phase = next;
        if let Some(tx) = self.observer {
            tx.send_replace(next);
        }
    }

    fn fail(&mut self, kind: FailureKind, message: String) -> Outcome {
        tracing::info!(
            code = kind.code(),
            orphaned_objects = kind.orphaned_objects(),
            "Upload failed"
        );
        self.advance(UploadPhase::Failed(kind));
        Outcome::Failure { kind, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Bytes;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::db::{MetadataWriteError, SongId};
    use crate::events::LibraryEvent;
    use crate::session::PrincipalId;
    use crate::upload::PreconditionError;

    // ========================================================================
    // Test doubles
    // ========================================================================

    #[derive(Debug, Clone)]
    struct PutCall {
        bucket: String,
        key: String,
        options: PutOptions,
    }

    /// Blob store recording every call; puts into `failing_bucket` fail,
    /// as a key collision when `collision` is set
    #[derive(Default)]
    struct RecordingBlobStore {
        calls: Mutex<Vec<PutCall>>,
        objects: Mutex<Vec<(String, String, Bytes)>>,
        failing_bucket: Option<&'static str>,
        collision: bool,
    }

    impl RecordingBlobStore {
        fn failing(bucket: &'static str) -> Self {
            Self {
                failing_bucket: Some(bucket),
                ..Default::default()
            }
        }

        fn colliding(bucket: &'static str) -> Self {
            Self {
                failing_bucket: Some(bucket),
                collision: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<PutCall> {
            self.calls.lock().unwrap().clone()
        }

        fn contains(&self, bucket: &str, key: &str) -> bool {
            self.objects
                .lock()
                .unwrap()
                .iter()
                .any(|(b, k, _)| b == bucket && k == key)
        }

        fn object_count(&self) -> usize {
            self.objects.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BlobStore for RecordingBlobStore {
        async fn put(
            &self,
            bucket: &str,
            key: &str,
            data: Bytes,
            options: &PutOptions,
        ) -> Result<StoredObjectRef, BlobWriteError> {
            self.calls.lock().unwrap().push(PutCall {
                bucket: bucket.to_string(),
                key: key.to_string(),
                options: options.clone(),
            });

            if self.failing_bucket == Some(bucket) && self.collision {
                return Err(BlobWriteError::AlreadyExists {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            if self.failing_bucket == Some(bucket) {
                return Err(BlobWriteError::Rejected {
                    bucket: bucket.to_string(),
                    reason: "quota exceeded".to_string(),
                });
            }

            self.objects
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string(), data));
            Ok(StoredObjectRef {
                path: key.to_string(),
            })
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    /// Metadata store keeping rows in memory; fails when `fail_with` is set
    #[derive(Default)]
    struct RecordingMetadataStore {
        rows: Mutex<Vec<SongRecord>>,
        calls: AtomicUsize,
        fail_with: Option<&'static str>,
    }

    impl RecordingMetadataStore {
        fn failing(reason: &'static str) -> Self {
            Self {
                fail_with: Some(reason),
                ..Default::default()
            }
        }

        fn rows(&self) -> Vec<SongRecord> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetadataStore for RecordingMetadataStore {
        async fn insert_song(&self, record: &SongRecord) -> Result<SongId, MetadataWriteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = self.fail_with {
                return Err(MetadataWriteError {
                    reason: reason.to_string(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            rows.push(record.clone());
            Ok(SongId(rows.len() as i64))
        }
    }

    fn buckets() -> UploadBuckets {
        UploadBuckets {
            audio: "songs".to_string(),
            image: "images".to_string(),
        }
    }

    fn orchestrator(
        blobs: &Arc<RecordingBlobStore>,
        metadata: &Arc<RecordingMetadataStore>,
        events: &LibraryEvents,
    ) -> UploadOrchestrator {
        let blobs: Arc<dyn BlobStore> = blobs.clone();
        let metadata: Arc<dyn MetadataStore> = metadata.clone();
        UploadOrchestrator::new(blobs, metadata, events.clone(), buckets(), CacheControl::max_age(3600))
    }

    fn submission() -> Submission {
        Submission {
            title: "Lo-Fi Beat".to_string(),
            author: "DJ X".to_string(),
            audio: Some(Payload::new(b"bytes A".to_vec()).with_file_name("beat.mp3")),
            image: Some(Payload::new(b"bytes B".to_vec()).with_content_type("image/jpeg")),
            principal: Some(PrincipalId::new("user-1")),
        }
    }

    /// Token suffix of a `<kind>-<title>-<token>` key
    fn token_of(key: &str) -> &str {
        key.rsplit('-').next().unwrap()
    }

    // ========================================================================
    // Tests
    // ========================================================================

    #[tokio::test]
    async fn test_precondition_failure_makes_no_remote_calls() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let metadata = Arc::new(RecordingMetadataStore::default());
        let events = LibraryEvents::default();
        let mut rx = events.subscribe();
        let upload = orchestrator(&blobs, &metadata, &events);

        let incomplete = vec![
            Submission { principal: None, ..submission() },
            Submission { title: String::new(), ..submission() },
            Submission { author: " ".to_string(), ..submission() },
            Submission { audio: None, ..submission() },
            Submission { image: Some(Payload::default()), ..submission() },
        ];

        for s in incomplete {
            let outcome = upload.submit(s).await;
            assert!(matches!(
                outcome.failure_kind(),
                Some(FailureKind::Precondition(_))
            ));
            assert_eq!(outcome.message(), "Missing Fields");
        }

        assert!(blobs.calls().is_empty());
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_unauthenticated_kind() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let metadata = Arc::new(RecordingMetadataStore::default());
        let upload = orchestrator(&blobs, &metadata, &LibraryEvents::default());

        let outcome = upload.submit(Submission { principal: None, ..submission() }).await;

        assert_eq!(
            outcome.failure_kind(),
            Some(FailureKind::Precondition(PreconditionError::Unauthenticated))
        );
    }

    #[tokio::test]
    async fn test_audio_failure_stops_workflow() {
        let blobs = Arc::new(RecordingBlobStore::failing("songs"));
        let metadata = Arc::new(RecordingMetadataStore::default());
        let upload = orchestrator(&blobs, &metadata, &LibraryEvents::default());

        let outcome = upload.submit(submission()).await;

        assert_eq!(
            outcome,
            Outcome::Failure {
                kind: FailureKind::AudioUpload,
                message: "Failed song upload".to_string(),
            }
        );
        let calls = blobs.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].bucket, "songs");
        assert_eq!(blobs.object_count(), 0);
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_failure_leaves_audio_orphaned() {
        let blobs = Arc::new(RecordingBlobStore::failing("images"));
        let metadata = Arc::new(RecordingMetadataStore::default());
        let upload = orchestrator(&blobs, &metadata, &LibraryEvents::default());

        let outcome = upload.submit(submission()).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::ImageUpload));
        assert_eq!(outcome.message(), "Failed image upload");

        let calls = blobs.calls();
        assert_eq!(calls.len(), 2);
        assert!(blobs.contains("songs", &calls[0].key));
        assert!(!blobs.contains("images", &calls[1].key));
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
        assert!(metadata.rows().is_empty());
    }

    #[tokio::test]
    async fn test_key_collision_is_an_upload_failure() {
        for (bucket, kind, message) in [
            ("songs", FailureKind::AudioUpload, "Failed song upload"),
            ("images", FailureKind::ImageUpload, "Failed image upload"),
        ] {
            let blobs = Arc::new(RecordingBlobStore::colliding(bucket));
            let metadata = Arc::new(RecordingMetadataStore::default());
            let upload = orchestrator(&blobs, &metadata, &LibraryEvents::default());

            let outcome = upload.submit(submission()).await;

            assert_eq!(outcome.failure_kind(), Some(kind));
            assert_eq!(outcome.message(), message);
            assert!(!outcome.message().contains("exists"));
            assert!(!outcome.message().contains(bucket));
            assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_metadata_failure_leaves_both_objects() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let metadata = Arc::new(RecordingMetadataStore::failing(
            "NOT NULL constraint failed: songs.user_id",
        ));
        let events = LibraryEvents::default();
        let mut rx = events.subscribe();
        let upload = orchestrator(&blobs, &metadata, &events);

        let outcome = upload.submit(submission()).await;

        assert_eq!(
            outcome,
            Outcome::Failure {
                kind: FailureKind::MetadataWrite,
                message: "NOT NULL constraint failed: songs.user_id".to_string(),
            }
        );
        assert_eq!(blobs.object_count(), 2);
        assert!(metadata.rows().is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_success_records_put_paths_and_refreshes_once() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let metadata = Arc::new(RecordingMetadataStore::default());
        let events = LibraryEvents::default();
        let mut rx = events.subscribe();
        let upload = orchestrator(&blobs, &metadata, &events);

        let outcome = upload.submit(submission()).await;

        assert_eq!(
            outcome,
            Outcome::Success {
                song_id: SongId(1),
                message: "Song uploaded".to_string(),
            }
        );

        let calls = blobs.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].bucket, "songs");
        assert_eq!(calls[1].bucket, "images");

        let rows = metadata.rows();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.user_id(), "user-1");
        assert_eq!(row.title(), "Lo-Fi Beat");
        assert_eq!(row.author(), "DJ X");
        assert_eq!(row.song_path(), calls[0].key);
        assert_eq!(row.image_path(), calls[1].key);

        assert_eq!(
            rx.try_recv().unwrap(),
            LibraryEvent::SongsChanged {
                user_id: PrincipalId::new("user-1")
            }
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_keys_share_one_token() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let metadata = Arc::new(RecordingMetadataStore::default());
        let upload = orchestrator(&blobs, &metadata, &LibraryEvents::default());

        upload.submit(submission()).await;

        let calls = blobs.calls();
        let token = token_of(&calls[0].key);
        assert!(!token.is_empty());
        assert_eq!(calls[0].key, format!("song-Lo-Fi Beat-{}", token));
        assert_eq!(calls[1].key, format!("image-Lo-Fi Beat-{}", token));
    }

    #[tokio::test]
    async fn test_puts_reject_overwrite_and_carry_content_type() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let metadata = Arc::new(RecordingMetadataStore::default());
        let upload = orchestrator(&blobs, &metadata, &LibraryEvents::default());

        upload.submit(submission()).await;

        let calls = blobs.calls();
        for call in &calls {
            assert_eq!(call.options.overwrite, OverwritePolicy::RejectIfExists);
            assert_eq!(call.options.cache_control.header_value(), "max-age=3600");
        }
        assert_eq!(calls[0].options.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(calls[1].options.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_identical_submissions_are_not_deduplicated() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let metadata = Arc::new(RecordingMetadataStore::default());
        let events = LibraryEvents::default();
        let mut rx = events.subscribe();
        let upload = orchestrator(&blobs, &metadata, &events);

        assert!(upload.submit(submission()).await.is_success());
        assert!(upload.submit(submission()).await.is_success());

        let keys: HashSet<String> = blobs.calls().into_iter().map(|c| c.key).collect();
        assert_eq!(keys.len(), 4);

        let rows = metadata.rows();
        assert_eq!(rows.len(), 2);
        assert_ne!(token_of(rows[0].song_path()), token_of(rows[1].song_path()));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_observer_sees_terminal_phase() {
        let blobs = Arc::new(RecordingBlobStore::failing("images"));
        let metadata = Arc::new(RecordingMetadataStore::default());
        let upload = orchestrator(&blobs, &metadata, &LibraryEvents::default());
        let (tx, rx) = watch::channel(UploadPhase::Idle);

        upload.submit_observed(submission(), &tx).await;
        assert_eq!(*rx.borrow(), UploadPhase::Failed(FailureKind::ImageUpload));

        let ok = orchestrator(
            &Arc::new(RecordingBlobStore::default()),
            &metadata,
            &LibraryEvents::default(),
        );
        ok.submit_observed(submission(), &tx).await;
        assert_eq!(*rx.borrow(), UploadPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_end_to_end_with_local_storage_and_sqlite() {
        use crate::db::{create_pool, SongRepository, SqliteMetadataStore};
        use crate::storage::LocalBlobStore;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let local = Arc::new(LocalBlobStore::new(temp_dir.path().to_path_buf()));
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let blobs: Arc<dyn BlobStore> = local.clone();
        let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(pool.clone()));
        let upload = UploadOrchestrator::new(
            blobs,
            metadata,
            LibraryEvents::default(),
            buckets(),
            CacheControl::default(),
        );

        let song_id = match upload.submit(submission()).await {
            Outcome::Success { song_id, .. } => song_id,
            other => panic!("expected success, got {:?}", other),
        };

        let song = SongRepository::new(&pool).get(song_id).await.unwrap().unwrap();
        assert_eq!(song.user_id, "user-1");
        assert_eq!(local.read("songs", &song.song_path).await.unwrap(), b"bytes A");
        assert_eq!(local.read("images", &song.image_path).await.unwrap(), b"bytes B");
    }
}
