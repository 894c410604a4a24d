//! Upload pipeline: authorize, stage, probe, remux, key, upload, commit.
//!
//! Stages run strictly in order and the first failure aborts the rest. Every
//! scratch file is owned by a [`StagedFile`] guard, so nothing written to the
//! scratch directory outlives a request, whatever stage it fails in.

use crate::error::VideoError;
use crate::media_tools::{probe_aspect, MediaToolkit};
use crate::metadata_store::{Video, VideoRepository};
use crate::object_store::ObjectStore;
use crate::signer::VideoSigner;
use crate::staging::{stage_stream, StagedFile, StagedUpload};
use crate::storage_key::generate_object_key;
use crate::storage_ref::StorageReference;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Extension given to staged uploads; the remux step keeps it
const STAGED_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Authorizing,
    Receiving,
    Probing,
    Remuxing,
    Keying,
    Uploading,
    Committing,
    Done,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Authorizing => "authorizing",
            UploadStage::Receiving => "receiving",
            UploadStage::Probing => "probing",
            UploadStage::Remuxing => "remuxing",
            UploadStage::Keying => "keying",
            UploadStage::Uploading => "uploading",
            UploadStage::Committing => "committing",
            UploadStage::Done => "done",
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound upload as handed over by the transport layer
pub struct UploadRequest<S> {
    /// Verified identity of the caller
    pub owner: Uuid,
    pub video_id: Uuid,
    /// Declared media type of the body, as sent by the client
    pub content_type: Option<String>,
    pub body: S,
}

/// Accept a declared media type only if it names an MP4 container.
///
/// Parameters such as `codecs=` are dropped; the bare essence is what gets
/// recorded on the stored object.
pub fn validate_content_type(declared: Option<&str>) -> Result<String, VideoError> {
    let declared = declared
        .ok_or_else(|| VideoError::Validation("Missing Content-Type for video".to_string()))?;

    let media_type: mime::Mime = declared
        .parse()
        .map_err(|_| VideoError::Validation("Invalid Content-Type".to_string()))?;

    let essence = media_type.essence_str();
    if !essence.ends_with(STAGED_EXTENSION) {
        return Err(VideoError::Validation(format!(
            "Invalid file type: {}",
            essence
        )));
    }

    Ok(essence.to_string())
}

pub struct UploadPipeline {
    toolkit: Arc<dyn MediaToolkit>,
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn VideoRepository>,
    signer: VideoSigner,
    bucket: String,
    scratch_dir: PathBuf,
}

impl UploadPipeline {
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn VideoRepository>,
        bucket: impl Into<String>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        let signer = VideoSigner::new(store.clone());
        Self {
            toolkit,
            store,
            repository,
            signer,
            bucket: bucket.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Run an upload to completion.
    ///
    /// Returns the updated record with its reference already resolved into a
    /// signed URL. The body is not read unless the caller owns the record and
    /// the declared type is acceptable.
    #[instrument(skip(self, request), fields(video_id = %request.video_id, owner = %request.owner))]
    pub async fn run<S, E>(&self, request: UploadRequest<S>) -> Result<Video, VideoError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let mut stage = UploadStage::Authorizing;

        let result = self.execute(request, &mut stage).await;

        match &result {
            Ok(video) => {
                metrics::counter!("video.uploads.completed").increment(1);
                metrics::histogram!("video.upload.duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(
                    video_id = %video.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Video upload completed"
                );
            }
            Err(e) => {
                metrics::counter!("video.uploads.failed", "stage" => stage.as_str()).increment(1);
                warn!(stage = %stage, error = %e, "Video upload aborted");
            }
        }

        result
    }

    async fn execute<S, E>(
        &self,
        request: UploadRequest<S>,
        stage: &mut UploadStage,
    ) -> Result<Video, VideoError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let UploadRequest {
            owner,
            video_id,
            content_type,
            body,
        } = request;

        *stage = UploadStage::Authorizing;
        let mut video = self.authorize(owner, video_id).await?;

        *stage = UploadStage::Receiving;
        let content_type = validate_content_type(content_type.as_deref())?;
        let StagedUpload {
            file: raw,
            handle,
            size_bytes,
        } = stage_stream(&self.scratch_dir, STAGED_EXTENSION, body).await?;
        // the tools open the file by path
        drop(handle);
        metrics::counter!("video.bytes.staged").increment(size_bytes);

        *stage = UploadStage::Probing;
        let category = probe_aspect(self.toolkit.as_ref(), raw.path())
            .await
            .map_err(|source| VideoError::ToolInvocation {
                stage: UploadStage::Probing,
                source,
            })?;
        debug!(category = %category, "Aspect ratio classified");

        *stage = UploadStage::Remuxing;
        let remuxed = self.toolkit.remux_fast_start(raw.path()).await;
        // the raw copy is dead weight whether or not the remux worked
        if let Err(e) = raw.remove().await {
            warn!(error = %e, "Failed to remove raw upload");
        }
        let processed = StagedFile::adopt(remuxed.map_err(|source| {
            VideoError::ToolInvocation {
                stage: UploadStage::Remuxing,
                source,
            }
        })?);

        *stage = UploadStage::Keying;
        let key = generate_object_key(category);
        let reference = StorageReference::new(self.bucket.as_str(), key.as_str())
            .map_err(|e| VideoError::Storage(e.into()))?;

        *stage = UploadStage::Uploading;
        let uploaded = self
            .store
            .upload(&self.bucket, &key, &content_type, processed.path())
            .await;
        if let Err(e) = processed.remove().await {
            warn!(error = %e, "Failed to remove processed upload");
        }
        uploaded.map_err(VideoError::Storage)?;

        *stage = UploadStage::Committing;
        let encoded = reference.encode();
        video.video_url = Some(encoded.clone());
        if let Err(cause) = self.repository.update_video(&video).await {
            // the object now exists without a record pointing at it
            error!(reference = %encoded, error = %cause, "Orphaned uploaded object");
            return Err(VideoError::Commit {
                reference: encoded,
                cause,
            });
        }

        *stage = UploadStage::Done;
        self.signer.resolve_for_display(video).await
    }

    async fn authorize(&self, owner: Uuid, video_id: Uuid) -> Result<Video, VideoError> {
        let video = self
            .repository
            .get_video(video_id)
            .await
            .map_err(VideoError::Database)?
            .ok_or_else(|| VideoError::NotFound("Couldn't find video".to_string()))?;

        if video.user_id != owner {
            return Err(VideoError::Authorization(
                "You don't own this video".to_string(),
            ));
        }

        Ok(video)
    }
}
