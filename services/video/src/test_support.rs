//! In-process fakes for the pipeline's collaborators.

use crate::media_tools::{faststart_output_path, MediaToolError, MediaToolkit, VideoDimensions};
use crate::metadata_store::{CreateVideoParams, Video, VideoRepository};
use crate::object_store::{ObjectStore, PresignedUrl};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

pub const TEST_BUCKET: &str = "tubely-videos";
pub const TEST_SECRET: &str = "test-secret";

/// Probes to fixed dimensions and "remuxes" by copying the file
pub struct FakeToolkit {
    pub probe_result: Result<VideoDimensions, fn() -> MediaToolError>,
    pub fail_remux: bool,
}

impl FakeToolkit {
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            probe_result: Ok(VideoDimensions { width, height }),
            fail_remux: false,
        }
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, MediaToolError> {
        assert!(path.exists(), "probe ran against a missing file");
        self.probe_result.map_err(|make| make())
    }

    async fn remux_fast_start(&self, input: &Path) -> Result<PathBuf, MediaToolError> {
        if self.fail_remux {
            return Err(MediaToolError::Failed {
                tool: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "moov atom not found".to_string(),
            });
        }

        let output = faststart_output_path(input)?;
        tokio::fs::copy(input, &output)
            .await
            .map_err(|source| MediaToolError::Spawn {
                tool: "ffmpeg".to_string(),
                source,
            })?;
        Ok(output)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Keeps uploads in memory and signs with a recognizable fake host
#[derive(Default)]
pub struct FakeObjectStore {
    pub uploads: Mutex<Vec<RecordedUpload>>,
    pub fail_upload: bool,
}

impl FakeObjectStore {
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        path: &Path,
    ) -> Result<()> {
        if self.fail_upload {
            return Err(anyhow!("SlowDown: please reduce your request rate"));
        }

        let body = tokio::fs::read(path).await?;
        self.uploads.lock().unwrap().push(RecordedUpload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            body,
        });
        Ok(())
    }

    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<PresignedUrl> {
        Ok(PresignedUrl {
            url: format!(
                "https://{}.s3.test/{}?X-Amz-Expires={}",
                bucket,
                key,
                ttl.as_secs()
            ),
            expires_at: Utc::now() + chrono::Duration::from_std(ttl)?,
        })
    }
}

/// Hash map repository
#[derive(Default)]
pub struct MemoryVideoStore {
    pub videos: Mutex<HashMap<Uuid, Video>>,
    pub fail_updates: bool,
}

impl MemoryVideoStore {
    pub fn insert_for(&self, user_id: Uuid) -> Video {
        let video = Video {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            title: "Boots on the ground".to_string(),
            description: "walkthrough".to_string(),
            thumbnail_url: None,
            video_url: None,
            user_id,
        };
        self.videos.lock().unwrap().insert(video.id, video.clone());
        video
    }

    pub fn stored(&self, id: Uuid) -> Option<Video> {
        self.videos.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoStore {
    async fn create_video(&self, user_id: Uuid, params: &CreateVideoParams) -> Result<Video> {
        let mut video = self.insert_for(user_id);
        video.title = params.title.clone();
        video.description = params.description.clone();
        self.videos.lock().unwrap().insert(video.id, video.clone());
        Ok(video)
    }

    async fn get_video(&self, id: Uuid) -> Result<Option<Video>> {
        Ok(self.stored(id))
    }

    async fn list_videos(&self, user_id: Uuid) -> Result<Vec<Video>> {
        let mut videos: Vec<Video> = self
            .videos
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(videos)
    }

    async fn update_video(&self, video: &Video) -> Result<()> {
        if self.fail_updates {
            return Err(anyhow!("connection pool timed out"));
        }

        let mut videos = self.videos.lock().unwrap();
        let stored = videos
            .get_mut(&video.id)
            .ok_or_else(|| anyhow!("Video {} no longer exists", video.id))?;
        *stored = video.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_video(&self, id: Uuid) -> Result<()> {
        self.videos.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Number of entries left in a scratch directory
pub fn scratch_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
