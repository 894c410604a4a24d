//! Tubely Video Service
//!
//! Accepts video uploads from authenticated owners, normalizes them for
//! progressive playback and stores them in S3. Records keep a durable
//! `bucket,key` storage reference; every read swaps it for a presigned URL
//! that expires ten minutes later.
//!
//! ## Features
//!
//! - **Streaming Uploads**: Request bodies are staged to scratch files, never
//!   buffered whole in memory
//! - **Aspect Classification**: `ffprobe` sorts videos into `landscape/`,
//!   `portrait/` and `other/` key prefixes
//! - **Fast Start**: `ffmpeg` moves the index atoms to the front of the file
//!   without re-encoding
//! - **Signed Playback**: The bucket stays private; clients only ever see
//!   short-lived URLs
//!
//! ## Architecture
//!
//! ```text
//!  HTTP (multipart)          Scratch dir               S3 Bucket
//! ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//! │ Upload       │────────▶│ raw upload   │         │ landscape/   │
//! │ Handler      │         │      │       │         │ portrait/    │
//! └──────────────┘         │      ▼       │         │ other/       │
//!        │                 │ ffprobe      │         └──────────────┘
//!        │                 │ ffmpeg       │                ▲
//!        │                 │      │       │                │
//!        │                 │      ▼       │                │
//!        │                 │ fast-start   │────────────────┘
//!        │                 └──────────────┘
//!        ▼                                                PostgreSQL
//! ┌──────────────┐                                  ┌──────────────┐
//! │ Upload       │─────── "bucket,key" ────────────▶│ videos       │
//! │ Pipeline     │                                  └──────────────┘
//! └──────────────┘                                         │
//!                                                          ▼
//!                                                   ┌──────────────┐
//!                                                   │ Video Signer │
//!                                                   │ (10 min URL) │
//!                                                   └──────────────┘
//! ```

pub mod api;
pub mod aspect;
pub mod auth;
pub mod config;
pub mod error;
pub mod media_tools;
pub mod metadata_store;
pub mod object_store;
pub mod signer;
pub mod staging;
pub mod storage_key;
pub mod storage_ref;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use aspect::AspectCategory;
pub use config::Config;
pub use error::VideoError;
pub use metadata_store::{PgVideoStore, Video, VideoRepository};
pub use object_store::{ObjectStore, S3ObjectStore};
pub use signer::{VideoSigner, SIGNED_URL_TTL};
pub use storage_ref::StorageReference;
pub use upload::{UploadPipeline, UploadStage};
