use crate::auth::AuthenticatedUser;
use crate::config::ApiConfig;
use crate::error::VideoError;
use crate::metadata_store::{CreateVideoParams, Video, VideoRepository};
use crate::signer::VideoSigner;
use crate::upload::{UploadPipeline, UploadRequest};
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use uuid::Uuid;

/// Multipart field carrying the video bytes
pub const UPLOAD_FIELD: &str = "video";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn VideoRepository>,
    pub pipeline: Arc<UploadPipeline>,
    pub signer: VideoSigner,
    pub jwt_secret: Arc<str>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/videos", post(create_video).get(list_videos))
        .route("/api/videos/:video_id", get(get_video).delete(delete_video))
        .route(
            "/api/video_upload/:video_id",
            post(upload_video).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "video-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.repository.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

fn parse_video_id(raw: &str) -> Result<Uuid, VideoError> {
    Uuid::parse_str(raw).map_err(|_| VideoError::Validation("Invalid ID".to_string()))
}

async fn load_video(state: &AppState, video_id: Uuid) -> Result<Video, VideoError> {
    state
        .repository
        .get_video(video_id)
        .await
        .map_err(VideoError::Database)?
        .ok_or_else(|| VideoError::NotFound("Couldn't find video".to_string()))
}

/// Create an empty video record owned by the caller
#[instrument(skip(state, params))]
async fn create_video(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(params): Json<CreateVideoParams>,
) -> Result<(StatusCode, Json<Video>), VideoError> {
    if params.title.trim().is_empty() {
        return Err(VideoError::Validation("Title is required".to_string()));
    }

    let video = state
        .repository
        .create_video(user_id, &params)
        .await
        .map_err(VideoError::Database)?;

    Ok((StatusCode::CREATED, Json(video)))
}

/// The caller's videos with playable URLs
#[instrument(skip(state))]
async fn list_videos(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<Video>>, VideoError> {
    let videos = state
        .repository
        .list_videos(user_id)
        .await
        .map_err(VideoError::Database)?;

    Ok(Json(state.signer.resolve_all(videos).await?))
}

/// Fetch one video; the stored reference is swapped for a signed URL
#[instrument(skip(state))]
async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<Video>, VideoError> {
    let video_id = parse_video_id(&video_id)?;
    let video = load_video(&state, video_id).await?;

    Ok(Json(state.signer.resolve_for_display(video).await?))
}

#[instrument(skip(state))]
async fn delete_video(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(video_id): Path<String>,
) -> Result<StatusCode, VideoError> {
    let video_id = parse_video_id(&video_id)?;
    let video = load_video(&state, video_id).await?;

    if video.user_id != user_id {
        return Err(VideoError::Authorization(
            "You can't delete this video".to_string(),
        ));
    }

    state
        .repository
        .delete_video(video_id)
        .await
        .map_err(VideoError::Database)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Stream the `video` multipart field through the upload pipeline
#[instrument(skip(state, multipart))]
async fn upload_video(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(video_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Video>, VideoError> {
    let video_id = parse_video_id(&video_id)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let video = state
            .pipeline
            .run(UploadRequest {
                owner: user_id,
                video_id,
                content_type,
                body: field,
            })
            .await
            .map_err(body_limit_exceeded)?;

        return Ok(Json(video));
    }

    Err(VideoError::Validation(format!(
        "Missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

fn payload_too_large() -> VideoError {
    VideoError::PayloadTooLarge("Video exceeds the upload size limit".to_string())
}

fn multipart_error(err: MultipartError) -> VideoError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large()
    } else {
        VideoError::Validation(err.body_text())
    }
}

/// The body limit can also trip while the field is being staged
fn body_limit_exceeded(err: VideoError) -> VideoError {
    match err {
        VideoError::Staging(io)
            if io
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<MultipartError>())
                .is_some_and(|e| e.status() == StatusCode::PAYLOAD_TOO_LARGE) =>
        {
            payload_too_large()
        }
        other => other,
    }
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting video API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
