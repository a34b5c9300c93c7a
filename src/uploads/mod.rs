mod ingest;

use axum::{
    Json, Router, debug_handler,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
};
use serde::Serialize;

use crate::event::{ChatEvent, EventKind};
use crate::{AppError, AppResult, AppState};

pub use ingest::{MediaCategory, MediaIngestHandler};

/// Same cap the original endpoints enforced: 10 MiB per upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/image", post(upload_image))
        .route("/voice", post(upload_voice))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub media_url: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[debug_handler(state = crate::AppState)]
async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    handle_upload(state, MediaCategory::Image, multipart).await
}

#[debug_handler(state = crate::AppState)]
async fn upload_voice(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    handle_upload(state, MediaCategory::Voice, multipart).await
}

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    data: Bytes,
}

/// Shared multipart path for both media endpoints: collect the fields, reject
/// anything invalid before touching storage, then ingest and announce the
/// stored object to the room.
async fn handle_upload(
    state: AppState,
    category: MediaCategory,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut room: Option<String> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "room" {
            room = Some(
                field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?,
            );
        } else if name == category.as_str() {
            let filename = field.file_name().unwrap_or("upload").to_owned();
            let content_type = field.content_type().map(str::to_owned);
            let data = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request(err.to_string()))?;
            file = Some(UploadedFile {
                filename,
                content_type,
                data,
            });
        }
    }

    let Some(room) = room.filter(|room| !room.trim().is_empty()) else {
        return Err(AppError::bad_request("room is required"));
    };
    let Some(file) = file else {
        return Err(AppError::bad_request(format!(
            "{} file field is required",
            category.as_str()
        )));
    };
    let Some(content_type) = file.content_type else {
        return Err(AppError::bad_request("file content type is required"));
    };

    let media_url = state
        .ingest
        .ingest(category, &file.filename, &content_type, &file.data)
        .await?;

    let event = ChatEvent::new(
        "System",
        EventKind::System,
        format!("file: {}", file.filename),
        media_url.clone(),
    );
    state.router.submit(&room, event);
    tracing::info!(%room, %media_url, category = category.as_str(), "media ingested");

    Ok(Json(UploadResponse {
        media_url,
        kind: category.as_str(),
    }))
}
