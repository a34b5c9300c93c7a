use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Voice,
}

impl MediaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaCategory::Image => "image",
            MediaCategory::Voice => "voice",
        }
    }

    /// Closed per-category allow-list of declared MIME types.
    pub fn allowed_types(&self) -> &'static [&'static str] {
        match self {
            MediaCategory::Image => &["image/jpeg", "image/png"],
            MediaCategory::Voice => &["audio/mpeg", "audio/wav"],
        }
    }
}

/// Validates and stores uploaded media under one directory, handing back the
/// URL path the stored object is served from.
#[derive(Clone)]
pub struct MediaIngestHandler {
    upload_dir: PathBuf,
}

impl MediaIngestHandler {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Stores one validated upload. The bytes land in a `.part` file that is
    /// renamed into place only once fully written, so a failed write leaves
    /// nothing reachable.
    pub async fn ingest(
        &self,
        category: MediaCategory,
        original_name: &str,
        declared_type: &str,
        data: &[u8],
    ) -> AppResult<String> {
        if !category.allowed_types().contains(&declared_type) {
            return Err(AppError::bad_request(format!(
                "unsupported {} type: {declared_type}",
                category.as_str()
            )));
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let stored_name = format!("{}{}", Uuid::now_v7().simple(), extension_of(original_name));
        let final_path = self.upload_dir.join(&stored_name);
        let part_path = self.upload_dir.join(format!("{stored_name}.part"));

        if let Err(err) = tokio::fs::write(&part_path, data).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&part_path, &final_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(err.into());
        }

        Ok(format!("/uploads/{stored_name}"))
    }
}

/// Dot-prefixed extension of the client's filename, or empty when it has none.
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}
