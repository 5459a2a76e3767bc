use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{ApiError, Result};

/// Images above this size are rejected before any write.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Checks the declared content type and payload size of an image upload.
/// Runs before any storage call so a bad file never leaves a partial write.
pub fn validate_image(content_type: &str, size: usize) -> Result<()> {
    if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
        return Err(ApiError::InvalidImageType(content_type.to_string()));
    }
    if size > MAX_IMAGE_BYTES {
        return Err(ApiError::ImageTooLarge {
            size,
            max: MAX_IMAGE_BYTES,
        });
    }
    Ok(())
}

/// Blob store for product images. The local-disk implementation below serves
/// the files itself; a hosted bucket would return its own public URLs.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], name_hint: &str) -> Result<String>;
    async fn delete(&self, public_url: &str) -> Result<bool>;
}

/// Stores images under a local directory exposed at `public_base` by the
/// router's static file service.
pub struct LocalImageStore {
    root: PathBuf,
    public_base: String,
}

impl LocalImageStore {
    pub fn new<P: AsRef<Path>>(root: P, public_base: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_base: public_base.into(),
        }
    }

    fn sanitize_hint(name_hint: &str) -> String {
        let cleaned: String = name_hint
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.is_empty() {
            "imagen".to_string()
        } else {
            cleaned
        }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload(&self, bytes: &[u8], name_hint: &str) -> Result<String> {
        let file_name = format!(
            "{}_{}",
            uuid::Uuid::new_v4().to_string().replace('-', ""),
            Self::sanitize_hint(name_hint)
        );

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&file_name), bytes).await?;

        Ok(format!("{}/{}", self.public_base, file_name))
    }

    async fn delete(&self, public_url: &str) -> Result<bool> {
        let prefix = format!("{}/", self.public_base);
        let Some(file_name) = public_url.strip_prefix(&prefix) else {
            // Externally hosted URL (or empty), nothing to remove locally
            return Ok(false);
        };
        if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
            return Ok(false);
        }

        match tokio::fs::remove_file(self.root.join(file_name)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
