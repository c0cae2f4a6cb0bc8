/// Local-disk file storage for uploads and generated audio
///
/// Files are written below a root directory and served by the API under a
/// public base URL (`/uploads` by default). Layout:
///
/// ```text
/// <root>/<namespace>/<first two hex chars of sha256>/<uuid>.<ext>
/// ```
///
/// The hash prefix spreads files across subdirectories; the uuid keeps
/// names unguessable and unique even for identical content.
///
/// # Example
///
/// ```no_run
/// use readhub_shared::storage::FileStorage;
///
/// # async fn example(png: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
/// let storage = FileStorage::new("./uploads", "/uploads", 5 * 1024 * 1024);
/// let stored = storage.save(&png, "image/png", "avatars").await?;
/// println!("served at {}", stored.url);
/// storage.delete(&stored.url).await?;
/// # Ok(())
/// # }
/// ```

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File is empty")]
    Empty,

    #[error("File exceeds the {max} byte limit")]
    TooLarge { max: usize },

    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("Invalid storage namespace: {0}")]
    InvalidNamespace(String),

    #[error("URL is not managed by this storage: {0}")]
    ForeignUrl(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepted content types and the extension they are stored with
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
];

/// File extension for an accepted content type
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    ALLOWED_TYPES
        .iter()
        .find(|(ct, _)| *ct == essence)
        .map(|(_, ext)| *ext)
}

pub fn is_image(content_type: &str) -> bool {
    extension_for(content_type).is_some() && content_type.trim().starts_with("image/")
}

/// A file written by [`FileStorage::save`]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredFile {
    /// Public URL
    pub url: String,
    /// Path relative to the storage root
    pub relative_path: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>, max_bytes: usize) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_base_url,
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validates and writes `bytes`, returning where they are served
    pub async fn save(
        &self,
        bytes: &[u8],
        content_type: &str,
        namespace: &str,
    ) -> Result<StoredFile, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge {
                max: self.max_bytes,
            });
        }
        let ext = extension_for(content_type)
            .ok_or_else(|| StorageError::UnsupportedType(content_type.to_string()))?;
        validate_namespace(namespace)?;

        let digest = hex::encode(Sha256::digest(bytes));
        let relative_path = format!("{}/{}/{}.{}", namespace, &digest[..2], Uuid::new_v4(), ext);
        let path = self.root.join(&relative_path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        info!(path = %relative_path, size = bytes.len(), content_type, "Stored file");

        Ok(StoredFile {
            url: format!("{}/{}", self.public_base_url, relative_path),
            relative_path,
            size: bytes.len(),
            content_type: content_type.to_string(),
        })
    }

    /// Removes a file by its public URL; `Ok(false)` if it was already gone
    pub async fn delete(&self, url: &str) -> Result<bool, StorageError> {
        let path = self.path_for_url(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(url, "Deleted stored file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Filesystem path behind a public URL
    pub fn path_for_url(&self, url: &str) -> Result<PathBuf, StorageError> {
        let relative = url
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;

        let relative = Path::new(relative);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || relative.as_os_str().is_empty() {
            return Err(StorageError::ForeignUrl(url.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

fn validate_namespace(namespace: &str) -> Result<(), StorageError> {
    let valid = !namespace.is_empty()
        && namespace.len() <= 32
        && namespace
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidNamespace(namespace.to_string()))
    }
}
