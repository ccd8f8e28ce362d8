use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use rocket::tokio::fs;
use rocket::tokio::io::AsyncWriteExt;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::error::AppError;

pub const MATERIALS_BUCKET: &str = "materials";

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("The resource already exists")]
    AlreadyExists(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object path: {0}")]
    InvalidPath(String),
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::AlreadyExists(path) => {
                AppError::Conflict(format!("The resource already exists: {}", path))
            }
            StorageError::NotFound(path) => AppError::NotFound(format!("Object {} not found", path)),
            StorageError::InvalidPath(path) => {
                AppError::Validation(format!("Invalid object path: {}", path))
            }
            StorageError::Io(e) => AppError::Internal(format!("Storage IO error: {}", e)),
        }
    }
}

fn slug(raw: &str) -> String {
    NON_ALNUM
        .replace_all(&raw.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Object key for an uploaded file: `public/{stem}-{timestamp}.{ext}` with the
/// stem and extension reduced to lowercase alphanumerics and single hyphens.
pub fn sanitize_upload_path(filename: &str, timestamp_ms: i64) -> String {
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (filename, None),
    };

    let mut stem = slug(stem);
    if stem.is_empty() {
        stem = "file".to_string();
    }

    match ext.map(slug).filter(|e| !e.is_empty()) {
        Some(ext) => format!("public/{stem}-{timestamp_ms}.{ext}"),
        None => format!("public/{stem}-{timestamp_ms}"),
    }
}

/// Last path segment, used as the display name of a material.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Files of the `materials` bucket kept on local disk.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(MATERIALS_BUCKET)
    }

    /// Maps an object key onto the bucket directory. Keys that could escape
    /// it are refused.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.bucket_dir().join(relative))
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(&self, key: &str, bytes: &[u8], upsert: bool) -> Result<String, StorageError> {
        let target = self.resolve(key)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Collision check and create happen in one open call.
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create(upsert)
            .truncate(upsert)
            .create_new(!upsert)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("Upload collides with an existing object");
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes).await?;
        file.flush().await?;

        info!("Object stored");
        Ok(key.to_string())
    }

    pub async fn open(&self, key: &str) -> Result<PathBuf, StorageError> {
        let target = self.resolve(key)?;
        if fs::try_exists(&target).await? {
            Ok(target)
        } else {
            Err(StorageError::NotFound(key.to_string()))
        }
    }

    pub fn public_url(&self, key: &str, download: bool) -> String {
        let url = format!("{}/storage/{}/{}", self.public_base_url, MATERIALS_BUCKET, key);
        if download {
            format!("{url}?download=true")
        } else {
            url
        }
    }
}

/// Uploads currently being written, counted per uploader.
#[derive(Debug, Clone, Default)]
pub struct UploadTracker {
    in_flight: Arc<Mutex<HashMap<i64, usize>>>,
}

impl UploadTracker {
    pub fn begin(&self, user_id: i64) -> UploadTicket {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *in_flight.entry(user_id).or_insert(0) += 1;

        UploadTicket {
            tracker: self.clone(),
            user_id,
        }
    }

    pub fn is_uploading(&self, user_id: i64) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&user_id)
            .is_some_and(|count| *count > 0)
    }

    fn release(&self, user_id: i64) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(count) = in_flight.get_mut(&user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_flight.remove(&user_id);
            }
        }
    }
}

/// Marks one upload as in flight until dropped.
#[derive(Debug)]
pub struct UploadTicket {
    tracker: UploadTracker,
    user_id: i64,
}

impl Drop for UploadTicket {
    fn drop(&mut self) {
        self.tracker.release(self.user_id);
    }
}
