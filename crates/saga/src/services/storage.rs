//! Blob storage trait with in-memory and filesystem implementations.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ArtifactError;

/// Durable storage for rendered labels.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Uploads `bytes` as `bucket/file_name`, replacing any previous object,
    /// and returns its public URL.
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, bucket: &str)
    -> Result<String, ArtifactError>;
}

#[derive(Debug, Default)]
struct InMemoryStorageState {
    objects: HashMap<String, Vec<u8>>,
    transient_failures: HashMap<String, u32>,
    rejected: HashSet<String>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    upload_calls: usize,
}

/// In-memory blob storage for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStorage {
    state: Arc<RwLock<InMemoryStorageState>>,
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` uploads of `file_name` with a retryable error.
    pub fn fail_upload_for(&self, file_name: &str, times: u32) {
        self.state
            .write()
            .unwrap()
            .transient_failures
            .insert(file_name.to_string(), times);
    }

    /// Permanently rejects uploads of `file_name`.
    pub fn reject_upload_for(&self, file_name: &str) {
        self.state
            .write()
            .unwrap()
            .rejected
            .insert(file_name.to_string());
    }

    /// Panics while uploading `file_name`.
    pub fn panic_on_upload_for(&self, file_name: &str) {
        self.state
            .write()
            .unwrap()
            .panics
            .insert(file_name.to_string());
    }

    /// Delays the upload of `file_name`, to control completion order.
    pub fn delay_upload_for(&self, file_name: &str, delay: Duration) {
        self.state
            .write()
            .unwrap()
            .delays
            .insert(file_name.to_string(), delay);
    }

    pub fn object_count(&self) -> usize {
        self.state.read().unwrap().objects.len()
    }

    pub fn has_object(&self, bucket: &str, file_name: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .objects
            .contains_key(&format!("{bucket}/{file_name}"))
    }

    pub fn upload_calls(&self) -> usize {
        self.state.read().unwrap().upload_calls
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        bucket: &str,
    ) -> Result<String, ArtifactError> {
        let delay = self.state.read().unwrap().delays.get(file_name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        state.upload_calls += 1;

        if state.panics.contains(file_name) {
            drop(state);
            panic!("storage client crashed uploading {file_name}");
        }
        if state.rejected.contains(file_name) {
            return Err(ArtifactError::UploadRejected(format!(
                "bucket {bucket} refused {file_name}"
            )));
        }
        if let Some(remaining) = state.transient_failures.get_mut(file_name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ArtifactError::TransientArtifactFailure(format!(
                "upload of {file_name} timed out"
            )));
        }

        state.objects.insert(format!("{bucket}/{file_name}"), bytes);
        Ok(format!("memory://{bucket}/{file_name}"))
    }
}

/// Stores labels under `root/bucket/file_name` and serves them from
/// `public_base_url/bucket/file_name`.
#[derive(Debug, Clone)]
pub struct FileBlobStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FileBlobStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn map_io(err: std::io::Error, file_name: &str) -> ArtifactError {
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                ArtifactError::TransientArtifactFailure(format!("{file_name}: {err}"))
            }
            _ => ArtifactError::UploadRejected(format!("{file_name}: {err}")),
        }
    }
}

#[async_trait]
impl BlobStorage for FileBlobStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        bucket: &str,
    ) -> Result<String, ArtifactError> {
        if file_name.contains(['/', '\\']) || bucket.contains(['/', '\\']) {
            return Err(ArtifactError::UploadRejected(format!(
                "invalid object path {bucket}/{file_name}"
            )));
        }

        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::map_io(e, file_name))?;
        tokio::fs::write(dir.join(file_name), bytes)
            .await
            .map_err(|e| Self::map_io(e, file_name))?;

        Ok(format!("{}/{bucket}/{file_name}", self.public_base_url))
    }
}
