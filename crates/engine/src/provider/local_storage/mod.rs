//! Filesystem-backed object storage.
//!
//! Buckets are directories under a root; object names may contain `/` and
//! map to nested paths. Useful as a fallback and in tests.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use serde_json::json;

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::models::{Capability, RequestEnvelope};
use crate::provider::http;
use crate::provider::{Provider, ProviderResult};

const VENDOR: &str = "local_storage";
const CAPABILITIES: &[Capability] = &[
    Capability::ObjectUpload,
    Capability::ObjectDownload,
    Capability::ObjectDelete,
    Capability::ObjectList,
];

pub struct LocalStorageProvider {
    root: PathBuf,
}

impl LocalStorageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, ProviderError> {
        Ok(self.root.join(relative_path(bucket)?))
    }

    fn object_path(&self, bucket: &str, object_name: &str) -> Result<PathBuf, ProviderError> {
        Ok(self.bucket_dir(bucket)?.join(relative_path(object_name)?))
    }

    async fn upload(&self, request: &RequestEnvelope) -> ProviderResult {
        let source = PathBuf::from(request.require_str("file_path")?);
        let bucket = request.require_str("bucket")?;
        let object_name = match request.str_param("object_name") {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| invalid("file_path has no file name"))?,
        };

        let target = self.object_path(bucket, &object_name)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let size = tokio::fs::copy(&source, &target).await.map_err(io_error)?;

        info!("Stored {} bytes as {}/{}", size, bucket, object_name);
        Ok(json!({
            "bucket": bucket,
            "object_name": object_name,
            "size": size,
            "location": target.to_string_lossy(),
        }))
    }

    async fn download(&self, request: &RequestEnvelope) -> ProviderResult {
        let bucket = request.require_str("bucket")?;
        let object_name = request.require_str("object_name")?;
        let destination = PathBuf::from(request.require_str("destination_path")?);

        let source = self.object_path(bucket, object_name)?;
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let size = tokio::fs::copy(&source, &destination)
            .await
            .map_err(io_error)?;

        Ok(json!({
            "bucket": bucket,
            "object_name": object_name,
            "size": size,
            "destination_path": destination.to_string_lossy(),
        }))
    }

    async fn delete(&self, request: &RequestEnvelope) -> ProviderResult {
        let bucket = request.require_str("bucket")?;
        let object_name = request.require_str("object_name")?;

        let path = self.object_path(bucket, object_name)?;
        tokio::fs::remove_file(&path).await.map_err(io_error)?;

        debug!("Deleted {}/{}", bucket, object_name);
        Ok(json!({ "bucket": bucket, "object_name": object_name, "deleted": true }))
    }

    async fn list(&self, request: &RequestEnvelope) -> ProviderResult {
        let bucket = request.require_str("bucket")?;
        let prefix = request.str_param("prefix").unwrap_or("");
        let dir = self.bucket_dir(bucket)?;

        let mut objects = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await.map_err(io_error)?;
            while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
                let file_type = entry.file_type().await.map_err(io_error)?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&dir) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.starts_with(prefix) {
                    objects.push(name);
                }
            }
        }
        objects.sort();

        Ok(json!({ "bucket": bucket, "count": objects.len(), "objects": objects }))
    }
}

/// Only plain relative components are allowed; `..`, roots and drive
/// prefixes would escape the storage root.
fn relative_path(name: &str) -> Result<PathBuf, ProviderError> {
    let path = Path::new(name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(invalid(format!("path '{}' escapes the storage root", name))),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(invalid(format!("'{}' is not a valid object path", name)));
    }
    Ok(clean)
}

fn invalid(message: impl Into<String>) -> ProviderError {
    ProviderError::permanent(ProviderErrorKind::InvalidRequest, message)
}

fn io_error(error: io::Error) -> ProviderError {
    match error.kind() {
        io::ErrorKind::NotFound => {
            ProviderError::permanent(ProviderErrorKind::NotFound, error.to_string())
        }
        io::ErrorKind::PermissionDenied => {
            ProviderError::permanent(ProviderErrorKind::Unauthorized, error.to_string())
        }
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
            ProviderError::retryable(ProviderErrorKind::Timeout, error.to_string())
        }
        _ => ProviderError::permanent(ProviderErrorKind::Other, error.to_string()),
    }
}

#[async_trait]
impl Provider for LocalStorageProvider {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult {
        match request.capability() {
            Capability::ObjectUpload => self.upload(request).await,
            Capability::ObjectDownload => self.download(request).await,
            Capability::ObjectDelete => self.delete(request).await,
            Capability::ObjectList => self.list(request).await,
            other => Err(http::unsupported(VENDOR, other)),
        }
    }
}
