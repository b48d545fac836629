// src/utils/object_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use log::{debug, error, warn};
use sha2::Sha256;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::models::ServiceError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
}

/// Object store capability.
///
/// Paths are opaque keys such as `uploads/{user}/{file}/{name}`. Failures
/// of the backing store surface as `UpstreamFailure`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn signed_upload_url(
        &self,
        path: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, ServiceError>;

    async fn signed_download_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, ServiceError>;

    // None when nothing is stored at `path`
    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>, ServiceError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, ServiceError>;

    // Deleting a missing object is not an error
    async fn delete(&self, path: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOp {
    Put,
    Get,
}

impl ObjectOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectOp::Put => "put",
            ObjectOp::Get => "get",
        }
    }

    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "put" => Some(ObjectOp::Put),
            "get" => Some(ObjectOp::Get),
            _ => None,
        }
    }
}

// Rejects anything that could escape the storage root
pub fn validate_object_path(path: &str) -> Result<(), ServiceError> {
    let invalid = || ServiceError::BadRequest(format!("Invalid object path: {}", path));

    if path.is_empty() || path.contains('\\') || path.contains("..") {
        return Err(invalid());
    }
    if !Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(invalid());
    }
    Ok(())
}

// The signed string: operation, path and expiry, one per line
fn canonical_request(op: ObjectOp, path: &str, expires: i64) -> String {
    format!("{}\n{}\n{}", op.as_str(), path, expires)
}

/// Filesystem-backed store that hands out HMAC-SHA256 signed URLs.
///
/// URLs look like `{base}/objects/{path}?op=put&expires=<unix>&signature=<hex>`
/// and are served by the object routes, which call [`LocalObjectStore::verify`]
/// before touching any bytes.
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
    signing_secret: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str, signing_secret: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ServiceError> {
        validate_object_path(path)?;
        Ok(self.root.join(path))
    }

    fn mac(&self, op: ObjectOp, path: &str, expires: i64) -> Result<HmacSha256, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes()).map_err(|e| {
            error!("Invalid URL signing key: {}", e);
            ServiceError::InternalServerError
        })?;
        mac.update(canonical_request(op, path, expires).as_bytes());
        Ok(mac)
    }

    fn sign(&self, op: ObjectOp, path: &str, ttl: Duration) -> Result<SignedUrl, ServiceError> {
        validate_object_path(path)?;
        let expires_at = Utc::now() + ttl;
        let expires = expires_at.timestamp();

        Ok(SignedUrl {
            url: format!(
                "{}/objects/{}?op={}&expires={}&signature={}",
                self.base_url,
                path,
                op.as_str(),
                expires,
                hex::encode(self.mac(op, path, expires)?.finalize().into_bytes())
            ),
            expires_at,
        })
    }

    pub fn verify(
        &self,
        op: ObjectOp,
        path: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        validate_object_path(path)?;

        let tag = hex::decode(signature).map_err(|_| {
            warn!("Rejected object request with a malformed signature: {}", path);
            ServiceError::Forbidden("Invalid signature".to_string())
        })?;
        self.mac(op, path, expires)?.verify_slice(&tag).map_err(|_| {
            warn!("Rejected object request with a bad signature: {}", path);
            ServiceError::Forbidden("Invalid signature".to_string())
        })?;

        if now.timestamp() > expires {
            return Err(ServiceError::Forbidden("This link has expired".to_string()));
        }
        Ok(())
    }

    // Receives the client's direct upload
    pub async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), ServiceError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create object directory for {}: {:?}", path, e);
                ServiceError::UpstreamFailure(e.to_string())
            })?;
        }

        fs::write(&target, bytes).await.map_err(|e| {
            error!("Failed to write object {}: {:?}", path, e);
            ServiceError::UpstreamFailure(e.to_string())
        })?;

        debug!("Stored {} bytes at {}", bytes.len(), path);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn signed_upload_url(
        &self,
        path: &str,
        _content_type: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, ServiceError> {
        self.sign(ObjectOp::Put, path, ttl)
    }

    async fn signed_download_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, ServiceError> {
        self.sign(ObjectOp::Get, path, ttl)
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>, ServiceError> {
        let target = self.resolve(path)?;
        match fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectStat { size: meta.len() })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("Failed to stat object {}: {:?}", path, e);
                Err(ServiceError::UpstreamFailure(e.to_string()))
            }
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
        let target = self.resolve(path)?;
        fs::read(&target).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ServiceError::NotFound("File content is no longer available".to_string())
            } else {
                error!("Failed to read object {}: {:?}", path, e);
                ServiceError::UpstreamFailure(e.to_string())
            }
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to delete object {}: {:?}", path, e);
                Err(ServiceError::UpstreamFailure(e.to_string()))
            }
        }
    }
}
