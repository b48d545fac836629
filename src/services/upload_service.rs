// src/services/upload_service.rs

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::Database;
use crate::models::{FileEvent, FileRecord, PrepareUploadRequest, PreparedUpload, ServiceError, User};
use crate::utils::object_store::ObjectStore;

const ALLOWED_EXTENSIONS: [&str; 4] = ["csv", "tsv", "xlsx", "xls"];
const MAX_FILE_NAME_CHARS: usize = 255;

fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn default_content_type(extension: &str) -> &'static str {
    match extension {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

// Keeps the object key to a safe ASCII subset
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(file_name);
    let sanitized: String = base
        .chars()
        .take(MAX_FILE_NAME_CHARS)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.').replace("..", "_");
    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

fn format_megabytes(bytes: u64) -> String {
    format!("{} MB", bytes / (1024 * 1024))
}

/// Upload coordinator.
///
/// The protocol is prepare, then a direct client transfer to the object
/// store, then confirm or abandon. Records stay `Pending` (and out of every
/// listing) until confirm has verified the stored object independently.
#[derive(Clone)]
pub struct UploadService {
    db: Database,
    objects: Arc<dyn ObjectStore>,
    max_upload_bytes: u64,
    upload_url_ttl: Duration,
    pending_ttl: Duration,
}

impl UploadService {
    pub fn new(
        db: Database,
        objects: Arc<dyn ObjectStore>,
        max_upload_bytes: u64,
        upload_url_ttl: Duration,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            db,
            objects,
            max_upload_bytes,
            upload_url_ttl,
            pending_ttl,
        }
    }

    // Validation happens before anything is created
    pub async fn prepare(&self, user: &User, request: &PrepareUploadRequest) -> Result<PreparedUpload, ServiceError> {
        let file_name = request.file_name.trim();
        if file_name.is_empty() || file_name.chars().count() > MAX_FILE_NAME_CHARS {
            return Err(ServiceError::BadRequest(format!(
                "File name must be between 1 and {} characters",
                MAX_FILE_NAME_CHARS
            )));
        }

        let extension = extension_of(file_name)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| {
                ServiceError::BadRequest(format!(
                    "Unsupported file type, allowed types are: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                ))
            })?;

        if request.file_size == 0 {
            return Err(ServiceError::BadRequest("File is empty".to_string()));
        }
        if request.file_size > self.max_upload_bytes {
            error!(
                "❌ Rejected upload of {} bytes from user: {} (limit {})",
                request.file_size, user.id, self.max_upload_bytes
            );
            return Err(ServiceError::BadRequest(format!(
                "File is too large, the limit is {}",
                format_megabytes(self.max_upload_bytes)
            )));
        }

        let content_type = request
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| default_content_type(&extension))
            .to_string();

        let file_id = Uuid::new_v4().to_string();
        let path = format!("uploads/{}/{}/{}", user.id, file_id, sanitize_file_name(file_name));

        let signed = self
            .objects
            .signed_upload_url(&path, &content_type, self.upload_url_ttl)
            .await?;

        let file = FileRecord::pending(
            file_id,
            file_name,
            path,
            request.file_size,
            content_type,
            &user.id,
            Utc::now(),
        );
        self.db.transaction(|tx| {
            tx.put_file(file.clone());
            Ok(())
        })?;

        info!("📤 Prepared upload: {} ({}) for user: {}", file.id, file.name, user.id);

        Ok(PreparedUpload {
            file,
            upload_url: signed.url,
            expires_at: signed.expires_at,
        })
    }

    /// Promotes a pending upload to `Uploaded` once the object store confirms
    /// an object of the declared size exists.
    ///
    /// A second confirm fails with `Conflict`; the status flip itself is a
    /// guarded transition so racing confirms cannot both succeed.
    pub async fn confirm(&self, file_id: &str, user_id: &str) -> Result<FileRecord, ServiceError> {
        let file = self.owned_upload(file_id, user_id)?;
        if !file.status.is_pending() {
            return Err(ServiceError::Conflict(
                "Upload has already been confirmed".to_string(),
            ));
        }

        let stat = self.objects.stat(&file.path).await?.ok_or_else(|| {
            error!("❌ Confirm for file: {} but nothing is stored at {}", file_id, file.path);
            ServiceError::Conflict("No uploaded content was found for this file".to_string())
        })?;
        if stat.size != file.size {
            error!(
                "❌ Size mismatch for file: {}: expected {} bytes, found {}",
                file_id, file.size, stat.size
            );
            return Err(ServiceError::Conflict(format!(
                "Uploaded size ({} bytes) does not match the expected size ({} bytes)",
                stat.size, file.size
            )));
        }

        let file = self.db.transaction(|tx| {
            let mut file = tx
                .file(file_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound("Upload not found".to_string()))?;
            file.apply(FileEvent::Confirmed, Utc::now())
                .map_err(|_| ServiceError::Conflict("Upload has already been confirmed".to_string()))?;
            tx.put_file(file.clone());
            Ok(file)
        })?;

        info!("✅ Upload confirmed: {}", file_id);
        Ok(file)
    }

    // Compensates a failed transfer; calling it again is a no-op
    pub async fn abandon(&self, file_id: &str, user_id: &str) -> Result<(), ServiceError> {
        let file = match self.db.read(|c| c.files.get(file_id).cloned())? {
            Some(file) => file,
            None => {
                info!("Upload: {} already gone, nothing to abandon", file_id);
                return Ok(());
            }
        };
        if file.creator_id != user_id {
            return Err(ServiceError::Forbidden(
                "Only the uploader can abandon this upload".to_string(),
            ));
        }
        if !file.status.is_pending() {
            return Err(ServiceError::Conflict(
                "Upload has already been confirmed, delete the file instead".to_string(),
            ));
        }

        // the record goes first, so a racing confirm can no longer promote it
        if !self.remove_if_pending(file_id)? {
            info!("Upload: {} already gone, nothing to abandon", file_id);
            return Ok(());
        }
        if let Err(e) = self.objects.delete(&file.path).await {
            warn!("⚠️ Could not remove partial object {}: {}", file.path, e);
        }

        info!("🚮 Upload abandoned: {}", file_id);
        Ok(())
    }

    /// Removes uploads that were prepared but never confirmed or abandoned.
    ///
    /// Returns how many records were removed.
    pub async fn purge_stale_uploads(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let cutoff = now - self.pending_ttl;
        let stale = self.db.read(|c| {
            c.files
                .values()
                .filter(|f| f.status.is_pending() && f.created_at < cutoff)
                .map(|f| (f.id.clone(), f.path.clone()))
                .collect::<Vec<_>>()
        })?;

        let mut purged = 0;
        for (file_id, path) in stale {
            match self.remove_if_pending(&file_id) {
                Ok(true) => purged += 1,
                // abandoned in the meantime
                Ok(false) => continue,
                // confirmed in the meantime; its bytes stay
                Err(e) => {
                    warn!("⚠️ Could not purge stale upload {}: {}", file_id, e);
                    continue;
                }
            }
            if let Err(e) = self.objects.delete(&path).await {
                warn!("⚠️ Could not remove stale object {}: {}", path, e);
            }
        }

        if purged > 0 {
            info!("🧹 Purged {} stale uploads", purged);
        }
        Ok(purged)
    }

    fn owned_upload(&self, file_id: &str, user_id: &str) -> Result<FileRecord, ServiceError> {
        let file = self
            .db
            .read(|c| c.files.get(file_id).cloned())?
            .ok_or_else(|| ServiceError::NotFound("Upload not found".to_string()))?;

        if file.creator_id != user_id {
            error!("❌ User: {} tried to act on upload: {} owned by someone else", user_id, file_id);
            return Err(ServiceError::Forbidden(
                "Only the uploader can confirm this upload".to_string(),
            ));
        }
        Ok(file)
    }

    // Guarded delete; a record that left Pending is kept
    fn remove_if_pending(&self, file_id: &str) -> Result<bool, ServiceError> {
        self.db.transaction(|tx| {
            let pending = match tx.file(file_id) {
                Some(file) => file.status.is_pending(),
                None => return Ok(false),
            };
            if !pending {
                return Err(ServiceError::Conflict(
                    "Upload has already been confirmed, delete the file instead".to_string(),
                ));
            }
            tx.delete_file(file_id);
            Ok(true)
        })
    }
}
