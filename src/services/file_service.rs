// src/services/file_service.rs

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::db::Database;
use crate::models::{
    DownloadLink, FileEvent, FileMetadata, FileRecord, FileStatus, ServiceError, Visibility,
};
use crate::services::permissions;
use crate::services::team_service::gate_team;
use crate::utils::header_extraction::{HeaderError, HeaderExtractor};
use crate::utils::object_store::ObjectStore;
use crate::utils::text_generation::TextGenerator;

const MAX_DISPLAY_NAME_CHARS: usize = 255;
const SAMPLE_ROWS: usize = 5;
const SAMPLE_ROW_CHARS: usize = 200;
const STALLED_MESSAGE: &str = "Processing did not finish, retry to run it again";

// Why a processing run did not reach Ready; each maps to one FileEvent
enum ProcessingFailure {
    HeadersMissing(String),
    Failed { message: String, detail: String },
}

impl ProcessingFailure {
    fn failed(message: &str, detail: impl ToString) -> Self {
        ProcessingFailure::Failed {
            message: message.to_string(),
            detail: detail.to_string(),
        }
    }

    fn into_event(self, file_id: &str) -> FileEvent {
        match self {
            ProcessingFailure::HeadersMissing(reason) => FileEvent::HeadersMissing(reason),
            ProcessingFailure::Failed { message, detail } => {
                warn!("⚠️ Processing failed for file: {}: {}", file_id, detail);
                FileEvent::Failed(message)
            }
        }
    }
}

pub(crate) fn visible_file(file: Option<&FileRecord>, file_id: &str) -> Result<FileRecord, ServiceError> {
    match file {
        Some(file) if !file.status.is_pending() => Ok(file.clone()),
        _ => {
            debug!("File not found or still pending: {}", file_id);
            Err(ServiceError::NotFound("File not found".to_string()))
        }
    }
}

fn managed_file(file: Option<&FileRecord>, file_id: &str, user_id: &str) -> Result<FileRecord, ServiceError> {
    let file = visible_file(file, file_id)?;
    if !permissions::can_manage_file(&file, user_id) {
        error!("❌ User: {} is not the creator of file: {}", user_id, file_id);
        return Err(ServiceError::Forbidden(
            "Only the file's creator can change or delete it".to_string(),
        ));
    }
    Ok(file)
}

/// File registry and processing state machine.
///
/// Status changes always go through `FileRecord::apply`, inside a
/// transaction, so an illegal transition surfaces as a conflict instead of
/// silently overwriting a concurrent change.
#[derive(Clone)]
pub struct FileService {
    db: Database,
    objects: Arc<dyn ObjectStore>,
    generator: Arc<dyn TextGenerator>,
    extractor: Arc<dyn HeaderExtractor>,
    download_ttl: Duration,
}

impl FileService {
    pub fn new(
        db: Database,
        objects: Arc<dyn ObjectStore>,
        generator: Arc<dyn TextGenerator>,
        extractor: Arc<dyn HeaderExtractor>,
        download_ttl: Duration,
    ) -> Self {
        Self {
            db,
            objects,
            generator,
            extractor,
            download_ttl,
        }
    }

    // Own files, public files and files shared with one of the user's teams; newest first
    pub fn files_for_user(&self, user_id: &str, user_team_ids: &[String]) -> Result<Vec<FileRecord>, ServiceError> {
        let mut files = self.db.read(|c| {
            c.files
                .values()
                .filter(|f| !f.status.is_pending())
                .filter(|f| permissions::can_read_file(f, user_id, user_team_ids))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        debug!("Found {} files for user: {}", files.len(), user_id);
        Ok(files)
    }

    pub fn file_by_id(&self, file_id: &str, user_id: &str, user_team_ids: &[String]) -> Result<FileRecord, ServiceError> {
        let file = self.db.read(|c| visible_file(c.files.get(file_id), file_id))??;

        if !permissions::can_read_file(&file, user_id, user_team_ids) {
            error!("❌ User: {} cannot read file: {}", user_id, file_id);
            return Err(ServiceError::Forbidden(
                "You do not have access to this file".to_string(),
            ));
        }
        Ok(file)
    }

    pub fn rename(&self, file_id: &str, user_id: &str, name: &str) -> Result<FileRecord, ServiceError> {
        let name = name.trim();
        let length = name.chars().count();
        if length == 0 || length > MAX_DISPLAY_NAME_CHARS {
            return Err(ServiceError::BadRequest(format!(
                "File name must be between 1 and {} characters",
                MAX_DISPLAY_NAME_CHARS
            )));
        }

        let file = self.db.transaction(|tx| {
            let mut file = managed_file(tx.file(file_id), file_id, user_id)?;
            file.display_name = name.to_string();
            file.updated_at = Utc::now();
            tx.put_file(file.clone());
            Ok(file)
        })?;

        info!("✏️ File: {} renamed to: {}", file_id, name);
        Ok(file)
    }

    // "private", "public" or a team id the creator belongs to; one mode replaces the other
    pub fn set_visibility(&self, file_id: &str, user_id: &str, target: &str) -> Result<FileRecord, ServiceError> {
        let visibility = Visibility::parse_target(target)?;

        let file = self.db.transaction(|tx| {
            let mut file = managed_file(tx.file(file_id), file_id, user_id)?;
            if let Visibility::Team(team_id) = &visibility {
                gate_team(tx.team(team_id), team_id, user_id)?;
            }

            file.visibility = visibility.clone();
            file.updated_at = Utc::now();
            tx.put_file(file.clone());
            Ok(file)
        })?;

        info!("🔐 File: {} visibility set to {:?}", file_id, file.visibility);
        Ok(file)
    }

    /// Deletes the stored bytes, then the record.
    ///
    /// If the object delete fails the record is kept, so storage can never be
    /// orphaned without a record pointing at it.
    pub async fn delete(&self, file_id: &str, user_id: &str) -> Result<(), ServiceError> {
        let file = self.db.read(|c| managed_file(c.files.get(file_id), file_id, user_id))??;
        if file.is_locked {
            return Err(ServiceError::Conflict(
                "File is being processed, try again once processing has finished".to_string(),
            ));
        }

        info!("🗑️ Deleting file: {} for user: {}", file_id, user_id);

        if !file.path.is_empty() {
            self.objects.delete(&file.path).await?;
        }

        self.db.transaction(|tx| {
            let locked = match tx.file(file_id) {
                Some(current) => current.is_locked,
                // already gone
                None => return Ok(()),
            };
            if locked {
                return Err(ServiceError::Conflict(
                    "File is being processed, try again once processing has finished".to_string(),
                ));
            }
            tx.delete_file(file_id);
            Ok(())
        })?;

        info!("✅ File deleted: {}", file_id);
        Ok(())
    }

    // Readable files only; a record whose bytes are gone is reported, not repaired
    pub async fn download_url(
        &self,
        file_id: &str,
        user_id: &str,
        user_team_ids: &[String],
    ) -> Result<DownloadLink, ServiceError> {
        let file = self.file_by_id(file_id, user_id, user_team_ids)?;

        if self.objects.stat(&file.path).await?.is_none() {
            warn!("⚠️ File: {} has metadata but no stored content at {}", file_id, file.path);
            return Err(ServiceError::NotFound(
                "File content is no longer available".to_string(),
            ));
        }

        let signed = self.objects.signed_download_url(&file.path, self.download_ttl).await?;
        Ok(DownloadLink {
            url: signed.url,
            expires_at: signed.expires_at,
        })
    }

    /// Runs extraction and summarisation for an `Uploaded` file.
    ///
    /// Processing failures become file status rather than errors: missing
    /// headers end in `ActionRequired`, anything else in `Error`. The returned
    /// error is reserved for the file not being processable at all.
    pub async fn process(&self, file_id: &str) -> Result<FileStatus, ServiceError> {
        let file = self.transition(file_id, None, FileEvent::ProcessingStarted)?;
        info!("⚙️ Processing file: {}", file_id);

        let outcome = self.run_pipeline(&file, true).await;
        self.record_outcome(file_id, outcome)
    }

    // Resumes an ActionRequired file, summarising it without headers
    pub async fn continue_without_headers(&self, file_id: &str, user_id: &str) -> Result<FileStatus, ServiceError> {
        let file = self.transition(file_id, Some(user_id), FileEvent::ContinueAnyway)?;
        info!("⚙️ Continuing file: {} without headers", file_id);

        let outcome = self.run_pipeline(&file, false).await;
        self.record_outcome(file_id, outcome)
    }

    pub async fn retry_processing(&self, file_id: &str, user_id: &str) -> Result<FileStatus, ServiceError> {
        self.transition(file_id, Some(user_id), FileEvent::Retry)?;
        info!("🔁 Retrying file: {}", file_id);
        self.process(file_id).await
    }

    /// Moves files that have sat in `Processing` for longer than `max_age` to
    /// `Error`, which unlocks them and makes them retryable.
    ///
    /// A run that crashed or could not record its outcome leaves the file
    /// locked otherwise. Returns how many files were recovered.
    pub fn recover_stalled_processing(&self, now: DateTime<Utc>, max_age: Duration) -> Result<usize, ServiceError> {
        let cutoff = now - max_age;
        let stalled = self.db.read(|c| {
            c.files
                .values()
                .filter(|f| f.status == FileStatus::Processing && f.updated_at < cutoff)
                .map(|f| f.id.clone())
                .collect::<Vec<_>>()
        })?;

        let mut recovered = 0;
        for file_id in stalled {
            let result = self.db.transaction(|tx| {
                let mut file = match tx.file(&file_id) {
                    // picked up again or finished in the meantime
                    Some(file) if file.status == FileStatus::Processing && file.updated_at < cutoff => file.clone(),
                    _ => return Ok(false),
                };
                file.apply(FileEvent::Stalled(STALLED_MESSAGE.to_string()), Utc::now())?;
                tx.put_file(file);
                Ok(true)
            });

            match result {
                Ok(true) => {
                    warn!("⚠️ File: {} was stuck processing since before {}, marked as error", file_id, cutoff);
                    recovered += 1;
                }
                Ok(false) => {}
                Err(e) => error!("❌ Could not recover stalled file: {}: {}", file_id, e),
            }
        }

        if recovered > 0 {
            info!("🧹 Recovered {} stalled files", recovered);
        }
        Ok(recovered)
    }

    // Guarded status change; `manager` restricts it to the file's creator
    fn transition(&self, file_id: &str, manager: Option<&str>, event: FileEvent) -> Result<FileRecord, ServiceError> {
        self.db.transaction(|tx| {
            let mut file = match manager {
                Some(user_id) => managed_file(tx.file(file_id), file_id, user_id)?,
                None => visible_file(tx.file(file_id), file_id)?,
            };
            file.apply(event, Utc::now())?;
            tx.put_file(file.clone());
            Ok(file)
        })
    }

    async fn run_pipeline(&self, file: &FileRecord, with_headers: bool) -> Result<FileMetadata, ProcessingFailure> {
        let bytes = self
            .objects
            .read(&file.path)
            .await
            .map_err(|e| ProcessingFailure::failed("The file content could not be loaded", e))?;

        let headers = if with_headers {
            self.extractor
                .extract_headers(&file.name, &bytes)
                .map_err(|e| match &e {
                    HeaderError::NoHeaders => ProcessingFailure::HeadersMissing(e.to_string()),
                    HeaderError::Unsupported(_) => ProcessingFailure::failed(&e.to_string(), &e),
                    HeaderError::Unreadable(_) => {
                        ProcessingFailure::failed("The file content could not be read", &e)
                    }
                })?
        } else {
            Vec::new()
        };

        let prompt = summary_prompt(file, &headers, &bytes);
        let summary = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| ProcessingFailure::failed("A summary could not be generated for this file", e))?;

        Ok(FileMetadata {
            headers,
            summary,
            processed_at: Utc::now(),
        })
    }

    fn record_outcome(
        &self,
        file_id: &str,
        outcome: Result<FileMetadata, ProcessingFailure>,
    ) -> Result<FileStatus, ServiceError> {
        let event = match outcome {
            Ok(metadata) => {
                let saved = self.db.transaction(|tx| {
                    let mut file = visible_file(tx.file(file_id), file_id)?;
                    file.apply(FileEvent::Processed, Utc::now())?;
                    file.metadata = Some(metadata);
                    tx.put_file(file.clone());
                    Ok(file.status)
                });

                match saved {
                    Ok(status) => {
                        info!("✅ File: {} is ready", file_id);
                        return Ok(status);
                    }
                    Err(e) => {
                        error!("❌ Failed to save processing results for file: {}: {}", file_id, e);
                        FileEvent::Failed("Processing results could not be saved".to_string())
                    }
                }
            }
            Err(failure) => failure.into_event(file_id),
        };

        let file = self.transition(file_id, None, event).map_err(|e| {
            // left Processing; recover_stalled_processing moves it to Error later
            error!("❌ Could not record processing failure for file: {}: {}", file_id, e);
            e
        })?;

        info!("📌 File: {} finished processing as {}", file_id, file.status.label());
        Ok(file.status)
    }
}

fn summary_prompt(file: &FileRecord, headers: &[String], bytes: &[u8]) -> String {
    let mut prompt = format!(
        "Summarise the data file \"{}\" in two or three sentences for someone browsing their files.\n",
        file.display_name
    );

    if headers.is_empty() {
        prompt.push_str("The file has no header row.\n");
    } else {
        prompt.push_str("Columns:\n");
        for header in headers {
            prompt.push_str(&format!("- {}\n", header));
        }
    }

    // workbooks are binary; only text formats get sample rows
    let content = match std::str::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => return prompt,
    };
    prompt.push_str("Sample rows:\n");
    for line in content.lines().filter(|l| !l.trim().is_empty()).take(SAMPLE_ROWS) {
        let line: String = line.chars().take(SAMPLE_ROW_CHARS).collect();
        prompt.push_str(&line);
        prompt.push('\n');
    }
    prompt
}
