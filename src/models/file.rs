// src/models/file.rs
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;

use super::ServiceError;

/// Lifecycle of an uploaded file.
///
/// `Pending` is the pre-confirmation phase: the metadata exists but the
/// client's transfer to the object store has not been verified yet. Pending
/// files never show up in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Uploaded,
    Processing,
    Ready,
    ActionRequired { reason: String },
    Error { message: String },
}

// Things that can happen to a file; fed through `FileStatus::apply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Confirmed,
    ProcessingStarted,
    Processed,
    HeadersMissing(String),
    Failed(String),
    // processing never reported back
    Stalled(String),
    ContinueAnyway,
    Retry,
}

impl FileEvent {
    fn describe(&self) -> &'static str {
        match self {
            FileEvent::Confirmed => "confirm",
            FileEvent::ProcessingStarted => "start processing",
            FileEvent::Processed => "finish processing",
            FileEvent::HeadersMissing(_) | FileEvent::Failed(_) => "record a processing failure for",
            FileEvent::Stalled(_) => "give up processing",
            FileEvent::ContinueAnyway => "continue processing",
            FileEvent::Retry => "retry",
        }
    }
}

impl FileStatus {
    // The single place where legal transitions are defined
    pub fn apply(&self, event: FileEvent) -> Result<FileStatus, ServiceError> {
        match (self, event) {
            (FileStatus::Pending, FileEvent::Confirmed) => Ok(FileStatus::Uploaded),
            (FileStatus::Uploaded, FileEvent::ProcessingStarted) => Ok(FileStatus::Processing),
            (FileStatus::ActionRequired { .. }, FileEvent::ContinueAnyway) => Ok(FileStatus::Processing),
            (FileStatus::Processing, FileEvent::Processed) => Ok(FileStatus::Ready),
            (FileStatus::Processing, FileEvent::HeadersMissing(reason)) => {
                Ok(FileStatus::ActionRequired { reason })
            }
            (FileStatus::Processing, FileEvent::Failed(message))
            | (FileStatus::Processing, FileEvent::Stalled(message)) => Ok(FileStatus::Error { message }),
            (FileStatus::Error { .. }, FileEvent::Retry) => Ok(FileStatus::Uploaded),
            (current, event) => Err(ServiceError::Conflict(format!(
                "Cannot {} a file that is {}",
                event.describe(),
                current.label().replace('_', " ")
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Uploaded => "uploaded",
            FileStatus::Processing => "processing",
            FileStatus::Ready => "ready",
            FileStatus::ActionRequired { .. } => "action_required",
            FileStatus::Error { .. } => "error",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            FileStatus::ActionRequired { reason } => Some(reason),
            FileStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FileStatus::Pending)
    }

    fn from_parts(label: &str, message: Option<String>) -> Result<Self, String> {
        let status = match label {
            "pending" => FileStatus::Pending,
            "uploaded" => FileStatus::Uploaded,
            "processing" => FileStatus::Processing,
            "ready" => FileStatus::Ready,
            "action_required" => FileStatus::ActionRequired {
                reason: message.unwrap_or_default(),
            },
            "error" => FileStatus::Error {
                message: message.unwrap_or_default(),
            },
            other => return Err(format!("unknown file status: {}", other)),
        };
        Ok(status)
    }
}

// Exactly one visibility mode holds at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
    Team(String),
}

impl Visibility {
    // "private", "public" (any case), or anything else is taken as a team id
    pub fn parse_target(target: &str) -> Result<Self, ServiceError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ServiceError::BadRequest(
                "Visibility must be \"private\", \"public\" or a team id".to_string(),
            ));
        }
        if target.eq_ignore_ascii_case("private") {
            Ok(Visibility::Private)
        } else if target.eq_ignore_ascii_case("public") {
            Ok(Visibility::Public)
        } else {
            Ok(Visibility::Team(target.to_string()))
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePermission {
    #[display(fmt = "admin")]
    Admin,
    #[display(fmt = "edit")]
    Edit,
    #[display(fmt = "view")]
    View,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub headers: Vec<String>,
    pub summary: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FileDocument", try_from = "FileDocument")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub display_name: String,
    // object-store key, fixed at creation
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub creator_id: String,
    pub permissions: BTreeMap<String, FilePermission>,
    pub visibility: Visibility,
    pub is_locked: bool,
    pub status: FileStatus,
    pub metadata: Option<FileMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    // Metadata for an upload that has been prepared but not confirmed
    pub fn pending(
        id: String,
        name: &str,
        path: String,
        size: u64,
        content_type: String,
        creator_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut permissions = BTreeMap::new();
        permissions.insert(creator_id.to_string(), FilePermission::Admin);

        Self {
            id,
            name: name.to_string(),
            display_name: name.to_string(),
            path,
            size,
            content_type,
            creator_id: creator_id.to_string(),
            permissions,
            visibility: Visibility::Private,
            is_locked: false,
            status: FileStatus::Pending,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, event: FileEvent, now: DateTime<Utc>) -> Result<(), ServiceError> {
        self.status = self.status.apply(event)?;
        self.is_locked = self.status == FileStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn team_ids(&self) -> Vec<&str> {
        match &self.visibility {
            Visibility::Team(team_id) => vec![team_id.as_str()],
            _ => Vec::new(),
        }
    }
}

// Stored/serialised shape of a file
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub creator_id: String,
    pub permissions: BTreeMap<String, FilePermission>,
    pub is_public: bool,
    #[serde(default)]
    pub team_ids: Vec<String>,
    pub is_locked: bool,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub metadata: Option<FileMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FileRecord> for FileDocument {
    fn from(file: FileRecord) -> Self {
        let (is_public, team_ids) = match &file.visibility {
            Visibility::Private => (false, Vec::new()),
            Visibility::Public => (true, Vec::new()),
            Visibility::Team(team_id) => (false, vec![team_id.clone()]),
        };

        Self {
            status: file.status.label().to_string(),
            status_message: file.status.message().map(str::to_string),
            id: file.id,
            name: file.name,
            display_name: file.display_name,
            path: file.path,
            size: file.size,
            content_type: file.content_type,
            creator_id: file.creator_id,
            permissions: file.permissions,
            is_public,
            team_ids,
            is_locked: file.is_locked,
            metadata: file.metadata,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

impl TryFrom<FileDocument> for FileRecord {
    type Error = String;

    fn try_from(doc: FileDocument) -> Result<Self, Self::Error> {
        let visibility = match (doc.is_public, doc.team_ids.as_slice()) {
            (false, []) => Visibility::Private,
            (true, []) => Visibility::Public,
            (false, [team_id]) => Visibility::Team(team_id.clone()),
            _ => {
                return Err(format!(
                    "file {} mixes visibility modes (isPublic={}, teamIds={:?})",
                    doc.id, doc.is_public, doc.team_ids
                ))
            }
        };

        Ok(Self {
            status: FileStatus::from_parts(&doc.status, doc.status_message)?,
            id: doc.id,
            name: doc.name,
            display_name: doc.display_name,
            path: doc.path,
            size: doc.size,
            content_type: doc.content_type,
            creator_id: doc.creator_id,
            permissions: doc.permissions,
            visibility,
            is_locked: doc.is_locked,
            metadata: doc.metadata,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }
}

// Upload and file request/response bodies
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUploadRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub file_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PreparedUpload {
    pub file: FileRecord,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RenameFileRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SetVisibilityRequest {
    pub visibility: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub file_ids: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub answer: String,
}
