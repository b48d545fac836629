// src/tests/support.rs
//
// In-memory collaborators and fixtures shared by the scenario tests.
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::Config;
use crate::db::Database;
use crate::models::{FileRecord, PrepareUploadRequest, ServiceError, SessionIdentity, User};
use crate::state::{AppState, Collaborators};
use crate::utils::header_extraction::TabularHeaderExtractor;
use crate::utils::identity::JwtIdentityVerifier;
use crate::utils::object_store::{ObjectStat, ObjectStore, SignedUrl};
use crate::utils::text_generation::TextGenerator;

pub const TEST_SECRET: &str = "scenario-secret";

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    // What a client's direct transfer would leave behind
    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.objects
            .write()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn remove(&self, path: &str) {
        self.objects.write().unwrap().remove(path);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.read().unwrap().contains_key(path)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn signed_upload_url(&self, path: &str, _content_type: &str, ttl: Duration) -> Result<SignedUrl, ServiceError> {
        Ok(SignedUrl {
            url: format!("memory://{}?op=put", path),
            expires_at: Utc::now() + ttl,
        })
    }

    async fn signed_download_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, ServiceError> {
        Ok(SignedUrl {
            url: format!("memory://{}?op=get", path),
            expires_at: Utc::now() + ttl,
        })
    }

    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>, ServiceError> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .get(path)
            .map(|bytes| ObjectStat { size: bytes.len() as u64 }))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
        self.objects
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("File content is no longer available".to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        self.objects.write().unwrap().remove(path);
        Ok(())
    }
}

// Replies from a queue, then with a fixed summary
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, ServiceError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn push(&self, reply: Result<String, ServiceError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("A short summary".to_string()))
    }
}

pub struct Harness {
    pub state: AppState,
    pub objects: Arc<MemoryObjectStore>,
    pub generator: Arc<ScriptedGenerator>,
}

pub fn temp_storage_dir() -> PathBuf {
    std::env::temp_dir().join(format!("tabula-test-{}", uuid::Uuid::new_v4()))
}

pub fn harness() -> Harness {
    let objects = Arc::new(MemoryObjectStore::default());
    let generator = Arc::new(ScriptedGenerator::default());

    let collaborators = Collaborators {
        identity: Arc::new(JwtIdentityVerifier::new(TEST_SECRET)),
        objects: objects.clone(),
        local_objects: None,
        generator: generator.clone(),
        extractor: Arc::new(TabularHeaderExtractor),
    };
    let state = AppState::build(
        Config::for_storage_dir(temp_storage_dir()),
        Database::in_memory(),
        collaborators,
    );

    Harness {
        state,
        objects,
        generator,
    }
}

impl Harness {
    pub fn user(&self, id: &str) -> User {
        self.state
            .users
            .upsert_from_identity(&SessionIdentity {
                user_id: id.to_string(),
                email: format!("{}@example.com", id),
                display_name: Some(id.to_uppercase()),
            })
            .unwrap()
    }

    pub fn team_ids(&self, user: &User) -> Vec<String> {
        self.state.teams.team_ids_for_user(&user.id).unwrap()
    }

    // Prepared, transferred and confirmed, but not yet processed
    pub async fn uploaded_file(&self, user: &User, name: &str, content: impl AsRef<[u8]>) -> FileRecord {
        let content = content.as_ref();
        let prepared = self
            .state
            .uploads
            .prepare(
                user,
                &PrepareUploadRequest {
                    file_name: name.to_string(),
                    content_type: None,
                    file_size: content.len() as u64,
                },
            )
            .await
            .unwrap();

        self.objects.put(&prepared.file.path, content);
        self.state
            .uploads
            .confirm(&prepared.file.id, &user.id)
            .await
            .unwrap()
    }

    pub async fn ready_file(&self, user: &User, name: &str, content: impl AsRef<[u8]>) -> FileRecord {
        let file = self.uploaded_file(user, name, content).await;
        self.state.files.process(&file.id).await.unwrap();
        self.stored_file(&file.id).unwrap()
    }

    // Raw store view, bypassing access checks
    pub fn stored_file(&self, file_id: &str) -> Option<FileRecord> {
        self.state
            .db
            .read(|c| c.files.get(file_id).cloned())
            .unwrap()
    }
}

fn column_name(index: usize) -> String {
    let mut index = index + 1;
    let mut name = String::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        name.insert(0, (b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    name
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

// Smallest xlsx package with one sheet; numeric-looking cells are stored as numbers
pub fn workbook(rows: &[&[&str]]) -> Vec<u8> {
    use zip::write::{FileOptions, ZipWriter};
    use zip::CompressionMethod;

    let mut sheet_rows = String::new();
    for (r, row) in rows.iter().enumerate() {
        sheet_rows.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_name(c), r + 1);
            if cell.is_empty() {
                continue;
            } else if cell.parse::<f64>().is_ok() {
                sheet_rows.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", reference, cell));
            } else {
                sheet_rows.push_str(&format!(
                    "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    reference,
                    xml_escape(cell)
                ));
            }
        }
        sheet_rows.push_str("</row>");
    }

    let parts = [
        (
            "[Content_Types].xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
                r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                r#"</Types>"#
            )
            .to_string(),
        ),
        (
            "_rels/.rels",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
                r#"</Relationships>"#
            )
            .to_string(),
        ),
        (
            "xl/workbook.xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>"#,
                r#"</workbook>"#
            )
            .to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
                r#"</Relationships>"#
            )
            .to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                    r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
                    r#"<sheetData>{}</sheetData></worksheet>"#
                ),
                sheet_rows
            ),
        ),
    ];

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, body) in parts.iter() {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer
}
