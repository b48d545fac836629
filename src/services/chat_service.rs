// src/services/chat_service.rs

use log::{debug, info};
use std::sync::Arc;

use crate::db::Database;
use crate::models::{FileRecord, FileStatus, ServiceError};
use crate::services::file_service::visible_file;
use crate::services::permissions;
use crate::utils::text_generation::TextGenerator;

const MAX_QUESTION_CHARS: usize = 2000;
const MAX_CONTEXT_FILES: usize = 20;

// Assistant that answers questions from file names, headers and summaries
#[derive(Clone)]
pub struct ChatService {
    db: Database,
    generator: Arc<dyn TextGenerator>,
}

impl ChatService {
    pub fn new(db: Database, generator: Arc<dyn TextGenerator>) -> Self {
        Self { db, generator }
    }

    pub async fn ask(
        &self,
        user_id: &str,
        user_team_ids: &[String],
        question: &str,
        file_ids: Option<&[String]>,
    ) -> Result<String, ServiceError> {
        let question = question.trim();
        let length = question.chars().count();
        if length == 0 || length > MAX_QUESTION_CHARS {
            return Err(ServiceError::BadRequest(format!(
                "Question must be between 1 and {} characters",
                MAX_QUESTION_CHARS
            )));
        }

        let context = self.context_files(user_id, user_team_ids, file_ids)?;
        debug!("Answering question for user: {} with {} files of context", user_id, context.len());

        let answer = self.generator.generate(&chat_prompt(question, &context)).await?;

        info!("💬 Answered question for user: {}", user_id);
        Ok(answer)
    }

    fn context_files(
        &self,
        user_id: &str,
        user_team_ids: &[String],
        file_ids: Option<&[String]>,
    ) -> Result<Vec<FileRecord>, ServiceError> {
        self.db.read(|c| match file_ids {
            Some(ids) => {
                let mut files = Vec::with_capacity(ids.len());
                for id in ids.iter().take(MAX_CONTEXT_FILES) {
                    let file = visible_file(c.files.get(id), id)?;
                    if !permissions::can_read_file(&file, user_id, user_team_ids) {
                        return Err(ServiceError::Forbidden(
                            "You do not have access to one of the selected files".to_string(),
                        ));
                    }
                    files.push(file);
                }
                Ok(files)
            }
            None => {
                let mut files: Vec<FileRecord> = c
                    .files
                    .values()
                    .filter(|f| f.status == FileStatus::Ready)
                    .filter(|f| permissions::can_read_file(f, user_id, user_team_ids))
                    .cloned()
                    .collect();
                files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                files.truncate(MAX_CONTEXT_FILES);
                Ok(files)
            }
        })?
    }
}

fn chat_prompt(question: &str, files: &[FileRecord]) -> String {
    let mut prompt = String::from(
        "Answer the user's question using only the files described below. \
         If they do not contain the answer, say so.\n\nFiles:\n",
    );

    if files.is_empty() {
        prompt.push_str("(no processed files are available)\n");
    }
    for file in files {
        let (headers, summary) = match &file.metadata {
            Some(meta) => (meta.headers.join(", "), meta.summary.as_str()),
            None => (String::new(), "not processed yet"),
        };
        prompt.push_str(&format!(
            "- {} | columns: {} | summary: {}\n",
            file.display_name,
            if headers.is_empty() { "none" } else { headers.as_str() },
            summary
        ));
    }

    prompt.push_str("\nQuestion: ");
    prompt.push_str(question);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileMetadata;
    use chrono::Utc;

    #[test]
    fn test_prompt_lists_file_context() {
        let mut file = FileRecord::pending(
            "f1".into(),
            "sales.csv",
            "uploads/u/f1/sales.csv".into(),
            10,
            "text/csv".into(),
            "u",
            Utc::now(),
        );
        file.metadata = Some(FileMetadata {
            headers: vec!["region".into(), "units".into()],
            summary: "Units by region".into(),
            processed_at: Utc::now(),
        });

        let prompt = chat_prompt("Which region sold most?", &[file]);
        assert!(prompt.contains("- sales.csv | columns: region, units | summary: Units by region"));
        assert!(prompt.ends_with("Question: Which region sold most?"));
    }
}
