// src/state.rs
use chrono::Duration;
use log::info;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::models::ServiceError;
use crate::services::{
    ChatService, FileService, InvitationService, TeamService, UploadService, UserService,
};
use crate::utils::header_extraction::{TabularHeaderExtractor, HeaderExtractor};
use crate::utils::identity::{IdentityVerifier, JwtIdentityVerifier};
use crate::utils::object_store::{LocalObjectStore, ObjectStore};
use crate::utils::text_generation::{HttpTextGenerator, TemplateTextGenerator, TextGenerator};

// External capabilities the services are built on
pub struct Collaborators {
    pub identity: Arc<dyn IdentityVerifier>,
    pub objects: Arc<dyn ObjectStore>,
    // set when bytes are served by this process through /objects
    pub local_objects: Option<Arc<LocalObjectStore>>,
    pub generator: Arc<dyn TextGenerator>,
    pub extractor: Arc<dyn HeaderExtractor>,
}

/// Everything a request handler needs, wired once at startup.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub identity: Arc<dyn IdentityVerifier>,
    pub local_objects: Option<Arc<LocalObjectStore>>,
    pub users: UserService,
    pub teams: TeamService,
    pub invitations: InvitationService,
    pub files: FileService,
    pub uploads: UploadService,
    pub chat: ChatService,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self, ServiceError> {
        let db = Database::open(config.database_path())?;

        let local_objects = Arc::new(LocalObjectStore::new(
            config.objects_dir(),
            &config.public_base_url,
            config.url_signing_secret.clone(),
        ));

        let generator: Arc<dyn TextGenerator> = match &config.text_generation_url {
            Some(url) => {
                info!("Using text generation endpoint: {}", url);
                Arc::new(HttpTextGenerator::new(
                    url.clone(),
                    config.text_generation_api_key.clone(),
                    config.text_generation_model.clone(),
                ))
            }
            None => {
                info!("No text generation endpoint configured, summaries use a template");
                Arc::new(TemplateTextGenerator)
            }
        };

        let collaborators = Collaborators {
            identity: Arc::new(JwtIdentityVerifier::new(config.jwt_secret.clone())),
            objects: local_objects.clone(),
            local_objects: Some(local_objects),
            generator,
            extractor: Arc::new(TabularHeaderExtractor),
        };

        Ok(Self::build(config, db, collaborators))
    }

    pub fn build(config: Config, db: Database, collaborators: Collaborators) -> Self {
        let url_ttl = Duration::seconds(config.signed_url_ttl_secs);
        let pending_ttl = Duration::seconds(config.pending_upload_ttl_secs);

        Self {
            users: UserService::new(db.clone()),
            teams: TeamService::new(db.clone()),
            invitations: InvitationService::new(db.clone()),
            files: FileService::new(
                db.clone(),
                collaborators.objects.clone(),
                collaborators.generator.clone(),
                collaborators.extractor,
                url_ttl,
            ),
            uploads: UploadService::new(
                db.clone(),
                collaborators.objects,
                config.max_upload_bytes,
                url_ttl,
                pending_ttl,
            ),
            chat: ChatService::new(db.clone(), collaborators.generator),
            identity: collaborators.identity,
            local_objects: collaborators.local_objects,
            db,
            config,
        }
    }
}
