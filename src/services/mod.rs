// src/services/mod.rs
pub mod chat_service;
pub mod file_service;
pub mod invitation_service;
pub mod permissions;
pub mod team_service;
pub mod upload_service;
pub mod user_service;

pub use chat_service::ChatService;
pub use file_service::FileService;
pub use invitation_service::InvitationService;
pub use team_service::TeamService;
pub use upload_service::UploadService;
pub use user_service::UserService;
