// src/models/mod.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::Display;
use serde_json::json;

pub mod file;
pub use file::*;

pub mod invitations;
pub use invitations::*;

pub mod team;
pub use team::*;

pub mod user;
pub use user::*;

// Error type shared by every service and route.
//
// Messages on Forbidden/NotFound/Conflict/BadRequest are shown to the caller
// as-is, so they must be specific and must not carry store internals.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[display(fmt = "Internal Server Error")]
    InternalServerError,
    #[display(fmt = "{}", _0)]
    BadRequest(String),
    #[display(fmt = "Unauthorized")]
    Unauthorized,
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", _0)]
    Conflict(String),
    #[display(fmt = "Upstream failure: {}", _0)]
    UpstreamFailure(String),
}

impl std::error::Error for ServiceError {}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::UpstreamFailure(_) | ServiceError::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // upstream detail is logged where it happens, never echoed back
            ServiceError::UpstreamFailure(_) => {
                "A storage or generation service failed, please try again".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_kind() {
        assert_eq!(ServiceError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ServiceError::Forbidden("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::NotFound("gone".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("twice".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::BadRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::UpstreamFailure("s3 timeout".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_uses_specific_message() {
        let err = ServiceError::Conflict("Invitation has already been accepted".into());
        assert_eq!(err.to_string(), "Invitation has already been accepted");
    }
}
