// src/utils/mod.rs
use actix_web::{dev::ServiceRequest, http::header, HttpMessage, HttpRequest};
use log::error;

use crate::models::{ServiceError, SessionIdentity, User};
use crate::state::AppState;

pub mod header_extraction;
pub mod identity;
pub mod object_store;
pub mod text_generation;

const SESSION_COOKIE: &str = "session";

// Bearer header first, then the session cookie
fn session_token(req: &ServiceRequest) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(|v| identity::extract_bearer_token(v).ok())
            .map(str::to_string);
    }

    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|token| !token.is_empty())
}

// Identity placed on the request by the authentication middleware
pub fn session_identity(req: &HttpRequest) -> Result<SessionIdentity, ServiceError> {
    req.extensions()
        .get::<SessionIdentity>()
        .cloned()
        .ok_or_else(|| {
            error!("❌ No verified identity on request to {}", req.path());
            ServiceError::Unauthorized
        })
}

// The caller as a stored user, registered on first sight
pub fn current_user(req: &HttpRequest, state: &AppState) -> Result<User, ServiceError> {
    let identity = session_identity(req)?;
    state.users.upsert_from_identity(&identity)
}

// Middleware that verifies the session with the identity provider
pub mod auth_middleware {
    use super::*;
    use actix_web::dev::{forward_ready, Service, ServiceResponse, Transform};
    use actix_web::{web, Error};
    use futures::future::{ok, Ready};
    use std::future::Future;
    use std::pin::Pin;
    use std::rc::Rc;

    pub struct Authentication;

    impl<S, B> Transform<S, ServiceRequest> for Authentication
    where
        S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
        S::Future: 'static,
        B: 'static,
    {
        type Response = ServiceResponse<B>;
        type Error = Error;
        type Transform = AuthenticationMiddleware<S>;
        type InitError = ();
        type Future = Ready<Result<Self::Transform, Self::InitError>>;

        fn new_transform(&self, service: S) -> Self::Future {
            ok(AuthenticationMiddleware {
                service: Rc::new(service),
            })
        }
    }

    pub struct AuthenticationMiddleware<S> {
        service: Rc<S>,
    }

    impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
    where
        S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
        S::Future: 'static,
        B: 'static,
    {
        type Response = ServiceResponse<B>;
        type Error = Error;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

        forward_ready!(service);

        fn call(&self, req: ServiceRequest) -> Self::Future {
            let service = Rc::clone(&self.service);

            Box::pin(async move {
                let token = session_token(&req).ok_or(ServiceError::Unauthorized)?;
                let state = req
                    .app_data::<web::Data<AppState>>()
                    .cloned()
                    .ok_or(ServiceError::InternalServerError)?;

                let identity = state.identity.verify_session(&token).await?;
                req.extensions_mut().insert(identity);

                service.call(req).await
            })
        }
    }
}

pub use auth_middleware::Authentication;
