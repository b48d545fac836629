// src/routes/mod.rs
use actix_web::web;

use crate::utils::Authentication;

pub mod auth_routes;
pub mod chat_routes;
pub mod file_routes;
pub mod invitation_routes;
pub mod object_routes;
pub mod team_routes;
pub mod upload_routes;

// Session-authenticated API under /api; signed object URLs carry their own authorisation
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(Authentication)
            .configure(auth_routes::init_routes)
            .configure(team_routes::init_routes)
            .configure(invitation_routes::init_routes)
            .configure(file_routes::init_routes)
            .configure(upload_routes::init_routes)
            .configure(chat_routes::init_routes),
    )
    .configure(object_routes::init_routes);
}
