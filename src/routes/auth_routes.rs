// src/routes/auth_routes.rs
use actix_web::{get, put, web, HttpRequest, HttpResponse};
use log::info;

use crate::models::{ServiceError, UpdateProfileRequest};
use crate::state::AppState;
use crate::utils::current_user;

// Current user, registered on the first verified request
#[get("/me")]
async fn me(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;

    info!("👤 Session for user: {}", user.id);

    Ok(HttpResponse::Ok().json(user))
}

#[put("/me")]
async fn update_me(
    req: HttpRequest,
    state: web::Data<AppState>,
    data: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;

    info!("📝 Updating profile for user: {}", user.id);

    let updated = state.users.update_profile(&user.id, &data.name)?;

    Ok(HttpResponse::Ok().json(updated))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(me).service(update_me);
}
