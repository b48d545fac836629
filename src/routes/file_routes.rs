// src/routes/file_routes.rs
use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse};
use log::info;
use serde_json::json;

use crate::models::{RenameFileRequest, ServiceError, SetVisibilityRequest, User};
use crate::state::AppState;
use crate::utils::current_user;

// Caller and the team ids that drive file visibility
fn caller(req: &HttpRequest, state: &AppState) -> Result<(User, Vec<String>), ServiceError> {
    let user = current_user(req, state)?;
    let team_ids = state.teams.team_ids_for_user(&user.id)?;
    Ok((user, team_ids))
}

#[get("/files")]
async fn list_files(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let (user, team_ids) = caller(&req, &state)?;

    info!("📂 Listing files for user: {}", user.id);

    let files = state.files.files_for_user(&user.id, &team_ids)?;

    info!("✅ Found {} files for user: {}", files.len(), user.id);

    Ok(HttpResponse::Ok().json(files))
}

#[get("/files/{file_id}")]
async fn get_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let (user, team_ids) = caller(&req, &state)?;
    let file_id = path.into_inner();

    let file = state.files.file_by_id(&file_id, &user.id, &team_ids)?;

    Ok(HttpResponse::Ok().json(file))
}

#[patch("/files/{file_id}")]
async fn rename_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    data: web::Json<RenameFileRequest>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let file_id = path.into_inner();

    let file = state.files.rename(&file_id, &user.id, &data.name)?;

    Ok(HttpResponse::Ok().json(file))
}

#[put("/files/{file_id}/visibility")]
async fn set_file_visibility(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    data: web::Json<SetVisibilityRequest>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let file_id = path.into_inner();

    let file = state.files.set_visibility(&file_id, &user.id, &data.visibility)?;

    Ok(HttpResponse::Ok().json(file))
}

#[delete("/files/{file_id}")]
async fn delete_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let file_id = path.into_inner();

    state.files.delete(&file_id, &user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "File deleted",
        "fileId": file_id
    })))
}

#[get("/files/{file_id}/download")]
async fn download_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let (user, team_ids) = caller(&req, &state)?;
    let file_id = path.into_inner();

    let link = state.files.download_url(&file_id, &user.id, &team_ids).await?;

    Ok(HttpResponse::Ok().json(link))
}

// Accept a file without a header row and finish processing it
#[post("/files/{file_id}/continue")]
async fn continue_processing(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let file_id = path.into_inner();

    let status = state.files.continue_without_headers(&file_id, &user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "fileId": file_id,
        "status": status.label(),
        "statusMessage": status.message()
    })))
}

#[post("/files/{file_id}/retry")]
async fn retry_processing(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let file_id = path.into_inner();

    let status = state.files.retry_processing(&file_id, &user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "fileId": file_id,
        "status": status.label(),
        "statusMessage": status.message()
    })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_files)
        .service(get_file)
        .service(rename_file)
        .service(set_file_visibility)
        .service(delete_file)
        .service(download_file)
        .service(continue_processing)
        .service(retry_processing);
}
