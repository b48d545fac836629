// src/routes/upload_routes.rs
use actix_web::{post, rt, web, HttpRequest, HttpResponse};
use log::{error, info};

use crate::models::{PrepareUploadRequest, ServiceError};
use crate::state::AppState;
use crate::utils::current_user;

// Phase one: create the pending record and hand out a signed upload URL
#[post("/uploads")]
async fn prepare_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    data: web::Json<PrepareUploadRequest>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;

    info!("📤 Upload requested by user: {} for {} ({} bytes)", user.id, data.file_name, data.file_size);

    let prepared = state.uploads.prepare(&user, &data).await?;

    Ok(HttpResponse::Created().json(prepared))
}

// Phase three: verify the transfer, then process in the background
#[post("/uploads/{file_id}/confirm")]
async fn confirm_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let file_id = path.into_inner();

    let file = state.uploads.confirm(&file_id, &user.id).await?;

    let files = state.files.clone();
    let processing_id = file_id.clone();
    rt::spawn(async move {
        if let Err(e) = files.process(&processing_id).await {
            error!("❌ Could not process file: {}: {}", processing_id, e);
        }
    });

    Ok(HttpResponse::Ok().json(file))
}

#[post("/uploads/{file_id}/abandon")]
async fn abandon_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let file_id = path.into_inner();

    state.uploads.abandon(&file_id, &user.id).await?;

    Ok(HttpResponse::NoContent().finish())
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(prepare_upload)
        .service(confirm_upload)
        .service(abandon_upload);
}
