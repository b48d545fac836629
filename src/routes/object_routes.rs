// src/routes/object_routes.rs
//
// Serves the signed URLs handed out by LocalObjectStore. No session here: the
// signature, operation and expiry in the query string are the authorisation.
use actix_web::{get, put, web, HttpResponse};
use chrono::Utc;
use futures::StreamExt;
use log::{error, info};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::ServiceError;
use crate::state::AppState;
use crate::utils::object_store::{LocalObjectStore, ObjectOp, ObjectStore};

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub op: String,
    pub expires: i64,
    pub signature: String,
}

fn authorise(
    state: &AppState,
    expected: ObjectOp,
    path: &str,
    query: &SignedQuery,
) -> Result<Arc<LocalObjectStore>, ServiceError> {
    let store = state
        .local_objects
        .clone()
        .ok_or_else(|| ServiceError::NotFound("Object storage is not served here".to_string()))?;

    if ObjectOp::parse(&query.op) != Some(expected) {
        return Err(ServiceError::Forbidden(
            "This link does not allow that operation".to_string(),
        ));
    }
    store.verify(expected, path, query.expires, &query.signature, Utc::now())?;
    Ok(store)
}

// Direct upload target for a signed PUT URL
#[put("/objects/{path:.*}")]
async fn put_object(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SignedQuery>,
    mut payload: web::Payload,
) -> Result<HttpResponse, ServiceError> {
    let path = path.into_inner();
    let store = authorise(&state, ObjectOp::Put, &path, &query)?;

    let limit = state.config.max_upload_bytes as usize;
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            error!("❌ Upload stream for {} failed: {}", path, e);
            ServiceError::BadRequest("Upload was interrupted".to_string())
        })?;
        if body.len() + chunk.len() > limit {
            return Err(ServiceError::BadRequest(
                "Upload exceeds the maximum file size".to_string(),
            ));
        }
        body.extend_from_slice(&chunk);
    }

    store.write(&path, &body).await?;

    info!("📥 Received {} bytes for {}", body.len(), path);

    Ok(HttpResponse::Ok().finish())
}

#[get("/objects/{path:.*}")]
async fn get_object(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SignedQuery>,
) -> Result<HttpResponse, ServiceError> {
    let path = path.into_inner();
    let store = authorise(&state, ObjectOp::Get, &path, &query)?;

    let bytes = store.read(&path).await?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(bytes))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(put_object).service(get_object);
}
