// src/routes/chat_routes.rs
use actix_web::{post, web, HttpRequest, HttpResponse};

use crate::models::{ChatRequest, ChatResponse, ServiceError};
use crate::state::AppState;
use crate::utils::current_user;

#[post("/chat")]
async fn ask(
    req: HttpRequest,
    state: web::Data<AppState>,
    data: web::Json<ChatRequest>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let team_ids = state.teams.team_ids_for_user(&user.id)?;

    let answer = state
        .chat
        .ask(&user.id, &team_ids, &data.question, data.file_ids.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(ChatResponse { answer }))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(ask);
}
