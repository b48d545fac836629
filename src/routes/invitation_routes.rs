// src/routes/invitation_routes.rs
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use log::info;

use crate::models::{CreateInvitationRequest, ServiceError};
use crate::state::AppState;
use crate::utils::current_user;

// Invite an existing user to a team
#[post("/teams/{team_id}/invitations")]
async fn create_invitation(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    data: web::Json<CreateInvitationRequest>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let team_id = path.into_inner();

    let invitation = state.invitations.create(&team_id, &user, &data.email)?;

    Ok(HttpResponse::Created().json(invitation))
}

#[get("/teams/{team_id}/invitations")]
async fn get_team_invitations(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let team_id = path.into_inner();

    let invitations = state.invitations.invitations_for_team(&team_id, &user.id)?;

    Ok(HttpResponse::Ok().json(invitations))
}

// The caller's pending invitations
#[get("/invitations")]
async fn get_my_invitations(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;

    let invitations = state.invitations.pending_for_user(&user)?;

    info!("📬 User: {} has {} pending invitations", user.id, invitations.len());

    Ok(HttpResponse::Ok().json(invitations))
}

#[post("/invitations/{invitation_id}/accept")]
async fn accept_invitation(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let invitation_id = path.into_inner();

    let invitation = state.invitations.accept(&invitation_id, &user)?;

    Ok(HttpResponse::Ok().json(invitation))
}

#[post("/invitations/{invitation_id}/decline")]
async fn decline_invitation(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let invitation_id = path.into_inner();

    let invitation = state.invitations.decline(&invitation_id, &user)?;

    Ok(HttpResponse::Ok().json(invitation))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_invitation)
        .service(get_team_invitations)
        .service(get_my_invitations)
        .service(accept_invitation)
        .service(decline_invitation);
}
