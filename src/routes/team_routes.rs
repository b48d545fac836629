// src/routes/team_routes.rs
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use log::info;
use serde_json::json;

use crate::models::{ServiceError, TeamData, UpdateRoleRequest};
use crate::state::AppState;
use crate::utils::current_user;

// Create a new team owned by the caller
#[post("/teams")]
async fn create_team(
    req: HttpRequest,
    state: web::Data<AppState>,
    team_data: web::Json<TeamData>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;

    let team = state.teams.create_team(&team_data.name, &user)?;

    Ok(HttpResponse::Created().json(team))
}

// Get all teams for the current user
#[get("/teams")]
async fn get_user_teams(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;

    info!("📋 Fetching teams for user: {}", user.id);

    let teams = state.teams.teams_for_user(&user.id)?;

    info!("✅ Found {} teams for user: {}", teams.len(), user.id);

    Ok(HttpResponse::Ok().json(teams))
}

#[get("/teams/{team_id}")]
async fn get_team(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let team_id = path.into_inner();

    info!("🔍 Fetching team: {} for user: {}", team_id, user.id);

    let team = state.teams.team_by_id(&team_id, &user.id)?;

    Ok(HttpResponse::Ok().json(team))
}

#[get("/teams/{team_id}/members")]
async fn get_team_members(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let team_id = path.into_inner();

    let members = state.teams.members(&team_id, &user.id)?;

    Ok(HttpResponse::Ok().json(members))
}

#[put("/teams/{team_id}/members/{user_id}")]
async fn update_team_member_role(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    data: web::Json<UpdateRoleRequest>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let (team_id, target_user_id) = path.into_inner();

    let member = state
        .teams
        .update_member_role(&team_id, &target_user_id, data.role, &user.id)?;

    Ok(HttpResponse::Ok().json(member))
}

#[delete("/teams/{team_id}/members/{user_id}")]
async fn remove_team_member(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let (team_id, target_user_id) = path.into_inner();

    let team = state.teams.remove_member(&team_id, &target_user_id, &user.id)?;

    Ok(HttpResponse::Ok().json(team))
}

#[post("/teams/{team_id}/leave")]
async fn leave_team(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user = current_user(&req, &state)?;
    let team_id = path.into_inner();

    state.teams.leave_team(&team_id, &user.id)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "You have left the team",
        "teamId": team_id
    })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_team)
        .service(get_user_teams)
        .service(get_team)
        .service(get_team_members)
        .service(update_team_member_role)
        .service(remove_team_member)
        .service(leave_team);
}
