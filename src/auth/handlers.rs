use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use crate::AppState;
use crate::auth::Role;
use crate::error::{AppError, AuthError};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub username: String,
    pub role: Role,
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MalformedToken)
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for username: {}", req.username);
    match state.auth.login(&req.username, &req.password).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(outcome)),
        Err(e) => {
            warn!("Login failed for username: {}: {}", req.username, e);
            Err(e.into())
        }
    }
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let tokens = state.auth.refresh(&req.refresh_token).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

pub async fn logout(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth.logout(&req.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn me(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let identity = state.auth.authorize(bearer_token(&req)?, Role::User)?;
    Ok(HttpResponse::Ok().json(IdentityResponse {
        username: identity.username,
        role: identity.role,
    }))
}

pub async fn admin(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let identity = state.auth.authorize(bearer_token(&req)?, Role::Admin)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Welcome, {}", identity.username),
        "role": identity.role,
    })))
}

/// Mounts every auth route onto an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/login", web::post().to(login))
        .route("/auth/refresh", web::post().to(refresh))
        .route("/auth/logout", web::post().to(logout))
        .route("/auth/me", web::get().to(me))
        .route("/admin", web::get().to(admin));
}
