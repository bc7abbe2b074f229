use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub token: String,
}

#[get("/token/status")]
pub async fn token_status(state: web::Data<AppState>) -> HttpResponse {
    let status = state.tokens.status();
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "configured": status.configured,
        "mode": status.mode,
        "created_at": status.created_at,
        "last_used": status.last_used,
    }))
}

/// Issues a new token. The value is only ever returned here.
#[post("/token/generate")]
pub async fn generate_token(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let tokens = state.tokens.clone();
    let record = web::block(move || tokens.generate())
        .await
        .map_err(|e| AppError::Initialization(format!("token task failed: {}", e)))??;
    info!("Access token regenerated, authentication is now required");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "token": record.token,
        "created_at": record.created_at,
    })))
}

#[post("/token/validate")]
pub async fn validate_token(
    state: web::Data<AppState>,
    body: web::Json<ValidateRequest>,
) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "valid": state.tokens.validate(&body.token),
    }))
}
