use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::errors::AppError;
use crate::state::AppState;

pub const TOKEN_HEADER: &str = "X-Token";

/// Token presented by the client, from `X-Token` or a bearer `Authorization`.
fn presented_token(req: &HttpRequest) -> Option<&str> {
    let headers = req.headers();
    if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(token);
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Guard for protected handlers: extraction fails with 401/403 unless the
/// request carries the configured token, or no token is configured.
#[derive(Debug)]
pub struct Authorized;

impl FromRequest for Authorized {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state
                .tokens
                .authorize(presented_token(req))
                .map(|_| Authorized)
                .map_err(AppError::from),
            None => Err(AppError::Initialization(
                "application state is not registered".to_string(),
            )),
        };
        ready(result)
    }
}
