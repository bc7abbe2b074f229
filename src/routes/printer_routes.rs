use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use super::auth::Authorized;
use crate::encoder::Protocol;
use crate::errors::{AppError, AppResult, PrintError};
use crate::registry::PrinterConfig;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DefaultPrinterRequest {
    #[serde(default)]
    pub name: String,
}

/// Serial registrations, spooler printers and the current default.
#[get("/printers")]
pub async fn list_printers(_auth: Authorized, state: web::Data<AppState>) -> HttpResponse {
    let system = state.spooler.list_printers().await;
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "default": state.registry.default_printer(),
        "serial": state.registry.list(),
        "system": system,
        "spooler": state.spooler.type_name(),
        "connection": {
            "state": state.connections.state(),
            "printer": state.connections.active_printer(),
        },
    }))
}

#[post("/printers/default")]
pub async fn set_default_printer(
    _auth: Authorized,
    state: web::Data<AppState>,
    body: web::Json<DefaultPrinterRequest>,
) -> AppResult<HttpResponse> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Printer name is required".to_string()));
    }

    let known = state.registry.is_serial(&name)
        || state
            .spooler
            .list_printers()
            .await
            .iter()
            .any(|p| p.matches(&name));
    if !known {
        return Err(PrintError::NotFound { name }.into());
    }

    state.registry.set_default(Some(name.clone()));
    info!("Default printer set to '{}'", name);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "default": name,
    })))
}

/// Registers a serial printer, replacing one with the same name.
#[post("/printers/serial")]
pub async fn register_serial_printer(
    _auth: Authorized,
    state: web::Data<AppState>,
    body: web::Json<PrinterConfig>,
) -> AppResult<HttpResponse> {
    let printer = body.into_inner();
    if printer.name.trim().is_empty() {
        return Err(AppError::BadRequest("Printer name is required".to_string()));
    }
    if printer.serial.port.trim().is_empty() {
        return Err(AppError::BadRequest("Serial port is required".to_string()));
    }
    printer.protocol.parse::<Protocol>()?;

    state.registry.register(printer.clone());
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "printer": printer,
    })))
}
