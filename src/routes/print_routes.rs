use actix_web::{post, web, HttpResponse};
use serde::Deserialize;
use tracing::{info, warn};

use super::auth::Authorized;
use crate::batch::{expand_items, pair_items, run_batch, LabelItem};
use crate::connection::ConnectionManager;
use crate::encoder::{LabelSetup, Protocol};
use crate::errors::{AppError, AppResult, PrintError};
use crate::label::LabelElement;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PrintBatchRequest {
    #[serde(default, alias = "itens")]
    pub items: Vec<LabelItem>,
    #[serde(default, alias = "impressora")]
    pub printer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrintLabelRequest {
    #[serde(default)]
    pub printer: Option<String>,
    #[serde(default)]
    pub elements: Vec<LabelElement>,
    #[serde(default = "default_copies")]
    pub copies: i32,
}

fn default_copies() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub protocol: String,
    #[serde(default)]
    pub elements: Vec<LabelElement>,
    #[serde(default)]
    pub label: LabelSetup,
}

/// Request printer if given, otherwise the configured default.
fn resolve_printer(state: &AppState, requested: Option<String>) -> AppResult<String> {
    requested
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .or_else(|| state.registry.default_printer())
        .ok_or_else(|| AppError::BadRequest("No printer selected and no default printer configured".to_string()))
}

/// Prints a catalogue batch: each item repeated by its quantity, two labels
/// per sheet.
#[post("/print/etiqueta")]
pub async fn print_batch(
    _auth: Authorized,
    state: web::Data<AppState>,
    body: web::Json<PrintBatchRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    if request.items.is_empty() {
        warn!("Print request without items");
        return Err(AppError::BadRequest("No items to print".to_string()));
    }
    let printer = resolve_printer(&state, request.printer)?;

    let labels = expand_items(&request.items);
    let label_count = labels.len();
    let jobs = pair_items(labels);
    info!(
        "Print request: {} item(s), {} label(s), {} sheet(s) on '{}'",
        request.items.len(),
        label_count,
        jobs.len(),
        printer
    );

    let target = state.sheet_printer_for(&printer)?;
    let _batch = state.print_lock.lock().await;
    let summary = run_batch(&jobs, state.config.printing.job_delay(), target.as_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": format!("{} label(s) sent to {}", label_count, printer),
        "items": label_count,
        "jobs": summary.jobs,
        "printer": printer,
    })))
}

/// Prints explicit elements on a serial printer.
#[post("/print/label")]
pub async fn print_label(
    _auth: Authorized,
    state: web::Data<AppState>,
    body: web::Json<PrintLabelRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    if request.elements.is_empty() {
        return Err(AppError::BadRequest("No elements to print".to_string()));
    }
    let printer = resolve_printer(&state, request.printer)?;
    if !state.registry.is_serial(&printer) {
        return Err(PrintError::NotFound { name: printer }.into());
    }

    let element_count = request.elements.len();
    let copies = request.copies;
    let connections = state.connections.clone();
    let target = printer.clone();

    let _batch = state.print_lock.lock().await;
    web::block(move || connections.print_once(&target, &request.elements, copies))
        .await
        .map_err(|e| PrintError::ConnectionError(format!("print task failed: {}", e)))??;

    info!("Printed {} element(s) x{} on '{}'", element_count, copies, printer);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "printer": printer,
        "elements": element_count,
        "copies": copies,
    })))
}

/// Encoder output for the elements, without touching any printer.
#[post("/print/preview")]
pub async fn preview(
    _auth: Authorized,
    body: web::Json<PreviewRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let protocol: Protocol = request.protocol.parse()?;
    let commands = ConnectionManager::preview(protocol, request.label, &request.elements)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "protocol": protocol.as_str(),
        "commands": commands,
    })))
}
