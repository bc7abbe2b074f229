use actix_web::{get, web, HttpResponse, Responder};
use sysinfo::{ProcessesToUpdate, System};

use crate::state::AppState;

/// Resident memory of this process, when the platform reports it.
fn process_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "memory_bytes": process_memory_bytes(),
        "token_configured": state.tokens.status().configured,
    }))
}
