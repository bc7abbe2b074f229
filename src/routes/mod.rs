// Route modules organization

pub mod auth;
pub mod health_routes;
pub mod print_routes;
pub mod printer_routes;
pub mod token_routes;

use actix_web::web;

use crate::errors::AppError;

pub use auth::Authorized;

/// Registers every endpoint plus JSON error handling on `cfg`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .service(health_routes::health)
    // Printing
    .service(print_routes::print_batch)
    .service(print_routes::print_label)
    .service(print_routes::preview)
    // Printer management
    .service(printer_routes::list_printers)
    .service(printer_routes::set_default_printer)
    .service(printer_routes::register_serial_printer)
    // Token management
    .service(token_routes::token_status)
    .service(token_routes::generate_token)
    .service(token_routes::validate_token);
}
