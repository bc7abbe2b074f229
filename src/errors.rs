use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("{0}")]
    Print(#[from] PrintError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Batch(#[from] BatchError),
}

/// Failures of the print pipeline: encoders, the serial link and the raster path.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error("Printer not found: {name}")]
    NotFound { name: String },

    #[error("Unsupported printer protocol: {protocol}")]
    UnsupportedProtocol { protocol: String },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("No printer connected")]
    NotConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("{primary} (disconnect also failed: {suppressed})")]
    CleanupFailed {
        primary: Box<PrintError>,
        suppressed: Box<PrintError>,
    },
}

impl From<serialport::Error> for PrintError {
    fn from(e: serialport::Error) -> Self {
        PrintError::ConnectionError(e.to_string())
    }
}

impl From<io::Error> for PrintError {
    fn from(e: io::Error) -> Self {
        PrintError::ConnectionError(e.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing access token")]
    Unauthorized,

    #[error("Invalid access token")]
    Forbidden,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to read token file {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("Failed to write token file {path}: {source}")]
    Write { path: String, source: io::Error },

    #[error("Corrupt token file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Failed to load serial printers from {path}: {reason}")]
    SerialPrinters { path: String, reason: String },
}

/// A batch stopped at `failed_job`; the first `completed` sheets were printed.
#[derive(Debug, Error)]
#[error("Job {failed_job} of {total} failed after {completed} completed: {source}")]
pub struct BatchError {
    pub failed_job: usize,
    pub completed: usize,
    pub total: usize,
    #[source]
    pub source: PrintError,
}

pub type AppResult<T> = Result<T, AppError>;

impl PrintError {
    fn error_type(&self) -> &'static str {
        match self {
            PrintError::NotFound { .. } => "not_found",
            PrintError::UnsupportedProtocol { .. } => "unsupported_protocol",
            PrintError::ConnectionError(_) => "connection_error",
            PrintError::NotConnected => "not_connected",
            PrintError::InvalidArgument(_) => "invalid_argument",
            PrintError::RenderError(_) => "render_error",
            PrintError::CleanupFailed { primary, .. } => primary.error_type(),
        }
    }
}

impl AppError {
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Initialization(_) => 500,
            AppError::Print(PrintError::NotFound { .. }) => 404,
            AppError::Print(PrintError::InvalidArgument(_)) => 400,
            AppError::Print(PrintError::UnsupportedProtocol { .. }) => 400,
            AppError::Print(_) => 500,
            AppError::Auth(AuthError::Unauthorized) => 401,
            AppError::Auth(AuthError::Forbidden) => 403,
            AppError::Token(_) => 500,
            AppError::Config(_) => 500,
            AppError::BadRequest(_) => 400,
            AppError::Batch(_) => 500,
        }
    }

    pub fn error_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
            "error_type": self.error_type()
        });
        if let AppError::Batch(batch) = self {
            body["completed_jobs"] = batch.completed.into();
            body["failed_job"] = batch.failed_job.into();
            body["total_jobs"] = batch.total.into();
        }
        body
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::Initialization(_) => "initialization_error",
            AppError::Print(e) => e.error_type(),
            AppError::Auth(AuthError::Unauthorized) => "unauthorized",
            AppError::Auth(AuthError::Forbidden) => "forbidden",
            AppError::Token(_) => "token_error",
            AppError::Config(_) => "config_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Batch(batch) => batch.source.error_type(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(ResponseError::status_code(self)).json(self.error_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_error_display() {
        let err = PrintError::NotFound {
            name: "Argox".to_string(),
        };
        assert_eq!(err.to_string(), "Printer not found: Argox");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::from(AuthError::Unauthorized).http_status(), 401);
        assert_eq!(AppError::from(AuthError::Forbidden).http_status(), 403);
        assert_eq!(AppError::from(PrintError::NotConnected).http_status(), 500);
        assert_eq!(
            AppError::BadRequest("empty".to_string()).http_status(),
            400
        );
    }

    #[test]
    fn test_cleanup_failure_keeps_both_causes() {
        let err = PrintError::CleanupFailed {
            primary: Box::new(PrintError::ConnectionError("write timed out".to_string())),
            suppressed: Box::new(PrintError::ConnectionError("port vanished".to_string())),
        };
        let text = err.to_string();
        assert!(text.contains("write timed out"));
        assert!(text.contains("port vanished"));
        assert_eq!(err.error_type(), "connection_error");
    }

    #[test]
    fn test_batch_error_body_reports_progress() {
        let err = AppError::from(BatchError {
            failed_job: 3,
            completed: 2,
            total: 5,
            source: PrintError::RenderError("spooler refused job".to_string()),
        });
        let json = err.error_body();

        assert_eq!(json["success"], false);
        assert_eq!(json["completed_jobs"], 2);
        assert_eq!(json["failed_job"], 3);
        assert_eq!(json["total_jobs"], 5);
        assert_eq!(json["error_type"], "render_error");
    }
}
