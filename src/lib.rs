// Library module organization

// Label model and protocol encoders
pub mod encoder;
pub mod label;

// Serial devices
pub mod connection;
pub mod registry;

// Raster path
pub mod render;
pub mod spooler;

// Print jobs and HTTP surface
pub mod batch;
pub mod layout;
pub mod routes;
pub mod state;
pub mod token;

pub mod config;
pub mod errors;

// Re-export commonly used types for convenience
pub use connection::{ConnectionManager, ConnectionState};
pub use encoder::{new_encoder, LabelSetup, Protocol, ProtocolEncoder};
pub use errors::{AppError, PrintError};
pub use label::LabelElement;
pub use state::AppState;
