// Shared application state handed to every request handler

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::batch::{RasterSheetPrinter, SerialSheetPrinter, SheetPrinter};
use crate::config::Config;
use crate::connection::{ConnectionManager, SerialPortFactory, TransportFactory};
use crate::errors::{AppError, PrintError};
use crate::registry::PrinterRegistry;
use crate::render::LabelRenderer;
use crate::spooler::{new_spooler, Spooler};
use crate::token::TokenStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<PrinterRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub spooler: Arc<dyn Spooler>,
    /// Absent when the label font could not be loaded; raster printing then
    /// fails while serial printing keeps working.
    pub renderer: Option<Arc<LabelRenderer>>,
    pub tokens: Arc<TokenStore>,
    /// Serializes whole batches across requests.
    pub print_lock: Arc<tokio::sync::Mutex<()>>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        info!("Initializing application state");

        let serial_printers = config.load_serial_printers()?;
        info!("Loaded {} serial printer(s)", serial_printers.len());
        let registry = Arc::new(PrinterRegistry::new(
            serial_printers,
            config.printing.default_printer.clone(),
        ));

        let tokens = TokenStore::load(config.storage.token_path())?;
        let renderer = Self::initialize_renderer(&config);
        let spooler = new_spooler(&config);

        Ok(Self::from_parts(
            config,
            registry,
            Arc::new(SerialPortFactory),
            spooler,
            renderer,
            tokens,
        ))
    }

    pub fn from_parts(
        config: Config,
        registry: Arc<PrinterRegistry>,
        transports: Arc<dyn TransportFactory>,
        spooler: Arc<dyn Spooler>,
        renderer: Option<Arc<LabelRenderer>>,
        tokens: TokenStore,
    ) -> Self {
        Self {
            connections: Arc::new(ConnectionManager::new(registry.clone(), transports)),
            config,
            registry,
            spooler,
            renderer,
            tokens: Arc::new(tokens),
            print_lock: Arc::new(tokio::sync::Mutex::new(())),
            started_at: Instant::now(),
        }
    }

    fn initialize_renderer(config: &Config) -> Option<Arc<LabelRenderer>> {
        match LabelRenderer::from_file(&config.render.font_path) {
            Ok(renderer) => Some(Arc::new(renderer)),
            Err(e) => {
                warn!("Label font unavailable (non-critical): {}", e);
                warn!("Raster printing is disabled until FONT_PATH points to a valid TTF");
                None
            }
        }
    }

    /// Chooses the path for `printer`: serial when it is registered as a
    /// serial device, the OS spooler otherwise.
    pub fn sheet_printer_for(&self, printer: &str) -> Result<Box<dyn SheetPrinter>, PrintError> {
        if self.registry.is_serial(printer) {
            return Ok(Box::new(SerialSheetPrinter {
                connections: self.connections.clone(),
                printer: printer.to_string(),
            }));
        }
        let renderer = self
            .renderer
            .clone()
            .ok_or_else(|| PrintError::RenderError("label font is not loaded".to_string()))?;
        Ok(Box::new(RasterSheetPrinter {
            renderer,
            spooler: self.spooler.clone(),
            printer: printer.to_string(),
        }))
    }
}
