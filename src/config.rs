use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::registry::PrinterConfig;

const TOKEN_FILE: &str = "print-token.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub printing: PrintingConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE)
    }

    /// Scratch directory for raster sheets waiting on the spooler.
    pub fn spool_dir(&self) -> PathBuf {
        self.data_dir.join("spool")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrintingConfig {
    pub default_printer: Option<String>,
    pub serial_printers_file: Option<PathBuf>,
    pub job_delay_ms: u64,
    pub spooler_timeout_secs: u64,
    pub spooler_grace_ms: u64,
    pub use_mock_printer: bool,
}

impl PrintingConfig {
    pub fn job_delay(&self) -> Duration {
        Duration::from_millis(self.job_delay_ms)
    }

    pub fn spooler_timeout(&self) -> Duration {
        Duration::from_secs(self.spooler_timeout_secs)
    }

    pub fn spooler_grace(&self) -> Duration {
        Duration::from_millis(self.spooler_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub font_path: PathBuf,
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server = ServerConfig {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT")
                .unwrap_or_else(|| "9110".to_string())
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
        };

        let storage = StorageConfig {
            data_dir: lookup("DATA_DIR")
                .unwrap_or_else(|| "./data".to_string())
                .into(),
        };

        let printing = PrintingConfig {
            default_printer: lookup("DEFAULT_PRINTER").filter(|s| !s.trim().is_empty()),
            serial_printers_file: lookup("SERIAL_PRINTERS_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            job_delay_ms: parse_number(&lookup, "PRINT_JOB_DELAY_MS", 500)?,
            spooler_timeout_secs: parse_number(&lookup, "SPOOLER_TIMEOUT_SECS", 30)?,
            spooler_grace_ms: parse_number(&lookup, "SPOOLER_GRACE_MS", 2000)?,
            use_mock_printer: lookup("USE_MOCK_PRINTER")
                .unwrap_or_else(|| "false".to_string())
                .parse()
                .unwrap_or(false),
        };

        let render = RenderConfig {
            font_path: lookup("FONT_PATH")
                .unwrap_or_else(|| "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string())
                .into(),
        };

        let config = Config {
            server,
            storage,
            printing,
            render,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.bind_address().parse().ok()
    }

    /// Serial printers declared in `SERIAL_PRINTERS_FILE`, if any.
    pub fn load_serial_printers(&self) -> Result<Vec<PrinterConfig>, ConfigError> {
        let Some(path) = &self.printing.serial_printers_file else {
            return Ok(Vec::new());
        };
        let error = |reason: String| ConfigError::SerialPrinters {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| error(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_with(&[]).expect("Failed to create config");
        assert_eq!(config.server.port, 9110);
        assert_eq!(config.bind_address(), "127.0.0.1:9110");
        assert_eq!(config.storage.token_path(), PathBuf::from("./data/print-token.json"));
        assert_eq!(config.printing.job_delay(), Duration::from_millis(500));
        assert_eq!(config.printing.spooler_timeout(), Duration::from_secs(30));
        assert!(config.printing.default_printer.is_none());
        assert!(!config.printing.use_mock_printer);
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(config_with(&[("PORT", "invalid")]), Err(ConfigError::InvalidPort)));
        assert!(matches!(config_with(&[("PORT", "0")]), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_invalid_delay() {
        let result = config_with(&[("PRINT_JOB_DELAY_MS", "soon")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber { name: "PRINT_JOB_DELAY_MS", .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("DEFAULT_PRINTER", "Argox"),
            ("USE_MOCK_PRINTER", "true"),
            ("DATA_DIR", "/var/lib/labels"),
            ("PRINT_JOB_DELAY_MS", "0"),
        ])
        .expect("config");
        assert_eq!(config.printing.default_printer.as_deref(), Some("Argox"));
        assert!(config.printing.use_mock_printer);
        assert_eq!(config.storage.spool_dir(), PathBuf::from("/var/lib/labels/spool"));
        assert!(config.printing.job_delay().is_zero());
    }

    #[test]
    fn test_load_serial_printers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("printers.json");
        std::fs::write(
            &path,
            r#"[{"name":"Argox","protocol":"PPLA","serial":{"port":"/dev/ttyUSB0","baud_rate":9600}}]"#,
        )
        .expect("write");

        let config = config_with(&[("SERIAL_PRINTERS_FILE", path.to_str().expect("utf-8 path"))])
            .expect("config");
        let printers = config.load_serial_printers().expect("printers");
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].protocol, "PPLA");
    }

    #[test]
    fn test_missing_serial_printers_file() {
        let config = config_with(&[("SERIAL_PRINTERS_FILE", "/nonexistent/printers.json")])
            .expect("config");
        assert!(matches!(
            config.load_serial_printers(),
            Err(ConfigError::SerialPrinters { .. })
        ));
    }
}
