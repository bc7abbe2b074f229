// Serial printer registrations and the default printer selection

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::info;

use crate::connection::SerialSettings;
use crate::encoder::LabelSetup;

/// A printer reached over a serial link.
///
/// `protocol` stays a free-form tag until connect time, where an unknown
/// value is reported as `UnsupportedProtocol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub name: String,
    #[serde(default)]
    pub model: String,
    pub protocol: String,
    pub serial: SerialSettings,
    #[serde(default)]
    pub label: LabelSetup,
}

#[derive(Debug, Default)]
pub struct PrinterRegistry {
    serial: RwLock<BTreeMap<String, PrinterConfig>>,
    default_printer: RwLock<Option<String>>,
}

impl PrinterRegistry {
    pub fn new(printers: Vec<PrinterConfig>, default_printer: Option<String>) -> Self {
        let registry = Self::default();
        for printer in printers {
            registry.register(printer);
        }
        registry.set_default(default_printer);
        registry
    }

    /// Adds or replaces a serial printer under its name.
    pub fn register(&self, printer: PrinterConfig) {
        info!(
            "Registering serial printer '{}' ({}, {})",
            printer.name, printer.protocol, printer.serial.port
        );
        let mut serial = self.serial.write().unwrap_or_else(|e| e.into_inner());
        serial.insert(printer.name.clone(), printer);
    }

    pub fn get(&self, name: &str) -> Option<PrinterConfig> {
        let serial = self.serial.read().unwrap_or_else(|e| e.into_inner());
        serial.get(name).cloned()
    }

    pub fn is_serial(&self, name: &str) -> bool {
        let serial = self.serial.read().unwrap_or_else(|e| e.into_inner());
        serial.contains_key(name)
    }

    pub fn list(&self) -> Vec<PrinterConfig> {
        let serial = self.serial.read().unwrap_or_else(|e| e.into_inner());
        serial.values().cloned().collect()
    }

    pub fn default_printer(&self) -> Option<String> {
        self.default_printer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_default(&self, name: Option<String>) {
        let mut current = self
            .default_printer
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *current = name.filter(|n| !n.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argox() -> PrinterConfig {
        PrinterConfig {
            name: "Argox".to_string(),
            model: "OS-2140".to_string(),
            protocol: "PPLA".to_string(),
            serial: SerialSettings::new("/dev/ttyUSB0"),
            label: LabelSetup::default(),
        }
    }

    #[test]
    fn test_register_replaces_by_name() {
        let registry = PrinterRegistry::default();
        registry.register(argox());
        let mut zebra = argox();
        zebra.protocol = "ZPL".to_string();
        registry.register(zebra);

        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.get("Argox").map(|p| p.protocol), Some("ZPL".to_string()));
    }

    #[test]
    fn test_blank_default_is_cleared() {
        let registry = PrinterRegistry::new(vec![argox()], Some("Argox".to_string()));
        assert_eq!(registry.default_printer(), Some("Argox".to_string()));
        assert!(registry.is_serial("Argox"));

        registry.set_default(Some("  ".to_string()));
        assert_eq!(registry.default_printer(), None);
    }

    #[test]
    fn test_config_from_json_uses_serial_defaults() {
        let json = r#"{"name":"Zebra","protocol":"ZPL","serial":{"port":"COM3"}}"#;
        let printer: PrinterConfig = serde_json::from_str(json).expect("valid printer");
        assert_eq!(printer.serial.baud_rate, 9600);
        assert_eq!(printer.serial.data_bits, 8);
        assert_eq!(printer.label, LabelSetup::default());
    }
}
