//! Device connection manager.
//!
//! Owns at most one serial link and the encoder bound to it. The manager is
//! built once at startup and shared with the request handlers; all state sits
//! behind a mutex so concurrent requests never interleave on the device.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::encoder::{new_encoder, LabelSetup, Protocol, ProtocolEncoder};
use crate::errors::PrintError;
use crate::label::LabelElement;
use crate::registry::PrinterRegistry;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    #[serde(default = "SerialSettings::default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "SerialSettings::default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "SerialSettings::default_stop_bits")]
    pub stop_bits: u8,
    /// `none`, `odd` or `even`.
    #[serde(default = "SerialSettings::default_none")]
    pub parity: String,
    /// `none`, `software` or `hardware`.
    #[serde(default = "SerialSettings::default_none")]
    pub flow_control: String,
}

impl SerialSettings {
    fn default_baud_rate() -> u32 {
        9600
    }

    fn default_data_bits() -> u8 {
        8
    }

    fn default_stop_bits() -> u8 {
        1
    }

    fn default_none() -> String {
        "none".to_string()
    }

    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: Self::default_baud_rate(),
            data_bits: Self::default_data_bits(),
            stop_bits: Self::default_stop_bits(),
            parity: Self::default_none(),
            flow_control: Self::default_none(),
        }
    }
}

/// Byte sink for encoded labels.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PrintError>;
    fn close(&mut self) -> Result<(), PrintError>;
}

pub trait TransportFactory: Send + Sync {
    fn open(&self, settings: &SerialSettings) -> Result<Box<dyn Transport>, PrintError>;
}

pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PrintError> {
        let port = self.port.as_mut().ok_or(PrintError::NotConnected)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PrintError> {
        // Dropping the handle releases the OS port.
        if let Some(port) = self.port.take() {
            debug!("Closing serial port {:?}", port.name());
        }
        Ok(())
    }
}

/// Opens real serial ports through the `serialport` crate.
pub struct SerialPortFactory;

impl SerialPortFactory {
    fn data_bits(bits: u8) -> Result<serialport::DataBits, PrintError> {
        match bits {
            5 => Ok(serialport::DataBits::Five),
            6 => Ok(serialport::DataBits::Six),
            7 => Ok(serialport::DataBits::Seven),
            8 => Ok(serialport::DataBits::Eight),
            other => Err(PrintError::ConnectionError(format!(
                "unsupported data bits: {}",
                other
            ))),
        }
    }

    fn stop_bits(bits: u8) -> Result<serialport::StopBits, PrintError> {
        match bits {
            1 => Ok(serialport::StopBits::One),
            2 => Ok(serialport::StopBits::Two),
            other => Err(PrintError::ConnectionError(format!(
                "unsupported stop bits: {}",
                other
            ))),
        }
    }

    fn parity(parity: &str) -> Result<serialport::Parity, PrintError> {
        match parity.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(serialport::Parity::None),
            "odd" | "o" => Ok(serialport::Parity::Odd),
            "even" | "e" => Ok(serialport::Parity::Even),
            other => Err(PrintError::ConnectionError(format!(
                "unsupported parity: {}",
                other
            ))),
        }
    }

    fn flow_control(flow: &str) -> Result<serialport::FlowControl, PrintError> {
        match flow.to_ascii_lowercase().as_str() {
            "none" => Ok(serialport::FlowControl::None),
            "software" | "xon/xoff" => Ok(serialport::FlowControl::Software),
            "hardware" | "rts/cts" => Ok(serialport::FlowControl::Hardware),
            other => Err(PrintError::ConnectionError(format!(
                "unsupported flow control: {}",
                other
            ))),
        }
    }
}

impl TransportFactory for SerialPortFactory {
    fn open(&self, settings: &SerialSettings) -> Result<Box<dyn Transport>, PrintError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(Self::data_bits(settings.data_bits)?)
            .stop_bits(Self::stop_bits(settings.stop_bits)?)
            .parity(Self::parity(&settings.parity)?)
            .flow_control(Self::flow_control(&settings.flow_control)?)
            .timeout(WRITE_TIMEOUT)
            .open()?;
        Ok(Box::new(SerialTransport { port: Some(port) }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct ActiveLink {
    printer: String,
    encoder: Box<dyn ProtocolEncoder>,
    transport: Box<dyn Transport>,
}

struct Link {
    state: ConnectionState,
    active: Option<ActiveLink>,
}

pub struct ConnectionManager {
    registry: Arc<PrinterRegistry>,
    factory: Arc<dyn TransportFactory>,
    link: Mutex<Link>,
    /// Held for a whole connect/print/disconnect sequence.
    session: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<PrinterRegistry>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            registry,
            factory,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                active: None,
            }),
            session: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn active_printer(&self) -> Option<String> {
        let link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        link.active.as_ref().map(|a| a.printer.clone())
    }

    /// Opens the link to a registered printer. An existing link is closed first.
    pub fn connect(&self, name: &str) -> Result<(), PrintError> {
        let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(previous) = link.active.as_ref().map(|a| a.printer.clone()) {
            warn!(
                "Connect to '{}' requested while '{}' is connected; closing it first",
                name, previous
            );
            if let Err(e) = Self::close_link(&mut link) {
                warn!("Failed to close previous link to '{}': {}", previous, e);
            }
        }

        let config = self.registry.get(name).ok_or_else(|| PrintError::NotFound {
            name: name.to_string(),
        })?;
        let protocol: Protocol = config.protocol.parse()?;

        link.state = ConnectionState::Connecting;
        info!(
            "Connecting to '{}' on {} at {} baud ({})",
            name, config.serial.port, config.serial.baud_rate, protocol
        );
        let transport = match self.factory.open(&config.serial) {
            Ok(transport) => transport,
            Err(e) => {
                link.state = ConnectionState::Disconnected;
                error!("Failed to open {}: {}", config.serial.port, e);
                return Err(match e {
                    PrintError::ConnectionError(_) => e,
                    other => PrintError::ConnectionError(other.to_string()),
                });
            }
        };

        link.active = Some(ActiveLink {
            printer: config.name.clone(),
            encoder: new_encoder(protocol, config.label),
            transport,
        });
        link.state = ConnectionState::Connected;
        info!("Connected to '{}'", name);
        Ok(())
    }

    pub fn print_label(&self, elements: &[LabelElement], copies: i32) -> Result<(), PrintError> {
        let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        let active = link.active.as_mut().ok_or(PrintError::NotConnected)?;

        let bytes = active.encoder.encode_job(elements, copies)?;
        debug!(
            "Sending {} bytes ({} elements, {} copies) to '{}'",
            bytes.len(),
            elements.len(),
            copies,
            active.printer
        );
        active.transport.write_all(&bytes)
    }

    /// Closes the link. Calling it while disconnected does nothing.
    pub fn disconnect(&self) -> Result<(), PrintError> {
        let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        Self::close_link(&mut link)
    }

    fn close_link(link: &mut Link) -> Result<(), PrintError> {
        link.state = ConnectionState::Disconnected;
        match link.active.take() {
            Some(mut active) => {
                info!("Disconnecting from '{}'", active.printer);
                active.transport.close()
            }
            None => Ok(()),
        }
    }

    /// Runs `f` against a fresh connection to `name` and always disconnects
    /// afterwards, reporting a failed disconnect next to the primary error.
    pub fn with_connection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Self) -> Result<T, PrintError>,
    ) -> Result<T, PrintError> {
        let _session = self.session.lock().unwrap_or_else(|e| e.into_inner());

        self.connect(name)?;
        let result = f(self);
        let cleanup = self.disconnect();

        match (result, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => {
                error!("Disconnect from '{}' failed after a successful print: {}", name, e);
                Err(e)
            }
            (Err(primary), Ok(())) => Err(primary),
            (Err(primary), Err(suppressed)) => {
                error!(
                    "Disconnect from '{}' failed while handling '{}': {}",
                    name, primary, suppressed
                );
                Err(PrintError::CleanupFailed {
                    primary: Box::new(primary),
                    suppressed: Box::new(suppressed),
                })
            }
        }
    }

    /// Connects, prints `copies` of one label and disconnects.
    pub fn print_once(
        &self,
        name: &str,
        elements: &[LabelElement],
        copies: i32,
    ) -> Result<(), PrintError> {
        self.with_connection(name, |manager| manager.print_label(elements, copies))
    }

    /// Encoder output for `elements` without touching any device.
    pub fn preview(
        protocol: Protocol,
        setup: LabelSetup,
        elements: &[LabelElement],
    ) -> Result<String, PrintError> {
        new_encoder(protocol, setup).generate_preview(elements)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// What the fake device saw.
    #[derive(Debug, Default)]
    pub struct DeviceLog {
        pub opened: usize,
        pub closed: usize,
        pub written: Vec<Vec<u8>>,
    }

    #[derive(Default)]
    pub struct FakeFactory {
        pub log: Arc<Mutex<DeviceLog>>,
        pub fail_open: bool,
        pub fail_write: bool,
        pub fail_close: bool,
    }

    struct FakeTransport {
        log: Arc<Mutex<DeviceLog>>,
        fail_write: bool,
        fail_close: bool,
    }

    impl Transport for FakeTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), PrintError> {
            if self.fail_write {
                return Err(PrintError::ConnectionError("write timed out".to_string()));
            }
            self.log.lock().unwrap().written.push(bytes.to_vec());
            Ok(())
        }

        fn close(&mut self) -> Result<(), PrintError> {
            self.log.lock().unwrap().closed += 1;
            if self.fail_close {
                return Err(PrintError::ConnectionError("port vanished".to_string()));
            }
            Ok(())
        }
    }

    impl TransportFactory for FakeFactory {
        fn open(&self, settings: &SerialSettings) -> Result<Box<dyn Transport>, PrintError> {
            if self.fail_open {
                return Err(PrintError::ConnectionError(format!(
                    "could not open {}",
                    settings.port
                )));
            }
            self.log.lock().unwrap().opened += 1;
            Ok(Box::new(FakeTransport {
                log: self.log.clone(),
                fail_write: self.fail_write,
                fail_close: self.fail_close,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{DeviceLog, FakeFactory};
    use super::*;
    use crate::label::{FontSpec, Position};
    use crate::registry::PrinterConfig;

    fn printer(name: &str, protocol: &str) -> PrinterConfig {
        PrinterConfig {
            name: name.to_string(),
            model: String::new(),
            protocol: protocol.to_string(),
            serial: SerialSettings::new("/dev/ttyS0"),
            label: LabelSetup::default(),
        }
    }

    fn manager(factory: FakeFactory) -> (ConnectionManager, Arc<Mutex<DeviceLog>>) {
        let log = factory.log.clone();
        let registry = Arc::new(PrinterRegistry::new(
            vec![
                printer("zebra", "ZPL"),
                printer("argox", "PPLA"),
                printer("legacy", "ESC/POS"),
            ],
            None,
        ));
        (ConnectionManager::new(registry, Arc::new(factory)), log)
    }

    fn label() -> Vec<LabelElement> {
        vec![LabelElement::text(
            Position::new(1.0, 1.0),
            "TESTE",
            FontSpec::default(),
        )]
    }

    #[test]
    fn test_connect_unknown_printer() {
        let (manager, _) = manager(FakeFactory::default());
        assert!(matches!(
            manager.connect("nope"),
            Err(PrintError::NotFound { .. })
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_unsupported_protocol() {
        let (manager, log) = manager(FakeFactory::default());
        assert!(matches!(
            manager.connect("legacy"),
            Err(PrintError::UnsupportedProtocol { .. })
        ));
        assert_eq!(log.lock().unwrap().opened, 0);
    }

    #[test]
    fn test_connect_open_failure() {
        let (manager, _) = manager(FakeFactory {
            fail_open: true,
            ..FakeFactory::default()
        });
        assert!(matches!(
            manager.connect("zebra"),
            Err(PrintError::ConnectionError(_))
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_then_disconnect_closes_transport() {
        let (manager, log) = manager(FakeFactory::default());
        manager.connect("zebra").expect("connect");
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.active_printer(), Some("zebra".to_string()));

        manager.disconnect().expect("disconnect");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.active_printer(), None);
        assert_eq!(log.lock().unwrap().closed, 1);

        // Second disconnect is a no-op.
        manager.disconnect().expect("disconnect again");
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_print_requires_connection() {
        let (manager, _) = manager(FakeFactory::default());
        assert!(matches!(
            manager.print_label(&label(), 1),
            Err(PrintError::NotConnected)
        ));
    }

    #[test]
    fn test_print_label_writes_encoded_job() {
        let (manager, log) = manager(FakeFactory::default());
        manager.connect("zebra").expect("connect");
        manager.print_label(&label(), 2).expect("print");

        let log = log.lock().unwrap();
        let sent = String::from_utf8(log.written[0].clone()).expect("ascii");
        assert!(sent.starts_with("^XA\n"));
        assert!(sent.contains("^FDTESTE^FS\n"));
        assert!(sent.ends_with("^PQ2\n^XZ\n"));
    }

    #[test]
    fn test_reconnect_closes_previous_link() {
        let (manager, log) = manager(FakeFactory::default());
        manager.connect("zebra").expect("connect zebra");
        manager.connect("argox").expect("connect argox");

        assert_eq!(manager.active_printer(), Some("argox".to_string()));
        let log = log.lock().unwrap();
        assert_eq!(log.opened, 2);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_invalid_copies_still_disconnects() {
        let (manager, log) = manager(FakeFactory::default());
        let result = manager.print_once("zebra", &label(), 0);

        assert!(matches!(result, Err(PrintError::InvalidArgument(_))));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_write_and_close_failures_are_both_reported() {
        let (manager, log) = manager(FakeFactory {
            fail_write: true,
            fail_close: true,
            ..FakeFactory::default()
        });

        match manager.print_once("argox", &label(), 1) {
            Err(PrintError::CleanupFailed {
                primary,
                suppressed,
            }) => {
                assert!(primary.to_string().contains("write timed out"));
                assert!(suppressed.to_string().contains("port vanished"));
            }
            other => panic!("expected CleanupFailed, got {:?}", other),
        }
        assert_eq!(log.lock().unwrap().closed, 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_close_failure_after_success_is_returned() {
        let (manager, _) = manager(FakeFactory {
            fail_close: true,
            ..FakeFactory::default()
        });
        assert!(matches!(
            manager.print_once("zebra", &label(), 1),
            Err(PrintError::ConnectionError(_))
        ));
    }

    #[test]
    fn test_preview_needs_no_device() {
        let preview =
            ConnectionManager::preview(Protocol::Epl2, LabelSetup::default(), &label()).expect("preview");
        assert_eq!(preview, "N\nA8,8,0,2,1,1,N,\"TESTE\"");
    }
}
