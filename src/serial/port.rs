use log::{error, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits, available_ports};

/// serial port baud rates offered for selection
pub const COMMON_BAUD_RATES: &[u32] = &[300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// baud rate selected when nothing else applies
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// read timeout of a regular connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// shown in place of a port name when nothing is enumerated
pub const NO_PORTS: &str = "No Ports";

/// Byte stream of an open serial port.
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SerialIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Owned handle to an open port.
pub type PortHandle = Box<dyn SerialIo>;

/// Access to the serial driver: port enumeration and opening.
///
/// The one place the driver is touched, so tests can stand in a simulated device.
#[cfg_attr(test, mockall::automock)]
pub trait SerialBackend: Send + Sync {
    /// Names of the ports currently present.
    fn port_names(&self) -> Vec<String>;

    /// Opens `port` at `baud_rate`, 8N1 without flow control.
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> tokio_serial::Result<PortHandle>;
}

/// Real ports through `tokio-serial`. Opening must happen inside a tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl SerialBackend for NativeBackend {
    fn port_names(&self) -> Vec<String> {
        list_ports()
    }

    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> tokio_serial::Result<PortHandle> {
        match tokio_serial::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open_native_async()
        {
            Ok(stream) => {
                info!("opened serial port {port} at {baud_rate} baud");
                Ok(Box::new(stream))
            }
            Err(e) => {
                error!("failed to open serial port {port}: {e}");
                Err(e)
            }
        }
    }
}

/// Names of the serial ports currently present.
pub fn list_ports() -> Vec<String> {
    match available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            info!("Error listing ports: {e}");
            Vec::new()
        }
    }
}

/// Parses a baud rate, accepting only [`COMMON_BAUD_RATES`].
pub fn parse_baud_rate(value: &str) -> Option<u32> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|baud| COMMON_BAUD_RATES.contains(baud))
}

/// Enumerated ports and the current selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortList {
    names: Vec<String>,
    selected: Option<usize>,
}

impl PortList {
    /// Builds the list, selecting the first port.
    pub fn new(names: Vec<String>) -> Self {
        let selected = if names.is_empty() { None } else { Some(0) };
        PortList { names, selected }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Selected port, `None` when nothing is enumerated.
    pub fn selected(&self) -> Option<&str> {
        self.selected.map(|i| self.names[i].as_str())
    }

    /// Selects `name` if it is enumerated.
    pub fn select(&mut self, name: &str) -> bool {
        match self.names.iter().position(|n| n == name) {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }

    /// Selected port or the [`NO_PORTS`] placeholder.
    pub fn label(&self) -> &str {
        self.selected().unwrap_or(NO_PORTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_list_selects_first() {
        let ports = PortList::new(vec!["COM3".into(), "COM4".into()]);
        assert_eq!(ports.selected(), Some("COM3"));
        assert_eq!(ports.label(), "COM3");
    }

    #[test]
    fn test_empty_port_list() {
        let mut ports = PortList::new(Vec::new());
        assert!(ports.is_empty());
        assert_eq!(ports.selected(), None);
        assert_eq!(ports.label(), NO_PORTS);
        assert!(!ports.select(NO_PORTS));
    }

    #[test]
    fn test_select_only_enumerated() {
        let mut ports = PortList::new(vec!["/dev/ttyUSB0".into(), "/dev/ttyACM0".into()]);
        assert!(ports.select("/dev/ttyACM0"));
        assert_eq!(ports.selected(), Some("/dev/ttyACM0"));
        assert!(!ports.select("/dev/ttyS9"));
        assert_eq!(ports.selected(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_parse_baud_rate() {
        assert_eq!(parse_baud_rate("9600"), Some(9600));
        assert_eq!(parse_baud_rate(" 115200 "), Some(115200));
        assert_eq!(parse_baud_rate("300"), Some(300));
        assert_eq!(parse_baud_rate("921600"), None);
        assert_eq!(parse_baud_rate("fast"), None);
    }
}
