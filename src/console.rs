//! # Console Module
//!
//! The user-facing side of the terminal: the current selection, the
//! scrollback, and the actions a user can take (connect/disconnect toggle,
//! cancel scan, send, clear). Input arrives as text lines; a line starting
//! with `/` is a command, anything else is transmitted.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use log::info;
use tokio::sync::mpsc;

use crate::error::{ConnectionError, Result, SendError, TerminalError};
use crate::serial::encoding::LineEnding;
use crate::serial::port::{COMMON_BAUD_RATES, PortList, SerialBackend, parse_baud_rate};
use crate::serial::{Connection, ConnectionState, Entry, ScanReport, Scrollback, Sink};
use crate::settings::{Preferences, Selection};

/// Console help text.
pub const HELP: &str = "\
Commands:
  /connect           connect, or disconnect when connected, or cancel a scan
  /disconnect        close the connection
  /cancel            cancel a running baud scan
  /clear             clear the scrollback
  /ports             refresh the port list
  /port <name>       select a port
  /baud <rate>       select a baud rate
  /ending <mode>     line ending: none, lf, cr, crlf
  /auto <on|off>     auto-detect the baud rate on connect
  /status            show the current selection
  /quit              save settings and exit
Any other line is sent; start it with // to send a leading /.
";

/// A parsed input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Toggle,
    Disconnect,
    Cancel,
    Clear,
    Ports,
    Port(String),
    Baud(u32),
    Ending(LineEnding),
    Auto(bool),
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parses a raw input line; invalid UTF-8 is replaced, not rejected.
    pub fn parse_bytes(line: &[u8]) -> Result<Command> {
        Command::parse(&String::from_utf8_lossy(line))
    }

    pub fn parse(line: &str) -> Result<Command> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(escaped) = line.strip_prefix("//") {
            return Ok(Command::Send(format!("/{escaped}")));
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default();
        let argument = words.next();
        let command = match (name, argument) {
            ("connect", None) => Command::Toggle,
            ("disconnect", None) => Command::Disconnect,
            ("cancel", None) => Command::Cancel,
            ("clear", None) => Command::Clear,
            ("ports", None) => Command::Ports,
            ("port", Some(port)) => Command::Port(port.to_string()),
            ("baud", Some(rate)) => Command::Baud(parse_baud_rate(rate).ok_or_else(|| {
                TerminalError::invalid_command(format!(
                    "unsupported baud rate '{rate}', choose one of {COMMON_BAUD_RATES:?}"
                ))
            })?),
            ("ending", Some(mode)) => {
                Command::Ending(mode.parse().map_err(TerminalError::invalid_command)?)
            }
            ("auto", Some("on")) => Command::Auto(true),
            ("auto", Some("off")) => Command::Auto(false),
            ("status", None) => Command::Status,
            ("help", None) => Command::Help,
            ("quit" | "exit", None) => Command::Quit,
            _ => return Err(TerminalError::invalid_command(line)),
        };
        if words.next().is_some() {
            return Err(TerminalError::invalid_command(line));
        }
        Ok(command)
    }
}

/// Whether the input loop keeps going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Something for the input loop to handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalEvent {
    /// An entry for the display, already recorded in the scrollback.
    Output(Entry),
    /// A baud scan ended; hand it to [`Terminal::finish_scan`].
    ScanFinished(ScanReport),
}

/// The terminal: one connection, its scrollback and the user's selection.
pub struct Terminal {
    backend: Arc<dyn SerialBackend>,
    connection: Connection,
    selection: Selection,
    scrollback: Scrollback,
    sink: Sink,
    output_rx: mpsc::UnboundedReceiver<Entry>,
    scan_rx: mpsc::UnboundedReceiver<ScanReport>,
}

impl Terminal {
    /// Creates a disconnected terminal with the currently enumerated ports.
    pub fn new(backend: Arc<dyn SerialBackend>) -> Terminal {
        let (sink, output_rx) = Sink::channel();
        let (connection, scan_rx) = Connection::new(Arc::clone(&backend), sink.clone());
        let selection = Selection::new(PortList::new(backend.port_names()));
        Terminal {
            backend,
            connection,
            selection,
            scrollback: Scrollback::new(),
            sink,
            output_rx,
            scan_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    /// Applies saved preferences that still make sense.
    pub fn apply_preferences(&mut self, preferences: &Preferences) {
        self.selection.apply(preferences);
    }

    /// Waits for output or a finished scan.
    ///
    /// Pending output is delivered before a scan report. Output is recorded
    /// in the scrollback before it is returned.
    pub async fn next_event(&mut self) -> TerminalEvent {
        tokio::select! {
            biased;
            Some(entry) = self.output_rx.recv() => {
                self.scrollback.push(entry.clone());
                TerminalEvent::Output(entry)
            }
            Some(report) = self.scan_rx.recv() => TerminalEvent::ScanFinished(report),
            // both senders live in `self`, so this is never reached
            else => std::future::pending().await,
        }
    }

    /// Runs one command.
    pub async fn handle(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Send(text) => self.send(&text).await?,
            Command::Toggle => self.toggle_connection().await?,
            Command::Disconnect => self.connection.disconnect().await,
            Command::Cancel => {
                if !self.connection.cancel_scan() {
                    self.sink.notice("--- No scan in progress ---\n");
                }
            }
            Command::Clear => self.clear(),
            Command::Ports => self.refresh_ports(),
            Command::Port(name) => self.select_port(&name)?,
            Command::Baud(baud_rate) => {
                self.ensure_idle()?;
                self.selection.baud_rate = baud_rate;
            }
            Command::Ending(line_ending) => self.selection.line_ending = line_ending,
            Command::Auto(auto_detect) => {
                self.ensure_idle()?;
                self.selection.auto_detect = auto_detect;
            }
            Command::Status => self.sink.notice(self.status()),
            Command::Help => self.sink.notice(HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Connect/disconnect toggle.
    ///
    /// Disconnects when connected, cancels when scanning, and otherwise
    /// connects to the selected port, scanning first if auto-detect is on.
    pub async fn toggle_connection(&mut self) -> std::result::Result<(), ConnectionError> {
        match self.connection.state() {
            ConnectionState::Connected => {
                self.connection.disconnect().await;
                Ok(())
            }
            ConnectionState::Scanning => {
                self.connection.cancel_scan();
                Ok(())
            }
            ConnectionState::Disconnected => {
                let port = self
                    .selection
                    .ports
                    .selected()
                    .ok_or(ConnectionError::NoPort)?
                    .to_string();
                if self.selection.auto_detect {
                    self.connection.start_scan(&port)
                } else {
                    self.connection.connect(&port, self.selection.baud_rate)
                }
            }
        }
    }

    /// Completes a scan, adopting the detected baud rate on success.
    pub async fn finish_scan(
        &mut self,
        report: ScanReport,
    ) -> std::result::Result<Option<u32>, ConnectionError> {
        let detected = self.connection.finish_scan(report).await?;
        if let Some(baud_rate) = detected {
            self.selection.baud_rate = baud_rate;
        }
        Ok(detected)
    }

    /// Sends a line with the selected line ending.
    pub async fn send(&mut self, text: &str) -> std::result::Result<(), SendError> {
        self.connection.send(text, self.selection.line_ending).await
    }

    /// Empties the scrollback; the connection is untouched.
    pub fn clear(&mut self) {
        self.scrollback.clear();
    }

    /// Re-enumerates ports and selects the first one.
    pub fn refresh_ports(&mut self) {
        self.selection.ports = PortList::new(self.backend.port_names());
        let mut listing = String::from("Ports:");
        if self.selection.ports.is_empty() {
            listing.push_str(" none\n");
        } else {
            listing.push('\n');
            for name in self.selection.ports.names() {
                let _ = writeln!(listing, "  {name}");
            }
        }
        self.sink.notice(listing);
    }

    fn select_port(&mut self, name: &str) -> Result<()> {
        self.ensure_idle()?;
        if !self.selection.ports.select(name) {
            return Err(TerminalError::invalid_command(format!(
                "port '{name}' is not available"
            )));
        }
        Ok(())
    }

    /// Settings can only change while disconnected.
    fn ensure_idle(&self) -> std::result::Result<(), ConnectionError> {
        match self.connection.state() {
            ConnectionState::Disconnected => Ok(()),
            state => Err(ConnectionError::busy(format!("cannot change settings while {state}"))),
        }
    }

    /// One-line summary of the selection and state.
    pub fn status(&self) -> String {
        let selection = &self.selection;
        format!(
            "--- {} | port {} | {} baud | ending {} | auto-detect {} ---\n",
            self.connection.state(),
            self.connection.port().unwrap_or(selection.ports.label()),
            self.connection.baud_rate().unwrap_or(selection.baud_rate),
            selection.line_ending,
            if selection.auto_detect { "on" } else { "off" },
        )
    }

    /// Disconnects and writes the preferences file.
    pub async fn shutdown(&mut self, settings: &Path) -> Result<()> {
        self.connection.disconnect().await;
        self.connection.cancel_scan();
        self.selection.preferences().save(settings)?;
        info!("terminal shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port::{MockSerialBackend, PortHandle};
    use crate::serial::testing::SimulatedDevice;
    use std::sync::Mutex;

    #[test]
    fn test_parse_bytes_tolerates_invalid_utf8() {
        assert_eq!(
            Command::parse_bytes(b"caf\xE9\r\n").unwrap(),
            Command::Send("caf\u{FFFD}".into())
        );
        assert_eq!(Command::parse_bytes(b"/status\n").unwrap(), Command::Status);
    }

    fn backend_with<F>(ports: &[&str], open: F) -> Arc<MockSerialBackend>
    where
        F: FnMut(&str, u32) -> tokio_serial::Result<PortHandle> + Send + 'static,
    {
        let names: Vec<String> = ports.iter().map(ToString::to_string).collect();
        let mut backend = MockSerialBackend::new();
        backend
            .expect_port_names()
            .returning(move || names.clone());
        let mut open = open;
        backend
            .expect_open()
            .returning(move |port, baud_rate, _| open(port, baud_rate));
        Arc::new(backend)
    }

    async fn next_output(terminal: &mut Terminal) -> Entry {
        match terminal.next_event().await {
            TerminalEvent::Output(entry) => entry,
            other => panic!("expected output, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_send() {
        assert_eq!(Command::parse("hello").unwrap(), Command::Send("hello".into()));
        assert_eq!(Command::parse("AT+GMR\n").unwrap(), Command::Send("AT+GMR".into()));
        assert_eq!(Command::parse("//help").unwrap(), Command::Send("/help".into()));
        assert_eq!(Command::parse("").unwrap(), Command::Send(String::new()));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/connect").unwrap(), Command::Toggle);
        assert_eq!(Command::parse("/baud 115200").unwrap(), Command::Baud(115200));
        assert_eq!(Command::parse("/ending lf").unwrap(), Command::Ending(LineEnding::NewLine));
        assert_eq!(Command::parse("/auto on").unwrap(), Command::Auto(true));
        assert_eq!(Command::parse("/port COM3").unwrap(), Command::Port("COM3".into()));
        assert_eq!(Command::parse("/exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse("/baud 12345").is_err());
        assert!(Command::parse("/ending tab").is_err());
        assert!(Command::parse("/auto maybe").is_err());
        assert!(Command::parse("/connect now").is_err());
        assert!(Command::parse("/frobnicate").is_err());
    }

    #[tokio::test]
    async fn test_connect_and_send_scenario() {
        let device = SimulatedDevice::new();
        let written = device.written();
        let mut device = Some(device);
        let backend = backend_with(&["COM3"], move |port, baud_rate| {
            assert_eq!((port, baud_rate), ("COM3", 9600));
            Ok(device.take().expect("opened once").into_handle())
        });
        let mut terminal = Terminal::new(backend);
        assert_eq!(terminal.selection().ports.selected(), Some("COM3"));
        assert_eq!(terminal.selection().baud_rate, 9600);
        assert!(!terminal.selection().auto_detect);

        terminal.handle(Command::Toggle).await.unwrap();
        assert_eq!(terminal.state(), ConnectionState::Connected);

        terminal.handle(Command::Send("ping".into())).await.unwrap();
        assert_eq!(*written.lock().unwrap(), b"ping\r\n");

        next_output(&mut terminal).await;
        let sent = next_output(&mut terminal).await;
        assert_eq!(sent, Entry::sent("ping\n"));
        assert_eq!(sent.to_string(), ">> ping\n");
        assert!(terminal.scrollback().text().ends_with(">> ping\n"));

        terminal.handle(Command::Toggle).await.unwrap();
        assert_eq!(terminal.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_detect_scenario() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&attempts);
        let backend = backend_with(&["COM3"], move |_, baud_rate| {
            log.lock().unwrap().push(baud_rate);
            let device = if baud_rate == 9600 {
                SimulatedDevice::with_output(b"GPS fix acquired\r\n")
            } else {
                SimulatedDevice::with_output(&[0xC3, 0x28, 0xA0, 0xA1])
            };
            Ok(device.into_handle())
        });
        let mut terminal = Terminal::new(backend);
        terminal.handle(Command::Baud(115200)).await.unwrap();
        terminal.handle(Command::Auto(true)).await.unwrap();

        terminal.handle(Command::Toggle).await.unwrap();
        assert_eq!(terminal.state(), ConnectionState::Scanning);

        let report = loop {
            if let TerminalEvent::ScanFinished(report) = terminal.next_event().await {
                break report;
            }
        };
        assert_eq!(terminal.finish_scan(report).await.unwrap(), Some(9600));
        assert_eq!(terminal.state(), ConnectionState::Connected);
        assert_eq!(terminal.selection().baud_rate, 9600);
        assert_eq!(attempts.lock().unwrap()[..2], [115200, 9600]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_while_scanning_cancels() {
        let backend = backend_with(&["COM3"], |_, _| Ok(SimulatedDevice::new().into_handle()));
        let mut terminal = Terminal::new(backend);
        terminal.handle(Command::Auto(true)).await.unwrap();
        terminal.handle(Command::Toggle).await.unwrap();
        assert!(terminal.handle(Command::Baud(300)).await.is_err());

        terminal.handle(Command::Toggle).await.unwrap();
        let report = loop {
            if let TerminalEvent::ScanFinished(report) = terminal.next_event().await {
                break report;
            }
        };
        assert_eq!(terminal.finish_scan(report).await.unwrap(), None);
        assert_eq!(terminal.state(), ConnectionState::Disconnected);
        assert!(terminal.scrollback().text().contains("--- Scan Cancelled ---\n"));
    }

    #[tokio::test]
    async fn test_no_ports_refuses_to_connect() {
        let backend = backend_with(&[], |_, _| panic!("nothing to open"));
        let mut terminal = Terminal::new(backend);

        let err = terminal.handle(Command::Toggle).await.unwrap_err();
        assert!(matches!(err, TerminalError::Connection(ConnectionError::NoPort)));
        assert_eq!(terminal.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connection_error_surfaces() {
        let backend = backend_with(&["COM7"], |_, _| {
            Err(tokio_serial::Error::new(
                tokio_serial::ErrorKind::NoDevice,
                "Access is denied.",
            ))
        });
        let mut terminal = Terminal::new(backend);

        let err = terminal.handle(Command::Toggle).await.unwrap_err();
        assert!(err.to_string().contains("Access is denied."));
        assert_eq!(terminal.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_clear_keeps_connection() {
        let backend = backend_with(&["COM3"], |_, _| Ok(SimulatedDevice::new().into_handle()));
        let mut terminal = Terminal::new(backend);
        terminal.handle(Command::Toggle).await.unwrap();
        next_output(&mut terminal).await;
        assert!(!terminal.scrollback().entries().is_empty());

        terminal.handle(Command::Clear).await.unwrap();
        assert!(terminal.scrollback().entries().is_empty());
        assert_eq!(terminal.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_select_port() {
        let backend = backend_with(&["COM1", "COM3"], |_, _| {
            Ok(SimulatedDevice::new().into_handle())
        });
        let mut terminal = Terminal::new(backend);
        terminal.handle(Command::Port("COM3".into())).await.unwrap();
        assert_eq!(terminal.selection().ports.selected(), Some("COM3"));
        assert!(terminal.handle(Command::Port("COM9".into())).await.is_err());
        assert_eq!(terminal.selection().ports.selected(), Some("COM3"));
    }

    #[tokio::test]
    async fn test_refresh_ports_lists_names() {
        let backend = backend_with(&["/dev/ttyUSB0"], |_, _| {
            Ok(SimulatedDevice::new().into_handle())
        });
        let mut terminal = Terminal::new(backend);
        terminal.handle(Command::Ports).await.unwrap();
        assert_eq!(
            next_output(&mut terminal).await,
            Entry::received("Ports:\n  /dev/ttyUSB0\n")
        );
    }

    #[tokio::test]
    async fn test_status_line() {
        let backend = backend_with(&["COM3"], |_, _| Ok(SimulatedDevice::new().into_handle()));
        let terminal = Terminal::new(backend);
        assert_eq!(
            terminal.status(),
            "--- disconnected | port COM3 | 9600 baud | ending Both (\\r\\n) | auto-detect off ---\n"
        );
    }

    #[tokio::test]
    async fn test_quit_and_shutdown_saves_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serial_settings.json");
        let backend = backend_with(&["COM3"], |_, _| Ok(SimulatedDevice::new().into_handle()));
        let mut terminal = Terminal::new(backend);
        terminal.handle(Command::Ending(LineEnding::CarriageReturn)).await.unwrap();
        terminal.handle(Command::Toggle).await.unwrap();

        assert_eq!(terminal.handle(Command::Quit).await.unwrap(), Flow::Quit);
        terminal.shutdown(&path).await.unwrap();
        assert_eq!(terminal.state(), ConnectionState::Disconnected);

        let saved = Preferences::load(&path).unwrap().unwrap();
        assert_eq!(saved.port, "COM3");
        assert_eq!(saved.baud, "9600");
        assert_eq!(saved.line_ending, "Carriage Return (\\r)");
        assert!(!saved.auto_detect);
    }

    #[tokio::test]
    async fn test_apply_preferences() {
        let backend = backend_with(&["COM1", "COM3"], |_, _| {
            Ok(SimulatedDevice::new().into_handle())
        });
        let mut terminal = Terminal::new(backend);
        terminal.apply_preferences(&Preferences {
            port: "COM3".into(),
            baud: "57600".into(),
            line_ending: "None".into(),
            auto_detect: true,
        });
        let selection = terminal.selection();
        assert_eq!(selection.ports.selected(), Some("COM3"));
        assert_eq!(selection.baud_rate, 57600);
        assert_eq!(selection.line_ending, LineEnding::None);
        assert!(selection.auto_detect);
    }
}
