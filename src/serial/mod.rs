pub mod connection;
pub mod data;
pub mod encoding;
pub mod port;
pub mod probe;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Connection, ConnectionState, ScanReport};
pub use data::{Entry, Scrollback, Sink};
pub use encoding::LineEnding;
pub use port::{NativeBackend, PortList, SerialBackend};
pub use probe::{BAUD_CANDIDATES, BaudProber};
