use std::fmt;
use tokio::sync::mpsc;

/// Prefix marking transmitted data in the scrollback.
pub const SENT_PREFIX: &str = ">> ";

/// One item appended to the display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub text: String,
    pub sent: bool,
}

impl Entry {
    /// Received data or a notice.
    pub fn received(text: impl Into<String>) -> Self {
        Entry {
            text: text.into(),
            sent: false,
        }
    }

    /// Data we transmitted, stored with [`SENT_PREFIX`] in front.
    pub fn sent(text: impl AsRef<str>) -> Self {
        Entry {
            text: format!("{SENT_PREFIX}{}", text.as_ref()),
            sent: true,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Ordered, append-only output shared by the control side and background tasks.
///
/// Entries are delivered in the order `append` was called.
#[derive(Clone, Debug)]
pub struct Sink {
    tx: mpsc::UnboundedSender<Entry>,
}

impl Sink {
    /// Creates a sink and the receiver the display drains.
    pub fn channel() -> (Sink, mpsc::UnboundedReceiver<Entry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Sink { tx }, rx)
    }

    /// Appends text, marked as sent or not. Sent text gets [`SENT_PREFIX`].
    pub fn append(&self, text: impl Into<String>, sent: bool) {
        let entry = if sent {
            Entry::sent(text.into())
        } else {
            Entry::received(text)
        };
        // display gone means we are shutting down
        let _ = self.tx.send(entry);
    }

    /// Appends a status notice.
    pub fn notice(&self, text: impl Into<String>) {
        self.append(text, false);
    }
}

/// Scrollback buffer the display renders from.
#[derive(Debug, Default)]
pub struct Scrollback {
    entries: Vec<Entry>,
}

impl Scrollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Full rendered text.
    pub fn text(&self) -> String {
        self.entries.iter().map(ToString::to_string).collect()
    }
}
