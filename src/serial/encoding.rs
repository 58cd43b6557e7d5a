//! # Encoding Module
//!
//! This module provides the text encoding and decoding used on the wire.
//! Outgoing lines are encoded as UTF-8 with a selectable line ending;
//! incoming bytes are decoded as UTF-8, dropping invalid sequences.

use std::fmt;
use std::str::FromStr;

/// Suffix appended to outgoing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// No suffix.
    None,
    /// `\n`
    NewLine,
    /// `\r`
    CarriageReturn,
    /// `\r\n`
    #[default]
    Both,
}

impl LineEnding {
    /// Every mode, in menu order.
    pub const ALL: [LineEnding; 4] = [
        LineEnding::None,
        LineEnding::NewLine,
        LineEnding::CarriageReturn,
        LineEnding::Both,
    ];

    /// The bytes appended to outgoing text.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::NewLine => "\n",
            LineEnding::CarriageReturn => "\r",
            LineEnding::Both => "\r\n",
        }
    }

    /// Display name, also used as the persisted form.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            LineEnding::None => "None",
            LineEnding::NewLine => "New Line (\\n)",
            LineEnding::CarriageReturn => "Carriage Return (\\r)",
            LineEnding::Both => "Both (\\r\\n)",
        }
    }

    /// Looks a mode up by its display name.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ending| ending.label() == label)
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Short names accepted on the command line and in console commands.
impl FromStr for LineEnding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(LineEnding::None),
            "lf" | "nl" | "\\n" => Ok(LineEnding::NewLine),
            "cr" | "\\r" => Ok(LineEnding::CarriageReturn),
            "crlf" | "both" | "\\r\\n" => Ok(LineEnding::Both),
            other => Err(format!("unknown line ending '{other}' (none, lf, cr, crlf)")),
        }
    }
}

/// Encodes a line of user text for transmission.
///
/// # Examples
///
/// ```
/// use serial_terminal::serial::encoding::{encode_line, LineEnding};
///
/// assert_eq!(encode_line("ping", LineEnding::Both), b"ping\r\n".to_vec());
/// assert_eq!(encode_line("ping", LineEnding::None), b"ping".to_vec());
/// ```
#[must_use]
pub fn encode_line(text: &str, ending: LineEnding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 2);
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(ending.suffix().as_bytes());
    bytes
}

/// Incremental UTF-8 decoder for a byte stream.
///
/// Invalid sequences are dropped. A multi-byte character split across two
/// reads is held back until the rest of it arrives.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the next chunk, returning all complete characters.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => rest = &after[len..],
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let tail = rest.to_vec();
        self.pending = tail;
        text
    }
}

/// Printable in the terminal sense: visible glyphs and the plain space.
///
/// Rejects controls, separators other than the space, format characters,
/// private-use characters and noncharacters. Unassigned code points outside
/// those ranges are not detected and count as printable.
#[must_use]
pub fn is_printable(c: char) -> bool {
    c == ' ' || !(c.is_control() || c.is_whitespace() || is_format(c) || is_private_or_noncharacter(c))
}

/// Format characters (general category Cf).
fn is_format(c: char) -> bool {
    matches!(
        c,
        '\u{AD}'
            | '\u{600}'..='\u{605}'
            | '\u{61C}'
            | '\u{6DD}'
            | '\u{70F}'
            | '\u{890}'..='\u{891}'
            | '\u{8E2}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{110BD}'
            | '\u{110CD}'
            | '\u{13430}'..='\u{1343F}'
            | '\u{1BCA0}'..='\u{1BCA3}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
    )
}

fn is_private_or_noncharacter(c: char) -> bool {
    let code = u32::from(c);
    matches!(code, 0xE000..=0xF8FF | 0xF0000..=0x10FFFF | 0xFDD0..=0xFDEF) || code & 0xFFFE == 0xFFFE
}

/// Fraction of characters that are printable or one of tab/CR/LF.
///
/// Returns `0.0` for an empty string.
#[must_use]
pub fn printable_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let printable = text
        .chars()
        .filter(|&c| is_printable(c) || matches!(c, '\t' | '\r' | '\n'))
        .count();
    printable as f64 / total as f64
}
