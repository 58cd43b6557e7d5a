//! # Settings Module
//!
//! The terminal's current selection and its persisted form.
//!
//! Preferences are stored as a flat JSON object in `serial_settings.json`,
//! read once at startup and written once at shutdown. Values that no longer
//! apply (a port that is not plugged in, an unknown baud rate) are ignored
//! field by field and the current selection is kept for that field.

use std::fs;
use std::io;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PreferencesError;
use crate::serial::encoding::LineEnding;
use crate::serial::port::{DEFAULT_BAUD_RATE, PortList, parse_baud_rate};

/// Default preferences file, relative to the working directory.
pub const SETTINGS_FILE: &str = "serial_settings.json";

/// Persisted preferences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    #[serde(deserialize_with = "lenient")]
    pub port: String,
    #[serde(deserialize_with = "lenient")]
    pub baud: String,
    #[serde(deserialize_with = "lenient")]
    pub line_ending: String,
    #[serde(deserialize_with = "lenient")]
    pub auto_detect: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            port: String::new(),
            baud: DEFAULT_BAUD_RATE.to_string(),
            line_ending: LineEnding::default().label().to_string(),
            auto_detect: false,
        }
    }
}

/// A field of the wrong type falls back to its empty value instead of
/// failing the whole file.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl Preferences {
    /// Reads preferences; `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Preferences>, PreferencesError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Reads preferences, falling back to defaults on any problem.
    pub fn load_or_default(path: &Path) -> Preferences {
        match Self::load(path) {
            Ok(Some(preferences)) => {
                info!("loaded preferences from {}", path.display());
                preferences
            }
            Ok(None) => Preferences::default(),
            Err(e) => {
                warn!("Error loading settings: {e}, using defaults");
                Preferences::default()
            }
        }
    }

    /// Writes preferences, replacing the file.
    pub fn save(&self, path: &Path) -> Result<(), PreferencesError> {
        let data = serde_json::to_string(self)?;
        fs::write(path, data)?;
        info!("saved preferences to {}", path.display());
        Ok(())
    }
}

/// What the user has currently selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub ports: PortList,
    pub baud_rate: u32,
    pub line_ending: LineEnding,
    pub auto_detect: bool,
}

impl Selection {
    pub fn new(ports: PortList) -> Self {
        Selection {
            ports,
            baud_rate: DEFAULT_BAUD_RATE,
            line_ending: LineEnding::default(),
            auto_detect: false,
        }
    }

    /// Applies whatever saved values still make sense.
    pub fn apply(&mut self, preferences: &Preferences) {
        if let Some(baud_rate) = parse_baud_rate(&preferences.baud) {
            self.baud_rate = baud_rate;
        }
        if let Some(line_ending) = LineEnding::from_label(&preferences.line_ending) {
            self.line_ending = line_ending;
        }
        self.auto_detect = preferences.auto_detect;
        if !preferences.port.is_empty() {
            self.ports.select(&preferences.port);
        }
    }

    /// Snapshot for saving.
    pub fn preferences(&self) -> Preferences {
        Preferences {
            port: self.ports.label().to_string(),
            baud: self.baud_rate.to_string(),
            line_ending: self.line_ending.label().to_string(),
            auto_detect: self.auto_detect,
        }
    }
}
