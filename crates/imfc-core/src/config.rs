//! Card configuration.
//!
//! Mirrors the settings a PC emulator exposes for the card: I/O base, IRQ
//! line, output rate and the path of the firmware ROM. Stored as JSON.

use crate::clock;
use crate::error::{ImfcError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default host I/O base.
pub const DEFAULT_BASE_PORT: u16 = 0x2A20;

/// Default host IRQ line.
pub const DEFAULT_IRQ: u8 = 3;

/// Default output rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Number of host ports the card decodes.
pub const HOST_PORT_COUNT: u16 = 16;

/// Card settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// First of the 16 host I/O ports.
    pub base_port: u16,
    /// Host IRQ line.
    pub irq: u8,
    /// Requested output rate in Hz (clamped to 8000 at use).
    pub sample_rate: u32,
    /// Firmware ROM image. Without one the card stays silent.
    pub firmware: Option<PathBuf>,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            irq: DEFAULT_IRQ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            firmware: None,
        }
    }
}

impl CardConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    ///
    /// A relative firmware path is resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json_str(&text)?;
        if let (Some(rom), Some(dir)) = (config.firmware.as_ref(), path.parent()) {
            if rom.is_relative() {
                config.firmware = Some(dir.join(rom));
            }
        }
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the host bus cannot address.
    pub fn validate(&self) -> Result<()> {
        if self.base_port.checked_add(HOST_PORT_COUNT - 1).is_none() {
            return Err(ImfcError::Config(format!(
                "base port {:#06X} leaves no room for {HOST_PORT_COUNT} ports",
                self.base_port
            )));
        }
        if self.irq > 15 {
            return Err(format!("IRQ {} out of range 0-15", self.irq).into());
        }
        Ok(())
    }

    /// Output rate after clamping.
    pub fn effective_sample_rate(&self) -> u32 {
        clock::clamp_sample_rate(self.sample_rate)
    }

    /// Z80 T-states per output frame.
    pub fn cycles_per_sample(&self) -> u32 {
        clock::cycles_per_sample(self.sample_rate)
    }

    /// Whether `port` is one of the card's host ports.
    pub fn decodes(&self, port: u16) -> bool {
        port.wrapping_sub(self.base_port) < HOST_PORT_COUNT
    }
}
