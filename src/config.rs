// MIT License - Copyright (c) 2026 Peter Wright
// Panel setup values and persisted item selection

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::constants::{DEFAULT_PORT, MAX_AREAS, MAX_ENCLOSURES, MAX_THERMOSTATS, MAX_UNITS, MAX_ZONES};
use crate::devices::unit::UnitKind;
use crate::devices::zone::ZoneKind;
use crate::error::{OmniError, Result};
use crate::protocol::parse_code;

/// Temperature scale used for thermostat and sensor points.
///
/// The controller reports temperatures as a raw byte in a half-degree
/// biased scale: `C = raw / 2 - 40`, `F = raw * 0.9 - 40`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempScale {
    #[default]
    Fahrenheit,
    Celsius,
}

impl TempScale {
    pub fn from_raw(self, raw: u8) -> i32 {
        let raw = raw as f64;
        let degrees = match self {
            Self::Celsius => raw / 2.0 - 40.0,
            Self::Fahrenheit => raw * 0.9 - 40.0,
        };
        degrees.round() as i32
    }

    /// Inverse of [`TempScale::from_raw`], clamped to the raw byte range.
    pub fn to_raw(self, degrees: i32) -> u8 {
        let degrees = degrees as f64;
        let raw = match self {
            Self::Celsius => (degrees + 40.0) * 2.0,
            Self::Fahrenheit => (degrees + 40.0) / 0.9,
        };
        raw.round().clamp(0.0, 255.0) as u8
    }
}

impl FromStr for TempScale {
    type Err = OmniError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f" | "fahrenheit" => Ok(Self::Fahrenheit),
            "c" | "celsius" => Ok(Self::Celsius),
            other => Err(OmniError::config(format!("unknown temperature scale {other:?}"))),
        }
    }
}

/// Humidity sensors report percent through the Fahrenheit mapping.
pub fn humidity_from_raw(raw: u8) -> u32 {
    TempScale::Fahrenheit.from_raw(raw).clamp(0, 100) as u32
}

pub fn humidity_to_raw(percent: u32) -> u8 {
    TempScale::Fahrenheit.to_raw(percent.min(100) as i32)
}

/// Configuration for connecting to an Omni controller.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Controller address
    pub host: String,
    /// Controller UDP port (default: 4369)
    pub port: u16,
    /// 128-bit pre-shared key
    pub private_key: [u8; 16],
    /// 4-digit login code, as digit values
    pub login_code: [u8; 4],
    /// Scale for temperature points
    pub temp_scale: TempScale,
    /// Number of expansion enclosures to expose (0-8)
    pub enclosures: usize,
    /// Bound on each session negotiation wait
    pub handshake_timeout: Duration,
    /// Bound on each poll request
    pub reply_timeout: Duration,
    /// Bound on each command/write acknowledgement
    pub command_timeout: Duration,
    /// Reconnection delay in milliseconds (base delay for exponential backoff)
    pub reconnect_delay_ms: u64,
    /// Maximum number of connection retries on transient errors (0 = no retries)
    pub max_connect_retries: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            private_key: [0; 16],
            login_code: [0; 4],
            temp_scale: TempScale::Fahrenheit,
            enclosures: 0,
            handshake_timeout: Duration::from_secs(4),
            reply_timeout: Duration::from_secs(3),
            command_timeout: Duration::from_secs(5),
            reconnect_delay_ms: 10000,
            max_connect_retries: 3,
        }
    }
}

impl PanelConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> PanelConfigBuilder {
        PanelConfigBuilder::default()
    }
}

/// Builder for PanelConfig.
///
/// The key and login code are checked in [`PanelConfigBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct PanelConfigBuilder {
    config: PanelConfig,
    key_hex: Option<String>,
    login_code: Option<String>,
}

impl PanelConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Pre-shared key as 32 hex digits; spaces, `-` and `:` separators are allowed.
    pub fn private_key_hex(mut self, key: impl Into<String>) -> Self {
        self.key_hex = Some(key.into());
        self
    }

    pub fn private_key(mut self, key: [u8; 16]) -> Self {
        self.key_hex = Some(hex::encode(key));
        self
    }

    pub fn login_code(mut self, code: impl Into<String>) -> Self {
        self.login_code = Some(code.into());
        self
    }

    pub fn temp_scale(mut self, scale: TempScale) -> Self {
        self.config.temp_scale = scale;
        self
    }

    pub fn enclosures(mut self, count: usize) -> Self {
        self.config.enclosures = count;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn max_connect_retries(mut self, retries: u32) -> Self {
        self.config.max_connect_retries = retries;
        self
    }

    pub fn build(self) -> Result<PanelConfig> {
        let mut config = self.config;
        if config.host.trim().is_empty() {
            return Err(OmniError::config("controller address is missing"));
        }
        if config.enclosures > MAX_ENCLOSURES {
            return Err(OmniError::config(format!(
                "at most {MAX_ENCLOSURES} enclosures are supported, got {}",
                config.enclosures
            )));
        }

        let key_hex = self
            .key_hex
            .ok_or_else(|| OmniError::config("private key is missing"))?;
        config.private_key = parse_key(&key_hex)?;

        let code = self
            .login_code
            .ok_or_else(|| OmniError::config("login code is missing"))?;
        config.login_code =
            parse_code(&code).map_err(|_| OmniError::config("login code must be 4 digits"))?;
        Ok(config)
    }
}

fn parse_key(text: &str) -> Result<[u8; 16]> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | ':'))
        .collect();
    let bytes =
        hex::decode(&cleaned).map_err(|e| OmniError::config(format!("private key: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        OmniError::config(format!("private key must be 16 bytes, got {}", b.len()))
    })
}

/// Which items are enabled, per category slot (item number − 1).
///
/// Text form, one key per line:
///
/// ```text
/// ; comment
/// Areas=1,2
/// Thermos=1
/// Units=1:Binary, 4:Dimmer, 300:Flag
/// Zones=3:Alarm, 15:Humidity
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemConfig {
    pub areas: Vec<bool>,
    pub zones: Vec<Option<ZoneKind>>,
    pub units: Vec<Option<UnitKind>>,
    pub thermostats: Vec<bool>,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            areas: vec![false; MAX_AREAS],
            zones: vec![None; MAX_ZONES],
            units: vec![None; MAX_UNITS],
            thermostats: vec![false; MAX_THERMOSTATS],
        }
    }
}

fn item_number(text: &str, capacity: usize, line: usize) -> Result<usize> {
    let n: usize = text.trim().parse().map_err(|_| {
        OmniError::config(format!("line {line}: {text:?} is not an item number"))
    })?;
    if n == 0 || n > capacity {
        return Err(OmniError::config(format!(
            "line {line}: item number {n} is outside 1..={capacity}"
        )));
    }
    Ok(n - 1)
}

fn typed_entry<K: FromStr>(entry: &str, capacity: usize, line: usize) -> Result<(usize, K)> {
    let (number, kind) = entry
        .split_once(':')
        .ok_or_else(|| OmniError::config(format!("line {line}: {entry:?} lacks ':subtype'")))?;
    let slot = item_number(number, capacity, line)?;
    let kind = kind.trim().parse().map_err(|_| {
        OmniError::config(format!("line {line}: unknown subtype {:?}", kind.trim()))
    })?;
    Ok((slot, kind))
}

impl ItemConfig {
    /// Parse the text form. Any malformed line rejects the whole text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut items = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            let (key, value) = trimmed
                .split_once('=')
                .ok_or_else(|| OmniError::config(format!("line {line}: expected key=value")))?;
            let value = value.trim();
            let entries: Vec<&str> = if value.is_empty() {
                Vec::new()
            } else {
                value.split(',').map(str::trim).collect()
            };

            match key.trim().to_ascii_lowercase().as_str() {
                "areas" => {
                    for e in entries {
                        items.areas[item_number(e, MAX_AREAS, line)?] = true;
                    }
                }
                "thermos" => {
                    for e in entries {
                        items.thermostats[item_number(e, MAX_THERMOSTATS, line)?] = true;
                    }
                }
                "units" => {
                    for e in entries {
                        let (slot, kind) = typed_entry(e, MAX_UNITS, line)?;
                        items.units[slot] = Some(kind);
                    }
                }
                "zones" => {
                    for e in entries {
                        let (slot, kind) = typed_entry(e, MAX_ZONES, line)?;
                        items.zones[slot] = Some(kind);
                    }
                }
                other => {
                    return Err(OmniError::config(format!("line {line}: unknown key {other:?}")));
                }
            }
        }
        Ok(items)
    }

    /// Render back to the text form accepted by [`ItemConfig::parse`].
    pub fn render(&self) -> String {
        fn numbers(flags: &[bool]) -> String {
            flags
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(i, _)| (i + 1).to_string())
                .collect::<Vec<_>>()
                .join(",")
        }
        fn typed<K: std::fmt::Display>(slots: &[Option<K>]) -> String {
            slots
                .iter()
                .enumerate()
                .filter_map(|(i, k)| k.as_ref().map(|k| format!("{}:{}", i + 1, k)))
                .collect::<Vec<_>>()
                .join(",")
        }

        let mut out = String::from("; Omni items enabled for polling\n");
        let _ = writeln!(out, "Areas={}", numbers(&self.areas));
        let _ = writeln!(out, "Thermos={}", numbers(&self.thermostats));
        let _ = writeln!(out, "Units={}", typed(&self.units));
        let _ = writeln!(out, "Zones={}", typed(&self.zones));
        out
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading item configuration from {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| OmniError::config(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.render())
            .map_err(|e| OmniError::config(format!("{}: {e}", path.display())))
    }

    pub fn is_empty(&self) -> bool {
        !self.areas.iter().any(|a| *a)
            && !self.thermostats.iter().any(|t| *t)
            && self.units.iter().all(Option::is_none)
            && self.zones.iter().all(Option::is_none)
    }
}
