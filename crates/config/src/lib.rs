use anyhow::{Context, Result};
use firmware::fuses::FuseConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use firmware::fuses::{Oscillator, Switch};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Unknown device '{0}'")]
    Unknown(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PortConfig {
    pub data_address: u16,
    pub tris_address: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            data_address: firmware::port::PORTB,
            tris_address: firmware::port::TRISB,
        }
    }
}

fn default_config_address() -> u16 {
    firmware::fuses::CONFIG_WORD_ADDRESS
}

fn default_config_words() -> u16 {
    2
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeviceDescriptor {
    pub name: String,
    pub rom_size: String, // e.g. "2 KiB"
    #[serde(default = "default_config_address")]
    pub config_address: u16,
    #[serde(default = "default_config_words")]
    pub config_words: u16,
    #[serde(default)]
    pub port: PortConfig,
}

/// Devices the writer tooling knows about: (name, ROM size).
const KNOWN_DEVICES: &[(&str, &str)] = &[
    ("SC8P052", "2 KiB"),
    ("SC8P052B", "2 KiB"),
    ("SC8P052B_A", "2 KiB"),
    ("SC8P054", "4 KiB"),
    ("SC8P062", "2 KiB"),
];

pub const DEFAULT_DEVICE: &str = "SC8P052";

impl DeviceDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open device descriptor at {:?}", path.as_ref()))?;
        serde_yaml::from_reader(f).context("Failed to parse Device Descriptor")
    }

    pub fn builtin(name: &str) -> Result<Self, DeviceError> {
        KNOWN_DEVICES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, rom)| Self {
                name: n.to_string(),
                rom_size: rom.to_string(),
                config_address: default_config_address(),
                config_words: default_config_words(),
                port: PortConfig::default(),
            })
            .ok_or_else(|| DeviceError::Unknown(name.to_string()))
    }

    pub fn known_devices() -> impl Iterator<Item = &'static str> {
        KNOWN_DEVICES.iter().map(|(n, _)| *n)
    }

    /// Resolve a device reference: a built-in name, or a descriptor path
    /// relative to `base_dir`.
    pub fn resolve(reference: &str, base_dir: &Path) -> Result<Self> {
        if reference.ends_with(".yaml") || reference.ends_with(".yml") {
            return Self::from_file(base_dir.join(reference));
        }
        Ok(Self::builtin(reference)?)
    }

    /// Program memory size in 14-bit words (two bytes each in images).
    pub fn rom_words(&self) -> Result<u32> {
        Ok((parse_size(&self.rom_size)? / 2) as u32)
    }
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE.to_string(),
            rom_size: "2 KiB".to_string(),
            config_address: default_config_address(),
            config_words: default_config_words(),
            port: PortConfig::default(),
        }
    }
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_clock_hz() -> u32 {
    firmware::XTAL_FREQ
}

fn default_delay_cycles() -> u32 {
    firmware::DELAY_CYCLES
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BlinkManifest {
    pub name: String,
    /// Built-in device name or path to a descriptor file.
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,
    #[serde(default = "default_delay_cycles")]
    pub delay_cycles: u32,
    #[serde(default)]
    pub pin: u8,
    #[serde(default)]
    pub fuses: FuseConfig,
}

impl Default for BlinkManifest {
    fn default() -> Self {
        Self {
            name: "blink".to_string(),
            device: default_device(),
            clock_hz: default_clock_hz(),
            delay_cycles: default_delay_cycles(),
            pin: 0,
            fuses: FuseConfig::default(),
        }
    }
}

impl BlinkManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open blink manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse Blink Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.clock_hz == 0 {
            anyhow::bail!("'clock_hz' must be greater than zero");
        }
        if self.delay_cycles == 0 {
            anyhow::bail!("'delay_cycles' must be greater than zero");
        }
        if self.pin > 7 {
            anyhow::bail!("'pin' must be in 0..=7, got {}", self.pin);
        }
        Ok(())
    }

    pub fn pin_mask(&self) -> u8 {
        1 << self.pin
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PinLevel {
    Low,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub hex: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub max_iterations: u64,
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    MaxCycles,
    MemoryViolation,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Tolerance {
    pub expected: f64,
    pub tolerance: f64,
}

impl Tolerance {
    pub fn accepts(&self, observed: f64) -> bool {
        (observed - self.expected).abs() <= self.tolerance
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PinSequenceAssertion {
    pub pin_sequence: Vec<PinLevel>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PeriodAssertion {
    pub period_us: Tolerance,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DutyCycleAssertion {
    pub duty_cycle: Tolerance,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DirectionWritesAssertion {
    pub direction_writes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigWordAssertion {
    pub config_word: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    PinSequence(PinSequenceAssertion),
    Period(PeriodAssertion),
    DutyCycle(DutyCycleAssertion),
    DirectionWrites(DirectionWritesAssertion),
    ConfigWord(ConfigWordAssertion),
    ExpectedStopReason(StopReasonAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: TestInputs,
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.limits.max_iterations == 0 {
            anyhow::bail!("Limit 'max_iterations' must be greater than zero");
        }

        for path in [&self.inputs.manifest, &self.inputs.hex].into_iter().flatten() {
            if path.trim().is_empty() {
                anyhow::bail!("Input paths cannot be empty");
            }
        }

        Ok(())
    }

    /// Resolve an input path relative to the script's directory.
    pub fn resolve_input(script_path: &Path, input: &str) -> PathBuf {
        let input = Path::new(input);
        if input.is_absolute() {
            input.to_path_buf()
        } else {
            script_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(input)
        }
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
