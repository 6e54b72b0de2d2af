//! SCX images consumed by the writer tool.
//!
//! Layout:
//! - bytes 0..32: device name, ASCII, terminated by `!` when shorter than 32
//! - byte 32: rolling code enable (always 0)
//! - bytes 33..160: reserved, `0xFF`
//! - bytes 160..256: configuration words, little endian
//! - bytes 256..: program memory, two bytes per word, little endian

use anyhow::{Context, Result};
use picblink_config::DeviceDescriptor;
use picblink_core::memory::{ProgramImage, ERASED_BYTE};
use std::path::Path;
use tracing::{info, warn};

pub const HEADER_SIZE: usize = 256;
pub const NAME_FIELD_SIZE: usize = 32;
pub const ROLLING_CODE_OFFSET: usize = 32;
pub const CONFIG_AREA_OFFSET: usize = 160;
pub const NAME_TERMINATOR: u8 = b'!';

const MAX_NAME_LEN: usize = NAME_FIELD_SIZE - 1;
const CONFIG_AREA_WORDS: usize = (HEADER_SIZE - CONFIG_AREA_OFFSET) / 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScxImage {
    pub device: String,
    pub rom_words: u32,
    pub config_words: Vec<u16>,
    bytes: Vec<u8>,
}

/// Built-in descriptor for `name`, or the default device with a warning.
pub fn device_or_default(name: &str) -> DeviceDescriptor {
    match DeviceDescriptor::builtin(name) {
        Ok(device) => device,
        Err(e) => {
            warn!("{}, using {} defaults", e, picblink_config::DEFAULT_DEVICE);
            DeviceDescriptor::default()
        }
    }
}

impl ScxImage {
    pub fn from_program(image: &ProgramImage, device: &DeviceDescriptor) -> Result<Self> {
        let rom_words = device.rom_words()?;
        let config_count = device.config_words as usize;
        if config_count > CONFIG_AREA_WORDS {
            anyhow::bail!(
                "Device '{}' declares {} config words, the SCX config area holds {}",
                device.name,
                config_count,
                CONFIG_AREA_WORDS
            );
        }

        let mut bytes = vec![ERASED_BYTE; HEADER_SIZE + rom_words as usize * 2];

        let name = device.name.as_bytes();
        let name_len = name.len().min(MAX_NAME_LEN);
        bytes[..name_len].copy_from_slice(&name[..name_len]);
        if name.len() < NAME_FIELD_SIZE {
            bytes[name_len] = NAME_TERMINATOR;
        }
        bytes[ROLLING_CODE_OFFSET] = 0x00;

        let mut config_words = Vec::with_capacity(config_count);
        for i in 0..config_count {
            let word = image
                .word_at(device.config_address as u32 + i as u32)
                .unwrap_or(0xFFFF);
            let offset = CONFIG_AREA_OFFSET + i * 2;
            bytes[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
            config_words.push(word);
        }

        for word_addr in 0..rom_words {
            let offset = HEADER_SIZE + word_addr as usize * 2;
            for (i, slot) in bytes[offset..offset + 2].iter_mut().enumerate() {
                if let Some(b) = image.byte_at(word_addr * 2 + i as u32) {
                    *slot = b;
                }
            }
        }

        let rom_end = rom_words * 2;
        let config_start = device.config_address as u32 * 2;
        let config_end = config_start + config_count as u32 * 2;
        let dropped = image
            .segments
            .iter()
            .flat_map(|s| s.start_addr..s.end_addr())
            .filter(|&a| a >= rom_end && !(config_start..config_end).contains(&a))
            .count();
        if dropped > 0 {
            warn!(
                "{} byte(s) lie outside ROM and config space of {} and were dropped",
                dropped, device.name
            );
        }

        Ok(Self {
            device: device.name.clone(),
            rom_words,
            config_words,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn rom_word(&self, word_addr: u32) -> Option<u16> {
        if word_addr >= self.rom_words {
            return None;
        }
        let offset = HEADER_SIZE + word_addr as usize * 2;
        Some(u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]]))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)
            .with_context(|| format!("Failed to write SCX file: {:?}", path))?;

        info!("Created {:?}", path);
        info!("  MCU: {}", self.device);
        info!(
            "  ROM size: {} words ({} bytes)",
            self.rom_words,
            self.rom_words * 2
        );
        info!("  Config words: {}", self.config_words.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blink_image() -> ProgramImage {
        let mut image = ProgramImage::new();
        image.add_segment(0, vec![0x83, 0x16, 0x86, 0x01]);
        image.add_segment(0x400E, vec![0xE4, 0x3C]);
        image
    }

    #[test]
    fn test_header_layout() {
        let device = DeviceDescriptor::builtin("SC8P052").unwrap();
        let scx = ScxImage::from_program(&blink_image(), &device).unwrap();
        let bytes = scx.as_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE + 0x400 * 2);
        assert_eq!(&bytes[..7], b"SC8P052");
        assert_eq!(bytes[7], NAME_TERMINATOR);
        assert_eq!(bytes[8], 0xFF);
        assert_eq!(bytes[ROLLING_CODE_OFFSET], 0x00);
        assert!(bytes[33..CONFIG_AREA_OFFSET].iter().all(|&b| b == 0xFF));
        assert_eq!(&bytes[160..164], &[0xE4, 0x3C, 0xFF, 0xFF]);
        assert_eq!(scx.config_words, vec![0x3CE4, 0xFFFF]);
    }

    #[test]
    fn test_rom_words() {
        let device = DeviceDescriptor::builtin("SC8P052").unwrap();
        let scx = ScxImage::from_program(&blink_image(), &device).unwrap();
        assert_eq!(scx.rom_word(0), Some(0x1683));
        assert_eq!(scx.rom_word(1), Some(0x0186));
        assert_eq!(scx.rom_word(2), Some(0xFFFF));
        assert_eq!(scx.rom_word(0x3FF), Some(0xFFFF));
        assert_eq!(scx.rom_word(0x400), None);
    }

    #[test]
    fn test_larger_device() {
        let device = DeviceDescriptor::builtin("SC8P054").unwrap();
        let scx = ScxImage::from_program(&blink_image(), &device).unwrap();
        assert_eq!(scx.as_bytes().len(), HEADER_SIZE + 0x800 * 2);
    }

    #[test]
    fn test_long_name_has_no_terminator() {
        let device = DeviceDescriptor {
            name: "X".repeat(40),
            ..DeviceDescriptor::default()
        };
        let scx = ScxImage::from_program(&ProgramImage::new(), &device).unwrap();
        let bytes = scx.as_bytes();
        assert!(bytes[..MAX_NAME_LEN].iter().all(|&b| b == b'X'));
        assert_eq!(bytes[MAX_NAME_LEN], 0xFF);
        assert_eq!(bytes[ROLLING_CODE_OFFSET], 0x00);
    }

    #[test]
    fn test_too_many_config_words() {
        let device = DeviceDescriptor {
            config_words: 49,
            ..DeviceDescriptor::default()
        };
        assert!(ScxImage::from_program(&ProgramImage::new(), &device).is_err());
    }

    #[test]
    fn test_unknown_device_falls_back() {
        assert_eq!(device_or_default("PIC99").name, "SC8P052");
        assert_eq!(device_or_default("SC8P062").name, "SC8P062");
    }
}
