use anyhow::{Context, Result};
use picblink_core::memory::ProgramImage;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub mod scx;

pub use scx::ScxImage;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXT_SEGMENT: u8 = 0x02;
const RECORD_EXT_LINEAR: u8 = 0x04;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HexError {
    #[error("line {line}: record contains non-hex characters")]
    InvalidDigits { line: usize },
    #[error("line {line}: record is truncated")]
    Truncated { line: usize },
    #[error("line {line}: byte count {count} does not match record length")]
    LengthMismatch { line: usize, count: usize },
    #[error("line {line}: checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    Checksum { line: usize, expected: u8, found: u8 },
    #[error("line {line}: data record runs past the 32-bit address space")]
    AddressOverflow { line: usize },
}

/// Parse an Intel HEX file into byte-addressed segments.
///
/// Lines that do not start with `:` are skipped. Records after the EOF
/// record are ignored, and so are start-address records (03, 05).
pub fn parse_intel_hex(text: &str) -> Result<ProgramImage, HexError> {
    let mut image = ProgramImage::new();
    let mut extended_addr: u32 = 0;
    let mut saw_eof = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        let Some(body) = line.strip_prefix(':') else {
            continue;
        };

        let bytes = decode_hex(body).ok_or(HexError::InvalidDigits { line: line_no })?;
        if bytes.len() < 5 {
            return Err(HexError::Truncated { line: line_no });
        }

        let count = bytes[0] as usize;
        if bytes.len() != count + 5 {
            return Err(HexError::LengthMismatch {
                line: line_no,
                count,
            });
        }

        let (payload, checksum) = bytes.split_at(bytes.len() - 1);
        let expected = payload
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b))
            .wrapping_neg();
        if expected != checksum[0] {
            return Err(HexError::Checksum {
                line: line_no,
                expected,
                found: checksum[0],
            });
        }

        let address = u16::from_be_bytes([bytes[1], bytes[2]]) as u32;
        let record_type = bytes[3];
        let data = &bytes[4..4 + count];

        match record_type {
            RECORD_DATA => {
                let full_addr = extended_addr + address;
                if full_addr as u64 + count as u64 > u32::MAX as u64 {
                    return Err(HexError::AddressOverflow { line: line_no });
                }
                debug!("Data record: Addr={:#x}, Len={}", full_addr, count);
                image.add_segment(full_addr, data.to_vec());
            }
            RECORD_EOF => {
                saw_eof = true;
                break;
            }
            RECORD_EXT_SEGMENT if count == 2 => {
                extended_addr = (u16::from_be_bytes([data[0], data[1]]) as u32) << 4;
            }
            RECORD_EXT_LINEAR if count == 2 => {
                extended_addr = (u16::from_be_bytes([data[0], data[1]]) as u32) << 16;
            }
            other => {
                debug!("Skipping record type {:#04x} on line {}", other, line_no);
            }
        }
    }

    if !saw_eof {
        warn!("HEX file has no end-of-file record");
    }

    Ok(image)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

pub fn load_hex(path: &Path) -> Result<ProgramImage> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read HEX file: {:?}", path))?;
    let image = parse_intel_hex(&text)
        .with_context(|| format!("Failed to parse HEX file: {:?}", path))?;

    info!(
        "Loaded {} bytes in {} segment(s) from {:?}",
        image.byte_len(),
        image.segments.len(),
        path
    );
    if image.is_empty() {
        warn!("No data records found in HEX file");
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLINK_HEX: &str = ":020000040000FA
:0E0000008316860183120130860086010328D4
:04400E00E43CFF3F50
:00000001FF
";

    #[test]
    fn test_parse_blink_image() {
        let image = parse_intel_hex(BLINK_HEX).unwrap();
        assert_eq!(image.segments.len(), 2);
        assert_eq!(image.word_at(0), Some(0x1683));
        assert_eq!(image.word_at(1), Some(0x0186));
        assert_eq!(image.word_at(6), Some(0x2803));
        assert_eq!(image.word_at(0x2007), Some(0x3CE4));
        assert_eq!(image.word_at(0x2008), Some(0x3FFF));
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let text = format!("; generated\n\n{}", BLINK_HEX);
        let image = parse_intel_hex(&text).unwrap();
        assert_eq!(image.byte_len(), 18);
    }

    #[test]
    fn test_records_after_eof_ignored() {
        let text = ":00000001FF\n:0400000001020304F2\n";
        let image = parse_intel_hex(text).unwrap();
        assert!(image.is_empty());
    }

    #[test]
    fn test_extended_segment_address() {
        // Segment 0x1000 -> base 0x10000
        let text = ":020000021000EC\n:0100000042BD\n:00000001FF\n";
        let image = parse_intel_hex(text).unwrap();
        assert_eq!(image.byte_at(0x10000), Some(0x42));
    }

    #[test]
    fn test_bad_checksum() {
        let err = parse_intel_hex(":0100000042BE\n").unwrap_err();
        assert_eq!(
            err,
            HexError::Checksum {
                line: 1,
                expected: 0xBD,
                found: 0xBE
            }
        );
    }

    #[test]
    fn test_malformed_records() {
        assert_eq!(
            parse_intel_hex(":01000000\n").unwrap_err(),
            HexError::Truncated { line: 1 }
        );
        assert_eq!(
            parse_intel_hex(":0200000042BC\n").unwrap_err(),
            HexError::LengthMismatch { line: 1, count: 2 }
        );
        assert_eq!(
            parse_intel_hex(":01000000ZZBD\n").unwrap_err(),
            HexError::InvalidDigits { line: 1 }
        );
    }

    #[test]
    fn test_data_past_address_space_rejected() {
        // Linear base 0xFFFF0000, two bytes at 0xFFFF
        let text = ":02000004FFFFFC\n:02FFFF00AABB9B\n:00000001FF\n";
        assert_eq!(
            parse_intel_hex(text).unwrap_err(),
            HexError::AddressOverflow { line: 2 }
        );

        // Last byte at 0xFFFFFFFE still fits
        let text = ":02000004FFFFFC\n:01FFFE0042C0\n:00000001FF\n";
        let image = parse_intel_hex(text).unwrap();
        assert_eq!(image.byte_at(0xFFFF_FFFE), Some(0x42));
    }
}
