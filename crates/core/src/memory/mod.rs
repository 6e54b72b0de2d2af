use serde::{Deserialize, Serialize};

/// Value of an unprogrammed program memory byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Contiguous bytes at a HEX byte address. Program word `n` occupies byte
/// addresses `2n` (low) and `2n + 1` (high).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub start_addr: u32,
    pub data: Vec<u8>,
}

impl Segment {
    /// One past the last byte, clamped at the top of the 32-bit space.
    pub fn end_addr(&self) -> u32 {
        self.start_addr.saturating_add(self.data.len() as u32)
    }

    fn byte_at(&self, addr: u32) -> Option<u8> {
        let offset = addr.checked_sub(self.start_addr)? as usize;
        self.data.get(offset).copied()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramImage {
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes, merging with the previous segment when contiguous.
    pub fn add_segment(&mut self, start_addr: u32, data: Vec<u8>) {
        if let Some(last) = self.segments.last_mut() {
            if last.end_addr() == start_addr {
                last.data.extend_from_slice(&data);
                return;
            }
        }
        self.segments.push(Segment { start_addr, data });
    }

    /// Later segments win on overlap, as in the file order of a HEX image.
    pub fn byte_at(&self, addr: u32) -> Option<u8> {
        self.segments.iter().rev().find_map(|s| s.byte_at(addr))
    }

    /// Little-endian program word; missing bytes read as erased.
    pub fn word_at(&self, word_addr: u32) -> Option<u16> {
        let base = word_addr.checked_mul(2)?;
        let lo = self.byte_at(base);
        let hi = base.checked_add(1).and_then(|addr| self.byte_at(addr));
        if lo.is_none() && hi.is_none() {
            return None;
        }
        let lo = lo.unwrap_or(ERASED_BYTE) as u16;
        let hi = hi.unwrap_or(ERASED_BYTE) as u16;
        Some(lo | (hi << 8))
    }

    pub fn byte_len(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }
}

/// A simple flat memory storage
#[derive(Debug)]
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u16,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u16) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    fn index(&self, addr: u16) -> Option<usize> {
        let offset = addr.checked_sub(self.base_addr)? as usize;
        (offset < self.data.len()).then_some(offset)
    }

    pub fn read_u8(&self, addr: u16) -> Option<u8> {
        self.index(addr).map(|i| self.data[i])
    }

    pub fn write_u8(&mut self, addr: u16, value: u8) -> bool {
        match self.index(addr) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_segments_merge() {
        let mut image = ProgramImage::new();
        image.add_segment(0, vec![0x01, 0x30]);
        image.add_segment(2, vec![0x86, 0x00]);
        image.add_segment(0x400E, vec![0xE4, 0x3C]);
        assert_eq!(image.segments.len(), 2);
        assert_eq!(image.word_at(0), Some(0x3001));
        assert_eq!(image.word_at(1), Some(0x0086));
        assert_eq!(image.word_at(0x2007), Some(0x3CE4));
        assert_eq!(image.word_at(5), None);
        assert_eq!(image.byte_len(), 6);
    }

    #[test]
    fn test_half_word_reads_erased_high_byte() {
        let mut image = ProgramImage::new();
        image.add_segment(4, vec![0x12]);
        assert_eq!(image.word_at(2), Some(0xFF12));
    }

    #[test]
    fn test_linear_memory_bounds() {
        let mut mem = LinearMemory::new(0x10, 0x20);
        assert!(mem.write_u8(0x2F, 7));
        assert_eq!(mem.read_u8(0x2F), Some(7));
        assert!(!mem.write_u8(0x30, 1));
        assert_eq!(mem.read_u8(0x1F), None);
    }

    #[test]
    fn test_segment_at_top_of_address_space() {
        let mut image = ProgramImage::new();
        image.add_segment(0xFFFF_FFFE, vec![0xAA, 0xBB]);
        assert_eq!(image.segments[0].end_addr(), u32::MAX);
        assert_eq!(image.byte_at(0xFFFF_FFFE), Some(0xAA));
        assert_eq!(image.word_at(0x7FFF_FFFF), Some(0xBBAA));
        assert_eq!(image.word_at(0x8000_0000), None);
    }
}
