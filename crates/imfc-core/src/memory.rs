//! Z80 address space: firmware ROM in the low half, RAM mirrored above it.
//!
//! ```text
//! 0x0000..=0x7FFF  ROM  (read-only, loaded once)
//! 0x8000..=0xFFFF  RAM  (16 KiB, addressed with `addr & 0x3FFF`)
//! ```

use crate::error::{ImfcError, Result};
use log::trace;
use std::path::Path;

/// Size of the firmware ROM.
pub const ROM_SIZE: usize = 0x8000;

/// Size of the working RAM.
pub const RAM_SIZE: usize = 0x4000;

const RAM_MASK: u16 = (RAM_SIZE - 1) as u16;

/// Program store plus working store as seen by the card's Z80.
#[derive(Clone)]
pub struct MemoryImage {
    rom: Vec<u8>,
    ram: Vec<u8>,
}

impl MemoryImage {
    /// Build an image from raw firmware bytes, truncated or zero-padded to [`ROM_SIZE`].
    pub fn from_bytes(firmware: &[u8]) -> Self {
        let mut rom = vec![0u8; ROM_SIZE];
        let len = firmware.len().min(ROM_SIZE);
        rom[..len].copy_from_slice(&firmware[..len]);
        if firmware.len() > ROM_SIZE {
            trace!(
                "firmware image truncated from {} to {ROM_SIZE} bytes",
                firmware.len()
            );
        }
        Self {
            rom,
            ram: vec![0u8; RAM_SIZE],
        }
    }

    /// Read a flat firmware image from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ImfcError::Firmware {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(&data))
    }

    /// CPU memory read.
    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        if (addr as usize) < ROM_SIZE {
            self.rom[addr as usize]
        } else {
            self.ram[(addr & RAM_MASK) as usize]
        }
    }

    /// CPU memory write; writes into ROM are dropped.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u8) {
        if (addr as usize) >= ROM_SIZE {
            self.ram[(addr & RAM_MASK) as usize] = value;
        }
    }

    /// Firmware contents.
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// Working RAM contents.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }
}

impl std::fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImage")
            .field("rom_len", &self.rom.len())
            .field("ram_len", &self.ram.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_image_is_zero_padded() {
        let mem = MemoryImage::from_bytes(&[0xF3, 0x76]);
        assert_eq!(mem.rom().len(), ROM_SIZE);
        assert_eq!(mem.read(0), 0xF3);
        assert_eq!(mem.read(1), 0x76);
        assert_eq!(mem.read(2), 0x00);
        assert_eq!(mem.read(0x7FFF), 0x00);
    }

    #[test]
    fn long_image_is_truncated() {
        let data: Vec<u8> = (0..ROM_SIZE + 16).map(|i| i as u8).collect();
        let mem = MemoryImage::from_bytes(&data);
        assert_eq!(mem.rom(), &data[..ROM_SIZE]);
    }

    #[test]
    fn rom_is_read_only() {
        let mut mem = MemoryImage::from_bytes(&[0xAA]);
        mem.write(0x0000, 0x55);
        assert_eq!(mem.read(0x0000), 0xAA);
    }

    #[test]
    fn ram_mirrors_through_mask() {
        let mut mem = MemoryImage::from_bytes(&[]);
        mem.write(0x8000, 0x11);
        assert_eq!(mem.read(0xC000), 0x11);
        mem.write(0xFFFF, 0x22);
        assert_eq!(mem.read(0xBFFF), 0x22);
        assert_eq!(mem.ram()[0x3FFF], 0x22);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = MemoryImage::load("/nonexistent/imfc.bin").unwrap_err();
        match err {
            ImfcError::Firmware { path, .. } => {
                assert!(path.ends_with("imfc.bin"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
