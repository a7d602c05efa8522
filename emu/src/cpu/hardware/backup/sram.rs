use serde::{Deserialize, Serialize};
use serde_with::{Bytes, serde_as};

pub const SRAM_BYTES: usize = 0x8000;

/// Battery-backed static RAM, 8 bits wide, mirrored every 32 KiB.
#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct Sram {
    #[serde_as(as = "Bytes")]
    data: Vec<u8>,
}

impl Default for Sram {
    fn default() -> Self {
        Self {
            data: vec![0xFF; SRAM_BYTES],
        }
    }
}

impl Sram {
    #[must_use]
    pub fn read(&self, address: u32) -> u8 {
        self.data[address as usize & (SRAM_BYTES - 1)]
    }

    /// Returns true when the stored byte changed.
    pub fn write(&mut self, address: u32, value: u8) -> bool {
        let cell = &mut self.data[address as usize & (SRAM_BYTES - 1)];
        let changed = *cell != value;
        *cell = value;
        changed
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn import(&mut self, image: &[u8]) {
        let copied = image.len().min(SRAM_BYTES);
        self.data[..copied].copy_from_slice(&image[..copied]);
        self.data[copied..].fill(0xFF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_mirror() {
        let mut sram = Sram::default();
        assert!(sram.write(0x0E00_0010, 0x5A));
        assert!(!sram.write(0x0E00_0010, 0x5A));
        assert_eq!(sram.read(0x0E00_8010), 0x5A);
    }
}
