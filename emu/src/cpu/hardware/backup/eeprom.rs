//! Serial EEPROM (512 bytes or 8 KiB), driven one bit per halfword by DMA.
//!
//! A request is a stream of bits written to the 0x0D region:
//!
//! ```text
//!  read:  1 1 <address: 6 or 14 bits> 0          then 68 bits read back:
//!                                                 4 junk bits + 64 data bits
//!  write: 1 0 <address: 6 or 14 bits> <64 data bits> 0
//! ```
//!
//! The address width is not known in advance: a DMA of 17 or 81 halfwords
//! (the requests of an 8 KiB part) selects the wide addressing, anything else
//! the narrow one.

use serde::{Deserialize, Serialize};
use serde_with::{Bytes, serde_as};

pub const EEPROM_512_BYTES: usize = 0x200;
pub const EEPROM_8K_BYTES: usize = 0x2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum EepromState {
    Idle,
    ReadAddress,
    /// Junk bits before the data.
    ReadData,
    ReadData2,
    WriteData,
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct Eeprom {
    #[serde_as(as = "Bytes")]
    data: Vec<u8>,
    size: usize,
    state: EepromState,
    #[serde_as(as = "Bytes")]
    buffer: [u8; 16],
    bits: usize,
    byte: usize,
    address: usize,
}

impl Default for Eeprom {
    fn default() -> Self {
        Self::new(EEPROM_512_BYTES)
    }
}

impl Eeprom {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; EEPROM_8K_BYTES],
            size,
            state: EepromState::Idle,
            buffer: [0; 16],
            bits: 0,
            byte: 0,
            address: 0,
        }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    pub fn reset_state(&mut self) {
        self.state = EepromState::Idle;
        self.bits = 0;
        self.byte = 0;
    }

    /// Reads the next bit. Outside a read request the chip reports ready (1).
    pub fn read(&mut self) -> u16 {
        match self.state {
            EepromState::Idle | EepromState::ReadAddress | EepromState::WriteData => 1,
            EepromState::ReadData => {
                self.bits += 1;
                if self.bits == 4 {
                    self.state = EepromState::ReadData2;
                    self.bits = 0;
                    self.byte = 0;
                }
                0
            }
            EepromState::ReadData2 => {
                let offset = (self.address << 3) + (self.byte >> 3);
                let data = self.data[offset & (self.size - 1)];
                let bit = (data >> (7 - (self.bits & 7))) & 1;

                self.bits += 1;
                self.byte += 1;
                if self.bits == 0x40 {
                    self.state = EepromState::Idle;
                }
                u16::from(bit)
            }
        }
    }

    /// Writes one bit. `dma_count` is the length of the DMA carrying it.
    /// Returns true when a block was stored.
    pub fn write(&mut self, value: u16, dma_count: u32) -> bool {
        let bit = (value & 1) as u8;

        match self.state {
            EepromState::Idle => {
                self.byte = 0;
                self.bits = 1;
                self.buffer[0] = bit;
                self.state = EepromState::ReadAddress;
            }
            EepromState::ReadAddress => {
                self.push_bit(bit);

                if dma_count == 0x11 || dma_count == 0x51 {
                    if self.bits != 0x11 {
                        return false;
                    }
                    self.size = EEPROM_8K_BYTES;
                    self.address =
                        ((usize::from(self.buffer[0]) & 0x3F) << 8) | usize::from(self.buffer[1]);
                } else {
                    if self.bits != 9 {
                        return false;
                    }
                    self.address = usize::from(self.buffer[0]) & 0x3F;
                }

                if self.buffer[0] & 0x40 == 0 {
                    self.buffer[0] = bit;
                    self.bits = 1;
                    self.byte = 0;
                    self.state = EepromState::WriteData;
                } else {
                    self.bits = 0;
                    self.byte = 0;
                    self.state = EepromState::ReadData;
                }
            }
            EepromState::ReadData | EepromState::ReadData2 => {
                self.state = EepromState::Idle;
            }
            EepromState::WriteData => {
                self.push_bit(bit);
                if self.bits == 0x40 {
                    let start = (self.address << 3) & (self.size - 1);
                    self.data[start..start + 8].copy_from_slice(&self.buffer[..8]);
                    return true;
                }
                if self.bits == 0x41 {
                    self.state = EepromState::Idle;
                    self.bits = 0;
                    self.byte = 0;
                }
            }
        }

        false
    }

    fn push_bit(&mut self, bit: u8) {
        let index = self.byte;
        self.buffer[index] = (self.buffer[index] << 1) | bit;
        self.bits += 1;
        if self.bits & 7 == 0 {
            self.byte += 1;
        }
        if self.byte >= self.buffer.len() {
            self.byte = 0;
        }
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Loads a battery image. An 8 KiB image selects the wide addressing.
    pub fn import(&mut self, image: &[u8]) {
        if image.len() > EEPROM_512_BYTES {
            self.size = EEPROM_8K_BYTES;
        }
        let copied = image.len().min(self.size);
        self.data[..copied].copy_from_slice(&image[..copied]);
        self.data[copied..].fill(0xFF);
    }
}
