//! Flash backup memory (Sanyo/Macronix/Panasonic style command set).
//!
//! ```text
//!            5555=AA        2AAA=55        5555=cmd
//!  ReadArray ──────► Cmd1 ──────► Cmd2 ──┬─ 90 ─► Autoselect (IDs readable)
//!                                        ├─ 80 ─► Cmd3 ─AA─► Cmd4 ─55─► Cmd5 ─┬─ 30 ─► sector erase
//!                                        │                                     └─ 10 ─► chip erase
//!                                        ├─ A0 ─► Program (next write stores a byte)
//!                                        ├─ B0 ─► SetBank (128K only, write at 0)
//!                                        └─ F0 ─► ReadArray
//! ```
//!
//! Any other byte sends the chip back to `ReadArray`.

use serde::{Deserialize, Serialize};
use serde_with::{Bytes, serde_as};

use crate::options::FlashSize;

const SECTOR_SIZE: usize = 0x1000;

const COMMAND_ADDRESS_1: u32 = 0x5555;
const COMMAND_ADDRESS_2: u32 = 0x2AAA;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum FlashState {
    ReadArray,
    Cmd1,
    Cmd2,
    Autoselect,
    Cmd3,
    Cmd4,
    Cmd5,
    Program,
    SetBank,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum ReadMode {
    Array,
    Autoselect,
    /// One status read after an erase, then back to array reads.
    EraseComplete,
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct Flash {
    #[serde_as(as = "Bytes")]
    data: Vec<u8>,
    size: FlashSize,
    state: FlashState,
    read_mode: ReadMode,
    bank: usize,
}

impl Flash {
    #[must_use]
    pub fn new(size: FlashSize) -> Self {
        Self {
            data: vec![0xFF; FlashSize::Flash128K.bytes()],
            size,
            state: FlashState::ReadArray,
            read_mode: ReadMode::Array,
            bank: 0,
        }
    }

    #[must_use]
    pub const fn size(&self) -> FlashSize {
        self.size
    }

    pub fn reset_state(&mut self) {
        self.state = FlashState::ReadArray;
        self.read_mode = ReadMode::Array;
        self.bank = 0;
    }

    const fn ids(&self) -> (u8, u8) {
        match self.size {
            FlashSize::Flash64K => (0x32, 0x1B),
            FlashSize::Flash128K => (0x62, 0x13),
        }
    }

    pub fn read(&mut self, address: u32) -> u8 {
        let address = (address & 0xFFFF) as usize;

        match self.read_mode {
            ReadMode::Array => self.data[(self.bank << 16) + address],
            ReadMode::Autoselect => {
                let (manufacturer, device) = self.ids();
                match address & 0xFF {
                    0 => manufacturer,
                    1 => device,
                    _ => 0,
                }
            }
            ReadMode::EraseComplete => {
                self.state = FlashState::ReadArray;
                self.read_mode = ReadMode::Array;
                0xFF
            }
        }
    }

    /// Handles a byte write. Returns true when the contents changed.
    pub fn write(&mut self, address: u32, value: u8) -> bool {
        let address = address & 0xFFFF;
        let mut changed = false;

        let state = self.state;
        self.state = match state {
            FlashState::ReadArray if address == COMMAND_ADDRESS_1 && value == 0xAA => {
                FlashState::Cmd1
            }
            FlashState::Cmd1 if address == COMMAND_ADDRESS_2 && value == 0x55 => FlashState::Cmd2,
            FlashState::Cmd2 if address == COMMAND_ADDRESS_1 => match value {
                0x90 => {
                    self.read_mode = ReadMode::Autoselect;
                    FlashState::Autoselect
                }
                0x80 => FlashState::Cmd3,
                0xA0 => FlashState::Program,
                0xB0 if self.size == FlashSize::Flash128K => FlashState::SetBank,
                _ => self.read_array(),
            },
            FlashState::Cmd3 if address == COMMAND_ADDRESS_1 && value == 0xAA => FlashState::Cmd4,
            FlashState::Cmd4 if address == COMMAND_ADDRESS_2 && value == 0x55 => FlashState::Cmd5,
            FlashState::Cmd5 => match value {
                0x30 => {
                    let start = (self.bank << 16) + (address as usize & 0xF000);
                    self.data[start..start + SECTOR_SIZE].fill(0xFF);
                    self.read_mode = ReadMode::EraseComplete;
                    changed = true;
                    FlashState::ReadArray
                }
                0x10 => {
                    self.data[..self.size.bytes()].fill(0xFF);
                    self.read_mode = ReadMode::EraseComplete;
                    changed = true;
                    FlashState::ReadArray
                }
                _ => self.read_array(),
            },
            FlashState::Autoselect => {
                if address == COMMAND_ADDRESS_1 && value == 0xAA {
                    FlashState::Cmd1
                } else {
                    self.read_array()
                }
            }
            FlashState::Program => {
                self.data[(self.bank << 16) + address as usize] = value;
                changed = true;
                self.read_array()
            }
            FlashState::SetBank => {
                if address == 0 {
                    self.bank = usize::from(value & 1);
                }
                self.read_array()
            }
            _ => self.read_array(),
        };

        changed
    }

    fn read_array(&mut self) -> FlashState {
        self.read_mode = ReadMode::Array;
        FlashState::ReadArray
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.size.bytes()]
    }

    /// Loads a battery image, growing to 128K for a 128K image.
    pub fn import(&mut self, image: &[u8]) {
        if image.len() > FlashSize::Flash64K.bytes() {
            self.size = FlashSize::Flash128K;
        }

        let size = self.size.bytes();
        let copied = image.len().min(size);
        self.data[..copied].copy_from_slice(&image[..copied]);
        self.data[copied..].fill(0xFF);

        if self.size == FlashSize::Flash128K && image.len() == FlashSize::Flash64K.bytes() {
            self.data.copy_within(0..0x1_0000, 0x1_0000);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn command(flash: &mut Flash, cmd: u8) {
        flash.write(0x0E00_5555, 0xAA);
        flash.write(0x0E00_2AAA, 0x55);
        flash.write(0x0E00_5555, cmd);
    }

    #[test]
    fn check_autoselect_ids() {
        let mut flash = Flash::new(FlashSize::Flash64K);
        command(&mut flash, 0x90);

        assert_eq!(flash.read(0x0E00_0000), 0x32);
        assert_eq!(flash.read(0x0E00_0001), 0x1B);
        assert_eq!(flash.read(0x0E00_0002), 0);

        command(&mut flash, 0xF0);
        assert_eq!(flash.read(0x0E00_0000), 0xFF);

        let mut flash = Flash::new(FlashSize::Flash128K);
        command(&mut flash, 0x90);
        assert_eq!(flash.read(0x0E00_0000), 0x62);
        assert_eq!(flash.read(0x0E00_0001), 0x13);
    }

    #[test]
    fn check_program_and_sector_erase() {
        let mut flash = Flash::new(FlashSize::Flash64K);
        command(&mut flash, 0xA0);
        assert!(flash.write(0x0E00_1234, 0x42));
        assert_eq!(flash.read(0x0E00_1234), 0x42);

        // the next plain write is not a program
        assert!(!flash.write(0x0E00_1235, 0x43));
        assert_eq!(flash.read(0x0E00_1235), 0xFF);

        command(&mut flash, 0x80);
        flash.write(0x0E00_5555, 0xAA);
        flash.write(0x0E00_2AAA, 0x55);
        assert!(flash.write(0x0E00_1000, 0x30));

        assert_eq!(flash.read(0x0E00_1234), 0xFF);
        assert_eq!(flash.read(0x0E00_1234), 0xFF);
    }

    #[test]
    fn check_bad_sequence_resets() {
        let mut flash = Flash::new(FlashSize::Flash64K);
        flash.write(0x0E00_5555, 0xAA);
        flash.write(0x0E00_1111, 0x55);
        flash.write(0x0E00_5555, 0x90);
        assert_eq!(flash.read(0x0E00_0000), 0xFF);
    }

    #[test]
    fn check_bank_switch() {
        let mut flash = Flash::new(FlashSize::Flash128K);
        command(&mut flash, 0xB0);
        flash.write(0x0E00_0000, 1);
        command(&mut flash, 0xA0);
        flash.write(0x0E00_0010, 0x99);

        assert_eq!(flash.contents()[0x1_0010], 0x99);
        assert_eq!(flash.read(0x0E00_0010), 0x99);

        command(&mut flash, 0xB0);
        flash.write(0x0E00_0000, 0);
        assert_eq!(flash.read(0x0E00_0010), 0xFF);
    }

    #[test]
    fn check_import_64k_into_128k_mirrors() {
        let mut flash = Flash::new(FlashSize::Flash128K);
        let mut image = vec![0; 0x1_0000];
        image[5] = 7;
        flash.import(&image);

        assert_eq!(flash.contents().len(), 0x2_0000);
        assert_eq!(flash.contents()[0x1_0005], 7);
    }

    #[test]
    fn check_import_128k_grows() {
        let mut flash = Flash::new(FlashSize::Flash64K);
        flash.import(&vec![1; 0x2_0000]);
        assert_eq!(flash.size(), FlashSize::Flash128K);
    }
}
