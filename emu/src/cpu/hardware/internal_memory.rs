use serde::{Deserialize, Serialize};
use serde_with::{Bytes, serde_as};

use crate::bitwise::Bits;

pub const BIOS_SIZE: usize = 0x4000;
pub const WORKING_RAM_SIZE: usize = 0x4_0000;
pub const WORKING_IRAM_SIZE: usize = 0x8000;
pub const PALETTE_RAM_SIZE: usize = 0x400;
pub const VIDEO_RAM_SIZE: usize = 0x1_8000;
pub const OAM_SIZE: usize = 0x400;
/// The cartridge bus addresses 32 MiB.
pub const MAX_ROM_SIZE: usize = 0x0200_0000;

/// Backing buffers of the address space.
///
/// ROM and BIOS images are not part of a save state: they are provided again
/// by the host when the system is created.
#[serde_as]
#[derive(Serialize, Deserialize)]
pub struct InternalMemory {
    /// From 0x00000000 to 0x00003FFF (16 `KBytes`).
    #[serde(skip, default = "empty_bios")]
    pub bios_system_rom: Vec<u8>,

    /// From 0x02000000 to 0x0203FFFF (256 `KBytes`), mirrored up to 0x02FFFFFF.
    #[serde_as(as = "Bytes")]
    pub working_ram: Vec<u8>,

    /// From 0x03000000 to 0x03007FFF (32 `KBytes`), mirrored up to 0x03FFFFFF.
    #[serde_as(as = "Bytes")]
    pub working_iram: Vec<u8>,

    /// From 0x05000000 to 0x050003FF.
    #[serde_as(as = "Bytes")]
    pub palette_ram: Vec<u8>,

    /// From 0x06000000 to 0x06017FFF, mirrored every 128 `KBytes`.
    #[serde_as(as = "Bytes")]
    pub video_ram: Vec<u8>,

    /// From 0x07000000 to 0x070003FF.
    #[serde_as(as = "Bytes")]
    pub object_attributes: Vec<u8>,

    /// Game Pak ROM, visible at 0x08000000, 0x0A000000 and 0x0C000000.
    #[serde(skip)]
    pub rom: Vec<u8>,
}

fn empty_bios() -> Vec<u8> {
    vec![0; BIOS_SIZE]
}

impl Default for InternalMemory {
    fn default() -> Self {
        Self::new(empty_bios(), vec![])
    }
}

impl InternalMemory {
    #[must_use]
    pub fn new(bios: Vec<u8>, rom: Vec<u8>) -> Self {
        let mut bios_system_rom = bios;
        bios_system_rom.resize(BIOS_SIZE, 0);

        Self {
            bios_system_rom,
            working_ram: vec![0; WORKING_RAM_SIZE],
            working_iram: vec![0; WORKING_IRAM_SIZE],
            palette_ram: vec![0; PALETTE_RAM_SIZE],
            video_ram: vec![0; VIDEO_RAM_SIZE],
            object_attributes: vec![0; OAM_SIZE],
            rom,
        }
    }

    /// Zeroes every RAM. Work RAM is kept when it holds a multiboot image.
    pub fn clear_ram(&mut self, keep_working_ram: bool) {
        if !keep_working_ram {
            self.working_ram.fill(0);
        }
        self.working_iram.fill(0);
        self.palette_ram.fill(0);
        self.video_ram.fill(0);
        self.object_attributes.fill(0);
    }

    /// Byte of the Game Pak at `offset` (relative to the start of the ROM).
    #[must_use]
    pub fn read_rom(&self, offset: u32) -> u8 {
        let offset = offset as usize & (MAX_ROM_SIZE - 1);
        if offset < self.rom.len() {
            self.rom[offset]
        } else {
            // Past the end of the image nothing drives the AD0-15 lines, which
            // still hold the low 16 bits of the halfword address just sent.
            (((offset >> 1) & 0xFFFF) as u16).get_byte((offset & 0b1) as u8)
        }
    }

    /// Index into [`InternalMemory::working_ram`].
    #[must_use]
    pub const fn working_ram_offset(address: u32) -> usize {
        address as usize & (WORKING_RAM_SIZE - 1)
    }

    /// Index into [`InternalMemory::working_iram`].
    #[must_use]
    pub const fn working_iram_offset(address: u32) -> usize {
        address as usize & (WORKING_IRAM_SIZE - 1)
    }

    /// Index into [`InternalMemory::video_ram`]. The upper 32 `KBytes` of each
    /// 128 `KBytes` block mirror the OBJ tiles at 0x10000.
    #[must_use]
    pub const fn video_ram_offset(address: u32) -> usize {
        let offset = address as usize & 0x1_FFFF;
        if offset >= VIDEO_RAM_SIZE {
            offset - 0x8000
        } else {
            offset
        }
    }

    /// Copies the image at the start of work RAM, where multiboot programs run.
    pub fn load_multiboot_image(&mut self) {
        let len = self.rom.len().min(WORKING_RAM_SIZE);
        self.working_ram[..len].copy_from_slice(&self.rom[..len]);
    }

    /// Writes a little-endian word into the BIOS buffer.
    pub fn patch_bios_word(&mut self, address: u32, value: u32) {
        let start = address as usize & (BIOS_SIZE - 1) & !3;
        self.bios_system_rom[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[must_use]
    pub fn bios_word(&self, address: u32) -> u32 {
        let start = address as usize & (BIOS_SIZE - 1) & !3;
        u32::from_le_bytes([
            self.bios_system_rom[start],
            self.bios_system_rom[start + 1],
            self.bios_system_rom[start + 2],
            self.bios_system_rom[start + 3],
        ])
    }
}
