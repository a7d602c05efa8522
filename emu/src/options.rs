//! Core configuration, fixed at construction and applied on [`crate::gba::Gba::reset`].

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveType {
    /// Detected from the first backup access.
    #[default]
    Auto,
    None,
    Sram,
    Flash,
    Eeprom,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashSize {
    #[default]
    Flash64K,
    Flash128K,
}

impl FlashSize {
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Flash64K => 0x1_0000,
            Self::Flash128K => 0x2_0000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreOptions {
    /// Start at the cartridge entry even when a BIOS image is loaded.
    pub skip_bios: bool,
    /// The image is a multiboot program: loaded in work RAM, entry at 0x0200_0000.
    pub multiboot: bool,
    pub save_type: SaveType,
    pub flash_size: FlashSize,
    /// Look for the save library signatures in the ROM to preset the backup kind.
    pub detect_save_from_rom: bool,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            skip_bios: false,
            multiboot: false,
            save_type: SaveType::Auto,
            flash_size: FlashSize::Flash64K,
            detect_save_from_rom: true,
        }
    }
}
