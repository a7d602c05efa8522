//! Cartridge backup memory.
//!
//! The ROM does not say which chip it talks to, so the kind is picked from
//! the first access that gives it away:
//!
//! - a write at 0x0E00_5555 (the first byte of a flash command) selects Flash;
//! - any other write in 0x0E/0x0F selects SRAM;
//! - a write in the 0x0D window selects EEPROM.
//!
//! [`CoreOptions`](crate::options::CoreOptions) can force a kind, or let the
//! ROM scan preset one from the save library signature.

pub mod eeprom;
pub mod flash;
pub mod sram;

use serde::{Deserialize, Serialize};

use crate::error::BatteryError;
use crate::options::{FlashSize, SaveType};

use self::eeprom::{EEPROM_8K_BYTES, EEPROM_512_BYTES, Eeprom};
use self::flash::Flash;
use self::sram::{SRAM_BYTES, Sram};

/// Detected backup chip, as reported to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    Sram,
    Flash64K,
    Flash128K,
    Eeprom512,
    Eeprom8K,
}

impl BackupKind {
    /// Size of the battery file.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Sram => SRAM_BYTES,
            Self::Flash64K => FlashSize::Flash64K.bytes(),
            Self::Flash128K => FlashSize::Flash128K.bytes(),
            Self::Eeprom512 => EEPROM_512_BYTES,
            Self::Eeprom8K => EEPROM_8K_BYTES,
        }
    }

    const fn from_image_size(size: usize) -> Option<Self> {
        match size {
            EEPROM_512_BYTES => Some(Self::Eeprom512),
            EEPROM_8K_BYTES => Some(Self::Eeprom8K),
            SRAM_BYTES => Some(Self::Sram),
            0x1_0000 => Some(Self::Flash64K),
            0x2_0000 => Some(Self::Flash128K),
            _ => None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
enum Backup {
    Undetected {
        flash_size: FlashSize,
        allow_eeprom: bool,
    },
    Disabled,
    Sram(Sram),
    Flash(Flash),
    Eeprom(Eeprom),
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackupMemory {
    backup: Backup,
    dirty: bool,
}

impl Default for BackupMemory {
    fn default() -> Self {
        Self::new(SaveType::Auto, FlashSize::Flash64K)
    }
}

impl BackupMemory {
    #[must_use]
    pub fn new(save_type: SaveType, flash_size: FlashSize) -> Self {
        let backup = match save_type {
            SaveType::Auto => Backup::Undetected {
                flash_size,
                allow_eeprom: true,
            },
            SaveType::None => Backup::Disabled,
            SaveType::Sram => Backup::Sram(Sram::default()),
            SaveType::Flash => Backup::Flash(Flash::new(flash_size)),
            SaveType::Eeprom => Backup::Eeprom(Eeprom::default()),
        };

        Self {
            backup,
            dirty: false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> Option<BackupKind> {
        match &self.backup {
            Backup::Undetected { .. } | Backup::Disabled => None,
            Backup::Sram(_) => Some(BackupKind::Sram),
            Backup::Flash(flash) => Some(match flash.size() {
                FlashSize::Flash64K => BackupKind::Flash64K,
                FlashSize::Flash128K => BackupKind::Flash128K,
            }),
            Backup::Eeprom(eeprom) => Some(if eeprom.size() == EEPROM_8K_BYTES {
                BackupKind::Eeprom8K
            } else {
                BackupKind::Eeprom512
            }),
        }
    }

    /// True when the 0x0D window belongs to the EEPROM.
    #[must_use]
    pub const fn eeprom_window(&self) -> bool {
        matches!(
            self.backup,
            Backup::Eeprom(_)
                | Backup::Undetected {
                    allow_eeprom: true,
                    ..
                }
        )
    }

    /// Puts the command state machines back to idle, keeping the contents.
    pub fn reset_state(&mut self) {
        match &mut self.backup {
            Backup::Flash(flash) => flash.reset_state(),
            Backup::Eeprom(eeprom) => eeprom.reset_state(),
            _ => {}
        }
    }

    /// Byte read in 0x0E/0x0F.
    pub fn read(&mut self, address: u32) -> u8 {
        match &mut self.backup {
            Backup::Sram(sram) => sram.read(address),
            Backup::Flash(flash) => flash.read(address),
            _ => 0xFF,
        }
    }

    /// Byte write in 0x0E/0x0F.
    pub fn write(&mut self, address: u32, value: u8) {
        if let Backup::Undetected { flash_size, .. } = self.backup {
            if address == 0x0E00_5555 {
                tracing::info!("flash backup memory detected");
                self.backup = Backup::Flash(Flash::new(flash_size));
            } else {
                tracing::info!("SRAM backup memory detected");
                self.backup = Backup::Sram(Sram::default());
            }
        }

        let changed = match &mut self.backup {
            Backup::Sram(sram) => sram.write(address, value),
            Backup::Flash(flash) => flash.write(address, value),
            _ => false,
        };
        self.dirty |= changed;
    }

    /// Bit read in the EEPROM window. Ready (1) until an EEPROM is detected.
    pub fn read_eeprom(&mut self) -> u16 {
        match &mut self.backup {
            Backup::Eeprom(eeprom) => eeprom.read(),
            _ => 1,
        }
    }

    /// Bit write in the EEPROM window.
    pub fn write_eeprom(&mut self, value: u16, dma_count: u32) {
        if matches!(
            self.backup,
            Backup::Undetected {
                allow_eeprom: true,
                ..
            }
        ) {
            tracing::info!("EEPROM backup memory detected");
            self.backup = Backup::Eeprom(Eeprom::default());
        }

        if let Backup::Eeprom(eeprom) = &mut self.backup {
            self.dirty |= eeprom.write(value, dma_count);
        }
    }

    /// Presets the kind from the save library signature found in the ROM.
    pub fn detect_from_rom(&mut self, rom: &[u8]) {
        if !matches!(self.backup, Backup::Undetected { .. }) {
            return;
        }

        match scan_signatures(rom) {
            Some(RomSignature::Eeprom) => self.backup = Backup::Eeprom(Eeprom::default()),
            Some(RomSignature::Sram) => self.backup = Backup::Sram(Sram::default()),
            Some(RomSignature::Flash(size)) => self.backup = Backup::Flash(Flash::new(size)),
            None => {
                // No signature: the cartridge has no EEPROM in 0x0D.
                if let Backup::Undetected { allow_eeprom, .. } = &mut self.backup {
                    *allow_eeprom = false;
                }
                return;
            }
        }
        tracing::info!("backup memory from ROM signature: {:?}", self.kind());
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub const fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Battery contents, sized for the detected kind.
    #[must_use]
    pub fn contents(&self) -> Option<&[u8]> {
        match &self.backup {
            Backup::Sram(sram) => Some(sram.contents()),
            Backup::Flash(flash) => Some(flash.contents()),
            Backup::Eeprom(eeprom) => Some(eeprom.contents()),
            Backup::Undetected { .. } | Backup::Disabled => None,
        }
    }

    /// Loads a battery file. Before detection the kind is inferred from the
    /// file size; afterwards the image is truncated or padded with 0xFF.
    pub fn import(&mut self, image: &[u8]) -> Result<(), BatteryError> {
        match &mut self.backup {
            Backup::Disabled => return Err(BatteryError::NoBackupMemory),
            Backup::Undetected { .. } => {
                let kind = BackupKind::from_image_size(image.len())
                    .ok_or(BatteryError::UnrecognizedSize(image.len()))?;
                self.backup = match kind {
                    BackupKind::Sram => Backup::Sram(Sram::default()),
                    BackupKind::Flash64K => Backup::Flash(Flash::new(FlashSize::Flash64K)),
                    BackupKind::Flash128K => Backup::Flash(Flash::new(FlashSize::Flash128K)),
                    BackupKind::Eeprom512 => Backup::Eeprom(Eeprom::new(EEPROM_512_BYTES)),
                    BackupKind::Eeprom8K => Backup::Eeprom(Eeprom::new(EEPROM_8K_BYTES)),
                };
                tracing::info!("backup memory from battery file: {kind:?}");
            }
            _ => {}
        }

        if let Some(expected) = self.kind().map(BackupKind::bytes) {
            if expected != image.len() {
                tracing::warn!(
                    "battery file is {} bytes, backup memory is {expected} bytes",
                    image.len()
                );
            }
        }

        match &mut self.backup {
            Backup::Sram(sram) => sram.import(image),
            Backup::Flash(flash) => flash.import(image),
            Backup::Eeprom(eeprom) => eeprom.import(image),
            Backup::Undetected { .. } | Backup::Disabled => {}
        }
        self.dirty = false;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RomSignature {
    Eeprom,
    Sram,
    Flash(FlashSize),
}

/// Looks for the save library version strings, aligned on 4 bytes.
fn scan_signatures(rom: &[u8]) -> Option<RomSignature> {
    const SIGNATURES: [(&[u8], RomSignature); 6] = [
        (b"EEPROM_V", RomSignature::Eeprom),
        (b"SRAM_V", RomSignature::Sram),
        (b"SRAM_F_V", RomSignature::Sram),
        (b"FLASH1M_V", RomSignature::Flash(FlashSize::Flash128K)),
        (b"FLASH512_V", RomSignature::Flash(FlashSize::Flash64K)),
        (b"FLASH_V", RomSignature::Flash(FlashSize::Flash64K)),
    ];

    (0..rom.len()).step_by(4).find_map(|offset| {
        let window = &rom[offset..];
        SIGNATURES
            .iter()
            .find(|(signature, _)| window.starts_with(signature))
            .map(|&(_, kind)| kind)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_flash_detection() {
        let mut backup = BackupMemory::default();
        assert_eq!(backup.kind(), None);
        assert_eq!(backup.read(0x0E00_0000), 0xFF);

        backup.write(0x0E00_5555, 0xAA);
        backup.write(0x0E00_2AAA, 0x55);
        backup.write(0x0E00_5555, 0x90);

        assert_eq!(backup.kind(), Some(BackupKind::Flash64K));
        assert_eq!(backup.read(0x0E00_0000), 0x32);
        assert_eq!(backup.read(0x0E00_0001), 0x1B);
        assert!(!backup.is_dirty());
    }

    #[test]
    fn check_sram_detection() {
        let mut backup = BackupMemory::default();
        backup.write(0x0E00_0004, 0x12);

        assert_eq!(backup.kind(), Some(BackupKind::Sram));
        assert_eq!(backup.read(0x0E00_0004), 0x12);
        assert!(backup.is_dirty());
        assert_eq!(backup.contents().map(<[u8]>::len), Some(0x8000));
    }

    #[test]
    fn check_eeprom_detection() {
        let mut backup = BackupMemory::default();
        assert!(backup.eeprom_window());
        assert_eq!(backup.read_eeprom(), 1);

        backup.write_eeprom(1, 9);
        assert_eq!(backup.kind(), Some(BackupKind::Eeprom512));

        let mut backup = BackupMemory::new(SaveType::Sram, FlashSize::Flash64K);
        assert!(!backup.eeprom_window());
        backup.write_eeprom(1, 9);
        assert_eq!(backup.kind(), Some(BackupKind::Sram));
    }

    #[test]
    fn check_rom_signature() {
        let mut rom = vec![0; 0x100];
        rom[0x40..0x49].copy_from_slice(b"FLASH1M_V");
        let mut backup = BackupMemory::default();
        backup.detect_from_rom(&rom);
        assert_eq!(backup.kind(), Some(BackupKind::Flash128K));

        let mut backup = BackupMemory::default();
        backup.detect_from_rom(&[0; 0x100]);
        assert_eq!(backup.kind(), None);
        assert!(!backup.eeprom_window());
    }

    #[test]
    fn check_import() {
        let mut backup = BackupMemory::default();
        backup.import(&[0x11; 0x2000]).unwrap();
        assert_eq!(backup.kind(), Some(BackupKind::Eeprom8K));

        let mut backup = BackupMemory::default();
        assert!(matches!(
            backup.import(&[0; 100]),
            Err(BatteryError::UnrecognizedSize(100))
        ));

        let mut backup = BackupMemory::new(SaveType::None, FlashSize::Flash64K);
        assert!(matches!(
            backup.import(&[0; 0x8000]),
            Err(BatteryError::NoBackupMemory)
        ));

        let mut backup = BackupMemory::new(SaveType::Sram, FlashSize::Flash64K);
        backup.import(&[0x22; 0x10]).unwrap();
        assert_eq!(backup.read(0x0E00_000F), 0x22);
        assert_eq!(backup.read(0x0E00_0010), 0xFF);
    }
}
