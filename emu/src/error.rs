//! Errors reported to the host. Emulated hardware itself never fails.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RomError {
    #[error("the ROM image is empty")]
    Empty,

    #[error("the ROM image is {0} bytes, the cartridge bus addresses at most 32 MiB")]
    TooLarge(usize),

    #[error("a multiboot image must fit in 256 KiB of work RAM, got {0} bytes")]
    MultibootTooLarge(usize),

    #[error("the BIOS image must be 16 KiB, got {0} bytes")]
    BadBiosSize(usize),

    #[error("cannot read content: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SaveStateError {
    #[error("not a save state")]
    BadMagic,

    #[error("save state version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("save state belongs to another game ({0:?})")]
    RomMismatch(String),

    #[error("save state was taken {}", if *.0 { "with a BIOS image" } else { "without a BIOS image" })]
    BiosMismatch(bool),

    #[error("cannot encode save state: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("cannot decode save state: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("save state I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BatteryError {
    #[error("no backup memory has been detected yet")]
    NoBackupMemory,

    #[error("a {0} bytes battery file does not match any backup memory")]
    UnrecognizedSize(usize),

    #[error("battery file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
