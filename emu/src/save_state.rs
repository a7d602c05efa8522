//! Save state layout.
//!
//! ```text
//!  ┌──────────────────────────────┬───────────────────────────────────────┐
//!  │ StateHeader                  │ Arm7tdmi (registers, bus, RAM, I/O,   │
//!  │ magic, version, title, BIOS  │ peripherals, backup memory)           │
//!  └──────────────────────────────┴───────────────────────────────────────┘
//! ```
//!
//! Both parts are `bincode` with the standard configuration. The ROM and BIOS
//! images are not stored: a state can only be loaded into a system built
//! from the same game, with or without a BIOS as it was taken.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SaveStateError;

pub const MAGIC: [u8; 4] = *b"CLMT";
/// Bumped whenever the serialized layout changes. Older states are refused.
pub const VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub rom_title: [u8; 16],
    pub uses_bios: bool,
}

impl StateHeader {
    #[must_use]
    pub const fn new(rom_title: [u8; 16], uses_bios: bool) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            rom_title,
            uses_bios,
        }
    }

    /// Checks that a state with this header can be loaded into a system
    /// running `rom_title`, with or without a BIOS.
    pub fn validate(&self, rom_title: &[u8; 16], uses_bios: bool) -> Result<(), SaveStateError> {
        if self.magic != MAGIC {
            return Err(SaveStateError::BadMagic);
        }
        if self.version != VERSION {
            return Err(SaveStateError::UnsupportedVersion {
                found: self.version,
                expected: VERSION,
            });
        }
        if &self.rom_title != rom_title {
            return Err(SaveStateError::RomMismatch(
                String::from_utf8_lossy(&self.rom_title)
                    .trim_end_matches('\0')
                    .to_string(),
            ));
        }
        if self.uses_bios != uses_bios {
            return Err(SaveStateError::BiosMismatch(self.uses_bios));
        }
        Ok(())
    }
}

/// Encodes `header` then `body`.
pub fn encode<T: Serialize>(header: &StateHeader, body: &T) -> Result<Vec<u8>, SaveStateError> {
    let config = bincode::config::standard();
    let mut bytes = bincode::serde::encode_to_vec(header, config)?;
    bytes.extend(bincode::serde::encode_to_vec(body, config)?);
    Ok(bytes)
}

/// Splits a state into its header and the bytes of the body.
pub fn decode_header(bytes: &[u8]) -> Result<(StateHeader, &[u8]), SaveStateError> {
    let (header, len): (StateHeader, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok((header, &bytes[len..]))
}

pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SaveStateError> {
    let (body, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TITLE: [u8; 16] = *b"ADVANCE WARSAWRE";

    #[test]
    fn check_header_round_trip() {
        let header = StateHeader::new(TITLE, false);
        let bytes = encode(&header, &(1_u32, vec![2_u8, 3])).unwrap();

        let (decoded, body) = decode_header(&bytes).unwrap();
        assert_eq!(decoded, header);
        let body: (u32, Vec<u8>) = decode_body(body).unwrap();
        assert_eq!(body, (1, vec![2, 3]));
    }

    #[test]
    fn check_validate() {
        let header = StateHeader::new(TITLE, true);
        assert!(header.validate(&TITLE, true).is_ok());

        assert!(matches!(
            header.validate(&[0; 16], true),
            Err(SaveStateError::RomMismatch(title)) if title == "ADVANCE WARSAWRE"
        ));
        assert!(matches!(
            header.validate(&TITLE, false),
            Err(SaveStateError::BiosMismatch(true))
        ));

        let old = StateHeader {
            version: 0,
            ..header.clone()
        };
        assert!(matches!(
            old.validate(&TITLE, true),
            Err(SaveStateError::UnsupportedVersion { found: 0, expected: 1 })
        ));

        let garbage = StateHeader {
            magic: *b"GBA!",
            ..header
        };
        assert!(matches!(garbage.validate(&TITLE, true), Err(SaveStateError::BadMagic)));
    }

    #[test]
    fn check_truncated_state() {
        assert!(matches!(decode_header(&[0x43]), Err(SaveStateError::Decode(_))));
    }
}
