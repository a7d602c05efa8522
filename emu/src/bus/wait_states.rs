//! Per-region wait states, indexed by the top nibble of the address.
//!
//! WAITCNT (0x0400_0204) reprograms the cartridge regions:
//!
//! ```text
//!  bits  0-1  SRAM wait            {4, 3, 2, 8}
//!  bits  2-3  ROM WS0 first access {4, 3, 2, 8}
//!  bit   4    ROM WS0 second       {2, 1}
//!  bits  5-6  ROM WS1 first access {4, 3, 2, 8}
//!  bit   7    ROM WS1 second       {4, 1}
//!  bits  8-9  ROM WS2 first access {4, 3, 2, 8}
//!  bit  10    ROM WS2 second       {8, 1}
//!  bit  14    prefetch buffer enable
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

const GAMEPAK_RAM_WAIT: [u8; 4] = [4, 3, 2, 8];
const GAMEPAK_WAIT: [u8; 4] = [4, 3, 2, 8];
const GAMEPAK_WAIT_SEQ_0: [u8; 2] = [2, 1];
const GAMEPAK_WAIT_SEQ_1: [u8; 2] = [4, 1];
const GAMEPAK_WAIT_SEQ_2: [u8; 2] = [8, 1];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStates {
    pub wait: [u8; 16],
    pub wait_seq: [u8; 16],
    pub wait_32: [u8; 16],
    pub wait_seq_32: [u8; 16],
    pub prefetch: bool,
}

impl Default for WaitStates {
    fn default() -> Self {
        Self {
            wait: [0, 0, 2, 0, 0, 0, 0, 0, 4, 4, 4, 4, 4, 4, 4, 0],
            wait_seq: [0, 0, 2, 0, 0, 0, 0, 0, 2, 2, 4, 4, 8, 8, 4, 0],
            wait_32: [0, 0, 5, 0, 0, 1, 1, 0, 7, 7, 9, 9, 13, 13, 4, 0],
            wait_seq_32: [0, 0, 5, 0, 0, 1, 1, 0, 5, 5, 9, 9, 17, 17, 4, 0],
            prefetch: false,
        }
    }
}

impl WaitStates {
    pub fn update_from_waitcnt(&mut self, value: u16) {
        let sram = GAMEPAK_RAM_WAIT[usize::from(value.get_bits(0..=1))];
        self.wait[0x0E] = sram;
        self.wait_seq[0x0E] = sram;

        let regions = [
            (0x08, value.get_bits(2..=3), GAMEPAK_WAIT_SEQ_0[usize::from(value.get_bit(4))]),
            (0x0A, value.get_bits(5..=6), GAMEPAK_WAIT_SEQ_1[usize::from(value.get_bit(7))]),
            (0x0C, value.get_bits(8..=9), GAMEPAK_WAIT_SEQ_2[usize::from(value.get_bit(10))]),
        ];
        for (base, first, second) in regions {
            let first = GAMEPAK_WAIT[usize::from(first)];
            self.wait[base] = first;
            self.wait[base + 1] = first;
            self.wait_seq[base] = second;
            self.wait_seq[base + 1] = second;
        }

        for region in 0x08..0x0F {
            self.wait_32[region] = self.wait[region] + self.wait_seq[region] + 1;
            self.wait_seq_32[region] = self.wait_seq[region] * 2 + 1;
        }

        self.prefetch = value.get_bit(14);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_default_rom_timing() {
        let waits = WaitStates::default();
        assert_eq!(waits.wait[0x08], 4);
        assert_eq!(waits.wait_seq[0x08], 2);
        assert_eq!(waits.wait_32[0x08], 7);
        assert!(!waits.prefetch);
    }

    #[test]
    fn check_waitcnt_fast_rom() {
        // WS0 3,1 ; SRAM 8 ; prefetch on
        let mut waits = WaitStates::default();
        waits.update_from_waitcnt(0x4017);

        assert_eq!(waits.wait[0x0E], 8);
        assert_eq!(waits.wait[0x08], 3);
        assert_eq!(waits.wait[0x09], 3);
        assert_eq!(waits.wait_seq[0x08], 1);
        assert_eq!(waits.wait_32[0x08], 5);
        assert_eq!(waits.wait_seq_32[0x08], 3);
        assert!(waits.prefetch);
    }

    #[test]
    fn check_waitcnt_ws2() {
        let mut waits = WaitStates::default();
        waits.update_from_waitcnt(0b0000_0111_0000_0000);

        assert_eq!(waits.wait[0x0C], 8);
        assert_eq!(waits.wait_seq[0x0D], 1);
        assert_eq!(waits.wait_32[0x0C], 10);
        assert_eq!(waits.wait_seq_32[0x0C], 3);
    }
}
