//! DMA channels.
//!
//! The channel registers live in the I/O register file. This module keeps
//! the internal source/destination pointers, which are latched when a
//! channel is enabled and advance with every transfer, and decodes the
//! control register.
//!
//! ```text
//!  DMAxCNT_H
//!  15    14   13-12   11    10     9      8-7      6-5
//!  ┌───┬────┬───────┬─────┬──────┬──────┬────────┬────────┐
//!  │ E │IRQ │timing │ DRQ │ 32b  │repeat│ src ctl│ dst ctl│
//!  └───┴────┴───────┴─────┴──────┴──────┴────────┴────────┘
//!  timing: 0 immediate, 1 VBlank, 2 HBlank, 3 special (sound FIFO / video capture)
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::wait_states::WaitStates;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressControl {
    Increment,
    Decrement,
    Fixed,
    /// Increment, and reload the destination when the channel repeats.
    IncrementReload,
}

impl From<u16> for AddressControl {
    fn from(value: u16) -> Self {
        match value & 0b11 {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            _ => Self::IncrementReload,
        }
    }
}

impl AddressControl {
    /// Address step for a word transfer.
    #[must_use]
    pub const fn word_step(self) -> i32 {
        match self {
            Self::Increment | Self::IncrementReload => 4,
            Self::Decrement => -4,
            Self::Fixed => 0,
        }
    }
}

/// What started a transfer. The value matches the timing field of DMAxCNT_H.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaTrigger {
    Immediate = 0,
    VBlank = 1,
    HBlank = 2,
    Special = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaControl(pub u16);

impl DmaControl {
    #[must_use]
    pub fn destination_control(self) -> AddressControl {
        AddressControl::from(self.0.get_bits(5..=6))
    }

    #[must_use]
    pub fn source_control(self) -> AddressControl {
        AddressControl::from(self.0.get_bits(7..=8))
    }

    #[must_use]
    pub fn repeat(self) -> bool {
        self.0.is_bit_on(9)
    }

    #[must_use]
    pub fn word_transfer(self) -> bool {
        self.0.is_bit_on(10)
    }

    #[must_use]
    pub fn timing(self) -> u16 {
        self.0.get_bits(12..=13)
    }

    #[must_use]
    pub fn irq_enabled(self) -> bool {
        self.0.is_bit_on(14)
    }

    #[must_use]
    pub fn enabled(self) -> bool {
        self.0.is_bit_on(15)
    }
}

#[derive(Clone, Copy, Default, Debug, Serialize, Deserialize)]
pub struct DmaChannel {
    pub source: u32,
    pub destination: u32,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [DmaChannel; 4],
}

/// One transfer, ready to be executed by the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub channel: usize,
    pub count: u32,
    pub word: bool,
    pub source_step: i32,
    pub destination_step: i32,
}

impl Dma {
    /// Decides whether `channel` runs for `trigger` and with which parameters.
    ///
    /// `count_register` is DMAxCNT_L as written. Sound FIFO requests on
    /// channels 1 and 2 always move 4 words to a fixed destination.
    #[must_use]
    pub fn plan(
        channel: usize,
        control: DmaControl,
        count_register: u16,
        trigger: DmaTrigger,
    ) -> Option<Transfer> {
        if !control.enabled() || control.timing() != trigger as u16 {
            return None;
        }

        let source_step = control.source_control().word_step();
        if trigger == DmaTrigger::Special && (channel == 1 || channel == 2) {
            return Some(Transfer {
                channel,
                count: 4,
                word: true,
                source_step,
                destination_step: 0,
            });
        }

        let count = match (count_register, channel) {
            (0, 3) => 0x1_0000,
            (0, _) => 0x4000,
            (count, _) => u32::from(count),
        };

        Some(Transfer {
            channel,
            count,
            word: control.word_transfer(),
            source_step,
            destination_step: control.destination_control().word_step(),
        })
    }
}

impl Transfer {
    /// Bus cycles charged for the whole transfer.
    #[must_use]
    pub fn cycles(&self, source: u32, destination: u32, waits: &WaitStates) -> i32 {
        let source_region = (source >> 24).min(15) as usize;
        let destination_region = (destination >> 24).min(15) as usize;
        let (first, sequential) = if self.word {
            (&waits.wait_32, &waits.wait_seq_32)
        } else {
            (&waits.wait, &waits.wait_seq)
        };

        let source_cycles = 1 + i32::from(sequential[source_region]);
        let destination_cycles = 1 + i32::from(sequential[destination_region]);
        let count = self.count as i32;

        (source_cycles + destination_cycles) * (count - 1)
            + 6
            + i32::from(first[source_region])
            + i32::from(sequential[destination_region])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_control_fields() {
        let control = DmaControl(0xC640);
        assert!(control.enabled());
        assert!(control.irq_enabled());
        assert!(control.word_transfer());
        assert!(control.repeat());
        assert_eq!(control.timing(), 0);
        assert_eq!(control.destination_control(), AddressControl::Fixed);
        assert_eq!(control.source_control(), AddressControl::Increment);
    }

    #[test]
    fn check_plan_immediate() {
        let transfer = Dma::plan(3, DmaControl(0x8400), 4, DmaTrigger::Immediate);
        assert_eq!(
            transfer,
            Some(Transfer {
                channel: 3,
                count: 4,
                word: true,
                source_step: 4,
                destination_step: 4,
            })
        );
        assert_eq!(
            Dma::plan(3, DmaControl(0x9400), 4, DmaTrigger::Immediate),
            None
        );
    }

    #[test]
    fn check_plan_zero_count() {
        let count = |channel| {
            Dma::plan(channel, DmaControl(0x8000), 0, DmaTrigger::Immediate).map(|t| t.count)
        };
        assert_eq!(count(0), Some(0x4000));
        assert_eq!(count(3), Some(0x1_0000));
    }

    #[test]
    fn check_plan_sound_fifo() {
        let transfer = Dma::plan(1, DmaControl(0xB640), 0, DmaTrigger::Special);
        assert_eq!(
            transfer,
            Some(Transfer {
                channel: 1,
                count: 4,
                word: true,
                source_step: 4,
                destination_step: 0,
            })
        );
    }

    #[test]
    fn check_transfer_cycles() {
        let transfer = Transfer {
            channel: 3,
            count: 4,
            word: true,
            source_step: 4,
            destination_step: 0,
        };
        // ROM to IWRAM with default waits: (6 + 1) * 3 + 6 + 7 + 0
        let cycles = transfer.cycles(0x0800_0000, 0x0300_0000, &WaitStates::default());
        assert_eq!(cycles, 34);
    }
}
