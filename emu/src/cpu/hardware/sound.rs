//! Direct Sound.
//!
//! Two 32-byte FIFOs of signed 8-bit samples. Each FIFO is drained by the
//! overflow of timer 0 or timer 1 (SOUNDCNT_H bits 10 and 14); when half of
//! it is consumed it asks DMA 1 (FIFO A) or DMA 2 (FIFO B) for 16 more bytes.
//!
//! Every drained sample becomes one interleaved stereo frame in the audio
//! ring, which the host empties a few times per frame. The PSG channels are
//! not synthesized.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::io_registers::Fifo;
use crate::ring_buffer::RingBuffer;

const FIFO_CAPACITY: usize = 32;
/// A DMA refill is requested when this many bytes or fewer are left.
const FIFO_REFILL_LEVEL: usize = 16;
/// Stereo frames kept between two host flushes.
const AUDIO_RING_CAPACITY: usize = 0x4000;

/// SOUNDCNT_H writable bits; 11 and 15 are write-only FIFO resets.
const SOUNDCNT_H_MASK: u16 = 0x770F;

fn audio_ring() -> RingBuffer<i16> {
    RingBuffer::new(AUDIO_RING_CAPACITY)
}

/// Which DMA channels want a FIFO refill after a timer overflow.
#[derive(Default, Debug, PartialEq, Eq)]
pub struct FifoRequests {
    pub fifo_a: bool,
    pub fifo_b: bool,
}

#[derive(Serialize, Deserialize)]
pub struct Sound {
    fifo_a: VecDeque<u8>,
    fifo_b: VecDeque<u8>,
    /// Last sample played by each FIFO.
    current: [i8; 2],
    #[serde(skip, default = "audio_ring")]
    samples: RingBuffer<i16>,
}

impl Default for Sound {
    fn default() -> Self {
        Self {
            fifo_a: VecDeque::with_capacity(FIFO_CAPACITY),
            fifo_b: VecDeque::with_capacity(FIFO_CAPACITY),
            current: [0; 2],
            samples: audio_ring(),
        }
    }
}

impl Sound {
    pub fn reset(&mut self) {
        self.fifo_a.clear();
        self.fifo_b.clear();
        self.current = [0; 2];
        self.samples.clear();
    }

    fn fifo_mut(&mut self, fifo: Fifo) -> &mut VecDeque<u8> {
        match fifo {
            Fifo::A => &mut self.fifo_a,
            Fifo::B => &mut self.fifo_b,
        }
    }

    /// Queues bytes written to FIFO_A/FIFO_B. A full FIFO drops them.
    pub fn write_fifo(&mut self, fifo: Fifo, bytes: &[u8]) {
        let queue = self.fifo_mut(fifo);
        for &byte in bytes {
            if queue.len() < FIFO_CAPACITY {
                queue.push_back(byte);
            }
        }
    }

    #[must_use]
    pub fn fifo_len(&self, fifo: Fifo) -> usize {
        match fifo {
            Fifo::A => self.fifo_a.len(),
            Fifo::B => self.fifo_b.len(),
        }
    }

    /// Handles a SOUNDCNT_H write and returns the value to store.
    pub fn write_control_high(&mut self, value: u16) -> u16 {
        if value.is_bit_on(11) {
            self.fifo_a.clear();
        }
        if value.is_bit_on(15) {
            self.fifo_b.clear();
        }
        value & SOUNDCNT_H_MASK
    }

    /// Consumes samples for the FIFOs clocked by `timer` (0 or 1).
    pub fn timer_overflow(
        &mut self,
        timer: usize,
        control_high: u16,
        control_x: u16,
    ) -> FifoRequests {
        let mut requests = FifoRequests::default();
        let mut played = false;

        for (index, fifo) in [Fifo::A, Fifo::B].into_iter().enumerate() {
            let timer_select = if fifo == Fifo::A { 10 } else { 14 };
            if usize::from(control_high.get_bit(timer_select)) != timer {
                continue;
            }

            let queue = self.fifo_mut(fifo);
            if let Some(sample) = queue.pop_front() {
                self.current[index] = sample as i8;
            }
            played = true;

            if self.fifo_len(fifo) <= FIFO_REFILL_LEVEL {
                match fifo {
                    Fifo::A => requests.fifo_a = true,
                    Fifo::B => requests.fifo_b = true,
                }
            }
        }

        if played && control_x.is_bit_on(7) {
            let (left, right) = self.mix(control_high);
            self.samples.push(left);
            self.samples.push(right);
        }

        requests
    }

    /// Left and right output of the current samples.
    fn mix(&self, control_high: u16) -> (i16, i16) {
        let mut left = 0_i16;
        let mut right = 0_i16;

        // (volume bit, right enable, left enable)
        let routing = [(2, 8, 9), (3, 12, 13)];
        for (sample, (volume, right_enable, left_enable)) in self.current.iter().zip(routing) {
            let scale = if control_high.is_bit_on(volume) { 256 } else { 128 };
            let value = (i32::from(*sample) * scale) as i16;
            if control_high.is_bit_on(right_enable) {
                right = right.saturating_add(value);
            }
            if control_high.is_bit_on(left_enable) {
                left = left.saturating_add(value);
            }
        }

        (left, right)
    }

    /// Takes the stereo samples produced since the previous call.
    pub fn drain_samples(&mut self) -> Vec<i16> {
        self.samples.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_fifo_capacity() {
        let mut sound = Sound::default();
        sound.write_fifo(Fifo::A, &[1; 40]);
        assert_eq!(sound.fifo_len(Fifo::A), 32);
        assert_eq!(sound.fifo_len(Fifo::B), 0);
    }

    #[test]
    fn check_control_resets_fifo() {
        let mut sound = Sound::default();
        sound.write_fifo(Fifo::A, &[1, 2, 3, 4]);
        sound.write_fifo(Fifo::B, &[1, 2]);

        let stored = sound.write_control_high(0x0B0F);
        assert_eq!(stored, 0x030F);
        assert_eq!(sound.fifo_len(Fifo::A), 0);
        assert_eq!(sound.fifo_len(Fifo::B), 2);
    }

    #[test]
    fn check_timer_overflow_requests_refill() {
        let mut sound = Sound::default();
        sound.write_fifo(Fifo::A, &[0x10; 18]);

        // FIFO A on timer 0, FIFO B on timer 1
        let control_high = 1 << 14;
        let first = sound.timer_overflow(0, control_high, 0);
        assert_eq!(first, FifoRequests::default());

        let second = sound.timer_overflow(0, control_high, 0);
        assert_eq!(
            second,
            FifoRequests {
                fifo_a: true,
                fifo_b: false,
            }
        );
        assert_eq!(sound.fifo_len(Fifo::A), 16);
        assert!(sound.drain_samples().is_empty());
    }

    #[test]
    fn check_mixed_output() {
        let mut sound = Sound::default();
        sound.write_fifo(Fifo::A, &[0x10]);
        sound.write_fifo(Fifo::B, &[0xF0]);

        // A full volume on both sides, B half volume on the left only.
        let control_high = 0b0010_0011_0000_0100;
        sound.timer_overflow(0, control_high, 0x80);

        assert_eq!(sound.drain_samples(), vec![0x1000 - 0x0800, 0x1000]);
        assert!(sound.drain_samples().is_empty());
    }
}
