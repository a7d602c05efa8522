//! Four 16-bit up-counters.
//!
//! A running timer does not tick every cycle: it keeps the number of cycles
//! left before its next overflow and the visible counter is derived from it
//! on demand. Cascade timers (bit 2 of TMxCNT_H, timers 1-3) count overflows
//! of the previous timer instead. Timer 0 drops the cascade bit.
//!
//! Control writes are latched and applied after the current event slice, so a
//! timer started by an instruction starts counting from the next slice.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// log2 of the prescaler: 1, 64, 256 and 1024 cycles per tick.
const PRESCALER_SHIFT: [u8; 4] = [0, 6, 8, 10];

/// TMxCNT_H bits kept by a write. Timer 0 has no previous timer to count.
const fn control_mask(index: usize) -> u16 {
    if index == 0 { 0xC3 } else { 0xC7 }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Timer {
    pub reload: u16,
    /// Control bits as read back (`value & 0xC7`).
    pub control: u16,
    /// Counter of stopped and cascade timers.
    pub counter: u16,
    /// Cycles left before the next overflow.
    pub ticks: i32,
    pub enabled: bool,
    shift: u8,
}

impl Timer {
    #[must_use]
    pub const fn is_cascade(&self) -> bool {
        self.control & 0b100 != 0
    }

    #[must_use]
    pub const fn irq_enabled(&self) -> bool {
        self.control & 0x40 != 0
    }

    const fn period(&self) -> i32 {
        (0x1_0000 - self.reload as i32) << self.shift
    }

    /// Counter value `elapsed` cycles after the last step.
    #[must_use]
    pub fn counter_at(&self, elapsed: i32) -> u16 {
        if self.enabled && !self.is_cascade() {
            let remaining = (self.ticks - elapsed).max(0) >> self.shift;
            0xFFFF_u16.wrapping_sub(remaining as u16)
        } else {
            self.counter
        }
    }
}

/// Result of [`Timers::step`].
#[derive(Default, Debug, PartialEq, Eq)]
pub struct TimersStepOutput {
    /// Bit `i` set when timer `i` overflowed.
    pub overflows: u8,
    /// IF bits to raise.
    pub interrupts: u16,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Timers {
    pub timers: [Timer; 4],
    /// Timers with a control write waiting to be applied.
    pending_controls: u8,
    pending_values: [u16; 4],
}

impl Timers {
    pub fn write_reload(&mut self, index: usize, value: u16) {
        self.timers[index].reload = value;
    }

    /// TMxCNT_H as read back. A latched write is visible before it applies.
    #[must_use]
    pub fn control(&self, index: usize) -> u16 {
        if self.pending_controls.is_bit_on(index as u8) {
            self.pending_values[index] & control_mask(index)
        } else {
            self.timers[index].control
        }
    }

    /// Latches a control write, applied by [`Timers::apply_pending_controls`].
    pub fn write_control(&mut self, index: usize, value: u16) {
        self.pending_values[index] = value;
        self.pending_controls.set_bit_on(index as u8);
    }

    #[must_use]
    pub const fn has_pending_controls(&self) -> bool {
        self.pending_controls != 0
    }

    pub fn apply_pending_controls(&mut self) {
        for index in 0..4 {
            if self.pending_controls.is_bit_on(index as u8) {
                self.apply_control(index, self.pending_values[index]);
            }
        }
        self.pending_controls = 0;
    }

    fn apply_control(&mut self, index: usize, value: u16) {
        let timer = &mut self.timers[index];
        timer.shift = PRESCALER_SHIFT[usize::from(value & 0b11)];

        let enable = value.is_bit_on(7);
        if enable && !timer.enabled {
            timer.counter = timer.reload;
            timer.ticks = timer.period();
            tracing::trace!("timer {index} started, reload 0x{:04X}", timer.reload);
        }
        timer.enabled = enable;
        timer.control = value & control_mask(index);
    }

    /// Cycles until the first running, non-cascade timer overflows.
    #[must_use]
    pub fn next_overflow(&self) -> Option<i32> {
        self.timers
            .iter()
            .filter(|timer| timer.enabled && !timer.is_cascade())
            .map(|timer| timer.ticks)
            .min()
    }

    /// Advances the timers by `clock` cycles.
    pub fn step(&mut self, clock: i32) -> TimersStepOutput {
        let mut output = TimersStepOutput::default();
        let mut previous_overflowed = false;

        for (index, timer) in self.timers.iter_mut().enumerate() {
            let mut overflowed = false;

            if timer.enabled {
                if timer.is_cascade() {
                    if previous_overflowed {
                        timer.counter = timer.counter.wrapping_add(1);
                        if timer.counter == 0 {
                            timer.counter = timer.reload;
                            overflowed = true;
                        }
                    }
                } else {
                    timer.ticks -= clock;
                    while timer.ticks <= 0 {
                        timer.ticks += timer.period();
                        overflowed = true;
                    }
                    timer.counter = timer.counter_at(0);
                }
            }

            if overflowed {
                output.overflows.set_bit_on(index as u8);
                if timer.irq_enabled() {
                    output.interrupts |= 0x8 << index;
                }
            }
            previous_overflowed = overflowed;
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn started(reload: u16, control: u16) -> Timers {
        let mut timers = Timers::default();
        timers.write_reload(0, reload);
        timers.write_control(0, control);
        timers.apply_pending_controls();
        timers
    }

    #[test]
    fn check_control_is_latched() {
        let mut timers = Timers::default();
        timers.write_control(2, 0x80);
        assert!(!timers.timers[2].enabled);
        assert!(timers.has_pending_controls());

        timers.apply_pending_controls();
        assert!(timers.timers[2].enabled);
        assert!(!timers.has_pending_controls());
    }

    #[test]
    fn check_overflow_raises_irq() {
        let mut timers = started(0xFFFF, 0xC0);
        assert_eq!(timers.next_overflow(), Some(1));

        let output = timers.step(1);
        assert_eq!(output.overflows, 0b1);
        assert_eq!(output.interrupts, 0x8);
        assert_eq!(timers.timers[0].ticks, 1);
    }

    #[test]
    fn check_prescaled_counter() {
        // reload 0xFF00, prescaler 64
        let mut timers = started(0xFF00, 0x81);
        assert_eq!(timers.timers[0].ticks, 0x100 << 6);
        assert_eq!(timers.timers[0].counter_at(0), 0xFEFF);

        let output = timers.step(64 * 16);
        assert_eq!(output, TimersStepOutput::default());
        assert_eq!(timers.timers[0].counter_at(0), 0xFF0F);
        assert_eq!(timers.timers[0].counter_at(64), 0xFF10);
    }

    #[test]
    fn check_cascade() {
        let mut timers = started(0xFFFF, 0x80);
        timers.write_reload(1, 0xFFFE);
        timers.write_control(1, 0xC4);
        timers.apply_pending_controls();

        assert_eq!(timers.next_overflow(), Some(1));

        let first = timers.step(1);
        assert_eq!(first.overflows, 0b01);
        assert_eq!(timers.timers[1].counter_at(0), 0xFFFF);

        let second = timers.step(1);
        assert_eq!(second.overflows, 0b11);
        assert_eq!(second.interrupts, 0x10);
        assert_eq!(timers.timers[1].counter, 0xFFFE);
    }

    #[test]
    fn check_timer0_ignores_cascade_bit() {
        let mut timers = started(0xFF00, 0x84);
        assert_eq!(timers.timers[0].control, 0x80);
        assert_eq!(timers.next_overflow(), Some(0x100));

        timers.step(0x10);
        assert_eq!(timers.timers[0].counter_at(0), 0xFF0F);
        assert_eq!(timers.timers[0].counter, 0xFF0F);
    }

    #[test]
    fn check_pending_control_reads_back() {
        let mut timers = started(0, 0x80);
        timers.write_control(0, 0xC5);
        timers.write_control(2, 0xFF);
        assert_eq!(timers.control(0), 0xC1);
        assert_eq!(timers.control(2), 0xC7);
        assert_eq!(timers.control(1), 0);

        timers.apply_pending_controls();
        assert_eq!(timers.control(0), 0xC1);
        assert_eq!(timers.timers[2].control, 0xC7);
    }

    #[test]
    fn check_restart_does_not_reload_running_timer() {
        let mut timers = started(0x0000, 0x80);
        timers.step(100);
        timers.write_control(0, 0x81);
        timers.apply_pending_controls();

        assert_eq!(timers.timers[0].ticks, 0x1_0000 - 100);
        assert_eq!(timers.timers[0].control, 0x81);
    }
}
