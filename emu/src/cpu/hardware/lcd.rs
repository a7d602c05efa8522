//! LCD timing.
//!
//! The core does not compose pixels: it walks the 228 lines of a frame,
//! keeps DISPSTAT/VCOUNT up to date and tells the bus when a visible line
//! must be handed to the host renderer and when the blanking periods start.
//!
//! ```text
//!                    960 cycles      272 cycles
//!                   ◄──────────►   ◄──────────►
//!               ┌──────────────────────────────┐
//!               │                 │            │
//!    160 lines  │     VDraw       │   HBlank   │
//!               │                 │            │
//!               ├─────────────────┴────────────┤
//!     68 lines  │            VBlank            │
//!               └──────────────────────────────┘
//! ```
//!
//! HBlank is entered 1008 cycles into a line and lasts 224 cycles
//! (the flag is raised a few cycles late, as on hardware), for a total of
//! 1232 cycles per line and 280 896 cycles per frame.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::io_registers::{DISPSTAT, IoRegisters, VCOUNT};
use crate::cpu::hardware::interrupt_control::Interrupt;

/// Cycles from the start of a line to HBlank.
pub const HDRAW_CYCLES: i32 = 1008;
/// Cycles spent in HBlank.
pub const HBLANK_CYCLES: i32 = 224;
/// Visible lines.
pub const LCD_HEIGHT: u16 = 160;
/// Visible pixels per line.
pub const LCD_WIDTH: usize = 240;
/// Last line of a frame.
const LAST_LINE: u16 = 227;
/// The audio ring is handed to the host on lines multiple of this.
const AUDIO_FLUSH_LINES: u16 = 53;

const VBLANK_FLAG: u8 = 0;
const HBLANK_FLAG: u8 = 1;
const VCOUNT_FLAG: u8 = 2;
const VBLANK_IRQ_ENABLE: u8 = 3;
const HBLANK_IRQ_ENABLE: u8 = 4;
const VCOUNT_IRQ_ENABLE: u8 = 5;

/// What happened during an [`Lcd::step`].
#[derive(Default, Debug, PartialEq, Eq)]
pub struct LcdStepOutput {
    /// Visible line to hand to the renderer.
    pub render_line: Option<u16>,
    pub entered_hblank: bool,
    pub entered_vblank: bool,
    /// The last visible line has been rendered.
    pub frame_done: bool,
    pub flush_audio: bool,
    /// IF bits to raise.
    pub interrupts: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Lcd {
    /// Cycles until the next HBlank start or end.
    pub ticks: i32,
}

impl Default for Lcd {
    fn default() -> Self {
        Self {
            ticks: HDRAW_CYCLES,
        }
    }
}

impl Lcd {
    pub fn reset(&mut self, io: &mut IoRegisters) {
        self.ticks = HDRAW_CYCLES;
        io.set(VCOUNT, 0);
        let status = io.get(DISPSTAT) & !0b111;
        io.set(DISPSTAT, status);
    }

    /// Advances by `clock` cycles. At most one HBlank transition happens per
    /// call: the scheduler never steps past [`Lcd::ticks`].
    pub fn step(&mut self, clock: i32, io: &mut IoRegisters) -> LcdStepOutput {
        let mut output = LcdStepOutput::default();

        self.ticks -= clock;
        if self.ticks > 0 {
            return output;
        }

        let mut status = io.get(DISPSTAT);
        let mut line = io.get(VCOUNT);

        if status.is_bit_on(VBLANK_FLAG) {
            if status.is_bit_on(HBLANK_FLAG) {
                self.ticks += HDRAW_CYCLES;
                line += 1;
                status.set_bit_off(HBLANK_FLAG);
                output.interrupts |= compare_vcount(&mut status, line);
            } else {
                self.ticks += HBLANK_CYCLES;
                status.set_bit_on(HBLANK_FLAG);
                if status.is_bit_on(HBLANK_IRQ_ENABLE) {
                    output.interrupts |= Interrupt::HBlank as u16;
                }
            }

            if line > LAST_LINE {
                status.set_bit_off(VBLANK_FLAG);
                status.set_bit_off(HBLANK_FLAG);
                line = 0;
                output.interrupts |= compare_vcount(&mut status, line);
            }
        } else if status.is_bit_on(HBLANK_FLAG) {
            line += 1;
            self.ticks += HDRAW_CYCLES;
            status.set_bit_off(HBLANK_FLAG);

            if line == LCD_HEIGHT {
                status.set_bit_on(VBLANK_FLAG);
                output.entered_vblank = true;
                if status.is_bit_on(VBLANK_IRQ_ENABLE) {
                    output.interrupts |= Interrupt::VBlank as u16;
                }
            }
            output.interrupts |= compare_vcount(&mut status, line);
        } else {
            output.render_line = Some(line);
            output.frame_done = line == LCD_HEIGHT - 1;
            output.flush_audio = line % AUDIO_FLUSH_LINES == 0;

            status.set_bit_on(HBLANK_FLAG);
            self.ticks += HBLANK_CYCLES;
            output.entered_hblank = true;
            if status.is_bit_on(HBLANK_IRQ_ENABLE) {
                output.interrupts |= Interrupt::HBlank as u16;
            }
        }

        io.set(DISPSTAT, status);
        io.set(VCOUNT, line);
        output
    }
}

/// Updates the VCOUNT match flag, returns the IF bit to raise.
fn compare_vcount(status: &mut u16, line: u16) -> u16 {
    if line == *status >> 8 {
        status.set_bit_on(VCOUNT_FLAG);
        if status.is_bit_on(VCOUNT_IRQ_ENABLE) {
            return Interrupt::VCount as u16;
        }
    } else {
        status.set_bit_off(VCOUNT_FLAG);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run_until_event(lcd: &mut Lcd, io: &mut IoRegisters) -> LcdStepOutput {
        let ticks = lcd.ticks;
        lcd.step(ticks, io)
    }

    #[test]
    fn check_first_line() {
        let mut io = IoRegisters::default();
        let mut lcd = Lcd::default();
        lcd.reset(&mut io);

        assert_eq!(lcd.step(100, &mut io), LcdStepOutput::default());

        let output = lcd.step(HDRAW_CYCLES - 100, &mut io);
        assert_eq!(output.render_line, Some(0));
        assert!(output.entered_hblank);
        assert!(output.flush_audio);
        assert_eq!(io.get(DISPSTAT) & 0b11, 0b10);
        assert_eq!(lcd.ticks, HBLANK_CYCLES);

        let output = run_until_event(&mut lcd, &mut io);
        assert_eq!(output.render_line, None);
        assert_eq!(io.get(VCOUNT), 1);
        assert_eq!(io.get(DISPSTAT) & 0b11, 0);
    }

    #[test]
    fn check_full_frame() {
        let mut io = IoRegisters::default();
        io.set(DISPSTAT, 0b1000);
        let mut lcd = Lcd::default();
        lcd.reset(&mut io);

        let mut rendered = 0;
        let mut cycles = 0;
        let mut vblank_irqs = 0;
        loop {
            cycles += lcd.ticks;
            let output = run_until_event(&mut lcd, &mut io);
            rendered += usize::from(output.render_line.is_some());
            if output.interrupts & Interrupt::VBlank as u16 != 0 {
                vblank_irqs += 1;
            }
            if io.get(VCOUNT) == 0 && io.get(DISPSTAT) & 0b11 == 0 && rendered > 0 {
                break;
            }
        }

        assert_eq!(rendered, 160);
        assert_eq!(vblank_irqs, 1);
        assert_eq!(cycles, 228 * 1232);
    }

    #[test]
    fn check_vcount_match() {
        let mut io = IoRegisters::default();
        // match line 1, IRQ enabled
        io.set(DISPSTAT, (1 << 8) | 0b10_0000);
        let mut lcd = Lcd::default();
        lcd.reset(&mut io);

        run_until_event(&mut lcd, &mut io);
        let output = run_until_event(&mut lcd, &mut io);

        assert_eq!(output.interrupts, Interrupt::VCount as u16);
        assert!(io.get(DISPSTAT).is_bit_on(VCOUNT_FLAG));

        run_until_event(&mut lcd, &mut io);
        run_until_event(&mut lcd, &mut io);
        assert!(io.get(DISPSTAT).is_bit_off(VCOUNT_FLAG));
    }
}
