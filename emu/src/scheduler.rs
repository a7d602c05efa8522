//! Event scheduler.
//!
//! Peripherals are not clocked after every instruction. The CPU runs until
//! the cycles spent since the last event slice reach `next_event`, the
//! nearest peripheral deadline. The elapsed time is then handed to the
//! peripherals in one slice, split when a shorter deadline shows up on the
//! way:
//!
//! ```text
//!   instructions ──► total_ticks >= next_event ?
//!                         │ yes
//!                         ▼
//!        ┌──► slice: timers ─► LCD (render, HBlank/VBlank DMA) ─► new deadline
//!        │                                                          │
//!        ├── DMA stall left ◄───────────────────────────────────────┤
//!        │                                                          ▼
//!        └── cycles left over ◄──────────────────── IRQ delivery (7 cycles latency)
//! ```
//!
//! The frame ends after the slice that rendered the last visible line.

use serde::{Deserialize, Serialize};

use crate::bus::io_registers::{KEYCNT, KEYINPUT, SOUNDCNT_H, SOUNDCNT_X};
use crate::cpu::hardware::dma::DmaTrigger;
use crate::cpu::hardware::interrupt_control::{Interrupt, STOP_WAKE_MASK};
use crate::cpu::hardware::keypad::keypad_condition;
use crate::gba::Gba;
use crate::host::{Host, Scanline};

/// Cycles between an IRQ being raised and the CPU taking it.
const IRQ_LATENCY: i32 = 7;

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Cycles spent since the last event slice.
    pub total_ticks: i32,
    /// Cycles from the last event slice to the nearest deadline.
    pub next_event: i32,
    /// IRQ latency left.
    pub irq_ticks: i32,
    /// Stall left from a high-level BIOS call.
    pub swi_ticks: i32,
    /// Bus cycles taken by DMA and not yet handed to the peripherals.
    pub dma_ticks: i32,
    /// An IRQ is waiting out its latency.
    pub int_state: bool,
    pub halted: bool,
    pub stopped: bool,
}

impl SchedulerState {
    /// Makes the next instruction end the current slice.
    pub const fn force_event(&mut self) {
        self.next_event = self.total_ticks;
    }

    /// The CPU issues no instruction.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.halted || self.stopped || self.swi_ticks > 0
    }
}

impl Gba {
    /// Runs the CPU and the peripherals until a frame has been displayed.
    pub(crate) fn run_until_frame_end(&mut self, host: &mut dyn Host) {
        let mut frame_done = false;

        while !frame_done {
            let state = &self.cpu.bus.scheduler;
            let clock = if state.is_idle() {
                (state.next_event - state.total_ticks).max(0)
            } else {
                self.cpu.step() as i32
            };

            let state = &mut self.cpu.bus.scheduler;
            state.total_ticks += clock;
            if state.total_ticks < state.next_event {
                continue;
            }

            let remaining = state.total_ticks - state.next_event;
            if state.swi_ticks > 0 {
                state.swi_ticks = (state.swi_ticks - clock).max(0);
            }
            let slice = state.next_event;
            state.total_ticks = 0;

            frame_done = self.process_events(slice, remaining, host);

            if self.cpu.bus.timers.has_pending_controls() {
                self.cpu.bus.timers.apply_pending_controls();
                let deadline = self.cpu.bus.next_event_deadline();
                self.cpu.bus.scheduler.next_event = deadline;
            }
        }
    }

    /// Hands `slice` cycles, then `remaining`, to the peripherals. Returns
    /// true when the last visible line was rendered.
    fn process_events(&mut self, mut slice: i32, mut remaining: i32, host: &mut dyn Host) -> bool {
        let mut frame_done = false;

        loop {
            let bus = &mut self.cpu.bus;
            if bus.scheduler.irq_ticks > 0 {
                bus.scheduler.irq_ticks = (bus.scheduler.irq_ticks - slice).max(0);
            }

            if !bus.scheduler.stopped {
                let output = bus.timers.step(slice);
                bus.io.request_interrupt(output.interrupts);
                for timer in 0..2 {
                    if output.overflows & (1 << timer) != 0 {
                        bus.feed_sound_fifos(timer);
                    }
                }
            }

            frame_done |= self.step_lcd(slice, host);

            let bus = &mut self.cpu.bus;
            bus.scheduler.next_event = bus.next_event_deadline();

            if bus.scheduler.dma_ticks > 0 {
                slice = bus.scheduler.dma_ticks.min(bus.scheduler.next_event);
                bus.scheduler.dma_ticks -= slice;
                continue;
            }

            self.deliver_interrupts();

            if remaining > 0 {
                let bus = &mut self.cpu.bus;
                slice = remaining.min(bus.scheduler.next_event);
                remaining -= slice;
                continue;
            }

            return frame_done;
        }
    }

    fn step_lcd(&mut self, slice: i32, host: &mut dyn Host) -> bool {
        let bus = &mut self.cpu.bus;
        let output = bus.lcd.step(slice, &mut bus.io);
        bus.io.request_interrupt(output.interrupts);

        if let Some(line) = output.render_line {
            host.render_scanline(&Scanline {
                line,
                io: &bus.io,
                palette: &bus.memory.palette_ram,
                vram: &bus.memory.video_ram,
                oam: &bus.memory.object_attributes,
            });
        }

        if output.flush_audio {
            host.push_audio_samples(&bus.sound.drain_samples());
        }

        if output.entered_hblank {
            bus.check_dma(DmaTrigger::HBlank, 0x0F);
        }

        if output.entered_vblank {
            let key_control = bus.io.get(KEYCNT);
            if key_control & 0x4000 != 0 && keypad_condition(bus.io.get(KEYINPUT), key_control) {
                bus.io.request_interrupt(Interrupt::Keypad as u16);
            }
            bus.check_dma(DmaTrigger::VBlank, 0x0F);
        }

        output.frame_done
    }

    fn deliver_interrupts(&mut self) {
        let cpu = &mut self.cpu;
        let state = &cpu.bus.scheduler;

        let mut pending = cpu.bus.io.pending_interrupts();
        if state.stopped {
            pending &= STOP_WAKE_MASK;
        }
        if pending == 0 {
            return;
        }

        if !cpu.bus.io.interrupt_master_enable() || cpu.cpsr.irq_disable() {
            // Halt ends on IE & IF even when the IRQ cannot be taken.
            let state = &mut cpu.bus.scheduler;
            state.halted = false;
            state.stopped = false;
            return;
        }

        let state = &mut cpu.bus.scheduler;
        if state.int_state {
            if state.irq_ticks == 0 {
                state.int_state = false;
                state.halted = false;
                state.stopped = false;
                cpu.interrupt();
            }
        } else if !state.halted && !state.stopped {
            state.int_state = true;
            state.irq_ticks = IRQ_LATENCY;
            state.next_event = state.next_event.min(IRQ_LATENCY);
        } else {
            state.halted = false;
            state.stopped = false;
            cpu.interrupt();
        }

        cpu.bus.scheduler.swi_ticks = 0;
    }
}

impl crate::bus::Bus {
    /// Cycles from the last event slice to the nearest peripheral deadline.
    #[must_use]
    pub fn next_event_deadline(&self) -> i32 {
        let mut deadline = self.lcd.ticks;
        if let Some(overflow) = self.timers.next_overflow() {
            deadline = deadline.min(overflow);
        }
        if self.scheduler.swi_ticks > 0 {
            deadline = deadline.min(self.scheduler.swi_ticks);
        }
        if self.scheduler.irq_ticks > 0 {
            deadline = deadline.min(self.scheduler.irq_ticks);
        }
        deadline
    }

    /// Pops a sample from the FIFOs clocked by `timer` and refills them by DMA.
    fn feed_sound_fifos(&mut self, timer: usize) {
        let requests =
            self.sound
                .timer_overflow(timer, self.io.get(SOUNDCNT_H), self.io.get(SOUNDCNT_X));
        if requests.fifo_a {
            self.check_dma(DmaTrigger::Special, 0b0010);
        }
        if requests.fifo_b {
            self.check_dma(DmaTrigger::Special, 0b0100);
        }
    }
}
