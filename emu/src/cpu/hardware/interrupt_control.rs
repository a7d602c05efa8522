use crate::bus::io_registers::{IE, IF, IME, IoRegisters};

/// IF/IE bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 1 << 0,
    HBlank = 1 << 1,
    VCount = 1 << 2,
    Timer0 = 1 << 3,
    Timer1 = 1 << 4,
    Timer2 = 1 << 5,
    Timer3 = 1 << 6,
    Serial = 1 << 7,
    Dma0 = 1 << 8,
    Dma1 = 1 << 9,
    Dma2 = 1 << 10,
    Dma3 = 1 << 11,
    Keypad = 1 << 12,
    GamePak = 1 << 13,
}

/// Interrupts able to leave Stop mode: keypad, game pak and serial.
pub const STOP_WAKE_MASK: u16 = Interrupt::Keypad as u16 | Interrupt::GamePak as u16 | Interrupt::Serial as u16;

impl IoRegisters {
    /// Sets bits in IF.
    pub fn request_interrupt(&mut self, flags: u16) {
        if flags != 0 {
            let requested = self.get(IF) | flags;
            self.set(IF, requested);
        }
    }

    /// IE & IF.
    #[must_use]
    pub const fn pending_interrupts(&self) -> u16 {
        self.get(IE) & self.get(IF)
    }

    #[must_use]
    pub const fn interrupt_master_enable(&self) -> bool {
        self.get(IME) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_pending() {
        let mut io = IoRegisters::default();
        io.set(IE, Interrupt::VBlank as u16 | Interrupt::Timer0 as u16);
        io.request_interrupt(Interrupt::Timer0 as u16 | Interrupt::Dma3 as u16);

        assert_eq!(io.get(IF), 0x808);
        assert_eq!(io.pending_interrupts(), Interrupt::Timer0 as u16);
        assert!(!io.interrupt_master_enable());
    }

    #[test]
    fn check_stop_mask() {
        assert_eq!(STOP_WAKE_MASK, 0x3080);
    }
}
