//! What the core calls back into: the renderer, the audio sink and an
//! optional tracer.

use crate::bus::io_registers::IoRegisters;
use crate::cpu::psr::CpuState;

/// Everything a renderer needs to draw one visible line.
pub struct Scanline<'a> {
    /// 0..160.
    pub line: u16,
    /// LCD registers (DISPCNT, BGxCNT, scroll, affine, windows, blending).
    pub io: &'a IoRegisters,
    pub palette: &'a [u8],
    pub vram: &'a [u8],
    pub oam: &'a [u8],
}

/// Frontend side of [`crate::gba::Gba::run_frame`].
pub trait Host {
    /// Called once per visible line, when the line enters HBlank.
    fn render_scanline(&mut self, scanline: &Scanline<'_>);

    /// Interleaved stereo samples produced since the previous call.
    fn push_audio_samples(&mut self, samples: &[i16]);
}

/// Observes the core while it runs. All methods default to doing nothing.
pub trait TraceHook {
    fn on_instruction(&mut self, _address: u32, _opcode: u32, _state: CpuState) {}

    /// A halfword write to the I/O register at `offset`, before its side effects.
    fn on_io_write(&mut self, _offset: u32, _value: u16) {}
}

#[derive(Default)]
pub struct NoTrace;

impl TraceHook for NoTrace {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct IoLog(Vec<(u32, u16)>);

    impl TraceHook for IoLog {
        fn on_io_write(&mut self, offset: u32, value: u16) {
            self.0.push((offset, value));
        }
    }

    #[test]
    fn check_default_methods() {
        let mut hooks: Vec<Box<dyn TraceHook>> = vec![Box::new(NoTrace), Box::new(IoLog::default())];
        for hook in &mut hooks {
            hook.on_instruction(0x0800_0000, 0xEAFF_FFFE, CpuState::Arm);
            hook.on_io_write(0x208, 1);
        }

        let mut log = IoLog::default();
        log.on_instruction(0, 0, CpuState::Thumb);
        log.on_io_write(0x200, 0x3FFF);
        assert_eq!(log.0, vec![(0x200, 0x3FFF)]);
    }
}
