//! One emulated Game Boy Advance: a CPU owning the bus, the cartridge it was
//! built from and the options applied on reset.

use std::io::Read;
use std::path::Path;

use crate::bus::Bus;
use crate::bus::io_registers::{KEYCNT, KEYINPUT};
use crate::cartridge_header::CartridgeHeader;
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::hardware::backup::{BackupKind, BackupMemory};
use crate::cpu::hardware::internal_memory::{BIOS_SIZE, InternalMemory, MAX_ROM_SIZE, WORKING_RAM_SIZE};
use crate::cpu::hardware::interrupt_control::Interrupt;
use crate::cpu::hardware::keypad::{Keypad, keypad_condition};
use crate::error::{BatteryError, RomError, SaveStateError};
use crate::host::{Host, TraceHook};
use crate::options::CoreOptions;
use crate::save_state::{self, StateHeader};

/// IRQ handler installed in place of the BIOS one: saves the scratch
/// registers, calls the handler stored at 0x03FFFFFC and returns.
const IRQ_TRAMPOLINE: [u32; 6] = [
    0xE92D_500F, // stmfd sp!, {r0-r3, r12, lr}
    0xE3A0_0301, // mov r0, #0x04000000
    0xE28F_E000, // add lr, pc, #0
    0xE510_F004, // ldr pc, [r0, #-4]
    0xE8BD_500F, // ldmfd sp!, {r0-r3, r12, lr}
    0xE25E_F004, // subs pc, lr, #4
];
const IRQ_TRAMPOLINE_ADDRESS: u32 = 0x128;
/// `b 0x128` at the IRQ vector.
const IRQ_VECTOR_BRANCH: u32 = 0xEA00_0042;

const CARTRIDGE_ENTRY: u32 = 0x0800_0000;
const MULTIBOOT_ENTRY: u32 = 0x0200_0000;

pub struct Gba {
    pub cpu: Arm7tdmi,

    cartridge_header: CartridgeHeader,
    options: CoreOptions,
    /// The save options changed since the backup memory was built.
    rebuild_backup: bool,
}

impl Gba {
    /// Builds a system around `rom` and resets it.
    ///
    /// Without a BIOS image the BIOS calls are emulated.
    pub fn new(rom: Vec<u8>, bios: Option<Vec<u8>>, options: CoreOptions) -> Result<Self, RomError> {
        if rom.is_empty() {
            return Err(RomError::Empty);
        }
        if rom.len() > MAX_ROM_SIZE {
            return Err(RomError::TooLarge(rom.len()));
        }
        if options.multiboot && rom.len() > WORKING_RAM_SIZE {
            return Err(RomError::MultibootTooLarge(rom.len()));
        }
        if let Some(bios) = &bios {
            if bios.len() != BIOS_SIZE {
                return Err(RomError::BadBiosSize(bios.len()));
            }
        }

        let cartridge_header = CartridgeHeader::from_rom(&rom);
        tracing::info!(
            "loaded {} KiB ROM \"{}\" ({})",
            rom.len() / 1024,
            cartridge_header.game_title(),
            cartridge_header.game_code()
        );

        let uses_bios = bios.is_some();
        let memory = InternalMemory::new(bios.unwrap_or_default(), rom);
        let bus = Bus::with_memory(memory, uses_bios);

        let mut gba = Self {
            cpu: Arm7tdmi::new(bus),
            cartridge_header,
            options,
            rebuild_backup: true,
        };
        gba.reset();
        Ok(gba)
    }

    /// Reads the whole ROM from `reader`, then builds the system.
    pub fn load_rom(
        mut reader: impl Read,
        bios: Option<Vec<u8>>,
        options: CoreOptions,
    ) -> Result<Self, RomError> {
        let mut rom = Vec::new();
        reader.read_to_end(&mut rom)?;
        Self::new(rom, bios, options)
    }

    /// Power cycle. Battery contents survive unless the save options changed.
    pub fn reset(&mut self) {
        if self.rebuild_backup {
            self.cpu.bus.backup = self.new_backup();
            self.rebuild_backup = false;
        }

        let multiboot = self.options.multiboot;
        let boot_from_bios = self.uses_bios() && !self.options.skip_bios;

        let bus = &mut self.cpu.bus;
        bus.reset();
        bus.memory.clear_ram(multiboot);
        if multiboot {
            bus.memory.load_multiboot_image();
        }
        if !bus.bios_loaded() {
            install_irq_trampoline(&mut bus.memory);
        }

        let entry = if boot_from_bios {
            0
        } else if multiboot {
            MULTIBOOT_ENTRY
        } else {
            CARTRIDGE_ENTRY
        };
        self.cpu.reset(entry, boot_from_bios);
        tracing::debug!("reset, entry at 0x{entry:08X}");
    }

    fn new_backup(&self) -> BackupMemory {
        let mut backup = BackupMemory::new(self.options.save_type, self.options.flash_size);
        if self.options.detect_save_from_rom {
            backup.detect_from_rom(&self.cpu.bus.memory.rom);
        }
        backup
    }

    /// Runs until the next frame has been displayed.
    pub fn run_frame(&mut self, host: &mut dyn Host) {
        self.run_until_frame_end(host);
    }

    /// Updates KEYINPUT. A stopped CPU is woken when the new state fulfills KEYCNT.
    pub fn set_keypad(&mut self, keypad: &Keypad) {
        let bus = &mut self.cpu.bus;
        bus.io.set(KEYINPUT, keypad.key_input & 0x03FF);

        let key_control = bus.io.get(KEYCNT);
        if bus.scheduler.stopped
            && key_control & 0x4000 != 0
            && keypad_condition(keypad.key_input, key_control)
        {
            bus.io.request_interrupt(Interrupt::Keypad as u16);
            bus.scheduler.force_event();
        }
    }

    #[must_use]
    pub const fn cartridge_header(&self) -> &CartridgeHeader {
        &self.cartridge_header
    }

    #[must_use]
    pub const fn options(&self) -> &CoreOptions {
        &self.options
    }

    /// New options take effect on the next [`Gba::reset`].
    pub fn set_options(&mut self, options: CoreOptions) {
        if options.save_type != self.options.save_type
            || options.flash_size != self.options.flash_size
            || options.detect_save_from_rom != self.options.detect_save_from_rom
        {
            self.rebuild_backup = true;
        }
        self.options = options;
    }

    #[must_use]
    pub const fn uses_bios(&self) -> bool {
        self.cpu.bus.bios_loaded()
    }

    pub fn set_trace_hook(&mut self, hook: Box<dyn TraceHook>) {
        self.cpu.bus.set_trace_hook(hook);
    }

    /// Backup memory kind, once detected.
    #[must_use]
    pub const fn save_kind(&self) -> Option<BackupKind> {
        self.cpu.bus.backup.kind()
    }

    /// Contents to write to the battery file.
    #[must_use]
    pub fn battery(&self) -> Option<&[u8]> {
        self.cpu.bus.backup.contents()
    }

    /// Loads a battery file.
    pub fn load_battery(&mut self, data: &[u8]) -> Result<(), BatteryError> {
        self.cpu.bus.backup.import(data)
    }

    /// The game wrote its backup memory since the last [`Gba::mark_battery_saved`].
    #[must_use]
    pub const fn battery_dirty(&self) -> bool {
        self.cpu.bus.backup.is_dirty()
    }

    pub const fn mark_battery_saved(&mut self) {
        self.cpu.bus.backup.clear_dirty();
    }

    pub fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        let header = StateHeader::new(self.cartridge_header.identity(), self.uses_bios());
        save_state::encode(&header, &self.cpu)
    }

    /// Restores a state taken with [`Gba::save_state`]. On error the running
    /// session is left as it was.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let (header, body) = save_state::decode_header(bytes)?;
        if let Err(error) = header.validate(&self.cartridge_header.identity(), self.uses_bios()) {
            tracing::warn!("save state rejected: {error}");
            return Err(error);
        }

        let mut cpu: Arm7tdmi = save_state::decode_body(body)?;

        let old = &mut self.cpu.bus;
        let restored = &mut cpu.bus;
        restored.memory.rom = std::mem::take(&mut old.memory.rom);
        restored.memory.bios_system_rom = std::mem::take(&mut old.memory.bios_system_rom);
        restored.set_trace_hook(old.take_trace_hook());
        cpu.unsupported_swi = std::mem::take(&mut self.cpu.unsupported_swi);

        self.cpu = cpu;
        Ok(())
    }

    pub fn save_state_to_file(&self, path: impl AsRef<Path>) -> Result<(), SaveStateError> {
        std::fs::write(path, self.save_state()?)?;
        Ok(())
    }

    pub fn load_state_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), SaveStateError> {
        let bytes = std::fs::read(path)?;
        self.load_state(&bytes)
    }

    /// Ends the session, handing back the battery contents if they were
    /// written since they were last saved.
    #[must_use]
    pub fn close(self) -> Option<Vec<u8>> {
        if self.battery_dirty() {
            self.battery().map(<[u8]>::to_vec)
        } else {
            None
        }
    }
}

fn install_irq_trampoline(memory: &mut InternalMemory) {
    memory.patch_bios_word(0x18, IRQ_VECTOR_BRANCH);
    for (i, &opcode) in IRQ_TRAMPOLINE.iter().enumerate() {
        memory.patch_bios_word(IRQ_TRAMPOLINE_ADDRESS + i as u32 * 4, opcode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::bus::io_registers::{Fifo, IE, IF, IME, SOUNDCNT_H, SOUNDCNT_X, TIMER_BASE};
    use crate::cpu::hardware::keypad::GbaButton;
    use crate::host::Scanline;
    use crate::options::SaveType;

    #[derive(Default)]
    struct CountingHost {
        lines: Vec<u16>,
        audio_calls: usize,
        samples: usize,
    }

    impl Host for CountingHost {
        fn render_scanline(&mut self, scanline: &Scanline<'_>) {
            self.lines.push(scanline.line);
        }

        fn push_audio_samples(&mut self, samples: &[i16]) {
            self.audio_calls += 1;
            self.samples += samples.len();
        }
    }

    /// `b .` repeated over 192 KiB.
    fn spin_rom() -> Vec<u8> {
        0xEAFF_FFFE_u32.to_le_bytes().repeat(192 * 1024 / 4)
    }

    fn gba() -> Gba {
        Gba::new(spin_rom(), None, CoreOptions::default()).unwrap()
    }

    #[test]
    fn check_rejected_images() {
        let options = CoreOptions::default();
        assert!(matches!(
            Gba::new(vec![], None, options.clone()),
            Err(RomError::Empty)
        ));
        assert!(matches!(
            Gba::new(vec![0; MAX_ROM_SIZE + 1], None, options.clone()),
            Err(RomError::TooLarge(_))
        ));
        assert!(matches!(
            Gba::new(spin_rom(), Some(vec![0; 100]), options.clone()),
            Err(RomError::BadBiosSize(100))
        ));

        let multiboot = CoreOptions {
            multiboot: true,
            ..options
        };
        assert!(matches!(
            Gba::new(vec![0; WORKING_RAM_SIZE + 4], None, multiboot),
            Err(RomError::MultibootTooLarge(_))
        ));
    }

    #[test]
    fn check_load_rom_from_reader() {
        let rom = spin_rom();
        let gba = Gba::load_rom(rom.as_slice(), None, CoreOptions::default()).unwrap();
        assert_eq!(gba.cpu.bus.memory.rom.len(), rom.len());
    }

    #[test]
    fn check_reset_entry() {
        let gba = gba();
        assert_eq!(gba.cpu.next_instruction_address(), 0x0800_0000);
        assert!(!gba.uses_bios());

        let with_bios = Gba::new(spin_rom(), Some(vec![0; BIOS_SIZE]), CoreOptions::default()).unwrap();
        assert_eq!(with_bios.cpu.next_instruction_address(), 0);

        let skip = CoreOptions {
            skip_bios: true,
            ..CoreOptions::default()
        };
        let skipped = Gba::new(spin_rom(), Some(vec![0; BIOS_SIZE]), skip).unwrap();
        assert_eq!(skipped.cpu.next_instruction_address(), 0x0800_0000);
    }

    #[test]
    fn check_multiboot_entry() {
        let options = CoreOptions {
            multiboot: true,
            ..CoreOptions::default()
        };
        let mut gba = Gba::new(vec![0xFE, 0xFF, 0xFF, 0xEA], None, options).unwrap();

        assert_eq!(gba.cpu.next_instruction_address(), 0x0200_0000);
        assert_eq!(gba.cpu.bus.read_word(0x0200_0000), 0xEAFF_FFFE);
    }

    #[test]
    fn check_irq_trampoline_installed() {
        let gba = gba();
        let memory = &gba.cpu.bus.memory;

        assert_eq!(memory.bios_word(0x18), IRQ_VECTOR_BRANCH);
        assert_eq!(memory.bios_word(0x128), 0xE92D_500F);
        assert_eq!(memory.bios_word(0x13C), 0xE25E_F004);
    }

    #[test]
    fn check_one_frame_renders_every_line() {
        let mut gba = gba();
        let mut host = CountingHost::default();

        gba.run_frame(&mut host);

        assert_eq!(host.lines.len(), 160);
        assert_eq!(host.lines, (0..160).collect::<Vec<u16>>());
        assert_eq!(gba.cpu.next_instruction_address(), 0x0800_0000);
        // Lines 0, 53, 106 and 159 flush audio, even with nothing produced.
        assert_eq!(host.audio_calls, 4);
        assert_eq!(host.samples, 0);
    }

    #[test]
    fn check_frames_are_contiguous() {
        let mut gba = gba();
        let mut host = CountingHost::default();

        for _ in 0..3 {
            gba.run_frame(&mut host);
        }
        assert_eq!(host.lines.len(), 480);
    }

    #[test]
    fn check_timer_overflow_sets_if() {
        let mut gba = gba();
        gba.cpu.bus.write_io(TIMER_BASE, 0xFFFF);
        gba.cpu.bus.write_io(TIMER_BASE + 2, 0x00C0);

        gba.run_frame(&mut CountingHost::default());

        assert_eq!(
            gba.cpu.bus.io.get(IF) & Interrupt::Timer0 as u16,
            Interrupt::Timer0 as u16
        );
    }

    #[test]
    fn check_hblank_dma_runs_once_per_visible_line() {
        let mut gba = gba();
        let bus = &mut gba.cpu.bus;
        bus.write_word(0x0400_00D4, 0x0200_0000);
        bus.write_word(0x0400_00D8, 0x0300_0000);
        bus.write_half_word(0x0400_00DC, 1);
        // Enable, HBlank, repeat, 16-bit, destination fixed.
        bus.write_half_word(0x0400_00DE, 0xA240);

        gba.run_frame(&mut CountingHost::default());

        assert_eq!(gba.cpu.bus.dma.channels[3].source, 0x0200_0000 + 160 * 2);
        assert_eq!(gba.cpu.bus.dma.channels[3].destination, 0x0300_0000);
        assert_eq!(gba.cpu.bus.io.get(0xDE), 0xA240);
    }

    #[test]
    fn check_timer_feeds_sound_fifo_by_dma() {
        let mut gba = gba();
        let bus = &mut gba.cpu.bus;
        for offset in (0..0x8000).step_by(4) {
            bus.write_word(0x0200_0000 + offset, 0x1020_3040);
        }

        // FIFO A on timer 0, full volume on both sides.
        bus.write_io(SOUNDCNT_H, 0x0304);
        bus.write_io(SOUNDCNT_X, 0x0080);
        bus.write_word(0x0400_00BC, 0x0200_0000);
        bus.write_word(0x0400_00C0, 0x0400_00A0);
        // Enable, special timing, 32-bit, repeat, destination fixed.
        bus.write_half_word(0x0400_00C6, 0xB640);
        assert_eq!(bus.sound.fifo_len(Fifo::A), 0);

        bus.write_io(TIMER_BASE, 0xFF00);
        bus.write_io(TIMER_BASE + 2, 0x0080);

        let mut host = CountingHost::default();
        gba.run_frame(&mut host);

        let bus = &gba.cpu.bus;
        assert!(bus.sound.fifo_len(Fifo::A) > 0);
        assert!(bus.dma.channels[1].source > 0x0200_0000);
        assert_eq!(bus.dma.channels[1].source % 16, 0);
        assert_eq!(bus.dma.channels[1].destination, 0x0400_00A0);
        assert_eq!(bus.io.get(0xC6), 0xB640);
        assert!(host.samples > 0);
        assert_eq!(host.samples % 2, 0);
    }

    #[test]
    fn check_vblank_irq_enters_trampoline() {
        let mut gba = gba();
        // User handler: `b .` in IWRAM.
        gba.cpu.bus.write_word(0x0300_0000, 0xEAFF_FFFE);
        gba.cpu.bus.write_word(0x0300_7FFC, 0x0300_0000);
        gba.cpu.bus.write_io(0x004, 0x0008);
        gba.cpu.bus.write_io(IE, Interrupt::VBlank as u16);
        gba.cpu.bus.write_io(IME, 1);

        let mut host = CountingHost::default();
        gba.run_frame(&mut host);
        gba.run_frame(&mut host);

        assert_eq!(gba.cpu.next_instruction_address(), 0x0300_0000);
        assert_eq!(gba.cpu.cpsr.mode(), crate::cpu::cpu_modes::Mode::Irq);
    }

    #[test]
    fn check_save_state_round_trip() {
        let mut gba = gba();
        let mut host = CountingHost::default();
        gba.run_frame(&mut host);
        gba.cpu.bus.write_word(0x0200_0100, 0x1234_5678);

        let state = gba.save_state().unwrap();

        gba.run_frame(&mut host);
        gba.cpu.bus.write_word(0x0200_0100, 0);
        gba.cpu.set_reg(3, 99);

        gba.load_state(&state).unwrap();

        assert_eq!(gba.cpu.bus.read_word(0x0200_0100), 0x1234_5678);
        assert_eq!(gba.save_state().unwrap(), state);
        assert_eq!(gba.cpu.bus.memory.rom.len(), 192 * 1024);
        assert_eq!(gba.cpu.bus.memory.bios_word(0x18), IRQ_VECTOR_BRANCH);
    }

    #[test]
    fn check_state_from_other_game_rejected() {
        let mut other_rom = spin_rom();
        other_rom[0xA0..0xA4].copy_from_slice(b"ZELD");
        let other = Gba::new(other_rom, None, CoreOptions::default()).unwrap();
        let foreign = other.save_state().unwrap();

        let mut gba = gba();
        gba.run_frame(&mut CountingHost::default());
        let before = gba.save_state().unwrap();

        assert!(matches!(
            gba.load_state(&foreign),
            Err(SaveStateError::RomMismatch(_))
        ));
        assert!(matches!(
            gba.load_state(&foreign[..3]),
            Err(SaveStateError::Decode(_))
        ));
        assert_eq!(gba.save_state().unwrap(), before);
    }

    #[test]
    fn check_state_with_bios_rejected() {
        let with_bios = Gba::new(spin_rom(), Some(vec![0; BIOS_SIZE]), CoreOptions::default()).unwrap();
        let state = with_bios.save_state().unwrap();

        let mut gba = gba();
        assert!(matches!(
            gba.load_state(&state),
            Err(SaveStateError::BiosMismatch(true))
        ));
    }

    #[test]
    fn check_battery_flow() {
        let options = CoreOptions {
            save_type: SaveType::Sram,
            ..CoreOptions::default()
        };
        let mut gba = Gba::new(spin_rom(), None, options).unwrap();
        assert_eq!(gba.save_kind(), Some(BackupKind::Sram));

        gba.load_battery(&[0x42; 0x8000]).unwrap();
        assert!(!gba.battery_dirty());
        assert_eq!(gba.cpu.bus.read_byte(0x0E00_0010), 0x42);

        gba.cpu.bus.write_byte(0x0E00_0010, 0x24);
        assert!(gba.battery_dirty());
        gba.mark_battery_saved();
        assert!(!gba.battery_dirty());

        gba.cpu.bus.write_byte(0x0E00_0011, 0x24);
        let battery = gba.close().unwrap();
        assert_eq!(battery.len(), 0x8000);
        assert_eq!(&battery[0x10..0x12], &[0x24, 0x24]);
    }

    #[test]
    fn check_battery_survives_reset() {
        let mut gba = gba();
        gba.cpu.bus.write_byte(0x0E00_0000, 0x77);
        assert_eq!(gba.save_kind(), Some(BackupKind::Sram));

        gba.reset();
        assert_eq!(gba.cpu.bus.read_byte(0x0E00_0000), 0x77);

        gba.set_options(CoreOptions {
            save_type: SaveType::None,
            ..CoreOptions::default()
        });
        gba.reset();
        assert_eq!(gba.save_kind(), None);
        assert!(matches!(gba.load_battery(&[0; 0x8000]), Err(BatteryError::NoBackupMemory)));
    }

    #[test]
    fn check_keypad_wakes_stopped_cpu() {
        let mut gba = gba();
        gba.cpu.bus.write_io(KEYCNT, 0x4000 | GbaButton::Start as u16);
        gba.cpu.bus.scheduler.stopped = true;

        let mut keypad = Keypad::default();
        gba.set_keypad(&keypad);
        assert_eq!(gba.cpu.bus.io.get(IF) & Interrupt::Keypad as u16, 0);

        keypad.set_button(GbaButton::Start, true);
        gba.set_keypad(&keypad);
        assert_eq!(gba.cpu.bus.io.get(KEYINPUT), 0x03F7);
        assert_ne!(gba.cpu.bus.io.get(IF) & Interrupt::Keypad as u16, 0);
    }

    #[test]
    fn check_trace_hook_sees_io_writes() {
        use std::sync::{Arc, Mutex};

        struct Recorder(Arc<Mutex<Vec<u32>>>);
        impl TraceHook for Recorder {
            fn on_io_write(&mut self, offset: u32, _value: u16) {
                self.0.lock().unwrap().push(offset);
            }
        }

        let offsets = Arc::new(Mutex::new(Vec::new()));
        let mut gba = gba();
        gba.set_trace_hook(Box::new(Recorder(Arc::clone(&offsets))));
        gba.cpu.bus.write_half_word(0x0400_0208, 1);

        assert_eq!(*offsets.lock().unwrap(), vec![IME]);
    }
}
