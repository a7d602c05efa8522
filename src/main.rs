use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use emu::gba::Gba;
use emu::host::{Host, Scanline};
use emu::options::{CoreOptions, FlashSize, SaveType};
use tracing_subscriber::EnvFilter;

/// Runs a Game Boy Advance image without a window.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to the ROM (or multiboot) image
    rom: PathBuf,

    /// Path to a 16 KiB BIOS image. Without it the BIOS calls are emulated.
    #[arg(long)]
    bios: Option<PathBuf>,

    /// Battery file. Defaults to the ROM path with a `.sav` extension.
    #[arg(long)]
    battery: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Start at the cartridge entry even when a BIOS is given
    #[arg(long)]
    skip_bios: bool,

    /// Treat the image as a multiboot program
    #[arg(long)]
    multiboot: bool,

    #[arg(long, value_enum, default_value_t = SaveKind::Auto)]
    save_type: SaveKind,

    /// Use a 128 KiB flash chip
    #[arg(long)]
    flash_128k: bool,

    /// Restore this save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state here after the last frame
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Write the log to this file instead of the terminal
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SaveKind {
    Auto,
    None,
    Sram,
    Flash,
    Eeprom,
}

impl From<SaveKind> for SaveType {
    fn from(kind: SaveKind) -> Self {
        match kind {
            SaveKind::Auto => Self::Auto,
            SaveKind::None => Self::None,
            SaveKind::Sram => Self::Sram,
            SaveKind::Flash => Self::Flash,
            SaveKind::Eeprom => Self::Eeprom,
        }
    }
}

/// Counts what the core produces.
#[derive(Default)]
struct HeadlessHost {
    lines: u64,
    samples: u64,
}

impl Host for HeadlessHost {
    fn render_scanline(&mut self, _scanline: &Scanline<'_>) {
        self.lines += 1;
    }

    fn push_audio_samples(&mut self, samples: &[i16]) {
        self.samples += samples.len() as u64;
    }
}

fn init_logging(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    };

    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map_or_else(|| "clementine.log".into(), |name| name.to_os_string());
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_logging(args.log_file.as_deref());

    let rom = match fs::read(&args.rom) {
        Ok(rom) => rom,
        Err(e) => {
            tracing::error!("cannot read {}: {e}", args.rom.display());
            return ExitCode::FAILURE;
        }
    };

    let bios = match args.bios.as_ref().map(fs::read).transpose() {
        Ok(bios) => bios,
        Err(e) => {
            tracing::error!("cannot read the BIOS: {e}");
            return ExitCode::FAILURE;
        }
    };

    let options = CoreOptions {
        skip_bios: args.skip_bios,
        multiboot: args.multiboot,
        save_type: args.save_type.into(),
        flash_size: if args.flash_128k {
            FlashSize::Flash128K
        } else {
            FlashSize::Flash64K
        },
        ..CoreOptions::default()
    };

    let mut gba = match Gba::new(rom, bios, options) {
        Ok(gba) => gba,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let header = gba.cartridge_header();
    tracing::info!(
        "{} [{}] maker {}",
        header.game_title(),
        header.game_code(),
        header.maker_code()
    );

    let battery_path = args
        .battery
        .clone()
        .unwrap_or_else(|| args.rom.with_extension("sav"));
    if battery_path.exists() {
        match fs::read(&battery_path) {
            Ok(data) => {
                if let Err(e) = gba.load_battery(&data) {
                    tracing::warn!("battery file {} ignored: {e}", battery_path.display());
                }
            }
            Err(e) => tracing::warn!("cannot read {}: {e}", battery_path.display()),
        }
    }

    if let Some(path) = &args.load_state {
        if let Err(e) = gba.load_state_from_file(path) {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    }

    let mut host = HeadlessHost::default();
    for _ in 0..args.frames {
        gba.run_frame(&mut host);
    }
    tracing::info!(
        "ran {} frames: {} lines, {} audio samples",
        args.frames,
        host.lines,
        host.samples
    );

    if let Some(path) = &args.save_state {
        if let Err(e) = gba.save_state_to_file(path) {
            tracing::warn!("{e}");
        }
    }

    if let Some(battery) = gba.close() {
        match fs::write(&battery_path, battery) {
            Ok(()) => tracing::info!("battery written to {}", battery_path.display()),
            Err(e) => tracing::warn!("cannot write {}: {e}", battery_path.display()),
        }
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use clap::CommandFactory;

    #[test]
    fn check_log_file_replaces_terminal() {
        let command = Args::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "log_file")
            .and_then(|arg| arg.get_help())
            .map(ToString::to_string);
        assert_eq!(help.as_deref(), Some("Write the log to this file instead of the terminal"));

        let args =
            Args::try_parse_from(["clementine", "game.gba", "--log-file", "run.log"]).unwrap();
        assert_eq!(args.log_file, Some(PathBuf::from("run.log")));
        assert_eq!(args.frames, 60);
    }
}
