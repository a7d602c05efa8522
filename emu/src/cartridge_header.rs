/// The first 0xC0 bytes of a Game Pak image.
///
/// Nothing in the header is required to run a game: homebrew and multiboot
/// images often leave it blank, so parsing never fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartridgeHeader {
    rom_entry_point: u32,
    game_title: [u8; 12],
    game_code: [u8; 4],
    maker_code: [u8; 2],
    fixed_value: u8,
    software_version: u8,
    complement_check: u8,
}

const HEADER_SIZE: usize = 0xC0;

impl CartridgeHeader {
    #[must_use]
    pub fn from_rom(rom: &[u8]) -> Self {
        let mut data = [0; HEADER_SIZE];
        let len = rom.len().min(HEADER_SIZE);
        data[..len].copy_from_slice(&rom[..len]);

        let mut game_title = [0; 12];
        game_title.copy_from_slice(&data[0xA0..0xAC]);
        let mut game_code = [0; 4];
        game_code.copy_from_slice(&data[0xAC..0xB0]);

        let header = Self {
            rom_entry_point: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            game_title,
            game_code,
            maker_code: [data[0xB0], data[0xB1]],
            fixed_value: data[0xB2],
            software_version: data[0xBC],
            complement_check: data[0xBD],
        };

        if header.fixed_value != 0x96 {
            tracing::debug!("header fixed value is 0x{:02X}", header.fixed_value);
        }
        let checksum = complement(&data);
        if checksum != header.complement_check {
            tracing::debug!(
                "header checksum is 0x{:02X}, expected 0x{checksum:02X}",
                header.complement_check
            );
        }

        header
    }

    /// 32bit ARM branch opcode
    #[must_use]
    pub const fn rom_entry_point(&self) -> u32 {
        self.rom_entry_point
    }

    /// Uppercase ASCII, padded with zeroes.
    #[must_use]
    pub fn game_title(&self) -> String {
        ascii(&self.game_title)
    }

    #[must_use]
    pub fn game_code(&self) -> String {
        ascii(&self.game_code)
    }

    #[must_use]
    pub fn maker_code(&self) -> String {
        ascii(&self.maker_code)
    }

    /// Usually 0x00
    #[must_use]
    pub const fn software_version(&self) -> u8 {
        self.software_version
    }

    #[must_use]
    pub const fn complement_check(&self) -> u8 {
        self.complement_check
    }

    /// Title and game code: what a save state is bound to.
    #[must_use]
    pub fn identity(&self) -> [u8; 16] {
        let mut identity = [0; 16];
        identity[..12].copy_from_slice(&self.game_title);
        identity[12..].copy_from_slice(&self.game_code);
        identity
    }
}

/// Header checksum over 0xA0..0xBD.
fn complement(data: &[u8; HEADER_SIZE]) -> u8 {
    data[0xA0..0xBD]
        .iter()
        .fold(0u8, |acc, &item| acc.wrapping_sub(item))
        .wrapping_sub(0x19)
}

fn ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { '?' })
        .collect()
}
