//! Decompression calls. Every stream starts with a word header:
//!
//! ```text
//!  bits 0-3   data size (Huffman: 4 or 8 bits per symbol)
//!  bits 4-7   compression type
//!  bits 8-31  decompressed size in bytes
//! ```

use crate::bus::Bus;

use super::memory_copy::reads_bios;

/// Where the decompressed bytes go. VRAM ignores byte writes, so the VRAM
/// variants store each pair of bytes as one halfword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Wram,
    Vram,
}

/// Reads the compressed stream and writes the output.
struct Stream<'a> {
    bus: &'a mut Bus,
    source: u32,
    destination: u32,
    target: Target,
    pending: Option<u8>,
}

impl<'a> Stream<'a> {
    /// `source` points past the header.
    const fn new(bus: &'a mut Bus, source: u32, destination: u32, target: Target) -> Self {
        Self {
            bus,
            source,
            destination,
            target,
            pending: None,
        }
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self.bus.read_byte(self.source);
        self.source = self.source.wrapping_add(1);
        byte
    }

    fn push(&mut self, byte: u8) {
        match self.target {
            Target::Wram => {
                self.bus.write_byte(self.destination, byte);
                self.destination = self.destination.wrapping_add(1);
            }
            Target::Vram => match self.pending.take() {
                None => self.pending = Some(byte),
                Some(low) => {
                    self.bus
                        .write_half_word(self.destination, u16::from_le_bytes([low, byte]));
                    self.destination = self.destination.wrapping_add(2);
                }
            },
        }
    }

    /// The byte output `distance` bytes before the next one.
    fn look_back(&mut self, distance: u32) -> u8 {
        let next = self
            .destination
            .wrapping_add(u32::from(self.pending.is_some()));
        let address = next.wrapping_sub(distance);

        match self.pending {
            Some(low) if address == self.destination => low,
            _ => self.bus.read_byte(address),
        }
    }
}

/// Reads the header at `source` and returns the decompressed size, or `None`
/// when the stream lies in the BIOS.
fn stream_length(bus: &mut Bus, source: u32) -> Option<u32> {
    let length = bus.read_word(source & !3) >> 8;
    (!reads_bios(source, length)).then_some(length)
}

/// LZ77: each flag byte, MSB first, tells whether the next 8 blocks are a
/// literal byte or a back reference (4 bits length - 3, 12 bits distance - 1).
pub fn lz77(bus: &mut Bus, source: u32, destination: u32, target: Target) {
    let Some(mut remaining) = stream_length(bus, source) else {
        return;
    };
    let mut stream = Stream::new(bus, (source & !3).wrapping_add(4), destination, target);

    while remaining > 0 {
        let flags = stream.next_byte();
        for block in 0..8 {
            if flags & (0x80 >> block) == 0 {
                let byte = stream.next_byte();
                stream.push(byte);
                remaining -= 1;
            } else {
                let reference = u16::from_be_bytes([stream.next_byte(), stream.next_byte()]);
                let length = (u32::from(reference >> 12) + 3).min(remaining);
                let distance = u32::from(reference & 0x0FFF) + 1;
                for _ in 0..length {
                    let byte = stream.look_back(distance);
                    stream.push(byte);
                }
                remaining -= length;
            }

            if remaining == 0 {
                return;
            }
        }
    }
}

/// Run length: a flag byte with bit 7 set repeats the next byte
/// `(flag & 0x7F) + 3` times, otherwise `(flag & 0x7F) + 1` literal bytes follow.
pub fn run_length(bus: &mut Bus, source: u32, destination: u32, target: Target) {
    let Some(mut remaining) = stream_length(bus, source) else {
        return;
    };
    let mut stream = Stream::new(bus, (source & !3).wrapping_add(4), destination, target);

    while remaining > 0 {
        let flag = stream.next_byte();
        let run = u32::from(flag & 0x7F);

        if flag & 0x80 != 0 {
            let length = (run + 3).min(remaining);
            let byte = stream.next_byte();
            for _ in 0..length {
                stream.push(byte);
            }
            remaining -= length;
        } else {
            let length = (run + 1).min(remaining);
            for _ in 0..length {
                let byte = stream.next_byte();
                stream.push(byte);
            }
            remaining -= length;
        }
    }
}

/// Undoes 8-bit delta filtering.
pub fn diff8(bus: &mut Bus, source: u32, destination: u32, target: Target) {
    let Some(length) = stream_length(bus, source) else {
        return;
    };
    let mut stream = Stream::new(bus, (source & !3).wrapping_add(4), destination, target);

    let mut value = 0_u8;
    for i in 0..length {
        let delta = stream.next_byte();
        value = if i == 0 { delta } else { value.wrapping_add(delta) };
        stream.push(value);
    }
}

/// Undoes 16-bit delta filtering.
pub fn diff16(bus: &mut Bus, source: u32, destination: u32) {
    let Some(length) = stream_length(bus, source) else {
        return;
    };
    let source = (source & !3).wrapping_add(4);
    let destination = destination & !1;

    let mut value = 0_u16;
    for i in 0..length / 2 {
        let delta = bus.read_half_word(source.wrapping_add(i * 2));
        value = if i == 0 { delta } else { value.wrapping_add(delta) };
        bus.write_half_word(destination.wrapping_add(i * 2), value);
    }
}

/// Deepest a symbol can sit in a 512 byte tree.
const MAX_TREE_DEPTH: u32 = 256;

/// Huffman: after the header come the tree size byte, the tree and a stream
/// of words read MSB first.
///
/// Every tree node holds the offset of its children (bits 0-5) and whether
/// the left (bit 7) or right (bit 6) child is a leaf holding a symbol.
pub fn huffman(bus: &mut Bus, source: u32, destination: u32) {
    let source = source & !3;
    let header = bus.read_word(source);
    let Some(mut remaining) = stream_length(bus, source) else {
        return;
    };

    let symbol_bits = header & 0xF;
    if symbol_bits != 4 && symbol_bits != 8 {
        tracing::debug!("Huffman stream with {symbol_bits}-bit symbols ignored");
        return;
    }

    let symbol_mask = (1 << symbol_bits) - 1;

    let tree_size = u32::from(bus.read_byte(source.wrapping_add(4)));
    let root = source.wrapping_add(5);
    let mut stream = source.wrapping_add(4 + (tree_size + 1) * 2);
    let mut destination = destination & !3;

    let mut packed = 0_u32;
    let mut packed_bits = 0;
    let mut node_address = root;
    let mut node = bus.read_byte(root);
    let mut depth = 0;

    while remaining > 0 {
        let bits = bus.read_word(stream);
        stream = stream.wrapping_add(4);

        for bit in (0..32).rev() {
            let right = (bits >> bit) & 1;
            let leaf_flag = if right == 0 { 0x80 } else { 0x40 };
            let leaf = node & leaf_flag != 0;
            let child = (node_address & !1)
                .wrapping_add(u32::from(node & 0x3F) * 2 + 2)
                .wrapping_add(right);
            node_address = child;
            node = bus.read_byte(child);
            depth += 1;

            if !leaf {
                if depth > MAX_TREE_DEPTH {
                    tracing::debug!("Huffman tree at 0x{root:08X} has no leaves");
                    return;
                }
                continue;
            }

            packed |= (u32::from(node) & symbol_mask) << packed_bits;
            packed_bits += symbol_bits;
            node_address = root;
            node = bus.read_byte(root);
            depth = 0;

            if packed_bits == 32 {
                bus.write_word(destination, packed);
                destination = destination.wrapping_add(4);
                packed = 0;
                packed_bits = 0;
                remaining = remaining.saturating_sub(4);
                if remaining == 0 {
                    return;
                }
            }
        }
    }
}
