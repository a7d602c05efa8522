//! Game Boy Advance emulation core.
//!
//! [`gba::Gba`] owns the whole system. The host builds it from a ROM image,
//! then calls [`gba::Gba::run_frame`] once per frame with a [`host::Host`]
//! that receives the scanlines and the audio samples.

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
mod bitwise;

#[allow(clippy::missing_panics_doc)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::large_stack_frames)]
#[allow(clippy::unreadable_literal)]
pub mod bus;

#[allow(clippy::similar_names)]
pub mod cartridge_header;
pub mod cpu;
pub mod error;

#[allow(clippy::cast_possible_truncation)]
pub mod gba;
pub mod host;
pub mod options;
mod ring_buffer;
pub mod save_state;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_sign_loss)]
pub mod scheduler;
