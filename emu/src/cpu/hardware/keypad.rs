use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// GBA button bit positions in KEYINPUT register (when pressed are set to 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GbaButton {
    A = 1 << 0,
    B = 1 << 1,
    Select = 1 << 2,
    Start = 1 << 3,
    Right = 1 << 4,
    Left = 1 << 5,
    Up = 1 << 6,
    Down = 1 << 7,
    R = 1 << 8,
    L = 1 << 9,
}

/// Button state as the host sees it, stored in KEYINPUT format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypad {
    pub key_input: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Keypad {
    /// All buttons released.
    #[must_use]
    pub const fn new() -> Self {
        Self { key_input: 0x03FF }
    }

    /// Builds the state from a mask of pressed buttons (bit set = pressed).
    #[must_use]
    pub const fn from_pressed(pressed: u16) -> Self {
        Self {
            key_input: !pressed & 0x03FF,
        }
    }

    /// Set button state: pressed = true, released = false.
    /// KEYINPUT is active-low: bit 0 = pressed, bit 1 = released.
    pub const fn set_button(&mut self, button: GbaButton, pressed: bool) {
        if pressed {
            self.key_input &= !(button as u16);
        } else {
            self.key_input |= button as u16;
        }
    }

    #[must_use]
    pub const fn is_pressed(&self, button: GbaButton) -> bool {
        self.key_input & button as u16 == 0
    }
}

/// True when KEYCNT asks for a keypad interrupt with the keys in `key_input`.
///
/// Bit 15 of KEYCNT selects AND mode (every selected key pressed) instead of
/// OR mode (any selected key pressed).
#[must_use]
pub fn keypad_condition(key_input: u16, key_control: u16) -> bool {
    let pressed = !key_input & 0x03FF;
    let selected = key_control & 0x03FF;

    if key_control.is_bit_on(15) {
        selected != 0 && pressed & selected == selected
    } else {
        pressed & selected != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_set_button() {
        let mut keypad = Keypad::new();
        keypad.set_button(GbaButton::Start, true);
        keypad.set_button(GbaButton::L, true);
        assert_eq!(keypad.key_input, 0x03FF & !(1 << 3) & !(1 << 9));
        assert!(keypad.is_pressed(GbaButton::Start));

        keypad.set_button(GbaButton::Start, false);
        assert!(!keypad.is_pressed(GbaButton::Start));
        assert_eq!(Keypad::from_pressed(1 << 9), keypad);
    }

    #[test]
    fn check_or_condition() {
        let keys = Keypad::from_pressed(GbaButton::A as u16).key_input;
        assert!(keypad_condition(keys, 0x4003));
        assert!(!keypad_condition(keys, 0x4002));
    }

    #[test]
    fn check_and_condition() {
        let only_a = Keypad::from_pressed(GbaButton::A as u16).key_input;
        let a_and_b = Keypad::from_pressed(0b11).key_input;

        assert!(!keypad_condition(only_a, 0xC003));
        assert!(keypad_condition(a_and_b, 0xC003));
        assert!(!keypad_condition(0x03FF, 0xC000));
    }
}
