//! IO device interface
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{constants::*, display::Framebuffer};

/// Hooks for the host to present the VM's output.
///
/// Called from the host thread, never from the interpreter loop.
pub trait Devices {
    /// Blit the display buffer to screen output.
    fn draw(&mut self, display: &Framebuffer);

    /// Turn the sound buzzer on or off.
    fn buzz(&mut self, state: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8"))]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    #[inline]
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = InvalidKeyCode;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        match key_id {
            0 => Ok(Self::Key0),
            1 => Ok(Self::Key1),
            2 => Ok(Self::Key2),
            3 => Ok(Self::Key3),
            4 => Ok(Self::Key4),
            5 => Ok(Self::Key5),
            6 => Ok(Self::Key6),
            7 => Ok(Self::Key7),
            8 => Ok(Self::Key8),
            9 => Ok(Self::Key9),
            10 => Ok(Self::KeyA),
            11 => Ok(Self::KeyB),
            12 => Ok(Self::KeyC),
            13 => Ok(Self::KeyD),
            14 => Ok(Self::KeyE),
            15 => Ok(Self::KeyF),
            _ => Err(InvalidKeyCode(key_id)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidKeyCode(pub u8);

impl std::error::Error for InvalidKeyCode {}

impl std::fmt::Display for InvalidKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "keycode must be in range 0 <= keycode < 16, got {}", self.0)
    }
}

/// Key transition produced by the host input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn press(key: KeyCode) -> Self {
        Self { key, pressed: true }
    }

    pub fn release(key: KeyCode) -> Self {
        Self {
            key,
            pressed: false,
        }
    }
}

/// Keyboard input state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputLatch {
    /// Pressed is a 1 bit, released is a 0 bit.
    key_state: u16,
    /// Last key to go down. Only cleared once every key is up.
    last_pressed: Option<KeyCode>,
    /// Most recent key to go down, kept after release.
    latest: Option<KeyCode>,
    /// Count of released-to-pressed transitions.
    presses: u64,
}

impl InputLatch {
    pub fn new() -> Self {
        Default::default()
    }

    /// Apply a key transition.
    pub fn apply(&mut self, event: KeyEvent) {
        let bit = 1 << event.key.as_u8();

        if event.pressed {
            if self.key_state & bit == 0 {
                self.presses = self.presses.wrapping_add(1);
            }
            self.key_state |= bit;
            self.last_pressed = Some(event.key);
            self.latest = Some(event.key);
        } else {
            self.key_state &= !bit;
            if self.key_state == 0 {
                self.last_pressed = None;
            }
        }
    }

    /// Checks whether the key with the given id is pressed.
    ///
    /// Ids outside of the keyboard are never pressed.
    #[inline]
    pub fn is_pressed(&self, key_id: u8) -> bool {
        key_id < KEY_COUNT && self.key_state & (1 << key_id) != 0
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state != 0
    }

    #[inline]
    pub fn last_pressed(&self) -> Option<KeyCode> {
        self.last_pressed
    }

    /// Last pressed key as a signed index, with -1 meaning none.
    #[inline]
    pub fn last_pressed_index(&self) -> i8 {
        self.last_pressed.map(|k| k.as_u8() as i8).unwrap_or(-1)
    }

    #[inline]
    pub(crate) fn latest(&self) -> Option<KeyCode> {
        self.latest
    }

    #[inline]
    pub(crate) fn presses(&self) -> u64 {
        self.presses
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Input latch shared between the host input thread and the interpreter.
///
/// The host is the only writer.
#[derive(Debug, Clone, Default)]
pub struct SharedInput(Arc<Mutex<InputLatch>>);

impl SharedInput {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, InputLatch> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a key transition atomically.
    pub fn apply(&self, event: KeyEvent) {
        self.lock().apply(event)
    }

    pub fn snapshot(&self) -> InputLatch {
        *self.lock()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut latch = InputLatch::new();

        latch.apply(KeyEvent::press(KeyCode::Key0));
        assert_eq!(latch.key_state, 0b00000000_00000001);
        assert!(latch.is_pressed(0));
        assert!(!latch.is_pressed(1));
        assert!(!latch.is_pressed(7));

        latch.apply(KeyEvent::press(KeyCode::Key7));
        assert_eq!(latch.key_state, 0b00000000_10000001);
        assert!(latch.is_pressed(7));

        latch.apply(KeyEvent::release(KeyCode::Key0));
        assert_eq!(latch.key_state, 0b00000000_10000000);
        assert!(!latch.is_pressed(0));

        latch.apply(KeyEvent::press(KeyCode::KeyF));
        assert_eq!(latch.key_state, 0b10000000_10000000);
        assert!(latch.is_pressed(15));
        assert!(!latch.is_pressed(16));
        assert!(!latch.is_pressed(0xFF));
    }

    #[test]
    fn test_last_pressed_cleared_when_all_released() {
        let mut latch = InputLatch::new();
        assert_eq!(latch.last_pressed_index(), -1);

        latch.apply(KeyEvent::press(KeyCode::Key3));
        latch.apply(KeyEvent::press(KeyCode::KeyA));
        assert_eq!(latch.last_pressed(), Some(KeyCode::KeyA));

        latch.apply(KeyEvent::release(KeyCode::KeyA));
        assert_eq!(latch.last_pressed(), Some(KeyCode::KeyA));

        latch.apply(KeyEvent::release(KeyCode::Key3));
        assert_eq!(latch.last_pressed(), None);
        assert_eq!(latch.last_pressed_index(), -1);
        assert_eq!(latch.latest(), Some(KeyCode::KeyA));
    }

    #[test]
    fn test_repeat_press_is_not_a_transition() {
        let mut latch = InputLatch::new();
        latch.apply(KeyEvent::press(KeyCode::Key1));
        latch.apply(KeyEvent::press(KeyCode::Key1));
        assert_eq!(latch.presses(), 1);

        latch.apply(KeyEvent::release(KeyCode::Key1));
        latch.apply(KeyEvent::press(KeyCode::Key1));
        assert_eq!(latch.presses(), 2);
    }

    #[test]
    fn test_keycode_conversion() {
        assert_eq!(KeyCode::try_from(0xB), Ok(KeyCode::KeyB));
        assert_eq!(KeyCode::try_from(16), Err(InvalidKeyCode(16)));
        assert_eq!(u8::from(KeyCode::KeyF), 15);
        assert_eq!(KeyCode::KeyC.to_string(), "kc");
    }
}
