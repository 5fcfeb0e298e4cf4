//! Terminal presentation of the display and buzzer.
use std::io::{self, Write};

use chip8::{Devices, Framebuffer};

/// Move the cursor to the top left corner.
const CURSOR_HOME: &str = "\x1B[H";
const CLEAR_SCREEN: &str = "\x1B[2J";
const BELL: &str = "\x07";

pub struct TerminalDevices<W: Write> {
    out: W,
    pixel_on: char,
    pixel_off: char,
    buzzer: bool,
    cleared: bool,
}

impl TerminalDevices<io::Stdout> {
    pub fn stdout(pixel_on: char, pixel_off: char) -> Self {
        Self::new(io::stdout(), pixel_on, pixel_off)
    }
}

impl<W: Write> TerminalDevices<W> {
    pub fn new(out: W, pixel_on: char, pixel_off: char) -> Self {
        Self {
            out,
            pixel_on,
            pixel_off,
            buzzer: false,
            cleared: false,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn present(&mut self, display: &Framebuffer) -> io::Result<()> {
        let frame = display
            .dump(self.pixel_on, self.pixel_off)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        if !self.cleared {
            self.out.write_all(CLEAR_SCREEN.as_bytes())?;
            self.cleared = true;
        }
        self.out.write_all(CURSOR_HOME.as_bytes())?;
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()
    }
}

impl<W: Write> Devices for TerminalDevices<W> {
    fn draw(&mut self, display: &Framebuffer) {
        if let Err(err) = self.present(display) {
            log::error!("failed to present display: {err}");
        }
    }

    fn buzz(&mut self, state: bool) {
        // Terminals have no continuous tone, ring once when switched on.
        if state && !self.buzzer {
            let result = self
                .out
                .write_all(BELL.as_bytes())
                .and_then(|_| self.out.flush());
            if let Err(err) = result {
                log::error!("failed to ring bell: {err}");
            }
        }
        self.buzzer = state;
    }
}

#[cfg(test)]
mod test {
    use chip8::{constants::*, SpriteEdge};

    use super::*;

    #[test]
    fn test_draw_frame() {
        let mut display = Framebuffer::new();
        display.draw_sprite(0, 0, &[0b1100_0000], SpriteEdge::Wrap);

        let mut devices = TerminalDevices::new(vec![], '@', '.');
        devices.draw(&display);
        devices.draw(&display);
        let out = String::from_utf8(devices.into_inner()).unwrap();

        assert_eq!(out.matches(CLEAR_SCREEN).count(), 1);
        assert_eq!(out.matches(CURSOR_HOME).count(), 2);
        assert!(out.contains("@@......"));
        assert_eq!(out.matches('@').count(), 4);
        assert_eq!(out.lines().count(), DISPLAY_HEIGHT * 2);
    }

    #[test]
    fn test_bell_rings_once() {
        let mut devices = TerminalDevices::new(vec![], '#', ' ');
        devices.buzz(true);
        devices.buzz(true);
        devices.buzz(false);
        devices.buzz(true);

        let out = devices.into_inner();
        assert_eq!(out.iter().filter(|b| **b == 0x07).count(), 2);
    }
}
