//! Monochrome display buffer.
use std::{
    fmt::{self, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::constants::*;

/// What happens to sprite pixels that fall past the right or bottom edge.
///
/// The starting coordinate is always wrapped, this only concerns the
/// remainder of the sprite.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SpriteEdge {
    /// Pixels wrap around to the opposite edge.
    #[default]
    Wrap,
    /// Pixels outside the display are discarded.
    Clip,
}

/// Screen buffer of 64x32 cells, one pixel per byte.
///
/// Cells are always 0 or 1.
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    cells: Box<[u8; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self {
            cells: Box::new([0; DISPLAY_BUFFER_SIZE]),
        }
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lit = self.cells.iter().filter(|px| **px != 0).count();
        f.debug_struct("Framebuffer").field("lit", &lit).finish()
    }
}

impl Framebuffer {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    #[inline]
    pub fn cells(&self) -> &[u8; DISPLAY_BUFFER_SIZE] {
        &self.cells
    }

    /// Pixel value at the given coordinate. Out of range coordinates are unlit.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        if x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT {
            self.cells[x + y * DISPLAY_WIDTH]
        } else {
            0
        }
    }

    /// XOR the sprite rows into the buffer, with the top left corner at `(x, y)`.
    ///
    /// The most significant bit of each row is the leftmost pixel.
    ///
    /// Returns `true` when any lit pixel was erased, which is used
    /// by programs for collision detection.
    pub fn draw_sprite(&mut self, x: u8, y: u8, rows: &[u8], edge: SpriteEdge) -> bool {
        let x = x as usize & DISPLAY_WIDTH_MASK;
        let y = y as usize & DISPLAY_HEIGHT_MASK;
        let mut is_erased = false;

        for (r, row) in rows.iter().enumerate() {
            let py = y + r;
            if py >= DISPLAY_HEIGHT && edge == SpriteEdge::Clip {
                break;
            }

            for c in 0..SPRITE_WIDTH {
                let px = x + c;
                if px >= DISPLAY_WIDTH && edge == SpriteEdge::Clip {
                    break;
                }

                if (row >> (7 - c)) & 1 == 0 {
                    continue;
                }

                let d = (px & DISPLAY_WIDTH_MASK) + (py & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;

                // XOR erases a pixel when both the old and new values are 1.
                is_erased |= self.cells[d] == 1;
                self.cells[d] ^= 1;
            }
        }

        is_erased
    }

    /// Render the buffer as text, one line per row.
    pub fn dump(&self, on: char, off: char) -> Result<String, fmt::Error> {
        let mut buf = String::with_capacity((DISPLAY_WIDTH + 1) * DISPLAY_HEIGHT);

        for row in self.cells.chunks(DISPLAY_WIDTH) {
            for px in row {
                buf.write_char(if *px != 0 { on } else { off })?;
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}

/// Display buffer shared between the interpreter and the presentation thread.
///
/// The interpreter is the only writer.
#[derive(Debug, Clone, Default)]
pub struct SharedDisplay(Arc<Mutex<Framebuffer>>);

impl SharedDisplay {
    pub fn new() -> Self {
        Default::default()
    }

    /// Lock the buffer. A poisoned lock still holds a valid buffer.
    pub fn lock(&self) -> MutexGuard<'_, Framebuffer> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the buffer at this point in time.
    pub fn snapshot(&self) -> Framebuffer {
        self.lock().clone()
    }
}
