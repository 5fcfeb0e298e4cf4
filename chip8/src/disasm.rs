//! Disassembler.
use std::fmt::{self, Write as FmtWrite};

use crate::{constants::MEM_START, decode, dispatch::Instr};

/// Prints program images as one instruction per line.
///
/// Addresses are shown as they would be once loaded at [`MEM_START`].
pub struct Disassembler<'a> {
    bytecode: &'a [u8],
    cursor: usize,
}

impl<'a> Disassembler<'a> {
    pub fn new(bytecode: &'a [u8]) -> Self {
        Self {
            bytecode,
            cursor: 0,
        }
    }

    /// Disassemble the whole image into a string.
    pub fn to_text(&mut self) -> Result<String, fmt::Error> {
        let mut s = String::new();
        self.cursor = 0;
        while self.cursor < self.bytecode.len() {
            self.disassemble(&mut s)?;
            self.cursor += 2;
        }
        self.cursor = 0;

        Ok(s)
    }

    /// Write the instruction under the cursor to the given writer.
    pub fn disassemble<W: FmtWrite>(&self, w: &mut W) -> fmt::Result {
        let address = MEM_START + self.cursor;

        match self.bytecode.get(self.cursor..self.cursor + 2) {
            Some(&[a, b]) => {
                let word = decode::word([a, b]);
                writeln!(w, "0x{:04X}  {:04X}  {}", address, word, Instr::decode(word))
            }
            // Images with an odd length have a trailing byte.
            _ => match self.bytecode.get(self.cursor) {
                Some(byte) => writeln!(w, "0x{:04X}  {:02X}", address, byte),
                None => Ok(()),
            },
        }
    }
}
