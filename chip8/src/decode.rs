//! Helpers for extracting operands from instruction words.
//!
//! Instructions are 16-bit big-endian words. The operand fields overlap,
//! and which of them are meaningful depends on the opcode:
//!
//! ```text
//! word: 0xDXYN
//!       |||+- n   (0x000F)
//!       ||+-- y   (0x00F0)
//!       |+--- x   (0x0F00)
//!       +---- op  (0xF000)
//!        +++- nnn (0x0FFF)
//!         ++- nn  (0x00FF)
//! ```
use crate::constants::Address;

/// Assemble an instruction word from the two bytes in memory.
#[inline(always)]
pub fn word(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// Extract the opcode identity from the upper nibble.
#[inline(always)]
pub fn op_code(word: u16) -> u8 {
    ((word & 0xF000) >> 12) as u8
}

/// Extract operand NNN, a 12-bit address.
#[inline(always)]
pub fn op_nnn(word: u16) -> Address {
    word & 0x0FFF
}

/// Extract operand NN, an 8-bit constant.
#[inline(always)]
pub fn op_nn(word: u16) -> u8 {
    (word & 0x00FF) as u8
}

/// Extract operand N, a 4-bit constant.
#[inline(always)]
pub fn op_n(word: u16) -> u8 {
    (word & 0x000F) as u8
}

/// Extract register index X.
#[inline(always)]
pub fn op_x(word: u16) -> u8 {
    ((word & 0x0F00) >> 8) as u8
}

/// Extract register index Y.
#[inline(always)]
pub fn op_y(word: u16) -> u8 {
    ((word & 0x00F0) >> 4) as u8
}

/// Extract operands VX and NN.
#[inline(always)]
pub fn op_xnn(word: u16) -> (u8, u8) {
    (op_x(word), op_nn(word))
}

/// Extract operands VX and VY.
#[inline(always)]
pub fn op_xy(word: u16) -> (u8, u8) {
    (op_x(word), op_y(word))
}

/// Extract operands VX, VY and N.
#[inline(always)]
pub fn op_xyn(word: u16) -> (u8, u8, u8) {
    (op_x(word), op_y(word), op_n(word))
}

/// All operand fields of an instruction word, decoded at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    pub nnn: Address,
    pub nn: u8,
    pub n: u8,
    pub x: u8,
    pub y: u8,
}

impl Operands {
    #[inline]
    pub fn decode(word: u16) -> Self {
        Self {
            nnn: op_nnn(word),
            nn: op_nn(word),
            n: op_n(word),
            x: op_x(word),
            y: op_y(word),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_fields() {
        let ops = Operands::decode(0xD12F);
        assert_eq!(ops.nnn, 0x12F);
        assert_eq!(ops.nn, 0x2F);
        assert_eq!(ops.n, 0xF);
        assert_eq!(ops.x, 0x1);
        assert_eq!(ops.y, 0x2);
        assert_eq!(op_code(0xD12F), 0xD);
    }

    #[test]
    fn test_word_is_big_endian() {
        assert_eq!(word([0xA2, 0x0A]), 0xA20A);
        assert_eq!(op_xyn(word([0x8A, 0xB4])), (0xA, 0xB, 0x4));
    }

    #[test]
    fn test_decode_extremes() {
        assert_eq!(
            Operands::decode(0x0000),
            Operands { nnn: 0, nn: 0, n: 0, x: 0, y: 0 }
        );
        assert_eq!(
            Operands::decode(0xFFFF),
            Operands { nnn: 0xFFF, nn: 0xFF, n: 0xF, x: 0xF, y: 0xF }
        );
    }
}
