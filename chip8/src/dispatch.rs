//! Opcode dispatch table.
//!
//! Instructions are identified by testing the fetched word against an
//! ordered list of `(pattern, mask)` pairs. The first entry where
//! `word & mask == pattern` wins. Order matters, because the `SYS addr`
//! pattern `0NNN` also matches `00E0` and `00EE`.
use std::fmt::{self, Formatter};

use crate::decode::*;

/// Instruction identity, resolved from the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Op {
    /// 0nnn (SYS addr)
    ///
    /// Call a machine code routine on the original hardware. Ignored.
    Sys,
    /// 00E0 (CLS)
    ///
    /// Clear the screen.
    ClearScreen,
    /// 00EE (RET)
    ///
    /// Return from the sub-routine.
    Return,
    /// 1nnn (JP addr)
    JumpAddress,
    /// 2nnn (CALL addr)
    Call,
    /// 3xnn (SE Vx, byte)
    Skip_Eq_Byte,
    /// 4xnn (SNE Vx, byte)
    Skip_NotEq_Byte,
    /// 5xy0 (SE Vx, Vy)
    Skip_Eq,
    /// 6xnn (LD Vx, byte)
    Load_Byte,
    /// 7xnn (ADD Vx, byte)
    Add_Byte,

    // ------------------------------------------------------------------------
    // Math
    /// 8xy0 (LD Vx, Vy)
    Load_Vx_Vy,
    /// 8xy1 (OR Vx, Vy)
    Or_Vx_Vy,
    /// 8xy2 (AND Vx, Vy)
    And_Vx_Vy,
    /// 8xy3 (XOR Vx, Vy)
    Xor_Vx_Vy,
    /// 8xy4 (ADD Vx, Vy)
    Add_Vx_Vy,
    /// 8xy5 (SUB Vx, Vy)
    Sub_Vx_Vy,
    /// 8xy6 (SHR Vx, Vy)
    ShiftRight,
    /// 8xy7 (SUBN Vx, Vy)
    SubReverse_Vx_Vy,
    /// 8xyE (SHL Vx, Vy)
    ShiftLeft,

    /// 9xy0 (SNE Vx, Vy)
    Skip_NotEq,
    /// Annn (LD I, addr)
    Load_Address,
    /// Bnnn (JP V0, addr)
    Jump_V0,
    /// Cxnn (RND Vx, byte)
    Random,
    /// Dxyn (DRW Vx, Vy, nibble)
    Draw,

    // ------------------------------------------------------------------------
    // Keyboard
    /// Ex9E (SKP Vx)
    Skip_Key,
    /// ExA1 (SKNP Vx)
    Skip_NotKey,

    // ------------------------------------------------------------------------
    // Misc
    /// Fx07 (LD Vx, DT)
    Load_Delay,
    /// Fx0A (LD Vx, K)
    Wait_Key,
    /// Fx15 (LD DT, Vx)
    Set_Delay,
    /// Fx18 (LD ST, Vx)
    Set_Sound,
    /// Fx1E (ADD I, Vx)
    Add_Address,
    /// Fx29 (LD F, Vx)
    Load_Font,
    /// Fx33 (LD B, Vx)
    Store_Bcd,
    /// Fx55 (LD [I], Vx)
    Store_Registers,
    /// Fx65 (LD Vx, [I])
    Load_Registers,
}

/// Single row of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub pattern: u16,
    pub mask: u16,
    pub op: Op,
}

impl Entry {
    #[inline(always)]
    pub const fn matches(&self, word: u16) -> bool {
        word & self.mask == self.pattern
    }
}

const fn entry(pattern: u16, mask: u16, op: Op) -> Entry {
    Entry { pattern, mask, op }
}

/// The 35 instructions of the canonical instruction set, in match order.
#[rustfmt::skip]
pub const DISPATCH_TABLE: [Entry; 35] = [
    entry(0x00E0, 0xFFFF, Op::ClearScreen),
    entry(0x00EE, 0xFFFF, Op::Return),
    // Must come after the other 0x0___ instructions.
    entry(0x0000, 0xF000, Op::Sys),
    entry(0x1000, 0xF000, Op::JumpAddress),
    entry(0x2000, 0xF000, Op::Call),
    entry(0x3000, 0xF000, Op::Skip_Eq_Byte),
    entry(0x4000, 0xF000, Op::Skip_NotEq_Byte),
    entry(0x5000, 0xF00F, Op::Skip_Eq),
    entry(0x6000, 0xF000, Op::Load_Byte),
    entry(0x7000, 0xF000, Op::Add_Byte),
    entry(0x8000, 0xF00F, Op::Load_Vx_Vy),
    entry(0x8001, 0xF00F, Op::Or_Vx_Vy),
    entry(0x8002, 0xF00F, Op::And_Vx_Vy),
    entry(0x8003, 0xF00F, Op::Xor_Vx_Vy),
    entry(0x8004, 0xF00F, Op::Add_Vx_Vy),
    entry(0x8005, 0xF00F, Op::Sub_Vx_Vy),
    entry(0x8006, 0xF00F, Op::ShiftRight),
    entry(0x8007, 0xF00F, Op::SubReverse_Vx_Vy),
    entry(0x800E, 0xF00F, Op::ShiftLeft),
    entry(0x9000, 0xF00F, Op::Skip_NotEq),
    entry(0xA000, 0xF000, Op::Load_Address),
    entry(0xB000, 0xF000, Op::Jump_V0),
    entry(0xC000, 0xF000, Op::Random),
    entry(0xD000, 0xF000, Op::Draw),
    entry(0xE09E, 0xF0FF, Op::Skip_Key),
    entry(0xE0A1, 0xF0FF, Op::Skip_NotKey),
    entry(0xF007, 0xF0FF, Op::Load_Delay),
    entry(0xF00A, 0xF0FF, Op::Wait_Key),
    entry(0xF015, 0xF0FF, Op::Set_Delay),
    entry(0xF018, 0xF0FF, Op::Set_Sound),
    entry(0xF01E, 0xF0FF, Op::Add_Address),
    entry(0xF029, 0xF0FF, Op::Load_Font),
    entry(0xF033, 0xF0FF, Op::Store_Bcd),
    entry(0xF055, 0xF0FF, Op::Store_Registers),
    entry(0xF065, 0xF0FF, Op::Load_Registers),
];

/// Find the instruction identified by the given word.
///
/// Returns `None` when no table entry matches, which is a decode fault.
#[inline]
pub fn lookup(word: u16) -> Option<Op> {
    DISPATCH_TABLE
        .iter()
        .find(|entry| entry.matches(word))
        .map(|entry| entry.op)
}

/// Decoded instruction, suitable for printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub word: u16,
    pub op: Option<Op>,
}

impl Instr {
    pub fn decode(word: u16) -> Self {
        Self {
            word,
            op: lookup(word),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let word = self.word;
        let Operands { nnn, nn, n, x, y } = Operands::decode(word);

        let op = match self.op {
            Some(op) => op,
            None => return write!(f, "0x{word:04X}"),
        };

        match op {
            Op::Sys => write!(f, "SYS 0x{nnn:03X}"),
            Op::ClearScreen => write!(f, "CLS"),
            Op::Return => write!(f, "RET"),
            Op::JumpAddress => write!(f, "JP 0x{nnn:03X}"),
            Op::Call => write!(f, "CALL 0x{nnn:03X}"),
            Op::Skip_Eq_Byte => write!(f, "SE v{x:X}, {nn}"),
            Op::Skip_NotEq_Byte => write!(f, "SNE v{x:X}, {nn}"),
            Op::Skip_Eq => write!(f, "SE v{x:X}, v{y:X}"),
            Op::Load_Byte => write!(f, "LD v{x:X}, {nn}"),
            Op::Add_Byte => write!(f, "ADD v{x:X}, {nn}"),
            // ------
            Op::Load_Vx_Vy => write!(f, "LD v{x:X}, v{y:X}"),
            Op::Or_Vx_Vy => write!(f, "OR v{x:X}, v{y:X}"),
            Op::And_Vx_Vy => write!(f, "AND v{x:X}, v{y:X}"),
            Op::Xor_Vx_Vy => write!(f, "XOR v{x:X}, v{y:X}"),
            Op::Add_Vx_Vy => write!(f, "ADD v{x:X}, v{y:X}"),
            Op::Sub_Vx_Vy => write!(f, "SUB v{x:X}, v{y:X}"),
            Op::ShiftRight => write!(f, "SHR v{x:X}, v{y:X}"),
            Op::SubReverse_Vx_Vy => write!(f, "SUBN v{x:X}, v{y:X}"),
            Op::ShiftLeft => write!(f, "SHL v{x:X}, v{y:X}"),
            // ------
            Op::Skip_NotEq => write!(f, "SNE v{x:X}, v{y:X}"),
            Op::Load_Address => write!(f, "LD I, 0x{nnn:03X}"),
            Op::Jump_V0 => write!(f, "JP v0, 0x{nnn:03X}"),
            Op::Random => write!(f, "RND v{x:X}, {nn}"),
            Op::Draw => write!(f, "DRW v{x:X}, v{y:X}, {n}"),
            Op::Skip_Key => write!(f, "SKP v{x:X}"),
            Op::Skip_NotKey => write!(f, "SKNP v{x:X}"),
            // ------
            Op::Load_Delay => write!(f, "LD v{x:X}, DT"),
            Op::Wait_Key => write!(f, "LD v{x:X}, K"),
            Op::Set_Delay => write!(f, "LD DT, v{x:X}"),
            Op::Set_Sound => write!(f, "LD ST, v{x:X}"),
            Op::Add_Address => write!(f, "ADD I, v{x:X}"),
            Op::Load_Font => write!(f, "LD F, v{x:X}"),
            Op::Store_Bcd => write!(f, "LD B, v{x:X}"),
            Op::Store_Registers => write!(f, "LD [I], v{x:X}"),
            Op::Load_Registers => write!(f, "LD v{x:X}, [I]"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_specific_patterns_win() {
        assert_eq!(lookup(0x00E0), Some(Op::ClearScreen));
        assert_eq!(lookup(0x00EE), Some(Op::Return));
        assert_eq!(lookup(0x0123), Some(Op::Sys));
        assert_eq!(lookup(0x0000), Some(Op::Sys));
    }

    #[test]
    fn test_every_entry_reachable() {
        for entry in DISPATCH_TABLE.iter() {
            assert_eq!(
                lookup(entry.pattern),
                Some(entry.op),
                "pattern {:04X}",
                entry.pattern
            );
        }

        let unique: HashSet<Op> = DISPATCH_TABLE.iter().map(|entry| entry.op).collect();
        assert_eq!(unique.len(), DISPATCH_TABLE.len());
    }

    /// Apart from the 0NNN overlap, patterns are disjoint.
    #[test]
    fn test_at_most_one_match() {
        for word in 0..=u16::MAX {
            let count = DISPATCH_TABLE.iter().filter(|e| e.matches(word)).count();
            match word {
                0x00E0 | 0x00EE => assert_eq!(count, 2),
                _ => assert!(count <= 1, "word {:04X} matched {} entries", word, count),
            }
        }
    }

    #[test]
    fn test_unmatched_words() {
        assert_eq!(lookup(0x5121), None);
        assert_eq!(lookup(0x800F), None);
        assert_eq!(lookup(0x9AB1), None);
        assert_eq!(lookup(0xE19F), None);
        assert_eq!(lookup(0xF0FF), None);
    }

    #[test]
    fn test_instr_display() {
        assert_eq!(Instr::decode(0x00E0).to_string(), "CLS");
        assert_eq!(Instr::decode(0x2ABC).to_string(), "CALL 0xABC");
        assert_eq!(Instr::decode(0xD01F).to_string(), "DRW v0, v1, 15");
        assert_eq!(Instr::decode(0xFA65).to_string(), "LD vA, [I]");
        assert_eq!(Instr::decode(0xF0FF).to_string(), "0xF0FF");
    }
}
