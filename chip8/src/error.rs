//! Result and errors.
use std::fmt::{self, Display, Formatter};

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// VM stopped on a fault, and must be reset before it can run again.
    Fault(Fault),
    /// Attempt to load a program image containing no bytes.
    EmptyProgram,
    /// Attempt to load a bytecode program that can't fit in memory.
    LargeProgram { size: usize },
    /// Font data with an unexpected layout.
    Font(String),
    Io(std::io::Error),
    Fmt(fmt::Error),
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fault(fault) => write!(f, "runtime fault: {}", fault),
            Self::EmptyProgram => write!(f, "program image is empty"),
            Self::LargeProgram { size } => {
                write!(f, "program too large for VM memory: {} bytes", size)
            }
            Self::Font(msg) => write!(f, "font error: {}", msg),
            Self::Io(err) => write!(f, "{}", err),
            Self::Fmt(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Chip8Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fault(fault) => Some(fault),
            Self::Io(err) => Some(err),
            Self::Fmt(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Fault> for Chip8Error {
    fn from(fault: Fault) -> Self {
        Chip8Error::Fault(fault)
    }
}

impl From<std::io::Error> for Chip8Error {
    fn from(err: std::io::Error) -> Self {
        Chip8Error::Io(err)
    }
}

impl From<fmt::Error> for Chip8Error {
    fn from(err: fmt::Error) -> Self {
        Chip8Error::Fmt(err)
    }
}

/// Conditions that stop the interpreter loop.
///
/// The program counter `pc` is always the address of the instruction
/// that caused the fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// No dispatch table entry matches the instruction word.
    Decode { pc: usize, word: u16 },
    /// Program counter does not point at two bytes inside memory.
    ProgramCounter { pc: usize },
    /// Memory access outside of the address space.
    MemoryAccess { pc: usize, address: usize },
    /// Subroutine call nested deeper than the call stack allows.
    StackOverflow { pc: usize },
    /// Return from subroutine with an empty call stack.
    StackUnderflow { pc: usize },
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { pc, word } => {
                write!(f, "{:04X}: unsupported opcode {:04X}", pc, word)
            }
            Self::ProgramCounter { pc } => {
                write!(f, "{:04X}: program counter out of memory bounds", pc)
            }
            Self::MemoryAccess { pc, address } => {
                write!(f, "{:04X}: memory access out of bounds at {:04X}", pc, address)
            }
            Self::StackOverflow { pc } => write!(f, "{:04X}: call stack overflow", pc),
            Self::StackUnderflow { pc } => write!(f, "{:04X}: call stack underflow", pc),
        }
    }
}

impl std::error::Error for Fault {}
