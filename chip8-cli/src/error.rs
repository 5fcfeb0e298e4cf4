//! Application errors
use std::fmt;

use chip8::{Chip8Error, Fault};

/// FreeBSD sysexits
const EX_USAGE: i32 = 64;
const EX_DATAERR: i32 = 65;
const EX_NOINPUT: i32 = 66;
const EX_CONFIG: i32 = 78;

#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
}

impl std::error::Error for AppError {}

#[derive(Debug)]
pub enum ErrorKind {
    /// Missing program path on the command line.
    Usage,
    /// Program image could not be read.
    Read { path: String, err: std::io::Error },
    Chip8(Chip8Error),
    Io(std::io::Error),
    Conf(serde_yaml::Error),
    /// Configuration file could not be read.
    ConfRead { path: String, err: std::io::Error },
}

impl AppError {
    pub fn usage() -> Self {
        Self {
            kind: ErrorKind::Usage,
        }
    }

    pub fn read(path: impl ToString, err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Read {
                path: path.to_string(),
                err,
            },
        }
    }

    pub fn conf_read(path: impl ToString, err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::ConfRead {
                path: path.to_string(),
                err,
            },
        }
    }

    /// Process exit code for the error.
    pub fn exit_code(&self) -> i32 {
        match &self.kind {
            ErrorKind::Usage => EX_USAGE,
            ErrorKind::Read { .. } => EX_NOINPUT,
            ErrorKind::Chip8(Chip8Error::EmptyProgram | Chip8Error::LargeProgram { .. }) => {
                EX_DATAERR
            }
            ErrorKind::Conf(_) | ErrorKind::ConfRead { .. } => EX_CONFIG,
            ErrorKind::Chip8(_) | ErrorKind::Io(_) => 1,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "application error: {}", self.kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage => write!(f, "no filename supplied"),
            Self::Read { path, err } => write!(f, "file unreadable: {path}: {err}"),
            Self::Chip8(Chip8Error::EmptyProgram) => write!(f, "zero bytes read"),
            Self::Chip8(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Conf(err) => write!(f, "configuration: {err}"),
            Self::ConfRead { path, err } => write!(f, "configuration unreadable: {path}: {err}"),
        }
    }
}

impl From<Chip8Error> for AppError {
    fn from(err: Chip8Error) -> Self {
        Self {
            kind: ErrorKind::Chip8(err),
        }
    }
}

impl From<Fault> for AppError {
    fn from(fault: Fault) -> Self {
        Chip8Error::Fault(fault).into()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Io(err),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self {
            kind: ErrorKind::Conf(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_errors_are_distinct() {
        let usage = AppError::usage();
        let unreadable = AppError::read(
            "missing.ch8",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        let empty = AppError::from(Chip8Error::EmptyProgram);

        assert_eq!(usage.exit_code(), 64);
        assert_eq!(unreadable.exit_code(), 66);
        assert_eq!(empty.exit_code(), 65);

        assert!(usage.to_string().contains("no filename supplied"));
        assert!(unreadable.to_string().contains("file unreadable: missing.ch8"));
        assert!(empty.to_string().contains("zero bytes read"));
    }

    #[test]
    fn test_fault_exit_code() {
        let err = AppError::from(Fault::StackUnderflow { pc: 0x200 });
        assert_eq!(err.exit_code(), 1);
    }
}
