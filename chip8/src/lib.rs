//! Interpreter core for the Chip-8 virtual machine.
pub mod constants;
mod cpu;
pub mod decode;
mod devices;
mod disasm;
pub mod dispatch;
mod display;
mod error;
mod runner;
mod timer;
mod vm;

pub use self::{
    devices::{Devices, InputLatch, InvalidKeyCode, KeyCode, KeyEvent, SharedInput},
    display::{Framebuffer, SharedDisplay, SpriteEdge},
    error::{Chip8Error, Chip8Result, Fault},
    runner::{RunEvent, RunnerHandle, StopSignal},
    timer::TickCounter,
    vm::{DecodePolicy, Flow, Hz, MachineState, TimerMode},
};

/// Version of the interpreter core.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        devices::{Devices, KeyCode, KeyEvent},
        disasm::Disassembler,
        error::{Chip8Error, Chip8Result, Fault},
        runner::{RunEvent, RunnerHandle},
        vm::{Chip8Conf, Chip8Vm, Flow, MachineState},
    };
}
