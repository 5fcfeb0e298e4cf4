//! Virtual machine.
use std::{
    fmt::{self, Write},
    time::Duration,
};

use log::{debug, error, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    constants::*,
    cpu::Chip8Cpu,
    decode::Operands,
    devices::{KeyCode, KeyEvent, SharedInput},
    dispatch::{lookup, Op},
    display::{SharedDisplay, SpriteEdge},
    error::{Chip8Error, Chip8Result, Fault},
    timer::{Clock, TickCounter},
};

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    display: SharedDisplay,
    input: SharedInput,
    clock: Clock,
    timer: TickCounter,
    rng: StdRng,
    state: MachineState,
    /// Press count seen when `Fx0A` started waiting for a key.
    key_wait: Option<u64>,
    /// Interrupt for VM loop.
    trap: bool,
    conf: Chip8Conf,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        Self::with_devices(conf, SharedDisplay::new(), SharedInput::new())
    }

    /// Create a VM drawing to and reading keys from the given shared state.
    pub fn with_devices(conf: Chip8Conf, display: SharedDisplay, input: SharedInput) -> Self {
        let rng = match conf.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut vm = Chip8Vm {
            cpu: Chip8Cpu::new(),
            display,
            input,
            clock: Clock::new(conf.clock_frequency.unwrap_or_default().into()),
            timer: TickCounter::new(),
            rng,
            state: MachineState::Running,
            key_wait: None,
            trap: false,
            conf,
        };
        vm.reset();
        vm
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Load a hexadecimal digit font to the bottom of memory, for use by `Fx29`.
    pub fn load_font(&mut self, fontset: &[u8]) -> Chip8Result<()> {
        if fontset.len() != FONTSET_DATA_LENGTH {
            return Err(Chip8Error::Font(format!(
                "fontset data must be {FONTSET_DATA_LENGTH} bytes, got {}",
                fontset.len()
            )));
        }

        let start = FONTSET_START as usize;
        self.cpu.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(fontset);

        Ok(())
    }

    /// Reset the machine, and load the program image at [`MEM_START`].
    pub fn load_bytecode(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if bytecode.is_empty() {
            return Err(Chip8Error::EmptyProgram);
        }

        if bytecode.len() > MAX_PROGRAM_SIZE {
            return Err(Chip8Error::LargeProgram {
                size: bytecode.len(),
            });
        }

        // Start with clean memory to avoid leaking previous program.
        self.reset();

        // Load program into virtual RAM
        self.cpu.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);
        debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }

    /// Clear all machine state in preparation for a fresh startup.
    ///
    /// This is the only way out of the faulted and halted states.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.display.lock().clear();
        self.input.lock().reset();
        self.clock.reset();
        self.timer.reset();
        self.state = MachineState::Running;
        self.key_wait = None;
        self.trap = false;
    }
}

/// Outcome of a single interpreter cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Stop was requested, and the machine is halted.
    Interrupt,
    /// Program counter has jumped to a new address.
    ///
    /// This is useful for the caller to avoid being
    /// blocked on infinite or long running loops.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// The display buffer changed and should be presented.
    Draw,
    /// The sound timer was set.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// Lifecycle of the interpreter loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineState {
    Running,
    /// Stopped on a fault. Only a reset resumes execution.
    Faulted(Fault),
    /// Stopped by request. Only a reset resumes execution.
    Halted,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Chip8Conf {
    /// Instruction throttle. Runs as fast as possible when `None`.
    pub clock_frequency: Option<Hz>,
    pub unknown_opcode: DecodePolicy,
    pub sprite_edge: SpriteEdge,
    pub timer_mode: TimerMode,
    /// Seed for `Cxnn`. Seeded from system entropy when `None`.
    pub seed: Option<u64>,
}

/// Handling of instruction words that match no dispatch table entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DecodePolicy {
    /// Transition to the faulted state.
    #[default]
    Halt,
    /// Log a warning and continue with the next instruction.
    Skip,
}

/// Source of time for the delay and sound timers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimerMode {
    /// Elapsed wall-clock time is measured once per cycle.
    #[default]
    WallClock,
    /// The host advances time explicitly with [`Chip8Vm::advance_timers`].
    Manual,
}

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// State inspection
impl Chip8Vm {
    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    pub fn pc(&self) -> usize {
        self.cpu.pc
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    /// Value of the address register `I`.
    pub fn address(&self) -> Address {
        self.cpu.address
    }

    pub fn memory(&self) -> &[u8; MEM_SIZE] {
        &self.cpu.ram
    }

    /// Return addresses on the call stack, bottom first.
    pub fn call_stack(&self) -> &[Address] {
        self.cpu.call_stack()
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    /// Whether the buzzer should currently be sounding.
    pub fn buzzer(&self) -> bool {
        self.cpu.buzzer_state
    }

    /// Whether the machine is stalled on `Fx0A`.
    pub fn is_key_waiting(&self) -> bool {
        self.key_wait.is_some()
    }

    /// Handle to the display buffer, for the presentation thread.
    pub fn display(&self) -> &SharedDisplay {
        &self.display
    }

    /// Handle to the input latch, for the host input thread.
    pub fn input(&self) -> &SharedInput {
        &self.input
    }
}

/// Interpreter
impl Chip8Vm {
    /// Sets the keyboard key input state.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.input.apply(KeyEvent { key, pressed });
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.input.lock().reset()
    }

    /// Request the machine to stop at the next cycle boundary.
    ///
    /// A pending `Fx0A` key wait is abandoned, leaving its register untouched.
    pub fn interrupt(&mut self) {
        self.trap = true;
    }

    /// Count down the timers by the ticks completed in `elapsed`.
    pub fn advance_timers(&mut self, elapsed: Duration) {
        let ticks = self.timer.advance(elapsed);
        self.cpu.tick_timers(ticks);
    }

    fn poll_timers(&mut self) {
        if self.conf.timer_mode == TimerMode::WallClock {
            let ticks = self.timer.poll();
            self.cpu.tick_timers(ticks);
        }
    }

    /// Run until the machine is interrupted or faults.
    ///
    /// With no other thread pressing keys, a program waiting for input
    /// will stall forever.
    pub fn execute(&mut self) -> Chip8Result<Flow> {
        loop {
            if self.tick()? == Flow::Interrupt {
                return Ok(Flow::Interrupt);
            }
        }
    }

    /// Run at most `step_count` cycles.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;

        for _ in 0..step_count {
            flow = self.tick()?;
            if flow == Flow::Interrupt {
                break;
            }
        }

        Ok(flow)
    }

    /// Run a single cycle.
    ///
    /// Once the machine has faulted, every call returns the same fault.
    pub fn tick(&mut self) -> Chip8Result<Flow> {
        match &self.state {
            MachineState::Running => {}
            MachineState::Faulted(fault) => return Err(Chip8Error::Fault(fault.clone())),
            MachineState::Halted => return Ok(Flow::Interrupt),
        }

        match self.step() {
            Ok(flow) => Ok(flow),
            Err(fault) => {
                error!("{fault}");
                self.state = MachineState::Faulted(fault.clone());
                self.key_wait = None;
                Err(Chip8Error::Fault(fault))
            }
        }
    }

    fn step(&mut self) -> Result<Flow, Fault> {
        if self.trap {
            // Interrupt signal is set.
            debug!("interrupted at {:04X}", self.cpu.pc);
            self.trap = false;
            self.key_wait = None;
            self.state = MachineState::Halted;
            return Ok(Flow::Interrupt);
        }

        self.clock.wait();

        let pc = self.cpu.pc;
        let word = self.cpu.fetch()?;
        self.cpu.pc += 2;

        let control_flow = match lookup(word) {
            Some(op) => {
                op_trace(pc, word);
                self.exec(op, pc, word)?
            }
            None => match self.conf.unknown_opcode {
                DecodePolicy::Halt => return Err(Fault::Decode { pc, word }),
                DecodePolicy::Skip => {
                    warn!("{:04X}: skipping unsupported opcode {:04X}", pc, word);
                    Flow::Ok
                }
            },
        };

        // Count down timers
        self.poll_timers();

        Ok(control_flow)
    }

    /// Execute a single decoded instruction.
    ///
    /// The program counter has already been advanced past the instruction,
    /// `pc` is its own address.
    fn exec(&mut self, op: Op, pc: usize, word: u16) -> Result<Flow, Fault> {
        let Operands { nnn, nn, n, x, y } = Operands::decode(word);
        let (vx, vy) = (x as usize, y as usize);

        let mut control_flow = Flow::Ok;

        match op {
            // 0NNN (SYS addr)
            //
            // Machine code routines of the original hardware are ignored.
            Op::Sys => { /* No Op */ }
            // 00E0 (CLS)
            //
            // Clear display
            Op::ClearScreen => {
                self.display.lock().clear();
                control_flow = Flow::Draw;
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Set the program counter to the value at the top of the stack.
            Op::Return => {
                self.cpu.pop_return(pc)?;
                control_flow = Flow::Jump;
            }
            // 1NNN (JP addr)
            //
            // Jump to address.
            Op::JumpAddress => {
                self.cpu.pc = nnn as usize;
                control_flow = Flow::Jump;
            }
            // 2NNN (CALL addr)
            //
            // Call subroutine at NNN.
            Op::Call => {
                self.cpu.push_return(pc)?;
                self.cpu.pc = nnn as usize;
                control_flow = Flow::Jump;
            }
            // 3XNN (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            Op::Skip_Eq_Byte => {
                if self.cpu.registers[vx] == nn {
                    self.cpu.pc += 2;
                }
            }
            // 4XNN (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            Op::Skip_NotEq_Byte => {
                if self.cpu.registers[vx] != nn {
                    self.cpu.pc += 2;
                }
            }
            // 5XY0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals value VY.
            Op::Skip_Eq => {
                if self.cpu.registers[vx] == self.cpu.registers[vy] {
                    self.cpu.pc += 2;
                }
            }
            // 6XNN (LD Vx, byte)
            //
            // Set register VX to value NN.
            Op::Load_Byte => {
                self.cpu.registers[vx] = nn;
            }
            // 7XNN (ADD Vx, byte)
            //
            // Add value NN to register VX. Carry flag is not set.
            Op::Add_Byte => {
                self.cpu.registers[vx] = self.cpu.registers[vx].wrapping_add(nn);
            }
            // Arithmetic instructions
            Op::Load_Vx_Vy
            | Op::Or_Vx_Vy
            | Op::And_Vx_Vy
            | Op::Xor_Vx_Vy
            | Op::Add_Vx_Vy
            | Op::Sub_Vx_Vy
            | Op::ShiftRight
            | Op::SubReverse_Vx_Vy
            | Op::ShiftLeft => self.exec_math(op, vx, vy),
            // 9XY0 (SNE Vx, Vy)
            //
            // Skip next instruction if Vx != Vy.
            Op::Skip_NotEq => {
                if self.cpu.registers[vx] != self.cpu.registers[vy] {
                    self.cpu.pc += 2;
                }
            }
            // ANNN (LD I, addr)
            //
            // Set address register I to value NNN.
            Op::Load_Address => {
                self.cpu.address = nnn;
            }
            // BNNN (JP V0, addr)
            //
            // Jump to address NNN offset by register V0.
            Op::Jump_V0 => {
                let target = (nnn + self.cpu.registers[0] as u16) & ADDRESS_MASK;
                self.cpu.pc = target as usize;
                control_flow = Flow::Jump;
            }
            // CXNN (RND Vx, byte)
            //
            // Generate random number.
            // Set register VX to the result of bitwise AND between a random number and NN.
            Op::Random => {
                self.cpu.registers[vx] = nn & self.rng.gen::<u8>();
            }
            // DXYN (DRW Vx, Vy, nibble)
            //
            // Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
            // Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
            // memory pointed to by address register I.
            //
            // If the drawing operation erases existing pixels in the display buffer, register VF is set to
            // 1, and set to 0 if no display bits are unset. This is used for collision detection.
            Op::Draw => {
                let (px, py) = (self.cpu.registers[vx], self.cpu.registers[vy]);
                let rows = self
                    .cpu
                    .mem(pc, self.cpu.address as usize, n as usize)?;
                let is_erased = self
                    .display
                    .lock()
                    .draw_sprite(px, py, rows, self.conf.sprite_edge);

                // If a pixel was erased, then a collision occurred.
                self.cpu.registers[FLAG_REGISTER] = is_erased as u8;
                control_flow = Flow::Draw;
            }
            // ----------------------------------------------------------------
            // EX9E (SKP Vx)
            //
            // Skip the next instruction if the key with the value of Vx is pressed.
            Op::Skip_Key => {
                if self.input.lock().is_pressed(self.cpu.registers[vx]) {
                    self.cpu.pc += 2;
                }
            }
            // EXA1 (SKNP Vx)
            //
            // Skip the next instruction if the key with the value of Vx is not pressed.
            Op::Skip_NotKey => {
                if !self.input.lock().is_pressed(self.cpu.registers[vx]) {
                    self.cpu.pc += 2;
                }
            }
            // ----------------------------------------------------------------
            // FX07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            Op::Load_Delay => {
                self.cpu.registers[vx] = self.cpu.delay_timer;
            }
            // FX0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // All execution stops until a key is pressed, then the value of that key is stored in Vx.
            Op::Wait_Key => control_flow = self.exec_key_wait(vx),
            // FX15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            Op::Set_Delay => {
                self.cpu.delay_timer = self.cpu.registers[vx];
            }
            // FX18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            Op::Set_Sound => {
                self.cpu.sound_timer = self.cpu.registers[vx];
                self.cpu.buzzer_state = self.cpu.sound_timer > 0;
                control_flow = Flow::Sound;
            }
            // FX1E (ADD I, Vx)
            //
            // Add Vx to I. The result is checked when memory is accessed.
            Op::Add_Address => {
                let x = self.cpu.registers[vx] as u16;
                self.cpu.address = self.cpu.address.wrapping_add(x);
            }
            // FX29 (LD F, Vx)
            //
            // Set I = location of font sprite for digit Vx.
            Op::Load_Font => {
                let digit = (self.cpu.registers[vx] & 0xF) as u16;
                self.cpu.address = FONTSET_START + digit * FONTSET_HEIGHT as u16;
            }
            // FX33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            Op::Store_Bcd => {
                let x = self.cpu.registers[vx];
                let addr = self.cpu.address as usize;
                self.cpu
                    .mem_mut(pc, addr, 3)?
                    .copy_from_slice(&[x / 100 % 10, x / 10 % 10, x % 10]);
            }
            // FX55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            // I is left pointing past the last stored value.
            Op::Store_Registers => {
                let count = vx + 1;
                let addr = self.cpu.address;
                let registers = self.cpu.registers;
                self.cpu
                    .mem_mut(pc, addr as usize, count)?
                    .copy_from_slice(&registers[..count]);
                self.cpu.address = addr.wrapping_add(count as u16);
            }
            // FX65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            // I is left pointing past the last loaded value.
            Op::Load_Registers => {
                let count = vx + 1;
                let addr = self.cpu.address;
                let mut values = [0; REGISTER_COUNT];
                values[..count].copy_from_slice(self.cpu.mem(pc, addr as usize, count)?);
                self.cpu.registers[..count].copy_from_slice(&values[..count]);
                self.cpu.address = addr.wrapping_add(count as u16);
            }
        }

        Ok(control_flow)
    }

    /// Execute an arithmetic instruction
    ///
    /// Flags are written after the result, so VF holds the flag
    /// even when it is also the destination.
    #[inline]
    fn exec_math(&mut self, op: Op, vx: usize, vy: usize) {
        let (x, y) = (self.cpu.registers[vx], self.cpu.registers[vy]);

        match op {
            // 8XY0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            Op::Load_Vx_Vy => self.cpu.registers[vx] = y,
            // 8XY1 (OR Vx, Vy)
            Op::Or_Vx_Vy => self.cpu.registers[vx] = x | y,
            // 8XY2 (AND Vx, Vy)
            Op::And_Vx_Vy => self.cpu.registers[vx] = x & y,
            // 8XY3 (XOR Vx, Vy)
            Op::Xor_Vx_Vy => self.cpu.registers[vx] = x ^ y,
            // 8XY4 (ADD Vx, Vy)
            //
            // ADDs VX to VY, and stores the result in VX.
            // Overflow is wrapped.
            // If overflow, set VF to 1, else 0.
            Op::Add_Vx_Vy => {
                let (result, carry) = x.overflowing_add(y);
                self.cpu.registers[vx] = result;
                self.cpu.registers[FLAG_REGISTER] = carry as u8;
            }
            // 8XY5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            Op::Sub_Vx_Vy => {
                let (result, borrow) = x.overflowing_sub(y);
                self.cpu.registers[vx] = result;
                self.cpu.registers[FLAG_REGISTER] = !borrow as u8;
            }
            // 8XY6 (SHR Vx, Vy)
            //
            // Shift VY right by 1, storing the result in both VX and VY.
            // VF is set to the bit shifted out.
            Op::ShiftRight => {
                self.cpu.registers[vx] = y >> 1;
                self.cpu.registers[vy] = y >> 1;
                self.cpu.registers[FLAG_REGISTER] = y & 1;
            }
            // 8XY7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            Op::SubReverse_Vx_Vy => {
                let (result, borrow) = y.overflowing_sub(x);
                self.cpu.registers[vx] = result;
                self.cpu.registers[FLAG_REGISTER] = !borrow as u8;
            }
            // 8XYE (SHL Vx, Vy)
            //
            // Shift VY left by 1, storing the result in both VX and VY.
            // VF is set to the bit shifted out.
            Op::ShiftLeft => {
                self.cpu.registers[vx] = y << 1;
                self.cpu.registers[vy] = y << 1;
                self.cpu.registers[FLAG_REGISTER] = (y >> 7) & 1;
            }
            _ => unreachable!("{op:?} is not an arithmetic instruction"),
        }
    }

    /// Stall on `Fx0A` until a key goes down after the wait started.
    fn exec_key_wait(&mut self, vx: usize) -> Flow {
        let (presses, latest) = {
            let input = self.input.lock();
            (input.presses(), input.latest())
        };

        match (self.key_wait, latest) {
            (Some(seen), Some(key)) if presses != seen => {
                self.cpu.registers[vx] = key.as_u8();
                self.key_wait = None;
                Flow::Ok
            }
            _ => {
                self.key_wait.get_or_insert(presses);

                // rewind the program counter to stall the machine
                self.cpu.pc -= 2;
                Flow::KeyWait
            }
        }
    }
}

/// Troubleshooting
#[doc(hidden)]
impl Chip8Vm {
    /// Returns the contents of the program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, std::fmt::Error> {
        let end = (MEM_START + count).min(MEM_SIZE);
        let mut buf = String::new();

        for (i, op) in self.cpu.ram[MEM_START..end].chunks(2).enumerate() {
            let offset = MEM_START + i * 2;
            match op {
                [a, b] => writeln!(buf, "{:04X}: {:02X}{:02X}", offset, a, b)?,
                [a] => writeln!(buf, "{:04X}: {:02X}", offset, a)?,
                _ => {}
            }
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, std::fmt::Error> {
        self.display.lock().dump('#', '.')
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        let input = self.input.snapshot();
        let mut buf = String::new();

        if input.any_key() {
            write!(buf, "keys: ")?;
            for i in 0..KEY_COUNT {
                if input.is_pressed(i) {
                    write!(buf, "k{i:x}")?;
                }
            }
        }

        Ok(buf)
    }
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(pc: usize, word: u16) {
    log::trace!("{:04X}: {}", pc, crate::dispatch::Instr::decode(word));
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: usize, _: u16) {}
