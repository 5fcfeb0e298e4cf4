//! CPU and memory state.
use crate::{constants::*, decode, error::Fault};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: usize,
    /// Stack pointer, indicating the number of return addresses on the stack.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Switch tracking whether the buzzer should be on or off.
    pub(crate) buzzer_state: bool,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self {
            pc: MEM_START,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            buzzer_state: false,

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
        }
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Zero every register, memory and the stack, and point the program
    /// counter at the start of the program space.
    pub(crate) fn reset(&mut self) {
        self.pc = MEM_START;
        self.sp = 0;
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.buzzer_state = false;
        self.clear_memory();
    }

    /// Erase the contents of the memory buffers `ram` and `stack`.
    pub(crate) fn clear_memory(&mut self) {
        self.ram.fill(0);
        self.stack.fill(0);
    }

    /// Fetch the big-endian instruction word at the program counter.
    #[inline(always)]
    pub(crate) fn fetch(&self) -> Result<u16, Fault> {
        if self.pc + 1 >= MEM_SIZE {
            return Err(Fault::ProgramCounter { pc: self.pc });
        }

        Ok(decode::word([self.ram[self.pc], self.ram[self.pc + 1]]))
    }

    /// Borrow `len` bytes of memory starting at `address`.
    ///
    /// The `pc` is only used to report a fault.
    #[inline]
    pub(crate) fn mem(&self, pc: usize, address: usize, len: usize) -> Result<&[u8], Fault> {
        check_bounds(pc, address, len)?;
        Ok(&self.ram[address..address + len])
    }

    #[inline]
    pub(crate) fn mem_mut(
        &mut self,
        pc: usize,
        address: usize,
        len: usize,
    ) -> Result<&mut [u8], Fault> {
        check_bounds(pc, address, len)?;
        Ok(&mut self.ram[address..address + len])
    }

    /// Push the current program counter as a return address.
    pub(crate) fn push_return(&mut self, pc: usize) -> Result<(), Fault> {
        if self.sp >= STACK_SIZE {
            return Err(Fault::StackOverflow { pc });
        }

        self.stack[self.sp] = self.pc as Address;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top return address into the program counter.
    pub(crate) fn pop_return(&mut self, pc: usize) -> Result<(), Fault> {
        let (sp, underflow) = self.sp.overflowing_sub(1);
        if underflow {
            return Err(Fault::StackUnderflow { pc });
        }

        self.sp = sp;
        self.pc = self.stack[sp] as usize;
        Ok(())
    }

    /// Return addresses currently on the stack, bottom first.
    #[inline]
    pub(crate) fn call_stack(&self) -> &[Address] {
        &self.stack[..self.sp]
    }

    /// Count down both timers by the number of elapsed ticks, stopping at 0.
    ///
    /// Returns `true` when the buzzer state changed.
    #[inline]
    pub(crate) fn tick_timers(&mut self, ticks: u32) -> bool {
        if ticks == 0 {
            return false;
        }

        let ticks = u8::try_from(ticks).unwrap_or(u8::MAX);
        self.delay_timer = self.delay_timer.saturating_sub(ticks);
        self.sound_timer = self.sound_timer.saturating_sub(ticks);

        // Buzzer should be on while sound timer counts down,
        // then turned off when the timer reaches zero.
        let buzzer_state = self.sound_timer > 0;
        let changed = buzzer_state != self.buzzer_state;
        self.buzzer_state = buzzer_state;
        changed
    }
}

#[inline(always)]
fn check_bounds(pc: usize, address: usize, len: usize) -> Result<(), Fault> {
    if address + len > MEM_SIZE {
        // Report the first byte that falls outside memory.
        Err(Fault::MemoryAccess {
            pc,
            address: address.max(MEM_SIZE),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reset() {
        let mut cpu = Chip8Cpu::new();
        cpu.pc = 0x300;
        cpu.registers[3] = 7;
        cpu.address = 0x123;
        cpu.delay_timer = 5;
        cpu.ram[0x400] = 0xAA;
        cpu.push_return(0x300).unwrap();

        cpu.reset();

        assert_eq!(cpu.pc, MEM_START);
        assert!(cpu.registers.iter().all(|v| *v == 0));
        assert_eq!(cpu.address, 0);
        assert_eq!(cpu.delay_timer, 0);
        assert_eq!(cpu.sound_timer, 0);
        assert!(cpu.ram.iter().all(|b| *b == 0));
        assert!(cpu.call_stack().is_empty());
    }

    #[test]
    fn test_fetch_bounds() {
        let mut cpu = Chip8Cpu::new();
        cpu.ram[0xFFE] = 0x12;
        cpu.ram[0xFFF] = 0x34;

        cpu.pc = 0xFFE;
        assert_eq!(cpu.fetch(), Ok(0x1234));

        cpu.pc = 0xFFF;
        assert_eq!(cpu.fetch(), Err(Fault::ProgramCounter { pc: 0xFFF }));
    }

    #[test]
    fn test_mem_bounds() {
        let mut cpu = Chip8Cpu::new();
        assert_eq!(cpu.mem(0x200, 0xFFD, 3).unwrap().len(), 3);
        assert_eq!(
            cpu.mem(0x200, 0xFFE, 3),
            Err(Fault::MemoryAccess {
                pc: 0x200,
                address: MEM_SIZE
            })
        );
        assert!(cpu.mem_mut(0x200, 0x1234, 1).is_err());
    }

    #[test]
    fn test_stack_limits() {
        let mut cpu = Chip8Cpu::new();

        for depth in 0..STACK_SIZE {
            cpu.pc = 0x200 + depth * 2;
            cpu.push_return(0x200).unwrap();
        }
        assert_eq!(cpu.push_return(0x222), Err(Fault::StackOverflow { pc: 0x222 }));

        for depth in (0..STACK_SIZE).rev() {
            cpu.pop_return(0x300).unwrap();
            assert_eq!(cpu.pc, 0x200 + depth * 2);
        }
        assert_eq!(cpu.pop_return(0x300), Err(Fault::StackUnderflow { pc: 0x300 }));
    }

    #[test]
    fn test_timers_saturate() {
        let mut cpu = Chip8Cpu::new();
        cpu.delay_timer = 10;
        cpu.sound_timer = 3;
        cpu.buzzer_state = true;

        assert!(!cpu.tick_timers(2));
        assert_eq!(cpu.delay_timer, 8);
        assert_eq!(cpu.sound_timer, 1);

        assert!(cpu.tick_timers(1000));
        assert_eq!(cpu.delay_timer, 0);
        assert_eq!(cpu.sound_timer, 0);
        assert!(!cpu.buzzer_state);
    }
}
