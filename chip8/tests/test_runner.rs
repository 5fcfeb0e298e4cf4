use std::time::{Duration, Instant};

use chip8::{prelude::*, Framebuffer};

const TIMEOUT: Duration = Duration::from_secs(5);
const PUMP: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Recorder {
    frames: Vec<Framebuffer>,
    buzz: Vec<bool>,
}

impl Devices for Recorder {
    fn draw(&mut self, display: &Framebuffer) {
        self.frames.push(display.clone());
    }

    fn buzz(&mut self, state: bool) {
        self.buzz.push(state);
    }
}

fn spawn(program: &[u8]) -> RunnerHandle {
    let mut vm = Chip8Vm::new(Chip8Conf {
        seed: Some(1),
        ..Default::default()
    });
    vm.load_bytecode(program).unwrap();
    RunnerHandle::spawn(vm)
}

/// Pump events until the condition holds, or give up after a while.
fn pump_until(
    runner: &mut RunnerHandle,
    devices: &mut Recorder,
    cond: impl Fn(&Recorder) -> bool,
) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond(devices) && Instant::now() < deadline {
        runner.pump(devices, PUMP);
    }
}

fn pump_stopped(runner: &mut RunnerHandle, devices: &mut Recorder) -> Option<MachineState> {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if let Some(state) = runner.pump(devices, PUMP) {
            return Some(state);
        }
    }
    None
}

#[test]
#[rustfmt::skip]
fn test_runner_draws() {
    let mut runner = spawn(&[
        0xA2, 0x0A, // LD I, .sprite
        0x60, 0x00, // LD v0, 0
        0x61, 0x00, // LD v1, 0
        0xD0, 0x11, // DRW v0, v1, 1
        0x12, 0x08, // JP 0x208
        0xF0, 0x00, // .sprite
    ]);
    let mut devices = Recorder::default();

    pump_until(&mut runner, &mut devices, |d| !d.frames.is_empty());
    let frame = devices.frames.first().expect("no frame was presented");
    assert_eq!(frame.pixel(0, 0), 1);
    assert_eq!(frame.pixel(3, 0), 1);
    assert_eq!(frame.pixel(4, 0), 0);

    runner.stop();
    assert_eq!(pump_stopped(&mut runner, &mut devices), Some(MachineState::Halted));

    let vm = runner.join().unwrap();
    assert_eq!(vm.state(), &MachineState::Halted);
    assert_eq!(vm.pc(), 0x208);
}

#[test]
fn test_runner_reports_fault() {
    // RET with an empty stack
    let mut runner = spawn(&[0x00, 0xEE]);
    let mut devices = Recorder::default();

    assert_eq!(
        pump_stopped(&mut runner, &mut devices),
        Some(MachineState::Faulted(Fault::StackUnderflow { pc: 0x200 }))
    );
}

#[test]
#[rustfmt::skip]
fn test_runner_key_input() {
    let mut runner = spawn(&[
        0xF0, 0x0A, // LD v0, K
        0xA2, 0x08, // LD I, .sprite
        0xD0, 0x01, // DRW v0, v0, 1
        0x12, 0x06, // JP 0x206
        0x80,       // .sprite
    ]);
    let mut devices = Recorder::default();

    // Keep tapping the key, the wait only accepts presses made after it began.
    let deadline = Instant::now() + TIMEOUT;
    while devices.frames.is_empty() && Instant::now() < deadline {
        runner.send_key(KeyEvent::press(KeyCode::Key7));
        runner.pump(&mut devices, PUMP);
        runner.send_key(KeyEvent::release(KeyCode::Key7));
    }
    assert_eq!(devices.frames.first().map(|f| f.pixel(7, 7)), Some(1));

    let vm = runner.join().unwrap();
    assert_eq!(vm.registers()[0], 7);
}

#[test]
fn test_runner_cancels_key_wait() {
    // LD v3, 0x55 ; LD v3, K
    let mut runner = spawn(&[0x63, 0x55, 0xF3, 0x0A]);
    let mut devices = Recorder::default();

    // Give the interpreter time to start waiting.
    runner.pump(&mut devices, Duration::from_millis(50));
    runner.stop_signal().stop();
    assert_eq!(pump_stopped(&mut runner, &mut devices), Some(MachineState::Halted));

    let vm = runner.join().unwrap();
    assert!(!vm.is_key_waiting());
    assert_eq!(vm.registers()[3], 0x55);
}

#[test]
#[rustfmt::skip]
fn test_runner_buzzer() {
    let mut runner = spawn(&[
        0x60, 0x02, // LD v0, 2
        0xF0, 0x18, // LD ST, v0
        0x12, 0x04, // JP 0x204
    ]);
    let mut devices = Recorder::default();

    // Two ticks at 60 Hz
    pump_until(&mut runner, &mut devices, |d| d.buzz.len() >= 2);
    assert_eq!(devices.buzz, vec![true, false]);
}
