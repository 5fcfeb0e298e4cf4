//! Interpreter loop running on its own thread.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info};

use crate::{
    devices::{Devices, KeyEvent, SharedInput},
    display::SharedDisplay,
    vm::{Chip8Vm, Flow, MachineState},
};

/// Notifications from the interpreter thread to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// Display buffer changed.
    Draw,
    /// Buzzer switched on or off.
    Buzzer(bool),
    /// Interpreter loop exited, in the given state.
    Stopped(MachineState),
}

/// Cloneable handle that asks the interpreter thread to stop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Owner of a VM running on a background thread.
pub struct RunnerHandle {
    signal: StopSignal,
    events: Receiver<RunEvent>,
    display: SharedDisplay,
    input: SharedInput,
    stopped: Option<MachineState>,
    thread: Option<JoinHandle<Chip8Vm>>,
}

impl RunnerHandle {
    /// Move the VM onto a new thread and start executing.
    pub fn spawn(vm: Chip8Vm) -> Self {
        let (tx, rx) = mpsc::channel();
        let signal = StopSignal::default();
        let display = vm.display().clone();
        let input = vm.input().clone();

        let thread_signal = signal.clone();
        let thread = thread::Builder::new()
            .name("chip8-vm".to_string())
            .spawn(move || run_loop(vm, thread_signal, tx));

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("failed to spawn interpreter thread: {err}");
                None
            }
        };

        Self {
            signal,
            events: rx,
            display,
            input,
            stopped: thread.is_none().then_some(MachineState::Halted),
            thread,
        }
    }

    /// Forward a key transition to the interpreter.
    pub fn send_key(&self, event: KeyEvent) {
        self.input.apply(event);
    }

    pub fn input(&self) -> &SharedInput {
        &self.input
    }

    pub fn display(&self) -> &SharedDisplay {
        &self.display
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.signal.clone()
    }

    /// Request the interpreter to halt at the next cycle boundary.
    pub fn stop(&self) {
        self.signal.stop();
    }

    /// Deliver pending events to the host devices.
    ///
    /// Blocks up to `timeout` for the first event, then drains the rest
    /// without waiting. Consecutive draws are presented once. Returns the
    /// final state once the interpreter loop has exited.
    pub fn pump(&mut self, devices: &mut impl Devices, timeout: Duration) -> Option<MachineState> {
        if let Some(state) = &self.stopped {
            return Some(state.clone());
        }

        let mut redraw = false;
        let mut next = match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.stopped = Some(MachineState::Halted);
                None
            }
        };

        while let Some(event) = next {
            match event {
                RunEvent::Draw => redraw = true,
                RunEvent::Buzzer(state) => devices.buzz(state),
                RunEvent::Stopped(state) => {
                    self.stopped = Some(state);
                }
            }
            next = self.events.try_recv().ok();
        }

        if redraw {
            devices.draw(&self.display.snapshot());
        }

        self.stopped.clone()
    }

    /// Stop the interpreter and wait for its thread to exit.
    ///
    /// Returns the VM, or `None` if the thread panicked.
    pub fn join(mut self) -> Option<Chip8Vm> {
        self.stop();
        self.thread.take().and_then(|handle| handle.join().ok())
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.signal.stop();
    }
}

fn run_loop(mut vm: Chip8Vm, signal: StopSignal, tx: Sender<RunEvent>) -> Chip8Vm {
    info!("interpreter thread started");
    let mut buzzer = vm.buzzer();

    loop {
        if signal.is_stopped() {
            vm.interrupt();
        }

        let result = vm.tick();

        // Timers count down on every cycle, including the stalled ones.
        if vm.buzzer() != buzzer {
            buzzer = vm.buzzer();
            // Host hanging up is not an error, the stop signal follows.
            let _ = tx.send(RunEvent::Buzzer(buzzer));
        }

        match result {
            Ok(Flow::Draw) => {
                let _ = tx.send(RunEvent::Draw);
            }
            Ok(Flow::KeyWait) => {
                // Nothing to do until the host presses a key.
                thread::yield_now();
            }
            Ok(Flow::Interrupt) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // Silence the buzzer on the way out.
    if buzzer {
        let _ = tx.send(RunEvent::Buzzer(false));
    }

    debug!("interpreter stopped: {:?}", vm.state());
    let _ = tx.send(RunEvent::Stopped(vm.state().clone()));
    vm
}
