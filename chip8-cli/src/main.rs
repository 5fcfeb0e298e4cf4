//! Entrypoint for CLI
use std::{
    env, fs,
    io::{self, BufRead},
    process, thread,
    time::Duration,
};

use chip8::{prelude::*, SharedInput, StopSignal, IMPL_VERSION};
use log::{debug, error, info, log_enabled, warn, Level, LevelFilter};

mod conf;
mod error;
mod keymap;
mod terminal;

use self::{
    conf::CliConf,
    error::AppError,
    keymap::{HostInput, KeyMap},
    terminal::TerminalDevices,
};

static USAGE: &str = r#"
usage: chip8 FILE

Runs the program image FILE. Keys are pressed and released by
writing tokens to standard input, one or more per line:

    +w      press host key 'w'
    -w      release host key 'w'
    quit    stop the machine

Closing standard input also stops the machine.

environment:
    CHIP8_CONF  path to a YAML configuration file
    RUST_LOG    log level filter

examples:
    chip8 breakout.ch8
"#;

/// Time the presentation loop waits for interpreter events.
const FRAME_TIME: Duration = Duration::from_millis(16);

fn main() {
    if let Err(err) = simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("failed to initialise logger: {err}");
    }

    if let Err(err) = run() {
        error!("{err}");
        if matches!(err.kind, error::ErrorKind::Usage) {
            print_usage();
        }
        process::exit(err.exit_code());
    }
}

fn run() -> Result<(), AppError> {
    let filepath = parse_args().ok_or_else(AppError::usage)?;
    let conf = CliConf::load()?;

    let bytecode = fs::read(&filepath).map_err(|err| AppError::read(&filepath, err))?;
    info!("Chip8 v{IMPL_VERSION}: loaded {filepath} ({} bytes)", bytecode.len());

    let mut vm = Chip8Vm::new(conf.vm.clone());
    vm.load_bytecode(&bytecode)?;

    if log_enabled!(Level::Debug) {
        let listing = Disassembler::new(&bytecode)
            .to_text()
            .map_err(Chip8Error::from)?;
        debug!("disassembly:\n{listing}");
    }

    let mut runner = RunnerHandle::spawn(vm);
    spawn_input(conf.keymap(), runner.input().clone(), runner.stop_signal());

    let mut devices = TerminalDevices::stdout(conf.pixel_on, conf.pixel_off);
    let state = loop {
        if let Some(state) = runner.pump(&mut devices, FRAME_TIME) {
            break state;
        }
    };

    info!("machine stopped: {state:?}");
    match state {
        MachineState::Faulted(fault) => Err(fault.into()),
        _ => Ok(()),
    }
}

/// Read key commands from standard input on a background thread.
fn spawn_input(keymap: KeyMap, input: SharedInput, stop: StopSignal) {
    let result = thread::Builder::new()
        .name("chip8-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("failed to read input: {err}");
                        break;
                    }
                };

                for command in keymap.parse_line(&line) {
                    match command {
                        HostInput::Key(event) => input.apply(event),
                        HostInput::Quit => {
                            stop.stop();
                            return;
                        }
                    }
                }
            }

            debug!("end of input");
            stop.stop();
        });

    if let Err(err) = result {
        error!("failed to spawn input thread: {err}");
    }
}

fn parse_args() -> Option<String> {
    env::args().nth(1)
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}
