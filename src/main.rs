//! Command-line driver for the page-replacement simulator: `generate` writes
//! a synthetic instruction trace, `run` replays one (or generates it inline)
//! through OPT and a chosen policy side by side.
//!
//! Argument handling is hand-rolled `env::args()` scanning, the same style
//! this workspace's own launcher used before this crate replaced it. Logging
//! follows `haoud-helium`'s `logger.rs`: a single `log::Log` impl with a
//! bracketed, colour-coded level prefix, here writing to stderr instead of a
//! serial port since this binary runs under a normal OS process.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::process::ExitCode;

use sim_core::policy::AlgorithmKind;
use sim_core::{instruction, preprocessor, Coordinator, Simulator};

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let prefix = match record.level() {
            log::Level::Error => "\x1b[1m\x1b[31m[!]\x1b[0m",
            log::Level::Warn => "\x1b[1m\x1b[33m[-]\x1b[0m",
            log::Level::Info => "\x1b[1m\x1b[32m[*]\x1b[0m",
            log::Level::Debug => "\x1b[1m\x1b[34m[#]\x1b[0m",
            log::Level::Trace => "\x1b[1m[~]\x1b[0m",
        };
        eprintln!("{prefix} {}", record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: Logger = Logger;

fn setup_logging() {
    let level = match std::env::var("VMSIM_LOG").as_deref() {
        Ok("trace") => log::LevelFilter::Trace,
        Ok("debug") => log::LevelFilter::Debug,
        Ok("warn") => log::LevelFilter::Warn,
        Ok("error") => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    log::set_logger(&LOGGER).expect("logger already set");
    log::set_max_level(level);
}

fn usage() -> &'static str {
    "usage:\n  \
     vmsim generate --processes P --ops N --seed S [--out FILE]\n  \
     vmsim run --algorithm {fifo,sc,mru,random} [--in FILE | --processes P --ops N --seed S] [--frames F]"
}

struct GenerateArgs {
    processes: u32,
    ops: u32,
    seed: u32,
    out: Option<String>,
}

impl Default for GenerateArgs {
    fn default() -> Self {
        GenerateArgs {
            processes: 10,
            ops: 500,
            seed: 1234,
            out: None,
        }
    }
}

struct RunArgs {
    algorithm: AlgorithmKind,
    input: Option<String>,
    processes: u32,
    ops: u32,
    seed: u32,
    frames: usize,
}

impl Default for RunArgs {
    fn default() -> Self {
        RunArgs {
            algorithm: AlgorithmKind::Fifo,
            input: None,
            processes: 10,
            ops: 500,
            seed: 1234,
            frames: sim_core::config::RAM_FRAMES,
        }
    }
}

fn next_value(args: &[String], idx: &mut usize, flag: &str) -> Result<String, String> {
    *idx += 1;
    args.get(*idx)
        .cloned()
        .ok_or_else(|| format!("{flag} expects a value"))
}

fn parse_generate(args: &[String]) -> Result<GenerateArgs, String> {
    let mut out = GenerateArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--processes" => {
                out.processes = next_value(args, &mut i, "--processes")?
                    .parse()
                    .map_err(|_| "invalid --processes".to_string())?
            }
            "--ops" => {
                out.ops = next_value(args, &mut i, "--ops")?
                    .parse()
                    .map_err(|_| "invalid --ops".to_string())?
            }
            "--seed" => {
                out.seed = next_value(args, &mut i, "--seed")?
                    .parse()
                    .map_err(|_| "invalid --seed".to_string())?
            }
            "--out" => out.out = Some(next_value(args, &mut i, "--out")?),
            other => return Err(format!("unrecognised flag '{other}'")),
        }
        i += 1;
    }
    Ok(out)
}

fn parse_run(args: &[String]) -> Result<RunArgs, String> {
    let mut out = RunArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--algorithm" => {
                let name = next_value(args, &mut i, "--algorithm")?;
                out.algorithm = match name.as_str() {
                    "fifo" => AlgorithmKind::Fifo,
                    "sc" | "second-chance" => AlgorithmKind::SecondChance,
                    "mru" => AlgorithmKind::Mru,
                    "random" => AlgorithmKind::Random,
                    other => return Err(format!("unknown algorithm '{other}'")),
                };
            }
            "--in" => out.input = Some(next_value(args, &mut i, "--in")?),
            "--processes" => {
                out.processes = next_value(args, &mut i, "--processes")?
                    .parse()
                    .map_err(|_| "invalid --processes".to_string())?
            }
            "--ops" => {
                out.ops = next_value(args, &mut i, "--ops")?
                    .parse()
                    .map_err(|_| "invalid --ops".to_string())?
            }
            "--seed" => {
                out.seed = next_value(args, &mut i, "--seed")?
                    .parse()
                    .map_err(|_| "invalid --seed".to_string())?
            }
            "--frames" => {
                out.frames = next_value(args, &mut i, "--frames")?
                    .parse()
                    .map_err(|_| "invalid --frames".to_string())?
            }
            other => return Err(format!("unrecognised flag '{other}'")),
        }
        i += 1;
    }
    Ok(out)
}

fn run_generate(args: GenerateArgs) -> Result<(), String> {
    let instructions = instruction::generate(args.processes, args.ops, args.seed);
    log::info!(
        "generated {} instructions for {} processes (seed {})",
        instructions.len(),
        args.processes,
        args.seed
    );
    match args.out {
        Some(path) => {
            let file = File::create(&path).map_err(|e| format!("could not create {path}: {e}"))?;
            instruction::write(BufWriter::new(file), &instructions).map_err(|e| e.to_string())?;
            log::info!("wrote trace to {path}");
        }
        None => {
            instruction::write(io::stdout().lock(), &instructions).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

fn load_instructions(args: &RunArgs) -> Result<Vec<sim_core::instruction::Instruction>, String> {
    match &args.input {
        Some(path) => {
            let file = File::open(path).map_err(|e| format!("could not open {path}: {e}"))?;
            instruction::parse(BufReader::new(file)).map_err(|e| e.to_string())
        }
        None => {
            log::info!(
                "no --in given, generating {} processes / {} ops (seed {})",
                args.processes,
                args.ops,
                args.seed
            );
            Ok(instruction::generate(args.processes, args.ops, args.seed))
        }
    }
}

fn run_simulation(args: RunArgs) -> Result<(), String> {
    let instructions = load_instructions(&args)?;
    let pre = preprocessor::run(&instructions);
    log::debug!(
        "preprocessed {} events across {} distinct pages",
        pre.events.len(),
        pre.future_use.page_count()
    );

    let mut coord = Coordinator::new(
        instructions,
        args.algorithm,
        args.frames,
        sim_core::config::PAGE_SIZE,
        args.seed,
    );
    coord.run_to_completion();

    print_report("opt", coord.opt());
    println!();
    print_report(args.algorithm.name(), coord.user());
    Ok(())
}

fn print_report(label: &str, sim: &Simulator) {
    println!("== {label} ==");
    println!("{}", sim.stats);
    println!("clock:               {}", sim.clock);
    println!("thrashing time:      {}", sim.thrashing_time);
    println!("pages still in swap: {}", sim.total_pages_in_swap);
    println!(
        "internal fragmentation bytes: {}",
        sim.internal_fragmentation_bytes
    );
}

fn main() -> ExitCode {
    setup_logging();

    let argv: Vec<String> = std::env::args().collect();
    let Some(command) = argv.get(1) else {
        eprintln!("{}", usage());
        return ExitCode::FAILURE;
    };
    let rest = &argv[2..];

    let result = match command.as_str() {
        "generate" => parse_generate(rest).and_then(run_generate),
        "run" => parse_run(rest).and_then(run_simulation),
        "help" | "--help" | "-h" => {
            println!("{}", usage());
            return ExitCode::SUCCESS;
        }
        other => Err(format!("unknown command '{other}'\n{}", usage())),
    };

    if let Err(e) = result {
        log::error!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
