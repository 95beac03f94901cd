//! The instruction stream: its type, a text parser/writer, and a pseudo-random
//! generator. Grounded on `instr_parser.c` (`parse_instructions_from_file`,
//! `generate_instructions`, `save_instructions_to_file`); the generator's
//! libc `rand()` is replaced with the crate's own [`crate::rng::Lcg`] (see
//! the RNG-unification decision in DESIGN.md).

use std::io::{BufRead, Write};

use crate::error::{Result, SimError};
use crate::rng::Lcg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    New { pid: u32, ptr_id: u32, size: u32 },
    Use { pid: u32, ptr_id: u32 },
    Delete { pid: u32, ptr_id: u32 },
    Kill { pid: u32 },
}

impl Instruction {
    pub fn pid(&self) -> u32 {
        match *self {
            Instruction::New { pid, .. }
            | Instruction::Use { pid, .. }
            | Instruction::Delete { pid, .. }
            | Instruction::Kill { pid } => pid,
        }
    }
}

/// Writes instructions back to the text grammar the parser accepts, enabling
/// the generate -> save -> reparse round trip.
pub fn write<W: Write>(mut out: W, instructions: &[Instruction]) -> std::io::Result<()> {
    for ins in instructions {
        match *ins {
            Instruction::New { pid, size, .. } => writeln!(out, "new({pid},{size})")?,
            Instruction::Use { ptr_id, .. } => writeln!(out, "use({ptr_id})")?,
            Instruction::Delete { ptr_id, .. } => writeln!(out, "delete({ptr_id})")?,
            Instruction::Kill { pid } => writeln!(out, "kill({pid})")?,
        }
    }
    Ok(())
}

struct ProcessInfo {
    seen: bool,
    killed: bool,
}

struct PtrInfo {
    owner_pid: u32,
    alive: bool,
}

/// Parses the text grammar described in SPEC_FULL.md §6. Blank lines and
/// `#`-comments are skipped. Fails closed: the first bad line aborts the
/// whole parse with [`SimError::MalformedInstruction`].
pub fn parse<R: BufRead>(input: R) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut ptrs: Vec<PtrInfo> = Vec::new();
    let mut processes: Vec<ProcessInfo> = Vec::new();
    let mut next_ptr_id: u32 = 0;

    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| SimError::MalformedInstruction {
            line: line_no,
            reason: format!("could not read line: {e}"),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let instr = parse_line(trimmed, line_no, &mut ptrs, &mut processes, &mut next_ptr_id)?;
        out.push(instr);
    }

    Ok(out)
}

fn ensure_process(processes: &mut Vec<ProcessInfo>, pid: u32) {
    let needed = pid as usize + 1;
    while processes.len() < needed {
        processes.push(ProcessInfo {
            seen: false,
            killed: false,
        });
    }
}

fn ensure_ptr(ptrs: &mut Vec<PtrInfo>, ptr_id: u32) {
    let needed = ptr_id as usize + 1;
    while ptrs.len() < needed {
        ptrs.push(PtrInfo {
            owner_pid: 0,
            alive: false,
        });
    }
}

fn parse_line(
    line: &str,
    line_no: usize,
    ptrs: &mut Vec<PtrInfo>,
    processes: &mut Vec<ProcessInfo>,
    next_ptr_id: &mut u32,
) -> Result<Instruction> {
    let err = |reason: String| SimError::MalformedInstruction {
        line: line_no,
        reason,
    };

    if let Some(args) = strip_call(line, "new") {
        let (pid_s, size_s) = split_two(args).ok_or_else(|| err("new() takes (pid,size)".into()))?;
        let pid: u32 = pid_s
            .parse()
            .map_err(|_| err(format!("invalid pid '{pid_s}'")))?;
        let size: u32 = size_s
            .parse()
            .map_err(|_| err(format!("invalid size '{size_s}'")))?;

        ensure_process(processes, pid);
        if processes[pid as usize].killed {
            return Err(err(format!("process {pid} already killed")));
        }
        processes[pid as usize].seen = true;

        *next_ptr_id += 1;
        let ptr_id = *next_ptr_id;
        ensure_ptr(ptrs, ptr_id);
        ptrs[ptr_id as usize] = PtrInfo {
            owner_pid: pid,
            alive: true,
        };

        return Ok(Instruction::New { pid, ptr_id, size });
    }

    if let Some(args) = strip_call(line, "use") {
        let ptr_id: u32 = args
            .parse()
            .map_err(|_| err(format!("invalid ptr '{args}'")))?;
        let pid = validate_ptr(ptrs, ptr_id, "use", line_no)?;
        return Ok(Instruction::Use { pid, ptr_id });
    }

    if let Some(args) = strip_call(line, "delete") {
        let ptr_id: u32 = args
            .parse()
            .map_err(|_| err(format!("invalid ptr '{args}'")))?;
        let pid = validate_ptr(ptrs, ptr_id, "delete", line_no)?;
        ptrs[ptr_id as usize].alive = false;
        return Ok(Instruction::Delete { pid, ptr_id });
    }

    if let Some(args) = strip_call(line, "kill") {
        let pid: u32 = args
            .parse()
            .map_err(|_| err(format!("invalid pid '{args}'")))?;
        ensure_process(processes, pid);
        let proc = &mut processes[pid as usize];
        if !proc.seen {
            return Err(err(format!("kill() on unknown process {pid}")));
        }
        if proc.killed {
            return Err(err(format!("duplicate kill() for process {pid}")));
        }
        proc.killed = true;
        return Ok(Instruction::Kill { pid });
    }

    Err(err(format!("unrecognised instruction '{line}'")))
}

fn validate_ptr(ptrs: &[PtrInfo], ptr_id: u32, label: &str, line_no: usize) -> Result<u32> {
    let valid = ptr_id != 0 && (ptr_id as usize) < ptrs.len() && ptrs[ptr_id as usize].alive;
    if !valid {
        return Err(SimError::MalformedInstruction {
            line: line_no,
            reason: format!("invalid pointer id {ptr_id} for {label}()"),
        });
    }
    Ok(ptrs[ptr_id as usize].owner_pid)
}

/// If `line` is `name(...)`, returns the text between the parens with
/// whitespace trimmed; rejects any trailing content after the closing paren.
fn strip_call<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('(')?;
    let close = rest.find(')')?;
    let (args, trailer) = rest.split_at(close);
    let trailer = &trailer[1..];
    if !trailer.trim().is_empty() {
        return None;
    }
    Some(args.trim())
}

fn split_two(args: &str) -> Option<(&str, &str)> {
    let comma = args.find(',')?;
    let (a, b) = args.split_at(comma);
    Some((a.trim(), b[1..].trim()))
}

struct GenProcess {
    live_ptrs: Vec<u32>,
}

/// Generates a pseudo-random workload: a `New` prelude per process (as
/// budget allows), a weighted new/use/delete body, and a `Kill` epilogue
/// for every process. See SPEC_FULL.md §4.1 for the exact weighting table.
pub fn generate(process_count: u32, op_count: u32, seed: u32) -> Vec<Instruction> {
    if process_count == 0 {
        return Vec::new();
    }

    let mut rng = Lcg::new(seed);
    let mut out = Vec::new();
    let mut procs: Vec<GenProcess> = (0..=process_count)
        .map(|_| GenProcess {
            live_ptrs: Vec::new(),
        })
        .collect();
    let mut next_ptr_id: u32 = 0;
    let mut remaining = op_count;

    let mut pid = 1;
    while pid <= process_count && remaining > 0 {
        next_ptr_id += 1;
        let size = rng.next_range(1, 20000);
        out.push(Instruction::New {
            pid,
            ptr_id: next_ptr_id,
            size,
        });
        procs[pid as usize].live_ptrs.push(next_ptr_id);
        remaining -= 1;
        pid += 1;
    }

    while remaining > 0 {
        let pid = rng.next_range(1, process_count);
        let count = procs[pid as usize].live_ptrs.len();

        let action = if count == 0 {
            0
        } else {
            let roll = rng.next_range(0, 99);
            if count == 1 {
                if roll < 45 {
                    0
                } else if roll < 80 {
                    1
                } else {
                    2
                }
            } else if roll < 35 {
                0
            } else if roll < 75 {
                1
            } else {
                2
            }
        };

        match action {
            1 => {
                let slot = rng.next_below(count);
                let ptr_id = procs[pid as usize].live_ptrs[slot];
                out.push(Instruction::Use { pid, ptr_id });
            }
            2 => {
                let slot = rng.next_below(count);
                let ptr_id = procs[pid as usize].live_ptrs.swap_remove(slot);
                out.push(Instruction::Delete { pid, ptr_id });
            }
            _ => {
                next_ptr_id += 1;
                let size = rng.next_range(1, 20000);
                out.push(Instruction::New {
                    pid,
                    ptr_id: next_ptr_id,
                    size,
                });
                procs[pid as usize].live_ptrs.push(next_ptr_id);
            }
        }
        remaining -= 1;
    }

    for pid in 1..=process_count {
        out.push(Instruction::Kill { pid });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_kinds() {
        let text = "new(2,10)\nuse(1)\ndelete(1)\nkill(2)\n";
        let parsed = parse(text.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(
            parsed[0],
            Instruction::New {
                pid: 2,
                ptr_id: 1,
                size: 10
            }
        );
        assert_eq!(parsed[1], Instruction::Use { pid: 2, ptr_id: 1 });
        assert_eq!(parsed[2], Instruction::Delete { pid: 2, ptr_id: 1 });
        assert_eq!(parsed[3], Instruction::Kill { pid: 2 });
    }

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        let text = "# a comment\n\nnew(1,1)\n   \n";
        let parsed = parse(text.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn use_on_unknown_ptr_is_an_error() {
        let err = parse("use(1)\n".as_bytes()).unwrap_err();
        matches!(err, SimError::MalformedInstruction { line: 1, .. });
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let err = parse("new(1,1) garbage\n".as_bytes()).unwrap_err();
        matches!(err, SimError::MalformedInstruction { .. });
    }

    #[test]
    fn new_on_killed_process_is_an_error() {
        let text = "new(1,1)\nkill(1)\nnew(1,1)\n";
        assert!(parse(text.as_bytes()).is_err());
    }

    #[test]
    fn generate_then_write_then_parse_round_trips() {
        let generated = generate(3, 30, 42);
        let mut buf = Vec::new();
        write(&mut buf, &generated).unwrap();
        let reparsed = parse(buf.as_slice()).unwrap();
        assert_eq!(generated, reparsed);
    }

    #[test]
    fn generate_is_deterministic_for_a_seed() {
        let a = generate(4, 200, 7);
        let b = generate(4, 200, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn generate_ends_with_one_kill_per_process() {
        let out = generate(5, 50, 99);
        let kills: Vec<_> = out
            .iter()
            .rev()
            .take(5)
            .filter(|i| matches!(i, Instruction::Kill { .. }))
            .collect();
        assert_eq!(kills.len(), 5);
    }
}
