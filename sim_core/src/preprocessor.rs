//! Single pass over an instruction stream that assigns page ids, expands
//! each instruction into the access events it produces, and builds the
//! future-use oracle OPT relies on.
//!
//! Grounded on `sim_manager.c`'s `precompute_events`/`build_future_dataset`.
//! The page-id assignment order here must match [`crate::mmu::Mmu`]'s own
//! assignment order exactly, or OPT's oracle would point at the wrong pages.

use crate::config::PAGE_SIZE;
use crate::ids::PageId;
use crate::instruction::Instruction;

/// One page touch produced by an instruction, at a given absolute position
/// in the expanded event stream.
#[derive(Debug, Clone, Copy)]
pub struct AccessEvent {
    pub instruction_index: usize,
    pub page_id: PageId,
}

/// For each page, the sorted, strictly increasing positions in the event
/// stream at which it is touched. Shared read-only by both simulators.
#[derive(Debug, Default)]
pub struct FutureUseDataset {
    entries: Vec<Vec<usize>>,
}

impl FutureUseDataset {
    pub fn positions(&self, page: PageId) -> &[usize] {
        self.entries
            .get(page.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }
}

pub struct PreprocessedWorkload {
    pub events: Vec<AccessEvent>,
    /// `offsets[i]..offsets[i+1]` delimits the events produced by instruction i.
    pub offsets: Vec<usize>,
    pub future_use: FutureUseDataset,
}

struct PtrEntry {
    alive: bool,
    pages: Vec<PageId>,
}

struct ProcessEntry {
    alive: bool,
    ptrs: Vec<u32>,
}

fn ensure_len<T: Default>(v: &mut Vec<T>, len: usize) {
    while v.len() < len {
        v.push(T::default());
    }
}

impl Default for PtrEntry {
    fn default() -> Self {
        PtrEntry {
            alive: false,
            pages: Vec::new(),
        }
    }
}

impl Default for ProcessEntry {
    fn default() -> Self {
        ProcessEntry {
            alive: false,
            ptrs: Vec::new(),
        }
    }
}

/// Runs the single pass described at module level and returns every
/// artifact both simulators need.
pub fn run(instructions: &[Instruction]) -> PreprocessedWorkload {
    let mut events: Vec<AccessEvent> = Vec::new();
    let mut offsets: Vec<usize> = Vec::with_capacity(instructions.len() + 1);
    let mut ptr_table: Vec<PtrEntry> = Vec::new();
    let mut proc_table: Vec<ProcessEntry> = Vec::new();
    let mut next_page_id: u32 = 1;

    for (i, ins) in instructions.iter().enumerate() {
        offsets.push(events.len());
        match *ins {
            Instruction::New { pid, ptr_id, size } => {
                let num_pages = ((size + PAGE_SIZE - 1) / PAGE_SIZE).max(1) as usize;
                ensure_len(&mut ptr_table, ptr_id as usize + 1);
                let mut pages = Vec::with_capacity(num_pages);
                for _ in 0..num_pages {
                    let page_id = PageId::new(next_page_id).expect("nonzero by construction");
                    next_page_id += 1;
                    events.push(AccessEvent {
                        instruction_index: i,
                        page_id,
                    });
                    pages.push(page_id);
                }
                ptr_table[ptr_id as usize] = PtrEntry { alive: true, pages };

                ensure_len(&mut proc_table, pid as usize + 1);
                let proc = &mut proc_table[pid as usize];
                proc.alive = true;
                proc.ptrs.push(ptr_id);
            }
            Instruction::Use { ptr_id, .. } => {
                if let Some(entry) = ptr_table.get(ptr_id as usize).filter(|e| e.alive) {
                    for &page_id in &entry.pages {
                        events.push(AccessEvent {
                            instruction_index: i,
                            page_id,
                        });
                    }
                }
            }
            Instruction::Delete { pid, ptr_id } => {
                if let Some(entry) = ptr_table.get_mut(ptr_id as usize) {
                    entry.alive = false;
                    entry.pages.clear();
                }
                if let Some(proc) = proc_table.get_mut(pid as usize) {
                    proc.ptrs.retain(|&p| p != ptr_id);
                }
            }
            Instruction::Kill { pid } => {
                if let Some(proc) = proc_table.get_mut(pid as usize) {
                    if proc.alive {
                        for ptr_id in proc.ptrs.drain(..) {
                            if let Some(entry) = ptr_table.get_mut(ptr_id as usize) {
                                entry.alive = false;
                                entry.pages.clear();
                            }
                        }
                        proc.alive = false;
                    }
                }
            }
        }
    }
    offsets.push(events.len());

    let max_page_id = (next_page_id.saturating_sub(1)) as usize;
    let mut future_entries: Vec<Vec<usize>> = (0..=max_page_id).map(|_| Vec::new()).collect();
    for (pos, event) in events.iter().enumerate() {
        let idx = event.page_id.index();
        if idx < future_entries.len() {
            future_entries[idx].push(pos);
        }
    }

    PreprocessedWorkload {
        events,
        offsets,
        future_use: FutureUseDataset {
            entries: future_entries,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::parse;

    #[test]
    fn new_with_exact_page_produces_one_event() {
        let ins = parse("new(1,4096)\n".as_bytes()).unwrap();
        let pre = run(&ins);
        assert_eq!(pre.events.len(), 1);
        assert_eq!(pre.future_use.positions(PageId::new(1).unwrap()), &[0]);
    }

    #[test]
    fn use_expands_to_one_event_per_page() {
        let ins = parse("new(1,8192)\nuse(1)\n".as_bytes()).unwrap();
        let pre = run(&ins);
        assert_eq!(pre.events.len(), 4);
    }

    #[test]
    fn delete_then_use_produces_no_more_events() {
        let ins = parse("new(1,4096)\ndelete(1)\nuse(1)\n".as_bytes());
        assert!(ins.is_err(), "parser already rejects use-after-delete");
    }

    #[test]
    fn kill_clears_future_events_for_owned_pages() {
        let ins = vec![
            Instruction::New {
                pid: 1,
                ptr_id: 1,
                size: 4096,
            },
            Instruction::Kill { pid: 1 },
        ];
        let pre = run(&ins);
        assert_eq!(pre.events.len(), 1);
        assert_eq!(pre.offsets, vec![0, 1, 1]);
    }

    #[test]
    fn future_use_positions_are_sorted() {
        let ins = vec![
            Instruction::New {
                pid: 1,
                ptr_id: 1,
                size: 4096,
            },
            Instruction::Use { pid: 1, ptr_id: 1 },
            Instruction::Use { pid: 1, ptr_id: 1 },
        ];
        let pre = run(&ins);
        let positions = pre.future_use.positions(PageId::new(1).unwrap());
        assert_eq!(positions, &[0, 1, 2]);
    }
}
