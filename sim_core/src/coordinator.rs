//! Drives two [`Simulator`]s — one pinned to OPT, one to a user-chosen
//! policy — through the same instruction stream in lockstep, sharing one
//! [`FutureUseDataset`].
//!
//! Grounded on `sim_manager.c`'s `sim_manager_init`/`sim_manager_free`; its
//! own `sim_manager_step` is a stub (`(void)mgr;`) in the reference, so the
//! real per-instruction dispatch here is new work built from SPEC_FULL.md
//! §4.5 rather than ported from that stub.

use std::rc::Rc;

use crate::engine::Simulator;
use crate::instruction::Instruction;
use crate::policy::AlgorithmKind;
use crate::preprocessor;

pub struct Coordinator {
    instructions: Vec<Instruction>,
    current_index: usize,
    running: bool,
    opt: Simulator,
    user: Simulator,
}

impl Coordinator {
    pub fn new(instructions: Vec<Instruction>, user_algorithm: AlgorithmKind, frames: usize, page_size: u32, seed: u32) -> Self {
        let pre = preprocessor::run(&instructions);
        let dataset = Rc::new(pre.future_use);

        let mut opt = Simulator::new("opt", AlgorithmKind::Opt, frames, page_size, seed);
        let mut user = Simulator::new(user_algorithm.name(), user_algorithm, frames, page_size, seed);
        opt.set_future_dataset(dataset.clone());
        user.set_future_dataset(dataset);

        let running = !instructions.is_empty();
        Coordinator {
            instructions,
            current_index: 0,
            running,
            opt,
            user,
        }
    }

    pub fn opt(&self) -> &Simulator {
        &self.opt
    }

    pub fn user(&self) -> &Simulator {
        &self.user
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Executes the next instruction on both simulators. No-op once the
    /// stream is exhausted.
    pub fn step(&mut self) -> bool {
        if !self.running {
            return false;
        }
        let ins = self.instructions[self.current_index];
        self.opt.process_instruction(&ins, self.current_index);
        self.user.process_instruction(&ins, self.current_index);

        self.current_index += 1;
        if self.current_index >= self.instructions.len() {
            self.running = false;
        }
        true
    }

    /// Drains the whole instruction stream, returning both final views.
    pub fn run_to_completion(&mut self) -> (&Simulator, &Simulator) {
        while self.step() {}
        (&self.opt, &self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::generate;

    #[test]
    fn both_simulators_see_the_same_instruction_count() {
        let ins = generate(3, 60, 5);
        let mut coord = Coordinator::new(ins.clone(), AlgorithmKind::Fifo, 4, 4096, 11);
        coord.run_to_completion();
        assert_eq!(coord.opt().stats.total_instructions, ins.len() as u64);
        assert_eq!(coord.user().stats.total_instructions, ins.len() as u64);
    }

    #[test]
    fn opt_is_never_worse_than_the_user_policy() {
        let ins = generate(5, 400, 123);
        let mut coord = Coordinator::new(ins, AlgorithmKind::Random, 4, 4096, 11);
        coord.run_to_completion();
        assert!(coord.opt().stats.page_faults <= coord.user().stats.page_faults);
    }

    #[test]
    fn empty_workload_is_not_running() {
        let coord = Coordinator::new(Vec::new(), AlgorithmKind::Fifo, 4, 4096, 1);
        assert!(!coord.is_running());
    }

    #[test]
    fn step_stops_advancing_once_exhausted() {
        let ins = vec![Instruction::Kill { pid: 1 }];
        let mut coord = Coordinator::new(ins, AlgorithmKind::Fifo, 4, 4096, 1);
        assert!(coord.step());
        assert!(!coord.is_running());
        assert!(!coord.step());
    }
}
