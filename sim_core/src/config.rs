//! Ambient configuration bundle threaded through the generator, parser and
//! coordinator. Mirrors `Config` in the reference implementation's
//! `config.h`/`config.c`, extended with the frame count and page size so
//! tests can shrink both (the worked examples use four frames).

use core::fmt;

use crate::policy::AlgorithmKind;

pub const PAGE_SIZE: u32 = 4096;
pub const RAM_FRAMES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    pub seed: u32,
    pub process_count: u32,
    pub op_count: u32,
    pub frames: usize,
    pub page_size: u32,
    pub algorithm: AlgorithmKind,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            process_count: 10,
            op_count: 500,
            frames: RAM_FRAMES,
            page_size: PAGE_SIZE,
            algorithm: AlgorithmKind::Fifo,
        }
    }
}

impl fmt::Display for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed: {} | processes: {} | ops: {} | frames: {} | page_size: {} | algorithm: {:?}",
            self.seed, self.process_count, self.op_count, self.frames, self.page_size, self.algorithm
        )
    }
}
