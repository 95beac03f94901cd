//! Per-simulator counters, following the `Stats`-struct-plus-`Display`
//! shape `haoud-helium` uses for its frame allocator (`frames_allocated`/
//! `frames_deallocated` there; page faults/hits/evictions here).

use core::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub total_instructions: u64,
    pub page_faults: u64,
    pub page_hits: u64,
    pub pages_created: u64,
    pub pages_evicted: u64,
    pub ptr_allocations: u64,
    pub ptr_deletions: u64,
    pub bytes_requested: u64,
}

impl SimStats {
    pub fn page_fault(&mut self) {
        self.page_faults += 1;
    }

    pub fn page_hit(&mut self) {
        self.page_hits += 1;
    }
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "instructions:    {}", self.total_instructions)?;
        writeln!(f, "page hits:       {}", self.page_hits)?;
        writeln!(f, "page faults:     {}", self.page_faults)?;
        writeln!(f, "pages created:   {}", self.pages_created)?;
        writeln!(f, "pages evicted:   {}", self.pages_evicted)?;
        writeln!(f, "ptr allocations: {}", self.ptr_allocations)?;
        writeln!(f, "ptr deletions:   {}", self.ptr_deletions)?;
        write!(f, "bytes requested: {}", self.bytes_requested)
    }
}
