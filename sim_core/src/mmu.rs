//! Frames, pages, ptrs and processes: the resident/swapped state machine
//! the engine drives one instruction at a time.
//!
//! Grounded on the MMU section of `sim_engine.c` (the `Page`/`Frame`/
//! `PtrMap`/`Process` structs and `acquire_frame`) and on the teacher's own
//! `memory.rs`, which keeps a flat `Vec` of free frames and hands them out
//! with `Vec::pop`/`Vec::push` rather than a bitmap or free list of nodes.

use std::cell::Cell;

use bitflags::bitflags;

use crate::ids::{IdCounter, PageId, Pid, PtrId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const RESIDENT = 0b001;
        const REF      = 0b010;
        const DIRTY    = 0b100;
    }
}

/// A page's interior-mutable fields are [`Cell`]s so the replacement
/// policies (which only ever need a shared `&Mmu`) can flip ref bits and
/// advance OPT's cursor without the engine handing out `&mut` everywhere.
#[derive(Debug)]
pub struct Page {
    pub id: PageId,
    pub owner_pid: Pid,
    pub owner_ptr: PtrId,
    flags: Cell<PageFlags>,
    pub frame_index: Cell<Option<usize>>,
    pub last_used: Cell<u64>,
    /// Sorted, strictly increasing absolute event positions; set once at
    /// creation from the shared future-use dataset and never mutated.
    pub future_uses: Vec<usize>,
    pub future_cursor: Cell<usize>,
    pub next_use_pos: Cell<Option<usize>>,
}

impl Page {
    fn new(id: PageId, owner_pid: Pid, owner_ptr: PtrId, future_uses: Vec<usize>) -> Self {
        let next_use_pos = future_uses.first().copied();
        Page {
            id,
            owner_pid,
            owner_ptr,
            flags: Cell::new(PageFlags::empty()),
            frame_index: Cell::new(None),
            last_used: Cell::new(0),
            future_uses,
            future_cursor: Cell::new(0),
            next_use_pos: Cell::new(next_use_pos),
        }
    }

    pub fn resident(&self) -> bool {
        self.flags.get().contains(PageFlags::RESIDENT)
    }

    pub fn set_resident(&self, value: bool) {
        self.set_flag(PageFlags::RESIDENT, value);
    }

    pub fn ref_bit(&self) -> bool {
        self.flags.get().contains(PageFlags::REF)
    }

    pub fn set_ref_bit(&self, value: bool) {
        self.set_flag(PageFlags::REF, value);
    }

    pub fn dirty(&self) -> bool {
        self.flags.get().contains(PageFlags::DIRTY)
    }

    pub fn set_dirty(&self, value: bool) {
        self.set_flag(PageFlags::DIRTY, value);
    }

    fn set_flag(&self, flag: PageFlags, value: bool) {
        let mut flags = self.flags.get();
        flags.set(flag, value);
        self.flags.set(flags);
    }
}

pub struct PtrMap {
    pub owner_pid: Pid,
    pub byte_size: u32,
    pub pages: Vec<PageId>,
}

impl PtrMap {
    pub fn fragmentation_bytes(&self, page_size: u32) -> u64 {
        self.pages.len() as u64 * page_size as u64 - self.byte_size as u64
    }
}

#[derive(Default)]
pub struct Process {
    pub ptrs: Vec<PtrId>,
    pub killed: bool,
}

/// Owns every frame, page, ptr and process for one simulator run.
pub struct Mmu {
    frames: Vec<Option<PageId>>,
    free_frames: Vec<usize>,
    pages: Vec<Option<Page>>,
    ptrs: Vec<Option<PtrMap>>,
    processes: Vec<Option<Process>>,
    page_ids: IdCounter,
}

impl Mmu {
    pub fn new(frame_count: usize) -> Self {
        Mmu {
            frames: vec![None; frame_count],
            free_frames: (0..frame_count).rev().collect(),
            pages: Vec::new(),
            ptrs: Vec::new(),
            processes: Vec::new(),
            page_ids: IdCounter::new(),
        }
    }

    pub fn reset(&mut self) {
        let frame_count = self.frames.len();
        self.frames = vec![None; frame_count];
        self.free_frames = (0..frame_count).rev().collect();
        self.pages.clear();
        self.ptrs.clear();
        self.processes.clear();
        self.page_ids = IdCounter::new();
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_occupant(&self, frame_index: usize) -> Option<PageId> {
        self.frames.get(frame_index).copied().flatten()
    }

    /// Linear-scan fallback for when the policy's `choose_victim` yields no
    /// candidate (e.g. an emptied FIFO queue) while frames are still full.
    pub fn first_occupied_page(&self) -> Option<PageId> {
        self.frames.iter().find_map(|slot| *slot)
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_frames.len()
    }

    pub fn page(&self, id: PageId) -> &Page {
        self.pages[id.index()]
            .as_ref()
            .expect("page id referenced after it was destroyed")
    }

    /// Like [`Mmu::page`] but returns `None` instead of panicking for an id
    /// whose page has been fully destroyed (`Delete`/`Kill`) rather than
    /// merely evicted. FIFO's queue can still hold such an id since nothing
    /// walks it out on destruction; its lazy-cleanup scan uses this instead
    /// of `page` to treat "destroyed" the same as "no longer resident".
    pub fn try_page(&self, id: PageId) -> Option<&Page> {
        self.pages.get(id.index()).and_then(|p| p.as_ref())
    }

    fn page_mut(&mut self, id: PageId) -> &mut Page {
        self.pages[id.index()]
            .as_mut()
            .expect("page id referenced after it was destroyed")
    }

    pub fn ptr(&self, id: PtrId) -> Option<&PtrMap> {
        self.ptrs.get(id.index()).and_then(|p| p.as_ref())
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(pid.index()).and_then(|p| p.as_ref())
    }

    fn ensure_process(&mut self, pid: Pid) -> &mut Process {
        if self.processes.len() <= pid.index() {
            self.processes.resize_with(pid.index() + 1, || None);
        }
        self.processes[pid.index()].get_or_insert_with(Process::default)
    }

    /// Assigns the next page id. Must be called in the same relative order
    /// the preprocessor assigned ids, or OPT's oracle points at the wrong
    /// pages (see the cross-component contract in SPEC_FULL.md §3).
    pub fn new_page(&mut self, owner_pid: Pid, owner_ptr: PtrId, future_uses: Vec<usize>) -> PageId {
        let id = self.page_ids.next_page();
        if self.pages.len() <= id.index() {
            self.pages.resize_with(id.index() + 1, || None);
        }
        self.pages[id.index()] = Some(Page::new(id, owner_pid, owner_ptr, future_uses));
        id
    }

    /// Registers a ptr under the id the instruction stream already assigned
    /// it (the generator/parser hands out ptr ids, not the engine).
    pub fn new_ptr(&mut self, pid: Pid, ptr_id: PtrId, byte_size: u32) {
        if self.ptrs.len() <= ptr_id.index() {
            self.ptrs.resize_with(ptr_id.index() + 1, || None);
        }
        self.ptrs[ptr_id.index()] = Some(PtrMap {
            owner_pid: pid,
            byte_size,
            pages: Vec::new(),
        });
        self.ensure_process(pid).ptrs.push(ptr_id);
    }

    /// Backfills a page's future-use vector once the shared dataset is
    /// known (the preprocessor builds it from the whole instruction stream,
    /// so it isn't available at the exact moment a brand-new page is born).
    pub fn set_future_uses(&mut self, id: PageId, future_uses: Vec<usize>) {
        let next_use_pos = future_uses.first().copied();
        let page = self.page_mut(id);
        page.future_uses = future_uses;
        page.next_use_pos.set(next_use_pos);
    }

    pub fn ptr_push_page(&mut self, ptr_id: PtrId, page_id: PageId) {
        if let Some(entry) = self.ptrs[ptr_id.index()].as_mut() {
            entry.pages.push(page_id);
        }
    }

    /// Pops a free frame, or evicts the given victim and reuses its frame.
    /// Returns `(frame_index, was_fault)`. Mirrors the reference's
    /// `acquire_frame`: `evict` releases the victim's frame back onto the
    /// free list exactly like `mmu_release_frame`, and this immediately pops
    /// it back off (`mmu_pop_free_frame`) rather than reusing the captured
    /// index directly, so the free list never ends up with a stale entry for
    /// a frame the caller is about to place a page into.
    pub fn acquire_frame(&mut self, victim: Option<PageId>) -> Option<(usize, bool)> {
        if let Some(frame_index) = self.free_frames.pop() {
            return Some((frame_index, false));
        }
        let victim = victim?;
        if self.page(victim).frame_index.get().is_none() {
            return None;
        }
        self.evict(victim);
        let frame_index = self.free_frames.pop()?;
        Some((frame_index, true))
    }

    pub fn place(&mut self, page_id: PageId, frame_index: usize, clock: u64) {
        self.frames[frame_index] = Some(page_id);
        let page = self.page_mut(page_id);
        page.set_resident(true);
        page.frame_index.set(Some(frame_index));
        page.set_ref_bit(true);
        page.last_used.set(clock);
    }

    pub fn touch(&mut self, page_id: PageId, clock: u64) {
        let page = self.page_mut(page_id);
        page.set_ref_bit(true);
        page.last_used.set(clock);
    }

    pub fn evict(&mut self, page_id: PageId) {
        let frame_index = self.page(page_id).frame_index.get();
        if let Some(idx) = frame_index {
            self.frames[idx] = None;
            self.free_frames.push(idx);
        }
        let page = self.page_mut(page_id);
        page.set_resident(false);
        page.set_ref_bit(false);
        page.frame_index.set(None);
    }

    /// Destroys a page outright (its ptr or process was deleted/killed).
    /// If it was resident its frame is returned to the free list.
    pub fn destroy_page(&mut self, page_id: PageId) {
        if self.page(page_id).resident() {
            self.evict(page_id);
        }
        self.pages[page_id.index()] = None;
    }

    pub fn destroy_ptr(&mut self, ptr_id: PtrId) -> Option<PtrMap> {
        let entry = self.ptrs[ptr_id.index()].take()?;
        if let Some(proc) = self
            .processes
            .get_mut(entry.owner_pid.index())
            .and_then(|p| p.as_mut())
        {
            proc.ptrs.retain(|&p| p != ptr_id);
        }
        Some(entry)
    }

    pub fn kill_process(&mut self, pid: Pid) -> Vec<PtrId> {
        let Some(proc) = self.processes.get_mut(pid.index()).and_then(|p| p.as_mut()) else {
            return Vec::new();
        };
        proc.killed = true;
        std::mem::take(&mut proc.ptrs)
    }

    /// Drops the process slot outright once every ptr it held has been torn
    /// down, matching `sim->processes[ins->pid] = NULL;` in the reference.
    pub fn remove_process(&mut self, pid: Pid) {
        if let Some(slot) = self.processes.get_mut(pid.index()) {
            *slot = None;
        }
    }

    #[cfg(test)]
    pub fn test_alloc_page(&mut self) -> PageId {
        let pid = Pid::new(1).unwrap();
        let ptr = PtrId::new(1).unwrap();
        self.new_ptr(pid, ptr, 1);
        self.new_page(pid, ptr, Vec::new())
    }

    #[cfg(test)]
    pub fn test_place(&mut self, page_id: PageId, frame_index: usize) {
        self.place(page_id, frame_index, 0);
    }

    #[cfg(test)]
    pub fn page_mut_for_test(&mut self, id: PageId) -> &mut Page {
        self.page_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_frames_come_from_a_flat_stack() {
        let mut mmu = Mmu::new(2);
        assert_eq!(mmu.free_frame_count(), 2);
        let (idx, was_fault) = mmu.acquire_frame(None).unwrap();
        assert!(!was_fault);
        assert_eq!(mmu.free_frame_count(), 1);
        let _ = idx;
    }

    #[test]
    fn acquiring_past_capacity_evicts_the_given_victim() {
        let mut mmu = Mmu::new(1);
        let page = mmu.test_alloc_page();
        let (idx, was_fault) = mmu.acquire_frame(None).unwrap();
        mmu.place(page, idx, 1);

        let new_page = mmu.test_alloc_page();
        let (idx2, was_fault2) = mmu.acquire_frame(Some(page)).unwrap();
        assert!(!was_fault);
        assert!(was_fault2);
        assert_eq!(idx2, idx);
        assert!(!mmu.page(page).resident());
        mmu.place(new_page, idx2, 2);
        assert!(mmu.page(new_page).resident());
    }

    #[test]
    fn destroying_a_ptr_detaches_it_from_its_process() {
        let mut mmu = Mmu::new(4);
        let pid = Pid::new(1).unwrap();
        let ptr = PtrId::new(1).unwrap();
        mmu.new_ptr(pid, ptr, 100);
        assert_eq!(mmu.process(pid).unwrap().ptrs, vec![ptr]);
        mmu.destroy_ptr(ptr);
        assert!(mmu.process(pid).unwrap().ptrs.is_empty());
    }
}
