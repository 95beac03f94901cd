//! The replacement-policy family. One dispatch surface, five strategies,
//! each carrying its own private state inside the [`PolicyState`] variant it
//! belongs to — a tagged union rather than a trait object, since the set of
//! strategies is closed and the engine already knows which one it holds.
//!
//! Grounded on `algorithms.c` in full: `fifo_choose`, `sc_choose`,
//! `mru_choose`, `rnd_choose`, `opt_choose`, and the four
//! `algorithms_on_page_*`/`choose_victim` entry points.

use std::collections::VecDeque;

use crate::ids::PageId;
use crate::mmu::{Mmu, Page};
use crate::rng::Lcg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Opt,
    Fifo,
    SecondChance,
    Mru,
    Random,
}

impl AlgorithmKind {
    /// The stable integer codes SPEC_FULL.md §6 fixes for serialisation.
    pub fn code(self) -> u8 {
        match self {
            AlgorithmKind::Opt => 0,
            AlgorithmKind::Fifo => 1,
            AlgorithmKind::SecondChance => 2,
            AlgorithmKind::Mru => 3,
            AlgorithmKind::Random => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AlgorithmKind::Opt),
            1 => Some(AlgorithmKind::Fifo),
            2 => Some(AlgorithmKind::SecondChance),
            3 => Some(AlgorithmKind::Mru),
            4 => Some(AlgorithmKind::Random),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AlgorithmKind::Opt => "opt",
            AlgorithmKind::Fifo => "fifo",
            AlgorithmKind::SecondChance => "second-chance",
            AlgorithmKind::Mru => "mru",
            AlgorithmKind::Random => "random",
        }
    }

    /// The five user-selectable algorithms, excluding OPT (it is never a
    /// user choice, only the clairvoyant comparison baseline).
    pub fn user_selectable() -> &'static [AlgorithmKind] {
        &[
            AlgorithmKind::Fifo,
            AlgorithmKind::SecondChance,
            AlgorithmKind::Mru,
            AlgorithmKind::Random,
        ]
    }
}

#[derive(Debug)]
pub enum PolicyState {
    Opt,
    Fifo { queue: VecDeque<PageId> },
    SecondChance { clock_hand: usize },
    Mru,
    Random { rng: Lcg },
}

impl PolicyState {
    pub fn new(kind: AlgorithmKind, seed: u32) -> Self {
        match kind {
            AlgorithmKind::Opt => PolicyState::Opt,
            AlgorithmKind::Fifo => PolicyState::Fifo {
                queue: VecDeque::new(),
            },
            AlgorithmKind::SecondChance => PolicyState::SecondChance { clock_hand: 0 },
            AlgorithmKind::Mru => PolicyState::Mru,
            AlgorithmKind::Random => PolicyState::Random {
                rng: Lcg::new(seed),
            },
        }
    }

    pub fn reset(&mut self) {
        match self {
            PolicyState::Fifo { queue } => queue.clear(),
            PolicyState::SecondChance { clock_hand } => *clock_hand = 0,
            PolicyState::Opt | PolicyState::Mru | PolicyState::Random { .. } => {}
        }
    }

    /// A page just became resident.
    pub fn on_page_loaded(&mut self, mmu: &Mmu, page_id: PageId) {
        match self {
            PolicyState::Fifo { queue } => queue.push_back(page_id),
            PolicyState::Opt => refresh_next_use(mmu, page_id),
            PolicyState::SecondChance { .. } | PolicyState::Mru | PolicyState::Random { .. } => {}
        }
    }

    /// A page just stopped being resident.
    pub fn on_page_evicted(&mut self, mmu: &Mmu, page_id: PageId) {
        if let PolicyState::Opt = self {
            refresh_next_use(mmu, page_id);
        }
    }

    /// The engine touched a resident page (including the touch that follows
    /// a fresh load).
    pub fn on_page_accessed(&mut self, mmu: &Mmu, page_id: PageId) {
        if let PolicyState::Opt = self {
            advance_future_use(mmu, page_id);
        }
    }

    /// Picks a resident page to evict, or `None` if no frame is occupied.
    pub fn choose_victim(&mut self, mmu: &Mmu) -> Option<PageId> {
        match self {
            PolicyState::Fifo { queue } => fifo_choose(mmu, queue),
            PolicyState::SecondChance { clock_hand } => sc_choose(mmu, clock_hand),
            PolicyState::Mru => mru_choose(mmu),
            PolicyState::Random { rng } => random_choose(mmu, rng),
            PolicyState::Opt => opt_choose(mmu),
        }
    }
}

fn opt_next_use_index(page: &Page) -> Option<usize> {
    page.future_uses.get(page.future_cursor).copied()
}

fn refresh_next_use(mmu: &Mmu, page_id: PageId) {
    let page = mmu.page(page_id);
    page.next_use_pos.set(opt_next_use_index(page));
}

fn advance_future_use(mmu: &Mmu, page_id: PageId) {
    let page = mmu.page(page_id);
    if page.future_cursor.get() < page.future_uses.len() {
        page.future_cursor.set(page.future_cursor.get() + 1);
    }
    page.next_use_pos.set(opt_next_use_index(page));
}

fn fifo_choose(mmu: &Mmu, queue: &mut VecDeque<PageId>) -> Option<PageId> {
    while let Some(candidate) = queue.pop_front() {
        let resident = mmu.try_page(candidate).is_some_and(|p| p.resident());
        if resident {
            return Some(candidate);
        }
    }
    None
}

fn sc_choose(mmu: &Mmu, clock_hand: &mut usize) -> Option<PageId> {
    let frames = mmu.frame_count();
    if frames == 0 {
        return None;
    }
    if *clock_hand >= frames {
        *clock_hand = 0;
    }

    for _ in 0..frames {
        if let Some(page_id) = mmu.frame_occupant(*clock_hand) {
            let page = mmu.page(page_id);
            if !page.ref_bit() {
                *clock_hand = (*clock_hand + 1) % frames;
                return Some(page_id);
            }
            page.set_ref_bit(false);
        }
        *clock_hand = (*clock_hand + 1) % frames;
    }

    for i in 0..frames {
        if let Some(page_id) = mmu.frame_occupant(i) {
            *clock_hand = (i + 1) % frames;
            return Some(page_id);
        }
    }
    None
}

fn mru_choose(mmu: &Mmu) -> Option<PageId> {
    let mut candidate = None;
    let mut best_time = 0u64;
    for i in 0..mmu.frame_count() {
        if let Some(page_id) = mmu.frame_occupant(i) {
            let last_used = mmu.page(page_id).last_used.get();
            if candidate.is_none() || last_used >= best_time {
                candidate = Some(page_id);
                best_time = last_used;
            }
        }
    }
    candidate
}

fn random_choose(mmu: &Mmu, rng: &mut Lcg) -> Option<PageId> {
    let occupied: Vec<PageId> = (0..mmu.frame_count())
        .filter_map(|i| mmu.frame_occupant(i))
        .collect();
    if occupied.is_empty() {
        return None;
    }
    let idx = rng.next_below(occupied.len());
    Some(occupied[idx])
}

fn opt_choose(mmu: &Mmu) -> Option<PageId> {
    let mut best_page = None;
    let mut farthest_use = 0usize;

    for i in 0..mmu.frame_count() {
        let page_id = match mmu.frame_occupant(i) {
            Some(id) => id,
            None => continue,
        };
        let page = mmu.page(page_id);
        match opt_next_use_index(page) {
            None => return Some(page_id),
            Some(next_use) => {
                if best_page.is_none() || next_use > farthest_use {
                    farthest_use = next_use;
                    best_page = Some(page_id);
                }
            }
        }
    }

    best_page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu::Mmu;

    fn mmu_with_frames(f: usize) -> Mmu {
        Mmu::new(f)
    }

    #[test]
    fn algorithm_codes_round_trip() {
        for kind in [
            AlgorithmKind::Opt,
            AlgorithmKind::Fifo,
            AlgorithmKind::SecondChance,
            AlgorithmKind::Mru,
            AlgorithmKind::Random,
        ] {
            assert_eq!(AlgorithmKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn fifo_skips_pages_no_longer_resident() {
        let mut mmu = mmu_with_frames(2);
        let p1 = mmu.test_alloc_page();
        let p2 = mmu.test_alloc_page();
        mmu.test_place(p1, 0);
        mmu.test_place(p2, 1);
        mmu.page(p1).set_resident(false);

        let mut queue = VecDeque::from([p1, p2]);
        assert_eq!(fifo_choose(&mmu, &mut queue), Some(p2));
    }

    #[test]
    fn mru_breaks_ties_toward_last_scanned() {
        let mut mmu = mmu_with_frames(2);
        let p1 = mmu.test_alloc_page();
        let p2 = mmu.test_alloc_page();
        mmu.test_place(p1, 0);
        mmu.test_place(p2, 1);
        mmu.page(p1).last_used.set(5);
        mmu.page(p2).last_used.set(5);

        assert_eq!(mru_choose(&mmu), Some(p2));
    }

    #[test]
    fn opt_prefers_no_future_use_immediately() {
        let mut mmu = mmu_with_frames(2);
        let p1 = mmu.test_alloc_page();
        let p2 = mmu.test_alloc_page();
        mmu.test_place(p1, 0);
        mmu.test_place(p2, 1);
        mmu.page_mut_for_test(p1).future_uses = vec![10];
        mmu.page_mut_for_test(p1).next_use_pos = std::cell::Cell::new(Some(10));
        mmu.page_mut_for_test(p2).future_uses = vec![];
        mmu.page_mut_for_test(p2).next_use_pos = std::cell::Cell::new(None);

        assert_eq!(opt_choose(&mmu), Some(p2));
    }

    #[test]
    fn random_choice_is_deterministic_for_a_seed() {
        let mut mmu = mmu_with_frames(3);
        let p1 = mmu.test_alloc_page();
        let p2 = mmu.test_alloc_page();
        mmu.test_place(p1, 0);
        mmu.test_place(p2, 1);

        let mut rng_a = Lcg::new(7);
        let mut rng_b = Lcg::new(7);
        assert_eq!(random_choose(&mmu, &mut rng_a), random_choose(&mmu, &mut rng_b));
    }
}
