//! Thread-local worker identity and seeding.
//!
//! Every worker thread learns its id when spawned. When the loader was given
//! a [`SeedWorkers`] hook, the worker is also reseeded at startup with
//! `base_seed + worker_id`, and anything running on that thread can draw from
//! the seeded generator through [`with_worker_rng`].

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::cell::{Cell, RefCell};

thread_local! {
    /// Thread-local worker ID (`None` outside worker threads).
    pub static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };

    /// Seed the worker was initialized with, if any.
    pub static WORKER_SEED: Cell<Option<u64>> = const { Cell::new(None) };

    /// Thread-local RNG for deterministic randomness in workers
    pub static WORKER_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// Worker initialization hook that reseeds each worker from one base seed.
///
/// Worker `w` gets seed `base_seed + w`, so two loaders built with the same
/// base seed produce identical per-worker random streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedWorkers {
    base_seed: u64,
}

impl SeedWorkers {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn seed_for(&self, worker_id: usize) -> u64 {
        self.base_seed.wrapping_add(worker_id as u64)
    }

    /// Runs on the worker thread before it takes its first task.
    pub fn init(&self, worker_id: usize) {
        init_worker_rng(self.seed_for(worker_id));
    }
}

/// Reseeds the current thread's worker RNG.
pub fn init_worker_rng(seed: u64) {
    WORKER_SEED.with(|s| s.set(Some(seed)));
    WORKER_RNG.with(|rng| *rng.borrow_mut() = Some(StdRng::seed_from_u64(seed)));
}

pub fn worker_id() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

pub fn worker_seed() -> Option<u64> {
    WORKER_SEED.with(Cell::get)
}

/// Runs `f` with the worker RNG, or with the thread's default RNG when the
/// current thread was never seeded.
pub fn with_worker_rng<R>(f: impl FnOnce(&mut dyn RngCore) -> R) -> R {
    WORKER_RNG.with(|rng| match rng.borrow_mut().as_mut() {
        Some(rng) => f(rng),
        None => f(&mut rand::rng()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn seed_is_base_plus_worker_id() {
        let hook = SeedWorkers::new(1_000);
        assert_eq!(hook.seed_for(0), 1_000);
        assert_eq!(hook.seed_for(7), 1_007);
        assert_eq!(SeedWorkers::new(u64::MAX).seed_for(1), 0);
    }

    #[test]
    fn initialized_threads_draw_reproducibly() {
        let draw = |worker_id: usize| {
            thread::spawn(move || {
                SeedWorkers::new(42).init(worker_id);
                let seed = worker_seed();
                let value = with_worker_rng(|rng| rng.next_u64());
                (seed, value)
            })
            .join()
            .unwrap()
        };
        let (seed_a, a) = draw(3);
        let (seed_b, b) = draw(3);
        assert_eq!(seed_a, Some(45));
        assert_eq!((seed_a, a), (seed_b, b));
        assert_ne!(draw(4).1, a);
    }

    #[test]
    fn unseeded_thread_falls_back() {
        thread::spawn(|| {
            assert_eq!(worker_seed(), None);
            assert_eq!(worker_id(), None);
            let _ = with_worker_rng(|rng| rng.next_u32());
        })
        .join()
        .unwrap();
    }
}
