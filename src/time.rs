//! Wall-clock control. Converts the client's time-control description into a
//! soft deadline (checked between iterations: is another depth worth
//! starting?) and a hard deadline (checked inside the tree: abort now).
//!
//! All fields are atomics: the worker polls while the caller may re-arm the
//! clock on a ponder hit. Reads are advisory; both deadline checks latch once
//! they trigger and raise the shared stop flag.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use shakmaty::Color;

use crate::types::SearchMode;

const SAFETY_MARGIN_MS: u64 = 1_000;
const DEFAULT_MOVES_TO_GO: u64 = 40;
const SOFT_FACTOR: f64 = 0.8;
/// Below this hard budget the clock is in trouble; shrink instead of extend.
const EMERGENCY_THRESHOLD_MS: u64 = 100;
const EMERGENCY_FACTOR: f64 = 0.9;
/// Sentinel for "no wall-clock limit".
const UNTIMED: u64 = u64::MAX;

pub struct TimeManager {
    created: Instant,
    /// Elapsed-at-arm offset, so the clock restarts without a new `Instant`.
    baseline_ms: AtomicU64,
    soft_ms: AtomicU64,
    hard_ms: AtomicU64,
    /// Accumulated extension (negative = emergency shrink).
    extra_ms: AtomicI64,
    /// A fixed per-move budget accepts no extensions.
    fixed_budget: AtomicBool,
    soft_hit: AtomicBool,
    hard_hit: AtomicBool,
    stop: Arc<AtomicBool>,
}

impl TimeManager {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            created: Instant::now(),
            baseline_ms: AtomicU64::new(0),
            soft_ms: AtomicU64::new(UNTIMED),
            hard_ms: AtomicU64::new(UNTIMED),
            extra_ms: AtomicI64::new(0),
            fixed_budget: AtomicBool::new(false),
            soft_hit: AtomicBool::new(false),
            hard_hit: AtomicBool::new(false),
            stop,
        }
    }

    /// Derive limits for a search and restart the clock. Also used on
    /// ponder hit, where the same mode is re-armed without the ponder flag.
    pub fn arm(&self, mode: &SearchMode, side: Color) {
        self.baseline_ms.store(self.total_elapsed_ms(), Ordering::Relaxed);
        self.extra_ms.store(0, Ordering::Relaxed);
        self.soft_hit.store(false, Ordering::Relaxed);
        self.hard_hit.store(false, Ordering::Relaxed);
        self.fixed_budget.store(false, Ordering::Relaxed);

        if !mode.is_timed() {
            self.soft_ms.store(UNTIMED, Ordering::Relaxed);
            self.hard_ms.store(UNTIMED, Ordering::Relaxed);
            return;
        }

        if mode.move_time_ms > 0 {
            self.hard_ms.store(mode.move_time_ms, Ordering::Relaxed);
            self.soft_ms.store(mode.move_time_ms, Ordering::Relaxed);
            self.fixed_budget.store(true, Ordering::Relaxed);
            return;
        }

        let idx = if side == Color::White { 0 } else { 1 };
        let time_left = mode.remaining_time_ms[idx].saturating_sub(SAFETY_MARGIN_MS);
        let moves_left = if mode.moves_to_go > 0 { mode.moves_to_go } else { DEFAULT_MOVES_TO_GO };
        let hard = (time_left + DEFAULT_MOVES_TO_GO * mode.inc_ms[idx]) / moves_left.max(1);
        let soft = (hard as f64 * SOFT_FACTOR) as u64;
        self.hard_ms.store(hard, Ordering::Relaxed);
        self.soft_ms.store(soft, Ordering::Relaxed);

        if hard < EMERGENCY_THRESHOLD_MS {
            self.add_extra_time(EMERGENCY_FACTOR);
        }
    }

    /// Accumulate `hard * (factor - 1)` of extra time. Ignored under a fixed
    /// per-move budget or when no clock is running.
    pub fn add_extra_time(&self, factor: f64) {
        if self.fixed_budget.load(Ordering::Relaxed) {
            return;
        }
        let hard = self.hard_ms.load(Ordering::Relaxed);
        if hard == UNTIMED {
            return;
        }
        let bonus = (hard as f64 * (factor - 1.0)) as i64;
        self.extra_ms.fetch_add(bonus, Ordering::Relaxed);
    }

    /// Should the driver skip starting another iteration? Latches, and sets
    /// the shared stop flag.
    pub fn soft_reached(&self) -> bool {
        if self.soft_hit.load(Ordering::Relaxed) {
            return true;
        }
        let soft = self.soft_ms.load(Ordering::Relaxed);
        if soft == UNTIMED {
            return false;
        }
        let extra = (self.extra_ms.load(Ordering::Relaxed) as f64 * SOFT_FACTOR) as i64;
        let limit = (soft as i64 + extra).max(0);
        if self.elapsed_ms() as i64 >= limit {
            self.soft_hit.store(true, Ordering::Relaxed);
            self.stop.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Must the search abort mid-iteration? Latches, and sets the shared
    /// stop flag.
    pub fn hard_reached(&self) -> bool {
        if self.hard_hit.load(Ordering::Relaxed) {
            return true;
        }
        let hard = self.hard_ms.load(Ordering::Relaxed);
        if hard == UNTIMED {
            return false;
        }
        let limit = (hard as i64 + self.extra_ms.load(Ordering::Relaxed)).max(0);
        if self.elapsed_ms() as i64 >= limit {
            self.hard_hit.store(true, Ordering::Relaxed);
            self.stop.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Milliseconds since the clock was (re-)armed.
    pub fn elapsed_ms(&self) -> u64 {
        self.total_elapsed_ms()
            .saturating_sub(self.baseline_ms.load(Ordering::Relaxed))
    }

    pub fn hard_limit_ms(&self) -> Option<u64> {
        match self.hard_ms.load(Ordering::Relaxed) {
            UNTIMED => None,
            ms => Some(ms),
        }
    }

    pub fn soft_limit_ms(&self) -> Option<u64> {
        match self.soft_ms.load(Ordering::Relaxed) {
            UNTIMED => None,
            ms => Some(ms),
        }
    }

    pub fn extra_time_ms(&self) -> i64 {
        self.extra_ms.load(Ordering::Relaxed)
    }

    fn total_elapsed_ms(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn manager() -> (TimeManager, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        (TimeManager::new(stop.clone()), stop)
    }

    #[test]
    fn test_game_time_allocation() {
        let (tm, _) = manager();
        let mut mode = SearchMode::default();
        mode.remaining_time_ms = [61_000, 0];
        mode.inc_ms = [1_000, 0];
        tm.arm(&mode, Color::White);
        // (60_000 + 40 * 1_000) / 40 = 2_500 hard, 2_000 soft.
        assert_eq!(tm.hard_limit_ms(), Some(2_500));
        assert_eq!(tm.soft_limit_ms(), Some(2_000));
    }

    #[test]
    fn test_moves_to_go_splits_budget() {
        let (tm, _) = manager();
        let mut mode = SearchMode::default();
        mode.remaining_time_ms = [0, 21_000];
        mode.moves_to_go = 10;
        tm.arm(&mode, Color::Black);
        assert_eq!(tm.hard_limit_ms(), Some(2_000));
    }

    #[test]
    fn test_fixed_move_time_refuses_extensions() {
        let (tm, _) = manager();
        tm.arm(&SearchMode::move_time(750), Color::White);
        assert_eq!(tm.hard_limit_ms(), Some(750));
        assert_eq!(tm.soft_limit_ms(), Some(750));
        tm.add_extra_time(2.0);
        assert_eq!(tm.extra_time_ms(), 0);
    }

    #[test]
    fn test_extension_accumulates() {
        let (tm, _) = manager();
        let mut mode = SearchMode::default();
        mode.remaining_time_ms = [41_000, 0];
        tm.arm(&mode, Color::White);
        let hard = tm.hard_limit_ms().unwrap();
        tm.add_extra_time(1.5);
        tm.add_extra_time(1.3);
        let expected =
            (hard as f64 * (1.5 - 1.0)) as i64 + (hard as f64 * (1.3 - 1.0)) as i64;
        assert_eq!(tm.extra_time_ms(), expected);
    }

    #[test]
    fn test_emergency_shrink() {
        let (tm, _) = manager();
        let mut mode = SearchMode::default();
        mode.remaining_time_ms = [4_200, 0];
        tm.arm(&mode, Color::White);
        // 3_200 / 40 = 80 ms hard: below the emergency threshold, so the
        // accumulator starts negative.
        assert_eq!(tm.hard_limit_ms(), Some(80));
        assert!(tm.extra_time_ms() < 0);
    }

    #[test]
    fn test_untimed_modes_never_trigger() {
        let (tm, stop) = manager();
        tm.arm(&SearchMode::infinite(), Color::White);
        assert!(!tm.soft_reached());
        assert!(!tm.hard_reached());

        let mut ponder = SearchMode::default();
        ponder.remaining_time_ms = [500, 500];
        ponder.ponder = true;
        tm.arm(&ponder, Color::White);
        sleep(Duration::from_millis(5));
        assert!(!tm.hard_reached());
        assert!(!stop.load(Ordering::Relaxed));
    }

    #[test]
    fn test_hard_deadline_latches_and_stops() {
        let (tm, stop) = manager();
        tm.arm(&SearchMode::move_time(1), Color::White);
        sleep(Duration::from_millis(5));
        assert!(tm.hard_reached());
        assert!(stop.load(Ordering::Relaxed));
        // Latched: stays true without re-checking the clock.
        assert!(tm.hard_reached());
        assert!(tm.soft_reached());
    }

    #[test]
    fn test_rearm_restarts_clock() {
        let (tm, stop) = manager();
        tm.arm(&SearchMode::move_time(1), Color::White);
        sleep(Duration::from_millis(5));
        assert!(tm.hard_reached());

        stop.store(false, Ordering::Relaxed);
        tm.arm(&SearchMode::move_time(10_000), Color::White);
        assert!(!tm.hard_reached());
        assert!(tm.elapsed_ms() < 1_000);
    }
}
