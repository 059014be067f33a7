//! The search core: per-ply scratch state, the iterative-deepening driver
//! with its window strategies, and (in the submodules) the recursive
//! alpha-beta node and the quiescence extension.

mod alpha_beta;
mod counters;
mod quiescence;

pub use counters::SearchCounters;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrayvec::ArrayVec;
use shakmaty::{Chess, Move, Position};

use crate::config::SearchOptions;
use crate::error::EngineError;
use crate::movepick;
use crate::perft::perft;
use crate::position::{is_legal, play, zobrist_key};
use crate::time::TimeManager;
use crate::tt::{value_from_tt, TranspositionTable};
use crate::types::{
    Score, SearchMode, SearchResult, CHECKMATE, DRAW, INFINITY, MAX_PLY, MAX_SEARCH_DEPTH,
};

pub type PvLine = ArrayVec<Move, MAX_PLY>;

/// Per-iteration progress, handed to the sink after every completed depth.
#[derive(Clone, Debug)]
pub struct SearchProgress {
    pub depth: i32,
    pub seldepth: i32,
    pub score: Score,
    pub nodes: u64,
    pub nps: u64,
    pub time_ms: u64,
    pub hashfull: u16,
    pub pv: Vec<Move>,
}

/// Where the search reports to: `info` lines per iteration, the final
/// `bestmove` when the orchestrator releases a result.
pub trait InfoSink: Send + Sync {
    fn send_info(&self, progress: &SearchProgress);
    fn send_result(&self, result: &SearchResult);
}

/// A sink that swallows everything. Used by perft validation and tests.
pub struct NullSink;

impl InfoSink for NullSink {
    fn send_info(&self, _progress: &SearchProgress) {}
    fn send_result(&self, _result: &SearchResult) {}
}

struct RootMove {
    mv: Move,
    value: Option<Score>,
}

const KILLER_SLOTS: usize = 2;
const PV_SEED_CAP: usize = 32;
const ASPIRATION_WINDOWS: [Score; 2] = [30, 200];

/// All state one search worker owns: the transposition table, per-ply
/// scratch buffers, counters and the cooperative stop machinery. Reused
/// across searches; nothing here allocates per node.
pub struct Search {
    pub options: SearchOptions,
    pub tt: TranspositionTable,
    pub counters: SearchCounters,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) time: Arc<TimeManager>,

    killers: Box<[[Option<Move>; KILLER_SLOTS]]>,
    pv: Box<[PvLine]>,
    mate_threat: Box<[bool]>,
    single_reply: Box<[bool]>,
    /// Zobrist keys of every position on the path: game prefix plus the
    /// ancestors of the node being searched.
    key_history: Vec<u64>,

    root_moves: Vec<RootMove>,
    root_best_move: Option<Move>,
    node_limit: u64,
    current_iteration_depth: i32,
}

impl Search {
    pub fn new(
        options: SearchOptions,
        stop: Arc<AtomicBool>,
        time: Arc<TimeManager>,
    ) -> Result<Self, EngineError> {
        options.validate()?;
        let tt = TranspositionTable::new(options.hash_size_mb)?;
        Ok(Self {
            options,
            tt,
            counters: SearchCounters::default(),
            stop,
            time,
            killers: vec![[None, None]; MAX_PLY].into_boxed_slice(),
            pv: vec![PvLine::new(); MAX_PLY].into_boxed_slice(),
            mate_threat: vec![false; MAX_PLY].into_boxed_slice(),
            single_reply: vec![false; MAX_PLY].into_boxed_slice(),
            key_history: Vec::with_capacity(MAX_PLY * 2),
            root_moves: Vec::with_capacity(movepick::MAX_MOVES),
            root_best_move: None,
            node_limit: 0,
            current_iteration_depth: 0,
        })
    }

    /// Rebuild the transposition table at a new size, dropping its contents.
    pub fn set_hash_size(&mut self, mb: usize) -> Result<(), EngineError> {
        self.tt = TranspositionTable::new(mb)?;
        self.options.hash_size_mb = mb;
        Ok(())
    }

    /// Run one search to completion (or until stopped) and return the
    /// result. `keys` is the game's position-key history, current position
    /// last; the driver needs it for repetition detection.
    pub fn run(
        &mut self,
        pos: &Chess,
        keys: &[u64],
        mode: &SearchMode,
        sink: &dyn InfoSink,
    ) -> SearchResult {
        self.prepare(keys);
        self.node_limit = mode.node_limit;

        if mode.perft || self.options.perft {
            return self.run_perft(pos, mode, sink);
        }

        if self.options.use_tt {
            self.tt.age_all();
        }

        let mut result = SearchResult::new();

        // A game that is already over never enters the deepening loop.
        if pos.legal_moves().is_empty() {
            result.score = if pos.is_check() { -CHECKMATE } else { DRAW };
            result.time_ms = self.time.elapsed_ms();
            return result;
        }

        if mode.last_move_from_book {
            self.time.add_extra_time(2.0);
        }

        let mut max_depth = mode.max_depth.clamp(1, MAX_SEARCH_DEPTH);
        if mode.mate_in > 0 {
            max_depth = (2 * mode.mate_in - 1).clamp(1, MAX_SEARCH_DEPTH);
        }
        let start_depth = mode.start_depth.clamp(1, max_depth);

        let root_key = zobrist_key(pos);
        let mut prior_value: Option<Score> = None;
        let mut seed_move: Option<Move> = None;
        if self.options.use_tt && self.options.use_tt_root {
            if let Some(entry) = self.tt.probe(root_key) {
                if let Some(m) = entry.best_move.clone()
                    && is_legal(pos, &m)
                {
                    self.seed_pv_from_tt(pos, &m);
                    self.root_best_move = Some(m.clone());
                    seed_move = Some(m);
                }
                if entry.depth as i32 >= start_depth {
                    prior_value = Some(value_from_tt(entry.value as Score, 0));
                }
            }
        }

        self.collect_root_moves(pos, seed_move.as_ref(), mode.restricted_moves.as_deref());
        if self.root_best_move.is_none() {
            self.root_best_move = self.root_moves.first().map(|r| r.mv.clone());
        }
        if self.pv[0].is_empty()
            && let Some(first) = self.root_moves.first()
        {
            self.pv[0].push(first.mv.clone());
        }
        self.single_reply[0] = self.root_moves.len() == 1;
        if self.single_reply[0] {
            self.time.add_extra_time(1.5);
        }

        let mut completed_depth = 0;
        for depth in start_depth..=max_depth {
            self.current_iteration_depth = depth;
            self.counters.iteration_depth = depth;

            let value = if self.options.use_mtdf
                && depth >= self.options.mtdf_start_depth
                && let Some(guess) = prior_value
            {
                self.mtdf(pos, depth, guess)
            } else if self.options.use_aspiration
                && depth >= self.options.aspiration_start_depth
                && let Some(prev) = prior_value
            {
                self.aspiration(pos, depth, prev)
            } else {
                self.search(pos, depth, 0, -INFINITY, INFINITY, true, true)
            };

            if !self.stopped() {
                prior_value = Some(value);
                completed_depth = depth;
                if let Some(best) = self.pv[0].first().cloned() {
                    self.promote_root_move(&best);
                    self.root_best_move = Some(best);
                }
                self.emit_info(sink, depth, value);
            }

            if self.stopped() || self.time.soft_reached() || self.time.hard_reached() {
                break;
            }
        }

        result.best_move = self.root_best_move.clone();
        result.ponder_move = self.pv[0].get(1).cloned();
        result.score = prior_value.unwrap_or(DRAW);
        result.depth = completed_depth;
        result.seldepth = self.counters.seldepth;
        result.nodes = self.counters.nodes;
        result.time_ms = self.time.elapsed_ms();
        result
    }

    /// Move-generator validation mode: raw node counts per depth, no
    /// pruning, no evaluation.
    fn run_perft(&mut self, pos: &Chess, mode: &SearchMode, sink: &dyn InfoSink) -> SearchResult {
        let mut result = SearchResult::new();
        let max_depth = mode.max_depth.clamp(1, MAX_SEARCH_DEPTH);
        for depth in 1..=max_depth {
            let nodes = perft(pos, depth as u32);
            self.counters.leaf_evaluations = nodes;
            self.counters.nodes += nodes;
            self.counters.iteration_depth = depth;
            let time_ms = self.time.elapsed_ms();
            sink.send_info(&SearchProgress {
                depth,
                seldepth: depth,
                score: DRAW,
                nodes,
                nps: nodes * 1000 / time_ms.max(1),
                time_ms,
                hashfull: 0,
                pv: Vec::new(),
            });
            if self.stopped() {
                break;
            }
        }
        result.nodes = self.counters.leaf_evaluations;
        result.depth = self.counters.iteration_depth;
        result.time_ms = self.time.elapsed_ms();
        result
    }

    /// Aspiration windows: assume the score lands near the previous
    /// iteration's, and re-search wider when it escapes. A fail-low is a
    /// nasty surprise, so it also buys extra time.
    fn aspiration(&mut self, pos: &Chess, depth: i32, prev: Score) -> Score {
        let mut stage = 0;
        loop {
            let (alpha, beta) = if stage < ASPIRATION_WINDOWS.len() {
                let w = ASPIRATION_WINDOWS[stage];
                ((prev - w).max(-INFINITY), (prev + w).min(INFINITY))
            } else {
                (-INFINITY, INFINITY)
            };
            let value = self.search(pos, depth, 0, alpha, beta, true, true);
            if self.stopped() || stage >= ASPIRATION_WINDOWS.len() {
                return value;
            }
            if value <= alpha {
                self.time.add_extra_time(1.3);
                self.counters.aspiration_researches += 1;
                stage += 1;
            } else if value >= beta {
                self.counters.aspiration_researches += 1;
                stage += 1;
            } else {
                return value;
            }
        }
    }

    /// MTD(f): zero-window probes around a running guess, tightening an
    /// upper and lower bound until they meet at the minimax value.
    fn mtdf(&mut self, pos: &Chess, depth: i32, guess: Score) -> Score {
        let mut g = guess;
        let mut lower = -INFINITY;
        let mut upper = INFINITY;
        loop {
            let beta = if g == lower { g + 1 } else { g };
            g = self.search(pos, depth, 0, beta - 1, beta, true, true);
            if self.stopped() {
                break;
            }
            if g < beta {
                upper = g;
            } else {
                lower = g;
            }
            if lower >= upper {
                break;
            }
            self.counters.mtdf_researches += 1;
        }
        g
    }

    fn prepare(&mut self, keys: &[u64]) {
        self.counters.reset();
        for slot in self.killers.iter_mut() {
            *slot = [None, None];
        }
        for line in self.pv.iter_mut() {
            line.clear();
        }
        self.mate_threat.fill(false);
        self.single_reply.fill(false);
        self.key_history.clear();
        // The current position's own key is pushed by the root node itself.
        if let Some((_, prefix)) = keys.split_last() {
            self.key_history.extend_from_slice(prefix);
        }
        self.root_moves.clear();
        self.root_best_move = None;
        self.current_iteration_depth = 0;
    }

    fn collect_root_moves(
        &mut self,
        pos: &Chess,
        seed: Option<&Move>,
        restricted: Option<&[String]>,
    ) {
        let ordered = movepick::ordered_moves(pos, seed, &[None, None]);
        for scored in &ordered {
            if let Some(allowed) = restricted {
                let uci = crate::position::uci_string(&scored.mv);
                if !allowed.iter().any(|s| s == &uci) {
                    continue;
                }
            }
            self.root_moves.push(RootMove { mv: scored.mv.clone(), value: None });
        }
        // An over-restrictive list would leave nothing to search; ignore it
        // rather than failing the whole search.
        if self.root_moves.is_empty() {
            for scored in &ordered {
                self.root_moves.push(RootMove { mv: scored.mv.clone(), value: None });
            }
        }
    }

    /// Walk the table's best-move chain to reconstruct a tentative PV before
    /// the first iteration. Bounded, since TT cycles are possible.
    fn seed_pv_from_tt(&mut self, pos: &Chess, first: &Move) {
        let mut line = PvLine::new();
        let mut current = pos.clone();
        let mut mv = first.clone();
        while line.len() < PV_SEED_CAP {
            if !is_legal(&current, &mv) {
                break;
            }
            current = play(&current, &mv);
            line.push(mv.clone());
            match self.tt.probe(zobrist_key(&current)).and_then(|e| e.best_move) {
                Some(next) => mv = next,
                None => break,
            }
        }
        self.pv[0] = line;
    }

    /// The committed best move leads the next iteration; the rest follow in
    /// order of their recorded root scores.
    fn promote_root_move(&mut self, mv: &Move) {
        if let Some(idx) = self.root_moves.iter().position(|r| &r.mv == mv)
            && idx > 0
        {
            let rm = self.root_moves.remove(idx);
            self.root_moves.insert(0, rm);
        }
        if self.root_moves.len() > 1 {
            self.root_moves[1..].sort_by(|a, b| b.value.cmp(&a.value));
        }
    }

    fn emit_info(&self, sink: &dyn InfoSink, depth: i32, score: Score) {
        let time_ms = self.time.elapsed_ms();
        sink.send_info(&SearchProgress {
            depth,
            seldepth: self.counters.seldepth,
            score,
            nodes: self.counters.nodes,
            nps: self.counters.nodes * 1000 / time_ms.max(1),
            time_ms,
            hashfull: if self.options.use_tt { self.tt.hashfull() } else { 0 },
            pv: self.pv[0].iter().cloned().collect(),
        });
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Polled at every node entry: external stop, node budget, hard time.
    pub(crate) fn should_stop(&mut self) -> bool {
        if self.stopped() {
            return true;
        }
        if self.node_limit > 0 && self.counters.nodes >= self.node_limit {
            self.stop.store(true, Ordering::Relaxed);
            return true;
        }
        self.time.hard_reached()
    }

    /// Has this key occurred at least `n` times on the path so far?
    pub(crate) fn is_repetition(&self, key: u64, n: usize) -> bool {
        self.key_history.iter().filter(|&&k| k == key).count() >= n
    }

    /// Draw score from the side to move's perspective. Positive contempt
    /// makes repetitions unattractive.
    pub(crate) fn contempt(&self) -> Score {
        -self.options.contempt_factor
    }

    /// Prepend `m` to the child's line to form this ply's PV.
    pub(crate) fn update_pv(&mut self, ply: usize, m: &Move) {
        let (head, tail) = self.pv.split_at_mut(ply + 1);
        let line = &mut head[ply];
        line.clear();
        line.push(m.clone());
        if let Some(child_line) = tail.first() {
            for mv in child_line {
                if line.is_full() {
                    break;
                }
                line.push(mv.clone());
            }
        }
    }

    /// The principal variation rooted at the last search.
    pub fn pv_line(&self) -> &[Move] {
        &self.pv[0]
    }
}
