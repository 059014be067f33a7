use shakmaty::Move;

use crate::error::EngineError;
use crate::types::{Score, CHECKMATE_THRESHOLD};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Bound {
    #[default]
    None,
    Exact,
    /// Beta cutoff: the true value is >= the stored value.
    Lower,
    /// Failed low: the true value is <= the stored value.
    Upper,
}

/// One table record. Kept within 32 bytes so a slot stays inside a cache
/// line together with its neighbor.
#[derive(Clone, Debug, Default)]
pub struct TtEntry {
    /// Full fingerprint, used to disambiguate slot collisions. 0 = empty.
    pub key: u64,
    /// Score, ply-adjusted for mates by the caller.
    pub value: i16,
    /// Plies remaining when this score was produced.
    pub depth: u8,
    pub bound: Bound,
    /// Incremented by `age_all` at every new search, decremented on probe
    /// hits. An entry with age > 0 has gone a whole search unreferenced.
    pub age: u8,
    pub mate_threat: bool,
    pub best_move: Option<Move>,
}

const _: () = assert!(std::mem::size_of::<TtEntry>() <= 32);

const AGE_CAP: u8 = 7;
pub const MIN_HASH_MB: usize = 1;

#[derive(Clone, Debug, Default)]
pub struct TtStats {
    pub probes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Different position overwritten in the same slot.
    pub collisions: u64,
    pub inserts: u64,
    pub updates: u64,
}

/// Fixed-capacity, direct-mapped transposition table. One slot per index,
/// addressed by `key % capacity`; the full key disambiguates collisions.
pub struct TranspositionTable {
    entries: Vec<TtEntry>,
    stats: TtStats,
}

impl TranspositionTable {
    /// Allocates and zeroes the whole table up front.
    pub fn new(mb: usize) -> Result<Self, EngineError> {
        if mb < MIN_HASH_MB {
            return Err(EngineError::Config(format!(
                "hash size must be at least {MIN_HASH_MB} MB, got {mb}"
            )));
        }
        let stride = std::mem::size_of::<TtEntry>();
        let capacity = mb * 1024 * 1024 / stride;
        Ok(Self {
            entries: vec![TtEntry::default(); capacity],
            stats: TtStats::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn slot(&self, key: u64) -> usize {
        (key % self.entries.len() as u64) as usize
    }

    /// Look up a position. A hit freshens the entry (age moves toward 0).
    pub fn probe(&mut self, key: u64) -> Option<TtEntry> {
        self.stats.probes += 1;
        let idx = self.slot(key);
        let entry = &mut self.entries[idx];
        if entry.key == key && entry.key != 0 {
            entry.age = entry.age.saturating_sub(1);
            self.stats.hits += 1;
            Some(entry.clone())
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Store a search result. Replacement policy:
    /// empty slots fill; foreign entries are overwritten only by an equal or
    /// deeper search once they have aged a whole search unreferenced; own
    /// entries are upgraded depth-preferred, and exact scores are never
    /// downgraded to a bound at equal depth.
    pub fn store(
        &mut self,
        key: u64,
        value: Score,
        bound: Bound,
        depth: i32,
        best_move: Option<Move>,
        mate_threat: bool,
    ) {
        let depth = depth.clamp(0, u8::MAX as i32) as u8;
        let value = value.clamp(i16::MIN as Score, i16::MAX as Score) as i16;
        let idx = self.slot(key);
        let entry = &mut self.entries[idx];

        if entry.key == 0 {
            *entry = TtEntry { key, value, depth, bound, age: 0, mate_threat, best_move };
            self.stats.inserts += 1;
        } else if entry.key != key {
            if depth >= entry.depth && entry.age > 0 {
                *entry = TtEntry { key, value, depth, bound, age: 0, mate_threat, best_move };
                self.stats.collisions += 1;
            }
        } else if depth > entry.depth {
            entry.value = value;
            entry.bound = bound;
            entry.depth = depth;
            entry.age = 0;
            entry.mate_threat = mate_threat;
            if best_move.is_some() {
                entry.best_move = best_move;
            }
            self.stats.updates += 1;
        } else if depth == entry.depth {
            entry.age = 0;
            entry.mate_threat = mate_threat;
            if entry.bound != Bound::Exact {
                entry.value = value;
                entry.bound = bound;
            }
            if best_move.is_some() {
                entry.best_move = best_move;
            }
            self.stats.updates += 1;
        } else if entry.best_move.is_none() && best_move.is_some() {
            // Shallower result: keep the stored score, but a move hint is
            // better than none.
            entry.best_move = best_move;
        }
    }

    /// Marks every occupied slot one search older. Called once when a new
    /// search starts.
    pub fn age_all(&mut self) {
        for entry in self.entries.iter_mut() {
            if entry.key != 0 {
                entry.age = (entry.age + 1).min(AGE_CAP);
            }
        }
    }

    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = TtEntry::default();
        }
        self.stats = TtStats::default();
    }

    pub fn stats(&self) -> &TtStats {
        &self.stats
    }

    /// Occupancy estimate in per mille, from a fixed-size sample.
    pub fn hashfull(&self) -> u16 {
        let sample = self.entries.len().min(1000);
        if sample == 0 {
            return 0;
        }
        let filled = self.entries[..sample].iter().filter(|e| e.key != 0).count();
        (filled * 1000 / sample) as u16
    }
}

/// Mate scores enter the table as "distance to mate from the storing node".
pub fn value_to_tt(value: Score, ply: usize) -> Score {
    if value >= CHECKMATE_THRESHOLD {
        value + ply as Score
    } else if value <= -CHECKMATE_THRESHOLD {
        value - ply as Score
    } else {
        value
    }
}

/// Re-offset a stored mate score to the probing node's ply.
pub fn value_from_tt(value: Score, ply: usize) -> Score {
    if value >= CHECKMATE_THRESHOLD {
        value - ply as Score
    } else if value <= -CHECKMATE_THRESHOLD {
        value + ply as Score
    } else {
        value
    }
}
