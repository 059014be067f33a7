//! Move ordering. Good ordering is what makes alpha-beta cut: the hash or
//! PV move goes first, then captures by MVV-LVA, promotions, killer moves,
//! and finally the remaining quiet moves.

use arrayvec::ArrayVec;
use shakmaty::{Chess, Move, Position, Role};

use crate::position::piece_value;
use crate::types::Score;

pub const MAX_MOVES: usize = 256;

pub struct ScoredMove {
    pub mv: Move,
    pub score: Score,
}

pub type ScoredMoves = ArrayVec<ScoredMove, MAX_MOVES>;

const SCORE_HINT: Score = 100_000;
const SCORE_CAPTURE_BASE: Score = 10_000;
const SCORE_PROMOTION: Score = 9_000;
const SCORE_KILLER: [Score; 2] = [8_000, 7_000];

/// Cheap attackers first within equal victims.
fn attacker_rank(role: Role) -> Score {
    match role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    }
}

fn score_move(
    m: &Move,
    hint: Option<&Move>,
    killers: &[Option<Move>; 2],
) -> Score {
    if hint == Some(m) {
        return SCORE_HINT;
    }
    if let Some(victim) = m.capture() {
        let mut s = SCORE_CAPTURE_BASE + piece_value(victim) * 10 - attacker_rank(m.role());
        if m.promotion().is_some() {
            s += SCORE_PROMOTION;
        }
        return s;
    }
    if m.promotion().is_some() {
        return SCORE_PROMOTION;
    }
    for (slot, bonus) in killers.iter().zip(SCORE_KILLER) {
        if slot.as_ref() == Some(m) {
            return bonus;
        }
    }
    0
}

fn collect(
    moves: impl IntoIterator<Item = Move>,
    hint: Option<&Move>,
    killers: &[Option<Move>; 2],
) -> ScoredMoves {
    let mut scored: ScoredMoves = ArrayVec::new();
    for mv in moves {
        let score = score_move(&mv, hint, killers);
        scored.push(ScoredMove { mv, score });
    }
    scored.sort_unstable_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// All legal moves, ordered for the main search.
pub fn ordered_moves(
    pos: &Chess,
    hint: Option<&Move>,
    killers: &[Option<Move>; 2],
) -> ScoredMoves {
    collect(pos.legal_moves(), hint, killers)
}

/// Noisy moves for quiescence: captures and promotions, or every evasion
/// when the side to move is in check.
pub fn qsearch_moves(pos: &Chess, hint: Option<&Move>, in_check: bool) -> ScoredMoves {
    let no_killers = [None, None];
    let legal = pos.legal_moves();
    if in_check {
        return collect(legal, hint, &no_killers);
    }
    collect(
        legal
            .into_iter()
            .filter(|m| m.is_capture() || m.promotion().is_some()),
        hint,
        &no_killers,
    )
}
