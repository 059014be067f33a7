//! Quiescence search: past the nominal horizon only forcing moves are
//! explored, so the evaluation is never taken in the middle of a capture
//! sequence. Stand-pat assumes the side to move always has a quiet option
//! worth at least the static evaluation.

use shakmaty::{Chess, Move, Position, Role};

use crate::evaluation::evaluate;
use crate::movepick;
use crate::position::{is_pawn_push_to_seventh, material_balance, piece_value, play, zobrist_key};
use crate::tt::{value_from_tt, value_to_tt, Bound};
use crate::types::{Score, CHECKMATE, INFINITY, MAX_PLY};

use super::Search;

impl Search {
    pub(crate) fn quiescence(
        &mut self,
        pos: &Chess,
        ply: usize,
        mut alpha: Score,
        mut beta: Score,
        pv_node: bool,
    ) -> Score {
        self.counters.nodes += 1;
        self.counters.qnodes += 1;
        self.counters.observe_seldepth(ply);
        self.pv[ply].clear();

        if ply + 1 >= MAX_PLY || !self.options.use_quiescence {
            self.counters.leaf_evaluations += 1;
            return evaluate(pos);
        }

        self.mate_threat[ply] = false;
        let key = zobrist_key(pos);

        if pos.halfmoves() >= 100 || self.is_repetition(key, 1) {
            return self.contempt();
        }

        if self.should_stop() {
            return -INFINITY;
        }

        if self.options.use_mdp {
            let a = alpha.max(-CHECKMATE + ply as Score);
            let b = beta.min(CHECKMATE - ply as Score);
            if a >= b {
                self.counters.mdp_prunes += 1;
                return a;
            }
            alpha = a;
            beta = b;
        }

        let mut tt_move: Option<Move> = None;
        if self.options.use_tt {
            self.counters.tt_probes += 1;
            if let Some(entry) = self.tt.probe(key) {
                self.counters.tt_hits += 1;
                tt_move = entry.best_move.clone();
                self.mate_threat[ply] = entry.mate_threat;
                let value = value_from_tt(entry.value as Score, ply);
                let cut = match entry.bound {
                    Bound::Exact => true,
                    Bound::Upper => !pv_node && value <= alpha,
                    Bound::Lower => !pv_node && value >= beta,
                    Bound::None => false,
                };
                if cut {
                    self.counters.tt_cuts += 1;
                    return value;
                }
            } else {
                self.counters.tt_misses += 1;
            }
        }

        let in_check = pos.is_check();
        let mut best_value = -INFINITY;

        // Standing pat is not an option while in check: every evasion must
        // be searched.
        if !in_check {
            let stand = evaluate(pos);
            self.counters.leaf_evaluations += 1;
            if stand >= beta {
                if self.options.use_tt && !self.stopped() {
                    let threat = self.mate_threat[ply];
                    self.tt.store(key, value_to_tt(stand, ply), Bound::Lower, 0, None, threat);
                }
                return stand;
            }
            if stand > alpha {
                alpha = stand;
            }
            best_value = stand;
        }

        let order_hint = if self.options.use_pvs_ordering { tt_move.as_ref() } else { None };
        let moves = movepick::qsearch_moves(pos, order_hint, in_check);

        let material_diff = material_balance(pos);
        let mut best_move: Option<Move> = None;
        let mut bound = Bound::Upper;

        self.key_history.push(key);

        for scored in &moves {
            let m = &scored.mv;

            if self.options.use_mpp
                && let Some(promo) = m.promotion()
                && promo != Role::Queen
                && promo != Role::Knight
            {
                self.counters.mpp_prunes += 1;
                continue;
            }

            let child = play(pos, m);

            // Delta pruning: even winning this capture outright cannot lift
            // the score back to alpha. Forcing moves are exempt.
            if self.options.use_qfutility && !in_check {
                let gain = m.capture().map(piece_value).unwrap_or(0);
                if gain + 2 * piece_value(Role::Pawn) + material_diff <= alpha
                    && m.promotion().is_none()
                    && !is_pawn_push_to_seventh(pos.turn(), m)
                    && !child.is_check()
                {
                    self.counters.qfutility_prunes += 1;
                    continue;
                }
            }

            let value = -self.quiescence(&child, ply + 1, -beta, -alpha, pv_node);

            if self.stopped() {
                break;
            }

            if value > best_value {
                best_value = value;
                best_move = Some(m.clone());
            }
            if value >= beta && self.options.use_alphabeta {
                bound = Bound::Lower;
                break;
            }
            if value > alpha {
                alpha = value;
                bound = Bound::Exact;
                self.update_pv(ply, m);
            }
        }

        self.key_history.pop();

        // In check with no evasions at all: mated right here.
        if moves.is_empty() && in_check {
            return -CHECKMATE + ply as Score;
        }

        if self.options.use_tt && !self.stopped() {
            self.tt.store(
                key,
                value_to_tt(best_value, ply),
                bound,
                0,
                best_move,
                self.mate_threat[ply],
            );
        }

        best_value
    }
}
