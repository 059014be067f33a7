//! The recursive negamax node. The order of business inside a node matters:
//! terminal routing, stop checks, draw detection, mate-distance pruning, the
//! transposition table, the forward-pruning block, and only then the move
//! loop with its extensions, per-move pruning and PVS windows.

use arrayvec::ArrayVec;
use shakmaty::{Chess, Move, Position, Role};

use crate::evaluation::evaluate;
use crate::movepick::{self, MAX_MOVES};
use crate::position::{
    has_non_pawn_material, is_pawn_push_to_seventh, material_balance, null_move, piece_value, play,
    zobrist_key,
};
use crate::tt::{value_from_tt, value_to_tt, Bound};
use crate::types::{is_mate_score, Score, CHECKMATE, DRAW, INFINITY, MAX_PLY};

use super::Search;

impl Search {
    /// Negamax with alpha-beta windows. Returns the node's value; fills
    /// `pv[ply]`, the table and the counters along the way. When the stop
    /// flag trips mid-node the return value is a sentinel the caller must
    /// discard.
    pub(crate) fn search(
        &mut self,
        pos: &Chess,
        depth: i32,
        ply: usize,
        mut alpha: Score,
        mut beta: Score,
        pv_node: bool,
        allow_null: bool,
    ) -> Score {
        let is_root = ply == 0;

        // Out of depth, out of plies, or past the iteration horizon: resolve
        // tactics instead of evaluating a noisy position.
        if depth <= 0 || ply + 1 >= MAX_PLY || ply as i32 - 1 >= self.current_iteration_depth {
            return self.quiescence(pos, ply, alpha, beta, pv_node);
        }

        self.counters.nodes += 1;
        if self.should_stop() {
            return -INFINITY;
        }

        self.pv[ply].clear();
        self.mate_threat[ply] = false;
        let key = zobrist_key(pos);

        if is_root {
            if pos.halfmoves() >= 100 || self.is_repetition(key, 2) {
                return DRAW;
            }
        } else if pos.halfmoves() >= 100 || self.is_repetition(key, 1) {
            return self.contempt();
        }

        // Mate-distance pruning: nothing below here can beat a mate we
        // already see, nor be worse than one we already suffer.
        if self.options.use_mdp && !is_root {
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
                if entry.depth as i32 >= depth && !is_root {
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
                }
            } else {
                self.counters.tt_misses += 1;
            }
        }

        let in_check = pos.is_check();

        if !pv_node && !in_check && allow_null && !is_root {
            let static_eval = evaluate(pos);
            self.counters.leaf_evaluations += 1;

            // Reverse futility: the position is so far above beta that even
            // a margin of error fails high.
            if self.options.use_rfp && depth == 1 {
                let margin = self.options.rfp_margin * depth;
                if static_eval - margin >= beta {
                    self.counters.rfp_prunes += 1;
                    let value = static_eval - margin;
                    if self.options.use_tt {
                        self.tt.store(
                            key,
                            value_to_tt(value, ply),
                            Bound::Lower,
                            depth,
                            None,
                            self.mate_threat[ply],
                        );
                    }
                    return value;
                }
            }

            // Null move: hand the opponent a free tempo; if the reduced
            // search still fails high, a real move will too. Unsound in
            // zugzwang, hence the material guard.
            if self.options.use_nmp
                && depth >= self.options.nmp_depth
                && has_non_pawn_material(pos)
                && !self.mate_threat[ply]
                && static_eval >= beta
                && let Some(null_pos) = null_move(pos)
            {
                let mut r = if depth > 6 { 3 } else { 2 };
                if self.options.verify_nmp {
                    r += 1;
                }
                let null_depth = depth - r;
                self.key_history.push(key);
                let mut null_value =
                    -self.search(&null_pos, null_depth, ply + 1, -beta, -beta + 1, false, false);
                self.key_history.pop();

                if is_mate_score(null_value) {
                    // The opponent mates if we stand still: warn the move
                    // loop so evasions get extended.
                    self.mate_threat[ply] = true;
                }

                if !self.stopped() {
                    if self.options.verify_nmp
                        && depth > self.options.nmp_verification_depth
                        && null_value >= beta
                    {
                        self.counters.nmp_verifications += 1;
                        // Another same-ply sub-search; keep this node's
                        // threat flag across it.
                        let mate_threat = self.mate_threat[ply];
                        null_value =
                            self.search(pos, null_depth, ply, beta - 1, beta, false, false);
                        self.mate_threat[ply] = mate_threat;
                    }
                    if null_value >= beta && !self.stopped() {
                        self.counters.nmp_prunes += 1;
                        if self.options.use_tt {
                            self.tt.store(
                                key,
                                value_to_tt(null_value, ply),
                                Bound::Lower,
                                depth,
                                None,
                                self.mate_threat[ply],
                            );
                        }
                        return null_value;
                    }
                }
            }

            // Razoring: hopelessly below alpha near the horizon; let the
            // tactical search have the last word.
            if self.options.use_razoring
                && depth <= self.options.razor_depth
                && !is_mate_score(alpha)
                && !self.mate_threat[ply]
                && static_eval + self.options.razor_margin <= alpha
            {
                self.counters.razor_drops += 1;
                return self.quiescence(pos, ply, alpha, beta, pv_node);
            }
        }

        let mut hint = tt_move;

        // Internal iterative deepening: a PV node with no move hint gets a
        // shallow preliminary search purely for its move ordering. The
        // sub-search runs at this same ply, so the scratch slots it scribbles
        // over are restored afterwards.
        if self.options.use_iid
            && pv_node
            && !is_root
            && hint.is_none()
            && depth > self.options.iid_reduction
        {
            self.counters.iid_searches += 1;
            let mate_threat = self.mate_threat[ply];
            self.search(pos, depth - self.options.iid_reduction, ply, alpha, beta, true, allow_null);
            hint = self.pv[ply].first().cloned();
            self.pv[ply].clear();
            self.mate_threat[ply] = mate_threat;
        }

        let moves: ArrayVec<Move, MAX_MOVES> = if is_root {
            self.root_moves.iter().map(|r| r.mv.clone()).collect()
        } else {
            let killers = if self.options.use_killers {
                self.killers[ply].clone()
            } else {
                [None, None]
            };
            let order_hint = if self.options.use_pvs_ordering { hint.as_ref() } else { None };
            movepick::ordered_moves(pos, order_hint, &killers)
                .into_iter()
                .map(|s| s.mv)
                .collect()
        };

        if moves.len() == 1 {
            self.single_reply[ply] = true;
        }

        let material_diff = material_balance(pos);
        let mate_threat_here = self.mate_threat[ply];

        let mut best_value = -INFINITY;
        let mut best_move: Option<Move> = None;
        let mut bound = Bound::Upper;
        let mut searched = 0usize;

        self.key_history.push(key);

        for (index, m) in moves.iter().enumerate() {
            // Under-promotions other than a knight are almost never best.
            if self.options.use_mpp
                && let Some(promo) = m.promotion()
                && promo != Role::Queen
                && promo != Role::Knight
            {
                self.counters.mpp_prunes += 1;
                continue;
            }

            let child = play(pos, m);
            let gives_check = child.is_check();
            let mut new_depth = depth - 1;
            let mut extended = false;

            if self.options.use_extensions {
                let forcing = mate_threat_here
                    || m.promotion().is_some()
                    || is_pawn_push_to_seventh(pos.turn(), m)
                    || matches!(m, Move::Castle { .. })
                    || gives_check;
                if forcing {
                    new_depth += 1;
                    extended = true;
                    self.counters.extensions += 1;
                }
            }

            if !pv_node && !extended && !in_check {
                let move_gain = m.capture().map(piece_value).unwrap_or(0);

                if self.options.use_limited_razoring
                    && depth == 3
                    && material_diff + move_gain + piece_value(Role::Queen) <= alpha
                {
                    self.counters.limited_razor_reductions += 1;
                    new_depth = 2;
                }
                if self.options.use_extended_futility
                    && depth == 2
                    && material_diff + move_gain + piece_value(Role::Rook) <= alpha
                {
                    self.counters.extended_futility_prunes += 1;
                    continue;
                }
                if self.options.use_futility
                    && depth == 1
                    && material_diff + move_gain + 3 * piece_value(Role::Pawn) <= alpha
                {
                    self.counters.futility_prunes += 1;
                    best_value = best_value.max(material_diff + move_gain);
                    continue;
                }
                if self.options.use_lmr
                    && searched >= self.options.lmr_min_moves
                    && depth >= self.options.lmr_min_depth
                {
                    self.counters.lmr_reductions += 1;
                    new_depth -= self.options.lmr_reduction;
                }
            }

            searched += 1;

            let value = if searched == 1 || !self.options.use_pvs {
                -self.search(&child, new_depth, ply + 1, -beta, -alpha, pv_node, true)
            } else {
                let zw = -self.search(&child, new_depth, ply + 1, -alpha - 1, -alpha, false, true);
                if zw > alpha && zw < beta && !self.stopped() {
                    self.counters.pvs_researches += 1;
                    -self.search(&child, new_depth, ply + 1, -beta, -alpha, pv_node, true)
                } else {
                    zw
                }
            };

            if self.stopped() {
                break;
            }

            if is_root {
                self.root_moves[index].value = Some(value);
            }

            if value > best_value {
                best_value = value;
                best_move = Some(m.clone());
            }

            if value >= beta && self.options.use_alphabeta {
                self.counters.record_beta_cutoff(searched - 1);
                if self.options.use_killers && !m.is_capture() {
                    self.push_killer(ply, m);
                }
                bound = Bound::Lower;
                break;
            }

            if value > alpha {
                bound = Bound::Exact;
                alpha = value;
                self.update_pv(ply, m);
                if is_root {
                    if self.root_best_move.as_ref() != Some(m) {
                        self.counters.best_move_changes += 1;
                    }
                    self.root_best_move = Some(m.clone());
                }
            }

            if is_root && (self.time.soft_reached() || self.time.hard_reached()) {
                break;
            }
        }

        self.key_history.pop();

        if moves.is_empty() && !is_root && !self.stopped() {
            best_value = if in_check { -CHECKMATE + ply as Score } else { DRAW };
        } else if searched == 0 && best_value == -INFINITY && !self.stopped() {
            // Every move was pruned away without a recorded value; the node
            // cannot raise the window.
            best_value = alpha;
        }

        if self.options.use_tt && !self.stopped() {
            self.tt.store(
                key,
                value_to_tt(best_value, ply),
                bound,
                depth,
                best_move,
                self.mate_threat[ply],
            );
        }

        best_value
    }

    fn push_killer(&mut self, ply: usize, m: &Move) {
        let slots = &mut self.killers[ply];
        if slots[0].as_ref() != Some(m) {
            slots[1] = slots[0].take();
            slots[0] = Some(m.clone());
        }
    }
}
