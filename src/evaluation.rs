use shakmaty::{Chess, Color, Position, Role};

use crate::position::ROLES;
use crate::pst::{EG_PIECE_VALUE, EG_TABLE, MG_PIECE_VALUE, MG_TABLE, PHASE_WEIGHT, TOTAL_PHASE};
use crate::types::Score;

/// Maps a role to the piece-square-table index (0-5).
fn piece_index(role: Role) -> usize {
    match role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    }
}

/// Evaluates the position with a material + piece-square tapered blend.
/// Returns centipawns from the side to move's perspective.
pub fn evaluate(pos: &Chess) -> Score {
    let board = pos.board();
    let mut mg_score: [Score; 2] = [0, 0]; // [white, black]
    let mut eg_score: [Score; 2] = [0, 0];
    let mut phase: i32 = 0;

    for color in [Color::White, Color::Black] {
        let side = if color == Color::White { 0 } else { 1 };
        for &role in &ROLES {
            let idx = piece_index(role);
            for sq in board.by_color(color) & board.by_role(role) {
                mg_score[side] += MG_PIECE_VALUE[idx];
                eg_score[side] += EG_PIECE_VALUE[idx];

                // Tables are stored rank-8 first; White flips the rank.
                let pst_idx = match color {
                    Color::White => usize::from(sq) ^ 56,
                    Color::Black => usize::from(sq),
                };
                mg_score[side] += MG_TABLE[idx][pst_idx];
                eg_score[side] += EG_TABLE[idx][pst_idx];

                phase += PHASE_WEIGHT[idx];
            }
        }
    }

    let phase = phase.min(TOTAL_PHASE);
    let mg = mg_score[0] - mg_score[1];
    let eg = eg_score[0] - eg_score[1];

    // Blend midgame and endgame scores by remaining material.
    let score = (mg * phase + eg * (TOTAL_PHASE - phase)) / TOTAL_PHASE;

    match pos.turn() {
        Color::White => score,
        Color::Black => -score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::parse_fen;

    #[test]
    fn test_startpos_is_balanced() {
        let score = evaluate(&Chess::default());
        assert_eq!(score, 0, "mirrored position must evaluate to 0, got {score}");
    }

    #[test]
    fn test_white_up_queen() {
        let pos = parse_fen("rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").unwrap();
        let score = evaluate(&pos);
        assert!(score > 700, "white up a queen should score high, got {score}");
    }

    #[test]
    fn test_score_is_side_to_move_relative() {
        // Same material edge, once seen from White and once from Black.
        let white_ahead_wtm =
            parse_fen("rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").unwrap();
        let white_ahead_btm =
            parse_fen("rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1").unwrap();
        let from_white = evaluate(&white_ahead_wtm);
        let from_black = evaluate(&white_ahead_btm);
        assert!(from_white > 0);
        assert!(from_black < 0);
    }

    #[test]
    fn test_endgame_pawn_edge() {
        let pos = parse_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        let score = evaluate(&pos);
        assert!(score > 0, "extra pawn should be positive, got {score}");
    }
}
