//! Thin adapter over `shakmaty`, which supplies position representation,
//! move generation, legality and Zobrist hashing. The search only touches
//! positions through the helpers in this module.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Rank, Role};

use crate::error::EngineError;
use crate::types::Score;

pub const ROLES: [Role; 6] = [
    Role::Pawn,
    Role::Knight,
    Role::Bishop,
    Role::Rook,
    Role::Queen,
    Role::King,
];

pub fn piece_value(role: Role) -> Score {
    match role {
        Role::Pawn => 100,
        Role::Knight => 320,
        Role::Bishop => 330,
        Role::Rook => 500,
        Role::Queen => 900,
        Role::King => 0,
    }
}

pub fn zobrist_key(pos: &Chess) -> u64 {
    let key: Zobrist64 = pos.zobrist_hash(EnPassantMode::Legal);
    key.0
}

/// Copy-make: positions are cheap to clone, so children are built instead of
/// mutated and unwound.
pub fn play(pos: &Chess, m: &Move) -> Chess {
    let mut child = pos.clone();
    child.play_unchecked(m);
    child
}

/// Pass the turn without touching the pieces. `None` when the side to move
/// is in check (a null move would leave the king hanging).
pub fn null_move(pos: &Chess) -> Option<Chess> {
    pos.clone().swap_turn().ok()
}

pub fn gives_check(pos: &Chess, m: &Move) -> bool {
    play(pos, m).is_check()
}

pub fn is_legal(pos: &Chess, m: &Move) -> bool {
    pos.legal_moves().iter().any(|x| x == m)
}

/// Sum of piece values for one side, king excluded.
pub fn material(pos: &Chess, color: Color) -> Score {
    let board = pos.board();
    let ours = board.by_color(color);
    ROLES
        .iter()
        .map(|&r| (ours & board.by_role(r)).count() as Score * piece_value(r))
        .sum()
}

/// Material balance from the side to move's perspective.
pub fn material_balance(pos: &Chess) -> Score {
    let us = pos.turn();
    material(pos, us) - material(pos, !us)
}

/// Whether the side to move still has pieces besides king and pawns.
/// Null-move pruning is unsound without them (zugzwang).
pub fn has_non_pawn_material(pos: &Chess) -> bool {
    let board = pos.board();
    let ours = board.by_color(pos.turn());
    (ours & !(board.by_role(Role::Pawn) | board.by_role(Role::King))).any()
}

/// 1.0 at the starting material count, tapering to 0.0 in a bare endgame.
pub fn game_phase_factor(pos: &Chess) -> f32 {
    const WEIGHTS: [(Role, i32); 4] = [
        (Role::Knight, 1),
        (Role::Bishop, 1),
        (Role::Rook, 2),
        (Role::Queen, 4),
    ];
    const TOTAL: i32 = 24;
    let board = pos.board();
    let mut phase = 0;
    for (role, weight) in WEIGHTS {
        phase += board.by_role(role).count() as i32 * weight;
    }
    phase.min(TOTAL) as f32 / TOTAL as f32
}

/// A pawn stepping onto the rank before promotion, from the mover's point
/// of view.
pub fn is_pawn_push_to_seventh(side: Color, m: &Move) -> bool {
    if m.role() != Role::Pawn {
        return false;
    }
    match side {
        Color::White => m.to().rank() == Rank::Seventh,
        Color::Black => m.to().rank() == Rank::Second,
    }
}

pub fn parse_fen(fen: &str) -> Result<Chess, EngineError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|_| EngineError::InvalidPosition(format!("bad FEN '{fen}'")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|_| EngineError::InvalidPosition(format!("illegal position '{fen}'")))
}

/// Parse a long-algebraic move and check it against the position.
pub fn parse_uci_move(pos: &Chess, s: &str) -> Option<Move> {
    let uci = UciMove::from_ascii(s.as_bytes()).ok()?;
    uci.to_move(pos).ok()
}

pub fn uci_string(m: &Move) -> String {
    m.to_uci(CastlingMode::Standard).to_string()
}

/// The game the client has set up: current position plus the Zobrist keys of
/// everything played so far, which the search needs for repetition checks.
#[derive(Clone, Debug)]
pub struct Game {
    pos: Chess,
    keys: Vec<u64>,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    pub fn new() -> Self {
        let pos = Chess::default();
        let key = zobrist_key(&pos);
        Self { pos, keys: vec![key] }
    }

    pub fn from_fen(fen: &str) -> Result<Self, EngineError> {
        let pos = parse_fen(fen)?;
        let key = zobrist_key(&pos);
        Ok(Self { pos, keys: vec![key] })
    }

    /// Play one long-algebraic move on the game.
    pub fn play_uci(&mut self, mv: &str) -> Result<(), EngineError> {
        let m = parse_uci_move(&self.pos, mv)
            .ok_or_else(|| EngineError::InvalidPosition(format!("illegal move '{mv}'")))?;
        self.pos.play_unchecked(&m);
        self.keys.push(zobrist_key(&self.pos));
        Ok(())
    }

    pub fn position(&self) -> &Chess {
        &self.pos
    }

    /// Zobrist keys of every position reached, the current one last.
    pub fn keys(&self) -> &[u64] {
        &self.keys
    }
}
