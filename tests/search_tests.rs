//! End-to-end search behavior: mate finding, stop conditions, terminal
//! positions, and the feature-invariance properties (changing PVS or
//! aspiration must never change the score at a fixed depth).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use graphite::position::is_legal;
use shakmaty::Position;
use graphite::time::TimeManager;
use graphite::types::{CHECKMATE, DRAW};
use graphite::{Game, NullSink, Search, SearchMode, SearchOptions};

fn new_search(mut options: SearchOptions) -> Search {
    options.hash_size_mb = 1;
    let stop = Arc::new(AtomicBool::new(false));
    let time = Arc::new(TimeManager::new(stop.clone()));
    Search::new(options, stop, time).expect("valid test options")
}

fn run(game: &Game, mode: SearchMode, options: SearchOptions) -> (graphite::SearchResult, Search) {
    let mut search = new_search(options);
    let result = search.run(game.position(), game.keys(), &mode, &NullSink);
    (result, search)
}

#[test]
fn finds_mate_in_two() {
    let game = Game::from_fen("1r3rk1/1pnnq1bR/p1pp2B1/P2P1p2/1PP1pP2/2B3P1/5PK1/2Q4R w - - 0 1")
        .unwrap();
    let (result, _) = run(&game, SearchMode::mate(2), SearchOptions::default());
    assert_eq!(result.score, CHECKMATE - 3, "mate in two is three plies away");
    let best = result.best_move.expect("a mating move exists");
    assert!(is_legal(game.position(), &best));
}

// Expensive in debug builds: run with `cargo test -- --ignored`.
#[test]
#[ignore]
fn finds_mate_in_four() {
    let game =
        Game::from_fen("r2r1n2/pp2bk2/2p1p2p/3q4/3PN1QP/2P3R1/P4PP1/5RK1 w - - 0 1").unwrap();
    let (result, _) = run(&game, SearchMode::mate(4), SearchOptions::default());
    assert_eq!(result.score, CHECKMATE - 7);
}

#[test]
fn node_limit_is_respected_exactly() {
    let game = Game::new();
    let limit = 20_000;
    let (result, _) = run(&game, SearchMode::nodes(limit), SearchOptions::default());
    assert!(
        result.nodes.abs_diff(limit) <= 1,
        "expected {limit}±1 nodes, got {}",
        result.nodes
    );
    let best = result.best_move.expect("a best move survives the cutoff");
    assert!(is_legal(game.position(), &best));
}

#[test]
fn fixed_depth_terminates_at_requested_depth() {
    let game = Game::new();
    let (result, search) = run(&game, SearchMode::depth(4), SearchOptions::default());
    assert_eq!(result.depth, 4);
    assert_eq!(search.counters.iteration_depth, 4);
    let best = result.best_move.expect("startpos has moves");
    assert!(is_legal(game.position(), &best));
}

#[test]
fn stalemate_yields_no_move_and_draw_score() {
    let game = Game::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
    assert!(game.position().legal_moves().is_empty());
    let (result, _) = run(&game, SearchMode::depth(5), SearchOptions::default());
    assert_eq!(result.best_move, None);
    assert_eq!(result.score, DRAW);
}

#[test]
fn checkmate_yields_no_move_and_mated_score() {
    let game = Game::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
        .unwrap();
    let (result, _) = run(&game, SearchMode::depth(5), SearchOptions::default());
    assert_eq!(result.best_move, None);
    assert_eq!(result.score, -CHECKMATE);
}

#[test]
fn single_legal_reply_is_played() {
    let game = Game::from_fen("k7/7R/1K6/8/8/8/8/8 b - - 0 1").unwrap();
    assert_eq!(game.position().legal_moves().len(), 1);
    let (result, _) = run(&game, SearchMode::depth(4), SearchOptions::default());
    let best = result.best_move.expect("one legal move");
    assert_eq!(graphite::position::uci_string(&best), "a8b8");
}

#[test]
fn restricted_root_moves_are_honored() {
    let game = Game::new();
    let mut mode = SearchMode::depth(3);
    mode.restricted_moves = Some(vec!["a2a3".to_string()]);
    let (result, _) = run(&game, mode, SearchOptions::default());
    assert_eq!(graphite::position::uci_string(&result.best_move.unwrap()), "a2a3");
}

#[test]
fn search_is_deterministic() {
    let game = Game::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3")
        .unwrap();
    let (first, _) = run(&game, SearchMode::depth(4), SearchOptions::default());
    let (second, _) = run(&game, SearchMode::depth(4), SearchOptions::default());
    assert_eq!(first.best_move, second.best_move);
    assert_eq!(first.score, second.score);
    assert_eq!(first.nodes, second.nodes);
}

#[test]
fn pv_head_matches_best_move() {
    let game = Game::new();
    let (result, search) = run(&game, SearchMode::depth(4), SearchOptions::default());
    assert_eq!(search.pv_line().first(), result.best_move.as_ref());
}

#[test]
fn deeper_searches_visit_at_least_as_many_nodes() {
    let game = Game::new();
    let (shallow, _) = run(&game, SearchMode::depth(2), SearchOptions::default());
    let (deep, _) = run(&game, SearchMode::depth(4), SearchOptions::default());
    assert!(
        deep.nodes >= shallow.nodes,
        "depth 4 ({}) must visit at least as many nodes as depth 2 ({})",
        deep.nodes,
        shallow.nodes
    );
}

const INVARIANCE_SUITE: [&str; 3] = [
    "startpos",
    "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3",
    "8/2k5/3p4/p2P1p2/P2P1P2/8/8/4K3 w - - 0 1",
];

fn suite_game(fen: &str) -> Game {
    if fen == "startpos" { Game::new() } else { Game::from_fen(fen).unwrap() }
}

/// Plain alpha-beta plus quiescence. The window-strategy invariance holds
/// exactly on this base; heuristics that carry state across re-searches
/// (table, killers, reductions) are tested separately.
fn invariance_base() -> SearchOptions {
    let mut options = SearchOptions::all_off();
    options.use_alphabeta = true;
    options.use_quiescence = true;
    options
}

#[test]
fn aspiration_does_not_change_the_score() {
    for fen in INVARIANCE_SUITE {
        let game = suite_game(fen);
        let mut with = invariance_base();
        with.use_aspiration = true;
        let (a, _) = run(&game, SearchMode::depth(4), with);
        let (b, _) = run(&game, SearchMode::depth(4), invariance_base());
        assert_eq!(a.score, b.score, "aspiration changed the score on {fen}");
    }
}

#[test]
fn pvs_does_not_change_the_score() {
    for fen in INVARIANCE_SUITE {
        let game = suite_game(fen);
        let mut with = invariance_base();
        with.use_pvs = true;
        let (a, _) = run(&game, SearchMode::depth(4), with);
        let (b, _) = run(&game, SearchMode::depth(4), invariance_base());
        assert_eq!(a.score, b.score, "PVS changed the score on {fen}");
    }
}

#[test]
fn mtdf_finds_a_legal_move() {
    let game = Game::new();
    let mut options = SearchOptions::default();
    options.use_pvs = false;
    options.use_aspiration = false;
    options.use_mtdf = true;
    let (result, _) = run(&game, SearchMode::depth(3), options);
    let best = result.best_move.expect("MTD(f) must still produce a move");
    assert!(is_legal(game.position(), &best));
}

#[test]
fn all_features_off_still_finds_mate_in_one() {
    // Scholar's mate position, White to deliver Qxf7#.
    let game = Game::from_fen("r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4")
        .unwrap();
    let (result, _) = run(&game, SearchMode::depth(2), SearchOptions::all_off());
    assert_eq!(graphite::position::uci_string(&result.best_move.unwrap()), "h5f7");
    assert_eq!(result.score, CHECKMATE - 1);
}

#[test]
fn fifty_move_draws_score_contempt() {
    // Bare kings one quiet move away from the 50-move rule: every child node
    // is a draw, scored as contempt for its side to move. The root therefore
    // sees the negated contempt value behind each move.
    let game = Game::from_fen("8/8/8/4k3/8/4K3/8/8 w - - 99 1").unwrap();
    let mut options = SearchOptions::default();
    options.contempt_factor = 50;
    let (result, _) = run(&game, SearchMode::depth(1), options);
    assert_eq!(result.score, 50);
}
