//! Move-generation validation against the published perft tables for the
//! initial position.

use graphite::perft::{perft, perft_detailed};
use shakmaty::Chess;

#[test]
fn perft_startpos_to_depth_four() {
    let pos = Chess::default();
    assert_eq!(perft(&pos, 1), 20);
    assert_eq!(perft(&pos, 2), 400);
    assert_eq!(perft(&pos, 3), 8_902);
    assert_eq!(perft(&pos, 4), 197_281);
}

#[test]
fn perft_detailed_startpos_depth_four() {
    let breakdown = perft_detailed(&Chess::default(), 4);
    assert_eq!(breakdown.nodes, 197_281);
    assert_eq!(breakdown.captures, 1_576);
    assert_eq!(breakdown.en_passants, 0);
    assert_eq!(breakdown.checks, 469);
    assert_eq!(breakdown.checkmates, 8);
}

// Expensive: run with `cargo test -- --ignored` in release builds.
#[test]
#[ignore]
fn perft_startpos_depth_five() {
    let breakdown = perft_detailed(&Chess::default(), 5);
    assert_eq!(breakdown.nodes, 4_865_609);
    assert_eq!(breakdown.captures, 82_719);
    assert_eq!(breakdown.en_passants, 258);
    assert_eq!(breakdown.checks, 27_351);
    assert_eq!(breakdown.checkmates, 347);
}
