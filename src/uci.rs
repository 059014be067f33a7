//! UCI protocol front end: reads commands from stdin, drives the engine,
//! and prints `info`/`bestmove` lines. Diagnostics go to the tracing
//! subscriber (stderr), never to stdout, which belongs to the protocol.

use std::io::{self, BufRead};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::position::{uci_string, Game};
use crate::search::{InfoSink, SearchProgress};
use crate::types::{format_score, SearchMode, SearchResult, MAX_SEARCH_DEPTH};

const ENGINE_NAME: &str = "graphite";

/// Prints search output in UCI wire format.
pub struct UciSink;

impl InfoSink for UciSink {
    fn send_info(&self, p: &SearchProgress) {
        let pv: Vec<String> = p.pv.iter().map(uci_string).collect();
        println!(
            "info depth {} seldepth {} {} nodes {} nps {} time {} hashfull {} pv {}",
            p.depth,
            p.seldepth,
            format_score(p.score),
            p.nodes,
            p.nps,
            p.time_ms,
            p.hashfull,
            pv.join(" ")
        );
    }

    fn send_result(&self, result: &SearchResult) {
        match (&result.best_move, &result.ponder_move) {
            (Some(best), Some(ponder)) => {
                println!("bestmove {} ponder {}", uci_string(best), uci_string(ponder))
            }
            (Some(best), None) => println!("bestmove {}", uci_string(best)),
            (None, _) => println!("bestmove 0000"),
        }
    }
}

pub fn run() {
    let mut engine = match Engine::new(Arc::new(UciSink)) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to start engine: {err}");
            return;
        }
    };
    let mut game = Game::new();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            continue;
        };

        match command {
            "uci" => {
                println!("id name {ENGINE_NAME}");
                println!("id author the {ENGINE_NAME} authors");
                println!("option name Hash type spin default 64 min 1 max 4096");
                println!("option name Ponder type check default true");
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => {
                if engine.is_searching() {
                    engine.stop_search();
                }
                engine.new_game();
                game = Game::new();
            }
            "position" => {
                if engine.is_searching() {
                    engine.stop_search();
                }
                match parse_position(&tokens) {
                    Ok(parsed) => game = parsed,
                    Err(err) => warn!(%err, "position rejected"),
                }
            }
            "go" => {
                let mode = parse_go(&tokens);
                if let Err(err) = engine.start_search(&game, mode) {
                    warn!(%err, "go rejected");
                }
            }
            "stop" => engine.stop_search(),
            "ponderhit" => engine.ponder_hit(),
            "setoption" => {
                if let Some((name, value)) = parse_setoption(&tokens) {
                    if let Err(err) = engine.set_option(&name, &value) {
                        warn!(%err, "setoption rejected");
                    }
                }
            }
            "quit" => {
                if engine.is_searching() {
                    engine.stop_search();
                }
                break;
            }
            _ => debug!(command, "unknown command ignored"),
        }
    }
}

fn parse_position(tokens: &[&str]) -> Result<Game, crate::error::EngineError> {
    let mut idx = 1;
    let mut game = match tokens.get(idx) {
        Some(&"startpos") => {
            idx += 1;
            Game::new()
        }
        Some(&"fen") => {
            idx += 1;
            let mut fen_parts = Vec::new();
            while idx < tokens.len() && tokens[idx] != "moves" {
                fen_parts.push(tokens[idx]);
                idx += 1;
            }
            Game::from_fen(&fen_parts.join(" "))?
        }
        _ => {
            return Err(crate::error::EngineError::InvalidPosition(
                "position needs 'startpos' or 'fen'".into(),
            ));
        }
    };

    if tokens.get(idx) == Some(&"moves") {
        for mv in &tokens[idx + 1..] {
            game.play_uci(mv)?;
        }
    }
    Ok(game)
}

fn parse_setoption(tokens: &[&str]) -> Option<(String, String)> {
    let name_idx = tokens.iter().position(|&t| t == "name")?;
    let value_idx = tokens.iter().position(|&t| t == "value");
    let name_end = value_idx.unwrap_or(tokens.len());
    let name = tokens[name_idx + 1..name_end].join(" ");
    let value = match value_idx {
        Some(vi) => tokens[vi + 1..].join(" "),
        None => String::from("true"),
    };
    if name.is_empty() { None } else { Some((name, value)) }
}

fn num_arg(tokens: &[&str], i: usize) -> Option<u64> {
    tokens.get(i + 1).and_then(|t| t.parse().ok())
}

fn parse_go(tokens: &[&str]) -> SearchMode {
    let mut mode = SearchMode::default();
    let mut i = 1;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                if let Some(d) = num_arg(tokens, i) {
                    mode.max_depth = (d as i32).clamp(1, MAX_SEARCH_DEPTH);
                }
                i += 1;
            }
            "movetime" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.move_time_ms = v;
                }
                i += 1;
            }
            "nodes" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.node_limit = v;
                }
                i += 1;
            }
            "wtime" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.remaining_time_ms[0] = v;
                }
                i += 1;
            }
            "btime" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.remaining_time_ms[1] = v;
                }
                i += 1;
            }
            "winc" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.inc_ms[0] = v;
                }
                i += 1;
            }
            "binc" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.inc_ms[1] = v;
                }
                i += 1;
            }
            "movestogo" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.moves_to_go = v;
                }
                i += 1;
            }
            "mate" => {
                if let Some(v) = num_arg(tokens, i) {
                    mode.mate_in = v as i32;
                }
                i += 1;
            }
            "perft" => {
                mode.perft = true;
                if let Some(d) = num_arg(tokens, i) {
                    mode.max_depth = (d as i32).clamp(1, MAX_SEARCH_DEPTH);
                    i += 1;
                }
            }
            "infinite" => mode.infinite = true,
            "ponder" => mode.ponder = true,
            "searchmoves" => {
                let mut moves = Vec::new();
                while let Some(&tok) = tokens.get(i + 1) {
                    if is_go_keyword(tok) {
                        break;
                    }
                    moves.push(tok.to_string());
                    i += 1;
                }
                if !moves.is_empty() {
                    mode.restricted_moves = Some(moves);
                }
            }
            _ => {}
        }
        i += 1;
    }
    mode
}

fn is_go_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "movetime"
            | "nodes"
            | "wtime"
            | "btime"
            | "winc"
            | "binc"
            | "movestogo"
            | "mate"
            | "perft"
            | "infinite"
            | "ponder"
            | "searchmoves"
    )
}
