use thiserror::Error;

/// Everything that can go wrong at the engine boundary. Nothing in here ever
/// crosses the search recursion; the stop flag is the only non-local exit
/// from the tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Rejected configuration: bad hash size, contradictory feature gates,
    /// unknown option name.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A control call arrived in the wrong state (double start, stray stop,
    /// ponderhit without a ponder search). Logged and ignored by the engine.
    #[error("invalid engine state: {0}")]
    State(String),

    /// Malformed position or move input at the client boundary.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The search produced a best move that is not legal in the root
    /// position. This is an internal invariant violation.
    #[error("search returned illegal best move {0}")]
    IllegalBestMove(String),
}
