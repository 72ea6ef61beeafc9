//! Errors for loading and replaying game records

use thiserror::Error;

/// A game record that cannot be turned into a sequence of positions.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("no game found in input")]
    NoGame,

    #[error("game has no moves")]
    Empty,

    #[error("invalid starting position '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("unreadable move '{san}' at ply {ply}")]
    InvalidSan { ply: usize, san: String },

    #[error("illegal move '{san}' at ply {ply}: {reason}")]
    IllegalMove {
        ply: usize,
        san: String,
        reason: String,
    },

    #[error("failed to read PGN: {0}")]
    Pgn(#[from] std::io::Error),
}
