//! Notable-moment finder: replays a game, asks a UCI engine about every
//! position where the focus side moved, and keeps the best-spaced highlights.

pub mod archive;
pub mod config;
pub mod error;
pub mod scoring;
pub mod selector;
pub mod stockfish;

pub use error::{EngineError, FinderError};
pub use scoring::{Candidate, CandidateScorer};
pub use selector::{rank_candidates, sample_moments, Moment, MomentSelector, SelectionOptions};
pub use stockfish::{EngineVerdict, Evaluator, Score, SearchBudget, StockfishEvaluator};
