//! Candidate scoring: which evaluated plies are worth showing, and how decisive they were.

use chess_core::Ply;
use tracing::debug;

use crate::stockfish::{EngineVerdict, Score};

/// Base score of a forced mate; any mate outranks any centipawn score
pub const MATE_SCORE: i64 = 1_000_000;

/// Centipawn magnitudes are capped here so they stay below every mate score
pub const MAX_CP_SCORE: i64 = 100_000;

/// Longest mate distance that still changes the score
const MAX_MATE_DISTANCE: i64 = 1_000;

/// Plies before this index are never candidates
pub const DEFAULT_OPENING_CUTOFF: usize = 10;

/// An evaluated ply where the player found the engine's best move
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ply: Ply,
    pub verdict: EngineVerdict,
    pub matches_played: bool,
    pub score: i64,
}

/// Comparable score for a verdict: shorter mates above longer mates above
/// any centipawn advantage. Being mated scores zero.
pub fn verdict_score(score: Score) -> i64 {
    match score {
        Score::Mate(n) if n > 0 => MATE_SCORE - i64::from(n).min(MAX_MATE_DISTANCE),
        Score::Mate(_) => 0,
        Score::Centipawns(cp) => i64::from(cp).abs().min(MAX_CP_SCORE),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateScorer {
    opening_cutoff: usize,
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new(DEFAULT_OPENING_CUTOFF)
    }
}

impl CandidateScorer {
    pub fn new(opening_cutoff: usize) -> Self {
        Self { opening_cutoff }
    }

    pub fn in_opening(&self, ply_index: usize) -> bool {
        ply_index < self.opening_cutoff
    }

    /// Turn an evaluated ply into a candidate, or `None` if it should not be shown.
    ///
    /// A missing verdict (engine failed on this ply) excludes the ply rather
    /// than scoring it as zero.
    pub fn score(&self, ply: Ply, verdict: Option<EngineVerdict>) -> Option<Candidate> {
        let Some(verdict) = verdict else {
            debug!(ply = ply.index, "No verdict, skipping");
            return None;
        };

        if self.in_opening(ply.index) {
            debug!(ply = ply.index, cutoff = self.opening_cutoff, "Opening ply, skipping");
            return None;
        }

        if verdict.best_move != ply.mv.coords {
            debug!(
                ply = ply.index,
                played = %ply.mv.coords,
                best = %verdict.best_move,
                "Played move is not the engine's best"
            );
            return None;
        }

        let score = verdict_score(verdict.score);
        Some(Candidate {
            ply,
            verdict,
            matches_played: true,
            score,
        })
    }
}
