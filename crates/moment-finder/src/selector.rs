//! Moment selection: evaluate the focus side's plies, rank the candidates and
//! keep a small, well-spaced set.

use std::sync::Arc;
use std::time::Duration;

use chess_core::{replay, GameRecord, Ply, Side};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::FinderError;
use crate::scoring::{Candidate, CandidateScorer, DEFAULT_OPENING_CUTOFF};
use crate::stockfish::{Evaluator, Score, SearchBudget};

pub const DEFAULT_MAX_MOMENTS: usize = 5;
pub const DEFAULT_MIN_PLY_SPACING: usize = 6;

/// One selected moment, ready to hand to a renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moment {
    /// 1-based display rank
    pub rank: usize,
    pub title: String,
    /// 0-based ply index in the game
    pub ply: usize,
    pub move_number: usize,
    pub side: Side,
    /// Position before the move
    pub fen: String,
    /// SAN of the move that was played
    pub move_label: String,
    pub move_uci: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_cp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
    pub note: Option<String>,
}

impl Moment {
    fn from_ply(rank: usize, ply: &Ply, first_mover: Side) -> Self {
        Self {
            rank,
            title: format!("Best moment #{rank}"),
            ply: ply.index,
            move_number: ply.move_number(first_mover),
            side: ply.side,
            fen: ply.fen_before.clone(),
            move_label: ply.mv.san.clone(),
            move_uci: ply.mv.coords.to_string(),
            eval_cp: None,
            mate: None,
            note: None,
        }
    }

    fn from_candidate(rank: usize, candidate: &Candidate, first_mover: Side) -> Self {
        let mut moment = Self::from_ply(rank, &candidate.ply, first_mover);
        let note = match candidate.verdict.score {
            Score::Mate(n) if n > 0 => {
                moment.mate = Some(n);
                format!("Found the forced mate in {n}")
            }
            Score::Mate(n) => {
                moment.mate = Some(n);
                format!("Best defence against mate in {}", n.unsigned_abs())
            }
            Score::Centipawns(cp) => {
                moment.eval_cp = Some(cp);
                format!("Engine's top choice ({:+.2})", f64::from(cp) / 100.0)
            }
        };
        moment.note = Some(note);
        moment
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOptions {
    pub max_count: usize,
    pub min_ply_spacing: usize,
    pub opening_cutoff: usize,
    /// Engine processes allowed to run at once
    pub max_concurrent: usize,
    pub budget: SearchBudget,
    /// Overall limit for one selection; in-flight engines are killed when it
    /// expires. `None` lets every ply finish or time out on its own.
    pub deadline: Option<Duration>,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_MOMENTS,
            min_ply_spacing: DEFAULT_MIN_PLY_SPACING,
            opening_cutoff: DEFAULT_OPENING_CUTOFF,
            max_concurrent: 2,
            budget: SearchBudget::Depth(14),
            deadline: None,
        }
    }
}

/// Sort by score (descending, earlier ply first on ties) and greedily keep
/// candidates at least `min_ply_spacing` plies away from everything kept so far.
pub fn rank_candidates(
    mut candidates: Vec<Candidate>,
    max_count: usize,
    min_ply_spacing: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.ply.index.cmp(&b.ply.index))
    });

    let mut accepted: Vec<Candidate> = Vec::with_capacity(max_count);
    for candidate in candidates {
        if accepted.len() >= max_count {
            break;
        }
        let spaced = accepted
            .iter()
            .all(|kept| kept.ply.index.abs_diff(candidate.ply.index) >= min_ply_spacing);
        if spaced {
            accepted.push(candidate);
        }
    }
    accepted
}

pub struct MomentSelector<E> {
    evaluator: Arc<E>,
    options: SelectionOptions,
}

impl<E: Evaluator> MomentSelector<E> {
    pub fn new(evaluator: E, options: SelectionOptions) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            options,
        }
    }

    /// Pick up to `max_count` moments where `focus` played the engine's best move.
    ///
    /// Only an unreadable record is an error; engine failures just drop the
    /// affected plies, and an empty result means nothing qualified.
    pub async fn select_moments(
        &self,
        record: &GameRecord,
        focus: Side,
    ) -> Result<Vec<Moment>, FinderError> {
        let replay = replay(record)?;
        let first_mover = replay.first_mover();
        info!(plies = replay.len(), %focus, "Selecting moments");

        let candidates = match self.options.deadline {
            Some(deadline) => {
                let plies = replay.into_iter();
                tokio::time::timeout(deadline, self.collect_candidates(plies, focus))
                    .await
                    .map_err(|_| {
                        warn!(?deadline, "Analysis deadline expired, abandoning evaluations");
                        FinderError::DeadlineExceeded(deadline)
                    })?
            }
            None => self.collect_candidates(replay.into_iter(), focus).await,
        };
        let candidate_count = candidates.len();

        let moments: Vec<Moment> = rank_candidates(
            candidates,
            self.options.max_count,
            self.options.min_ply_spacing,
        )
        .iter()
        .enumerate()
        .map(|(i, candidate)| Moment::from_candidate(i + 1, candidate, first_mover))
        .collect();

        info!(candidates = candidate_count, selected = moments.len(), "Selection complete");
        Ok(moments)
    }

    /// Evaluate every focus ply past the opening, at most `max_concurrent` at a time.
    async fn collect_candidates(
        &self,
        plies: impl Iterator<Item = Ply>,
        focus: Side,
    ) -> Vec<Candidate> {
        let scorer = CandidateScorer::new(self.options.opening_cutoff);
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));
        let budget = self.options.budget;
        // Dropping the set aborts every task, which kills their engines
        let mut tasks = JoinSet::new();

        for ply in plies.filter(|p| p.side == focus && !scorer.in_opening(p.index)) {
            let evaluator = Arc::clone(&self.evaluator);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (ply, None);
                };
                let verdict = match evaluator.evaluate(&ply.fen_before, budget).await {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        warn!(ply = ply.index, fen = %ply.fen_before, error = %e, "Evaluation failed, dropping ply");
                        None
                    }
                };
                (ply, verdict)
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ply, verdict)) => candidates.extend(scorer.score(ply, verdict)),
                Err(e) => warn!(error = %e, "Evaluation task failed"),
            }
        }
        candidates
    }
}

/// Engine-free fallback: up to `max_count` focus plies spread evenly over the game.
pub fn sample_moments(
    record: &GameRecord,
    focus: Side,
    max_count: usize,
) -> Result<Vec<Moment>, FinderError> {
    let replay = replay(record)?;
    let first_mover = replay.first_mover();
    let focus_plies: Vec<&Ply> = replay.plies().iter().filter(|p| p.side == focus).collect();

    let count = max_count.min(focus_plies.len());
    let moments = (0..count)
        .map(|k| {
            let pos = if count == 1 {
                0
            } else {
                k * (focus_plies.len() - 1) / (count - 1)
            };
            let mut moment = Moment::from_ply(k + 1, focus_plies[pos], first_mover);
            moment.note = Some("Sampled from the game without engine evaluation".to_string());
            moment
        })
        .collect();
    Ok(moments)
}
