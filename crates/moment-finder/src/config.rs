//! Finder configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chess_core::Side;

use crate::error::FinderError;
use crate::scoring::DEFAULT_OPENING_CUTOFF;
use crate::selector::{SelectionOptions, DEFAULT_MAX_MOMENTS, DEFAULT_MIN_PLY_SPACING};
use crate::stockfish::{EngineOptions, SearchBudget};

#[derive(Clone, Debug)]
pub struct FinderConfig {
    /// Path (or name on PATH) of the UCI engine binary
    pub stockfish_path: String,

    /// Search depth per position, used unless a movetime is set
    pub search_depth: u32,

    /// Fixed think time per position; takes precedence over depth
    pub movetime_ms: Option<u64>,

    /// Allowance for one evaluation on top of its search time
    pub engine_timeout_secs: u64,

    pub engine_threads: u32,
    pub engine_hash_mb: u32,

    /// Engine processes allowed at once
    pub max_concurrent_engines: usize,

    pub max_moments: usize,
    pub min_ply_spacing: usize,
    pub opening_cutoff_ply: usize,

    /// Limit for a whole selection run; 0 (the default) disables it.
    /// Timed-out plies count against it, so it must cover every wave of engines.
    pub analysis_deadline_secs: u64,

    /// Side analysed when the caller does not pick one
    pub default_focus: Side,
}

impl FinderConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, FinderError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FinderError> {
        let stockfish_path = lookup("STOCKFISH_PATH").unwrap_or_else(|| "stockfish".to_string());

        let search_depth: u32 = parse_var(&lookup, "SEARCH_DEPTH").unwrap_or(14);
        let movetime_ms: Option<u64> = parse_var(&lookup, "MOVETIME_MS").filter(|ms| *ms > 0);
        let engine_timeout_secs: u64 = parse_var(&lookup, "ENGINE_TIMEOUT_SECS").unwrap_or(30);
        let engine_threads: u32 = parse_var(&lookup, "ENGINE_THREADS").unwrap_or(1);
        let engine_hash_mb: u32 = parse_var(&lookup, "ENGINE_HASH_MB").unwrap_or(64);

        let max_concurrent_engines: usize = parse_var(&lookup, "MAX_CONCURRENT_ENGINES")
            .unwrap_or_else(|| num_cpus::get().clamp(1, 4));

        let max_moments: usize = parse_var(&lookup, "MAX_MOMENTS").unwrap_or(DEFAULT_MAX_MOMENTS);
        let min_ply_spacing: usize =
            parse_var(&lookup, "MIN_PLY_SPACING").unwrap_or(DEFAULT_MIN_PLY_SPACING);
        let opening_cutoff_ply: usize =
            parse_var(&lookup, "OPENING_CUTOFF_PLY").unwrap_or(DEFAULT_OPENING_CUTOFF);
        let analysis_deadline_secs: u64 =
            parse_var(&lookup, "ANALYSIS_DEADLINE_SECS").unwrap_or(0);

        let default_focus = match lookup("DEFAULT_FOCUS") {
            Some(v) => v.parse().map_err(FinderError::Config)?,
            None => Side::White,
        };

        if max_concurrent_engines == 0 {
            return Err(FinderError::Config(
                "MAX_CONCURRENT_ENGINES must be at least 1".into(),
            ));
        }
        if search_depth == 0 && movetime_ms.is_none() {
            return Err(FinderError::Config("SEARCH_DEPTH must be at least 1".into()));
        }
        if engine_timeout_secs == 0 {
            return Err(FinderError::Config(
                "ENGINE_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            stockfish_path,
            search_depth,
            movetime_ms,
            engine_timeout_secs,
            engine_threads,
            engine_hash_mb,
            max_concurrent_engines,
            max_moments,
            min_ply_spacing,
            opening_cutoff_ply,
            analysis_deadline_secs,
            default_focus,
        })
    }

    pub fn budget(&self) -> SearchBudget {
        match self.movetime_ms {
            Some(ms) => SearchBudget::MoveTime(Duration::from_millis(ms)),
            None => SearchBudget::Depth(self.search_depth),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.engine_threads.max(1),
            hash_mb: self.engine_hash_mb.max(1),
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn selection_options(&self) -> SelectionOptions {
        SelectionOptions {
            max_count: self.max_moments,
            min_ply_spacing: self.min_ply_spacing,
            opening_cutoff: self.opening_cutoff_ply,
            max_concurrent: self.max_concurrent_engines,
            budget: self.budget(),
            deadline: (self.analysis_deadline_secs > 0)
                .then(|| Duration::from_secs(self.analysis_deadline_secs)),
        }
    }
}

/// Parse a variable into its target type; missing or out-of-range values read as unset.
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
