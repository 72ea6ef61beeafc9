//! Moment finder CLI
//!
//! Reads one game (PGN file, stdin, or a Chess.com user's latest game), picks
//! the focus side's best moments with Stockfish, and prints them as JSON.
//!
//! Usage: moment-finder (--pgn <file|-> | --username <name>) [--focus white|black]
//!                      [--max N] [--spacing N] [--sample]

use std::io::Read;

use chess_core::{GameMetadata, GameRecord, Side};
use moment_finder::archive::ChessComClient;
use moment_finder::config::FinderConfig;
use moment_finder::stockfish::locate_engine;
use moment_finder::{sample_moments, FinderError, Moment, MomentSelector, StockfishEvaluator};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: moment-finder (--pgn <file|-> | --username <name>) \
[--focus white|black] [--max N] [--spacing N] [--sample]";

#[derive(Debug, Default)]
struct CliArgs {
    pgn: Option<String>,
    username: Option<String>,
    focus: Option<Side>,
    max: Option<usize>,
    spacing: Option<usize>,
    sample: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut i = 0;
    while i < args.len() {
        let value = || {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} needs a value", args[i]))
        };
        match args[i].as_str() {
            "--pgn" => parsed.pgn = Some(value()?),
            "--username" => parsed.username = Some(value()?),
            "--focus" => parsed.focus = Some(value()?.parse()?),
            "--max" => {
                parsed.max = Some(value()?.parse().map_err(|_| "--max needs a number")?);
            }
            "--spacing" => {
                parsed.spacing = Some(value()?.parse().map_err(|_| "--spacing needs a number")?);
            }
            "--sample" => {
                parsed.sample = true;
                i += 1;
                continue;
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
        i += 2;
    }

    match (&parsed.pgn, &parsed.username) {
        (None, None) => Err("one of --pgn or --username is required".into()),
        (Some(_), Some(_)) => Err("--pgn and --username cannot be combined".into()),
        _ => Ok(parsed),
    }
}

#[derive(Serialize)]
struct Report<'a> {
    /// "ok", "no_moments" or "sampled"
    status: &'static str,
    focus: Side,
    source_game: &'a GameMetadata,
    moments: Vec<Moment>,
}

async fn load_record(args: &CliArgs) -> Result<GameRecord, FinderError> {
    if let Some(username) = &args.username {
        let client = ChessComClient::new()?;
        let games = client.fetch_recent_games(username).await?;
        info!(username = %username, games = games.len(), "Fetched recent games");
        return games
            .into_iter()
            .next()
            .ok_or_else(|| FinderError::Archive(format!("No recent games found for {username}")));
    }

    let pgn = match args.pgn.as_deref() {
        Some("-") | None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| FinderError::Archive(format!("Failed to read stdin: {e}")))?;
            text
        }
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| FinderError::Archive(format!("Failed to read {path}: {e}")))?,
    };
    Ok(GameRecord::from_pgn(&pgn)?)
}

async fn run(args: &CliArgs, config: &FinderConfig) -> Result<(), FinderError> {
    let record = load_record(args).await?;
    let focus = args.focus.unwrap_or(config.default_focus);

    let mut options = config.selection_options();
    if let Some(max) = args.max {
        options.max_count = max;
    }
    if let Some(spacing) = args.spacing {
        options.min_ply_spacing = spacing;
    }

    let engine = if args.sample {
        None
    } else {
        let found = locate_engine(&config.stockfish_path);
        if found.is_none() {
            warn!(path = %config.stockfish_path, "Engine not found, sampling moments without evaluation");
        }
        found
    };

    let (status, moments) = match engine {
        Some(path) => {
            info!(engine = %path.display(), budget = ?options.budget, "Analyzing with engine");
            let evaluator =
                StockfishEvaluator::new(path, config.engine_options(), config.engine_timeout());
            let moments = MomentSelector::new(evaluator, options)
                .select_moments(&record, focus)
                .await?;
            let status = if moments.is_empty() { "no_moments" } else { "ok" };
            (status, moments)
        }
        None => ("sampled", sample_moments(&record, focus, options.max_count)?),
    };

    let report = Report {
        status,
        focus,
        source_game: record.metadata(),
        moments,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the JSON report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    let config = FinderConfig::load()?;

    match run(&args, &config).await {
        Ok(()) => Ok(()),
        Err(FinderError::MalformedRecord(e)) => {
            eprintln!(
                "{}",
                json!({ "error": "invalid game record", "detail": e.to_string() })
            );
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
