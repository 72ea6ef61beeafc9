//! Chess.com public archive client: a source of recent game records by username.
//!
//! No retries or caching; callers decide what to do with failures.

use std::time::Duration;

use chess_core::{GameMetadata, GameRecord};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FinderError;

const CHESS_COM_API: &str = "https://api.chess.com";

pub struct ChessComClient {
    client: Client,
    base_url: String,
    username_pattern: Regex,
}

impl ChessComClient {
    pub fn new() -> Result<Self, FinderError> {
        let client = Client::builder()
            .user_agent("chess-moments/1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FinderError::Archive(format!("HTTP client setup failed: {e}")))?;
        // Chess.com usernames: letters, digits, underscore and hyphen
        let username_pattern = Regex::new(r"^[a-zA-Z0-9_-]{2,30}$")
            .map_err(|e| FinderError::Archive(format!("Bad username pattern: {e}")))?;
        Ok(Self {
            client,
            base_url: CHESS_COM_API.to_string(),
            username_pattern,
        })
    }

    /// Point the client at a different API host (mirrors, local fixtures).
    /// Archive URLs returned by the API are moved onto the same host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Games from the user's latest monthly archive, newest first.
    pub async fn fetch_recent_games(&self, username: &str) -> Result<Vec<GameRecord>, FinderError> {
        let username = self.validate_username(username)?;
        let url = format!(
            "{}/pub/player/{}/games/archives",
            self.base_url,
            username.to_lowercase()
        );
        let archives = self.get_json(&url).await?;

        let Some(latest) = archives["archives"]
            .as_array()
            .and_then(|list| list.last())
            .and_then(|v| v.as_str())
        else {
            debug!(username, "No archives");
            return Ok(Vec::new());
        };

        let data = self.get_json(&self.rebase(latest)).await?;
        Ok(games_from_archive(&data))
    }

    pub fn validate_username<'a>(&self, username: &'a str) -> Result<&'a str, FinderError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(FinderError::Archive("Username required".into()));
        }
        if !self.username_pattern.is_match(username) {
            return Err(FinderError::Archive(format!("Invalid username format: '{username}'")));
        }
        Ok(username)
    }

    fn rebase(&self, url: &str) -> String {
        match url.strip_prefix(CHESS_COM_API) {
            Some(path) => format!("{}{path}", self.base_url),
            None => url.to_string(),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, FinderError> {
        debug!(url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FinderError::Archive(format!("Request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(FinderError::Archive(format!("HTTP {} for {url}", resp.status())));
        }

        resp.json()
            .await
            .map_err(|e| FinderError::Archive(format!("JSON parse error: {e}")))
    }
}

/// Records from one monthly archive payload, newest first.
///
/// Variant games and entries without a readable PGN are skipped.
pub fn games_from_archive(data: &Value) -> Vec<GameRecord> {
    let games = data["games"].as_array().cloned().unwrap_or_default();
    let mut records: Vec<GameRecord> = Vec::with_capacity(games.len());

    for game in games {
        let rules = game.get("rules").and_then(|v| v.as_str()).unwrap_or("chess");
        if rules != "chess" {
            continue;
        }
        let Some(pgn) = game.get("pgn").and_then(|v| v.as_str()) else {
            continue;
        };

        let record = match GameRecord::from_pgn(pgn) {
            Ok(record) => record,
            Err(e) => {
                warn!(url = game.get("url").and_then(|v| v.as_str()), error = %e, "Skipping unreadable game");
                continue;
            }
        };

        let from_pgn = record.metadata().clone();
        let metadata = GameMetadata {
            source_id: game
                .get("url")
                .and_then(|v| v.as_str())
                .map(String::from)
                .or(from_pgn.source_id),
            white: game["white"]["username"]
                .as_str()
                .map(String::from)
                .or(from_pgn.white),
            black: game["black"]["username"]
                .as_str()
                .map(String::from)
                .or(from_pgn.black),
            result: from_pgn.result,
            end_time: game
                .get("end_time")
                .and_then(|v| v.as_i64())
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            time_class: game
                .get("time_class")
                .and_then(|v| v.as_str())
                .map(String::from),
        };
        records.push(record.with_metadata(metadata));
    }

    records.sort_by(|a, b| b.metadata().end_time.cmp(&a.metadata().end_time));
    records
}
