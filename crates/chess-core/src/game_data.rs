use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shakmaty::Color;

/// One of the two players, named by piece color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn color(self) -> Color {
        match self {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::White => "white",
            Side::Black => "black",
        })
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Side::White),
            "black" | "b" => Ok(Side::Black),
            other => Err(format!("unknown side '{other}' (expected white or black)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMetadata {
    /// Where the game came from (archive URL or PGN Link/Site tag)
    pub source_id: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>, // "1-0", "0-1", "1/2-1/2", "*"
    pub end_time: Option<DateTime<Utc>>,
    /// Time-control class as reported by the archive ("blitz", "rapid", ...)
    pub time_class: Option<String>,
}

/// A finished game: SAN move tokens plus metadata.
///
/// Immutable once built; replaying the same record always yields the same plies.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    start_fen: Option<String>,
    moves: Vec<String>,
    metadata: GameMetadata,
}

impl GameRecord {
    /// Record starting from the standard initial position.
    pub fn new<I, S>(moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            start_fen: None,
            moves: moves.into_iter().map(Into::into).collect(),
            metadata: GameMetadata::default(),
        }
    }

    pub fn with_start_fen(mut self, fen: impl Into<String>) -> Self {
        self.start_fen = Some(fen.into());
        self
    }

    pub fn with_metadata(mut self, metadata: GameMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Custom starting position, if the game did not start from the initial setup.
    pub fn start_fen(&self) -> Option<&str> {
        self.start_fen.as_deref()
    }

    /// SAN move tokens in game order.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn metadata(&self) -> &GameMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}
