//! Game replay: turns a `GameRecord` into the position before every ply.
//!
//! Replay is a fold over the SAN tokens. Each step consumes the previous
//! position and yields an immutable snapshot, so ply `k` always sees exactly
//! plies `0..k` applied to the starting position.

use std::fmt;
use std::str::FromStr;

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{CastlingMode, Chess, EnPassantMode, File, Move, Position, Role, Square};

use crate::error::RecordError;
use crate::game_data::{GameRecord, Side};

/// Squares of a move in UCI form (`e2e4`, `e7e8q`, castling as `e1g1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveCoords {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl MoveCoords {
    /// Coordinates of a legal move. Castling uses the king's destination
    /// square, which is how engines report it outside Chess960 mode.
    pub fn from_move(mv: &Move) -> Option<Self> {
        match *mv {
            Move::Normal {
                from,
                to,
                promotion,
                ..
            } => Some(Self {
                from,
                to,
                promotion,
            }),
            Move::EnPassant { from, to } => Some(Self {
                from,
                to,
                promotion: None,
            }),
            Move::Castle { king, rook } => {
                let file = if rook.file() > king.file() {
                    File::G
                } else {
                    File::C
                };
                Some(Self {
                    from: king,
                    to: Square::from_coords(file, king.rank()),
                    promotion: None,
                })
            }
            Move::Put { .. } => None,
        }
    }
}

fn promotion_char(role: Role) -> Option<char> {
    match role {
        Role::Queen => Some('q'),
        Role::Rook => Some('r'),
        Role::Bishop => Some('b'),
        Role::Knight => Some('n'),
        _ => None,
    }
}

impl fmt::Display for MoveCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(c) = self.promotion.and_then(promotion_char) {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for MoveCoords {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(format!("not a UCI move: '{s}'"));
        }
        let from: Square = s[0..2]
            .parse()
            .map_err(|_| format!("bad source square in '{s}'"))?;
        let to: Square = s[2..4]
            .parse()
            .map_err(|_| format!("bad target square in '{s}'"))?;
        let promotion = match s.as_bytes().get(4) {
            None => None,
            Some(b'q' | b'Q') => Some(Role::Queen),
            Some(b'r' | b'R') => Some(Role::Rook),
            Some(b'b' | b'B') => Some(Role::Bishop),
            Some(b'n' | b'N') => Some(Role::Knight),
            Some(_) => return Err(format!("bad promotion piece in '{s}'")),
        };
        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

/// The move played at a ply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyMove {
    pub coords: MoveCoords,
    /// SAN label for display, e.g. `Rd8#`
    pub san: String,
}

/// One half-move together with the position it was played from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ply {
    /// 0-based half-move index
    pub index: usize,
    /// Side that played this move
    pub side: Side,
    pub mv: PlyMove,
    /// FEN of the position before the move
    pub fen_before: String,
}

impl Ply {
    /// Full-move number as printed in PGN (1-based).
    pub fn move_number(&self, first_mover: Side) -> usize {
        let offset = usize::from(first_mover == Side::Black);
        (self.index + offset) / 2 + 1
    }
}

/// Whose turn a ply is, relative to the side the caller cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Focus,
    Other,
}

/// The replayed game: every ply with its position-before, in order.
#[derive(Debug, Clone)]
pub struct Replay {
    first_mover: Side,
    plies: Vec<Ply>,
}

impl Replay {
    pub fn first_mover(&self) -> Side {
        self.first_mover
    }

    pub fn plies(&self) -> &[Ply] {
        &self.plies
    }

    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }

    /// Side to move at `index`, derived from parity alone.
    pub fn side_at(&self, index: usize) -> Side {
        if index % 2 == 0 {
            self.first_mover
        } else {
            self.first_mover.opposite()
        }
    }

    pub fn side_to_move(&self, index: usize, focus: Side) -> Turn {
        if self.side_at(index) == focus {
            Turn::Focus
        } else {
            Turn::Other
        }
    }
}

impl IntoIterator for Replay {
    type Item = Ply;
    type IntoIter = std::vec::IntoIter<Ply>;

    fn into_iter(self) -> Self::IntoIter {
        self.plies.into_iter()
    }
}

/// Canonical position string used throughout (full FEN, legal en passant only).
pub fn position_string(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

fn starting_position(record: &GameRecord) -> Result<Chess, RecordError> {
    let Some(fen) = record.start_fen() else {
        return Ok(Chess::default());
    };
    let invalid = |reason: String| RecordError::InvalidFen {
        fen: fen.to_string(),
        reason,
    };
    let parsed: Fen = fen.parse().map_err(|e| invalid(format!("{e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| invalid(format!("{e}")))
}

/// Replay a record from its starting position.
///
/// Fails on the first token that is not SAN or not legal in the position it
/// is applied to, and on records with no moves at all.
pub fn replay(record: &GameRecord) -> Result<Replay, RecordError> {
    if record.is_empty() {
        return Err(RecordError::Empty);
    }

    let start = starting_position(record)?;
    let first_mover = Side::from(start.turn());

    let (_, plies) = record.moves().iter().enumerate().try_fold(
        (start, Vec::with_capacity(record.len())),
        |(mut pos, mut plies), (index, token)| {
            let san_plus: SanPlus = token.parse().map_err(|_| RecordError::InvalidSan {
                ply: index,
                san: token.clone(),
            })?;
            let mv = san_plus
                .san
                .to_move(&pos)
                .map_err(|e| RecordError::IllegalMove {
                    ply: index,
                    san: token.clone(),
                    reason: e.to_string(),
                })?;
            let coords = MoveCoords::from_move(&mv).ok_or_else(|| RecordError::IllegalMove {
                ply: index,
                san: token.clone(),
                reason: "drop moves are not part of standard chess".to_string(),
            })?;

            plies.push(Ply {
                index,
                side: Side::from(pos.turn()),
                mv: PlyMove {
                    coords,
                    san: san_plus.to_string(),
                },
                fen_before: position_string(&pos),
            });

            pos.play_unchecked(mv);
            Ok::<_, RecordError>((pos, plies))
        },
    )?;

    Ok(Replay { first_mover, plies })
}
