//! Game records and replay shared by the moment finder.

pub use shakmaty;

pub mod error;
pub mod game_data;
pub mod pgn;
pub mod replay;

pub use error::RecordError;
pub use game_data::{GameMetadata, GameRecord, Side};
pub use replay::{replay, MoveCoords, Ply, PlyMove, Replay, Turn};
