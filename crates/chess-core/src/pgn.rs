//! PGN loading: mainline SAN tokens and the few headers we care about.

use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};

use crate::error::RecordError;
use crate::game_data::{GameMetadata, GameRecord};

/// Tags collected during header parsing.
#[derive(Default)]
struct PgnTags {
    metadata: GameMetadata,
    setup: Option<String>,
    fen: Option<String>,
}

/// State during movetext parsing.
struct Mainline {
    tags: PgnTags,
    moves: Vec<String>,
}

/// Visitor that turns one PGN game into a `GameRecord`.
struct RecordBuilder;

impl Visitor for RecordBuilder {
    type Tags = PgnTags;
    type Movetext = Mainline;
    type Output = GameRecord;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(PgnTags::default())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let value = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
        if value.is_empty() || value == "?" {
            return ControlFlow::Continue(());
        }
        match name {
            b"White" => tags.metadata.white = Some(value),
            b"Black" => tags.metadata.black = Some(value),
            b"Result" => tags.metadata.result = Some(value),
            // Chess.com puts the game URL in Link; Site is the generic fallback
            b"Link" => tags.metadata.source_id = Some(value),
            b"Site" => {
                if tags.metadata.source_id.is_none() {
                    tags.metadata.source_id = Some(value);
                }
            }
            b"SetUp" => tags.setup = Some(value),
            b"FEN" => tags.fen = Some(value),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(Mainline {
            tags,
            moves: Vec::new(),
        })
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(
        &mut self,
        movetext: &mut Self::Movetext,
        san_plus: SanPlus,
    ) -> ControlFlow<Self::Output> {
        movetext.moves.push(san_plus.to_string());
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        let Mainline { tags, moves } = movetext;
        let record = GameRecord::new(moves).with_metadata(tags.metadata);
        match (tags.setup.as_deref(), tags.fen) {
            (Some("0"), _) | (_, None) => record,
            (_, Some(fen)) => record.with_start_fen(fen),
        }
    }
}

impl GameRecord {
    /// Parse the first game of a PGN document.
    ///
    /// Legality is not checked here; that happens when the record is replayed.
    pub fn from_pgn(pgn: &str) -> Result<Self, RecordError> {
        let mut reader = Reader::new(pgn.as_bytes());
        reader.read_game(&mut RecordBuilder)?.ok_or(RecordError::NoGame)
    }
}
