#![allow(dead_code)]

use chess_core::GameRecord;

/// Morphy vs Duke Karl / Count Isouard, Paris 1858. 33 plies, White mates.
pub const OPERA_GAME: &str = r#"[Event "Paris"]
[Site "Paris FRA"]
[White "Paul Morphy"]
[Black "Duke Karl / Count Isouard"]
[Result "1-0"]

1. e4 e5 2. Nf3 d6 3. d4 Bg4 4. dxe5 Bxf3 5. Qxf3 dxe5 6. Bc4 Nf6 7. Qb3 Qe7
8. Nc3 c6 9. Bg5 b5 10. Nxb5 cxb5 11. Bxb5+ Nbd7 12. O-O-O Rd8 13. Rxd7 Rxd7
14. Rd1 Qe6 15. Bxd7+ Nxd7 16. Qb8+ Nxb8 17. Rd8# 1-0"#;

/// Position before 17. Rd8#
pub const OPERA_GAME_FINAL_FEN: &str = "1n2kb1r/p4ppp/4q3/4p1B1/4P3/8/PPP2PPP/2KR4 w k - 0 17";

pub fn opera_game() -> GameRecord {
    GameRecord::from_pgn(OPERA_GAME).unwrap()
}

/// Black to move first, from a composed position.
pub fn black_to_move_record() -> GameRecord {
    GameRecord::new(["Kd7", "Kf2", "Kc6", "Ke3"])
        .with_start_fen("4k3/8/8/8/8/8/8/4K3 b - - 3 40")
}
