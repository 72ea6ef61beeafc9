//! UCI engine session (async I/O)
//!
//! Every evaluation owns a freshly spawned engine process for its whole
//! duration; processes are never shared between concurrent evaluations.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chess_core::MoveCoords;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::EngineError;

/// How long a process gets to exit after `quit` before it is killed
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Search effort for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    Depth(u32),
    MoveTime(Duration),
}

impl SearchBudget {
    fn go_command(&self) -> String {
        match self {
            SearchBudget::Depth(depth) => format!("go depth {depth}"),
            SearchBudget::MoveTime(time) => format!("go movetime {}", time.as_millis()),
        }
    }

    /// Wall-clock time the search is told to use; zero for depth budgets.
    pub fn search_time(&self) -> Duration {
        match self {
            SearchBudget::Depth(_) => Duration::ZERO,
            SearchBudget::MoveTime(time) => *time,
        }
    }
}

/// Engine evaluation, from the point of view of the side to move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated)
    Mate(i32),
}

/// Result of evaluating one position
#[derive(Debug, Clone, PartialEq)]
pub struct EngineVerdict {
    pub best_move: MoveCoords,
    pub score: Score,
    /// Depth of the reported line, if the engine sent one
    pub depth: Option<u32>,
    /// Principal variation in UCI notation
    pub pv: Vec<String>,
}

/// Options sent to every engine after the UCI handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub threads: u32,
    pub hash_mb: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 64,
        }
    }
}

/// Something that can evaluate a position within a budget.
///
/// `Ok(None)` means the engine finished but reported no usable line (e.g. the
/// side to move has no legal moves); that is different from an error.
pub trait Evaluator: Send + Sync + 'static {
    fn evaluate(
        &self,
        fen: &str,
        budget: SearchBudget,
    ) -> impl Future<Output = Result<Option<EngineVerdict>, EngineError>> + Send;
}

/// One running engine process
pub struct EngineProcess {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl EngineProcess {
    /// Spawn the engine. Nothing is sent until `handshake`.
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self, EngineError> {
        let mut process = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {e}", program.display())))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("engine stdin was not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("engine stdout was not captured".into()))?;

        Ok(Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read one line into `line`; end of output is a protocol error.
    async fn read_line(&mut self, line: &mut String) -> Result<(), EngineError> {
        line.clear();
        let n = self.stdout.read_line(line).await?;
        if n == 0 {
            return Err(EngineError::Protocol(
                "engine closed its output before finishing".into(),
            ));
        }
        debug!(line = line.trim(), "SF >");
        Ok(())
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), EngineError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            if line.trim() == expected {
                return Ok(());
            }
        }
    }

    /// UCI handshake and option setup
    pub async fn handshake(&mut self, options: &EngineOptions) -> Result<(), EngineError> {
        self.send("uci").await?;
        self.wait_for("uciok").await?;

        self.send(&format!("setoption name Threads value {}", options.threads))
            .await?;
        self.send(&format!("setoption name Hash value {}", options.hash_mb))
            .await?;
        self.send("isready").await?;
        self.wait_for("readyok").await?;
        Ok(())
    }

    /// Search one position and return the last principal line the engine
    /// reported before its `bestmove`.
    pub async fn search(
        &mut self,
        fen: &str,
        budget: SearchBudget,
    ) -> Result<Option<EngineVerdict>, EngineError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&budget.go_command()).await?;

        let mut last: Option<InfoLine> = None;
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            match trimmed.split_whitespace().next() {
                Some("info") => {
                    let info = parse_info(trimmed)?;
                    if info.score.is_some() && !info.bound && info.multipv.unwrap_or(1) == 1 {
                        last = Some(info);
                    }
                }
                Some("bestmove") => {
                    return Ok(match (parse_bestmove(trimmed)?, last) {
                        (BestMove::Move(best_move), Some(info)) => {
                            info.score.map(|score| EngineVerdict {
                                best_move,
                                score,
                                depth: info.depth,
                                pv: info.pv,
                            })
                        }
                        (BestMove::Move(best_move), None) => {
                            debug!(%best_move, "bestmove without a scored line");
                            None
                        }
                        (BestMove::NoMove, _) => None,
                    });
                }
                // id lines, banners, option listings, anything else
                _ => {}
            }
        }
    }

    /// Ask the engine to exit, killing it if it does not within a short grace period.
    pub async fn quit(mut self) {
        let _ = self.send("quit").await;
        if tokio::time::timeout(QUIT_GRACE, self.process.wait())
            .await
            .is_err()
        {
            warn!("Engine ignored quit, killing it");
            let _ = self.process.kill().await;
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Evaluator that spawns a fresh engine process for every call
#[derive(Debug, Clone)]
pub struct StockfishEvaluator {
    program: PathBuf,
    args: Vec<String>,
    options: EngineOptions,
    timeout: Duration,
}

impl StockfishEvaluator {
    /// `timeout` is the allowance on top of the budget's own search time.
    pub fn new(program: impl Into<PathBuf>, options: EngineOptions, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            options,
            timeout,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Wall-clock ceiling for one evaluation, always longer than the search itself.
    pub fn timeout_for(&self, budget: SearchBudget) -> Duration {
        self.timeout + budget.search_time()
    }
}

impl Evaluator for StockfishEvaluator {
    async fn evaluate(
        &self,
        fen: &str,
        budget: SearchBudget,
    ) -> Result<Option<EngineVerdict>, EngineError> {
        let ceiling = self.timeout_for(budget);
        let mut engine = EngineProcess::spawn(&self.program, &self.args)?;

        let outcome = tokio::time::timeout(ceiling, async {
            engine.handshake(&self.options).await?;
            engine.search(fen, budget).await
        })
        .await;

        engine.quit().await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(ceiling)),
        }
    }
}

/// Resolve an engine program the way the OS would: paths are checked
/// directly, bare names are searched on `PATH`.
pub fn locate_engine(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

/// Fields of interest from one `info` line
#[derive(Debug, Default, PartialEq)]
struct InfoLine {
    depth: Option<u32>,
    multipv: Option<u32>,
    score: Option<Score>,
    /// lowerbound/upperbound scores are not final
    bound: bool,
    pv: Vec<String>,
}

/// Parse an `info` line. Unknown fields are skipped; a `score` that cannot be
/// read is a protocol error.
fn parse_info(line: &str) -> Result<InfoLine, EngineError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut info = InfoLine::default();
    let mut i = 1;

    while i < parts.len() {
        match parts[i] {
            "depth" => {
                info.depth = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "multipv" => {
                info.multipv = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "score" => {
                let kind = parts.get(i + 1).copied();
                let value = parts
                    .get(i + 2)
                    .and_then(|v| v.parse::<i32>().ok())
                    .ok_or_else(|| EngineError::Protocol(format!("unreadable score in '{line}'")))?;
                info.score = Some(match kind {
                    Some("cp") => Score::Centipawns(value),
                    Some("mate") => Score::Mate(value),
                    _ => {
                        return Err(EngineError::Protocol(format!(
                            "unknown score kind in '{line}'"
                        )))
                    }
                });
                i += 3;
                if matches!(parts.get(i), Some(&"lowerbound") | Some(&"upperbound")) {
                    info.bound = true;
                    i += 1;
                }
            }
            "pv" => {
                info.pv = parts[i + 1..].iter().map(|s| s.to_string()).collect();
                break;
            }
            // free text until end of line
            "string" => break,
            _ => i += 1,
        }
    }

    Ok(info)
}

#[derive(Debug, PartialEq)]
enum BestMove {
    Move(MoveCoords),
    /// `bestmove (none)`: no legal move in the searched position
    NoMove,
}

fn parse_bestmove(line: &str) -> Result<BestMove, EngineError> {
    match line.split_whitespace().nth(1) {
        None => Err(EngineError::Protocol("bestmove line without a move".into())),
        Some("(none)") | Some("0000") => Ok(BestMove::NoMove),
        Some(token) => token
            .parse()
            .map(BestMove::Move)
            .map_err(EngineError::Protocol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4 e7e5";
        let info = parse_info(line).unwrap();
        assert_eq!(info.depth, Some(20));
        assert_eq!(info.multipv, Some(1));
        assert_eq!(info.score, Some(Score::Centipawns(35)));
        assert!(!info.bound);
        assert_eq!(info.pv, vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        assert_eq!(parse_info(line).unwrap().score, Some(Score::Mate(-3)));
    }

    #[test]
    fn test_parse_bound() {
        let line = "info depth 12 score cp 80 lowerbound nodes 5000 pv g1f3";
        let info = parse_info(line).unwrap();
        assert!(info.bound);
        assert_eq!(info.pv, vec!["g1f3"]);
    }

    #[test]
    fn test_info_string_is_not_parsed() {
        let info = parse_info("info string score cp banana").unwrap();
        assert_eq!(info, InfoLine::default());
    }

    #[test]
    fn test_currmove_line_has_no_score() {
        let info = parse_info("info depth 5 currmove e2e4 currmovenumber 1").unwrap();
        assert_eq!(info.score, None);
    }

    #[test]
    fn test_malformed_score_is_protocol_error() {
        assert!(matches!(
            parse_info("info depth 3 score cp"),
            Err(EngineError::Protocol(_))
        ));
        assert!(matches!(
            parse_info("info depth 3 score wdl 10"),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_bestmove("bestmove e7e8q ponder d8e8").unwrap(),
            BestMove::Move("e7e8q".parse().unwrap())
        );
        assert_eq!(parse_bestmove("bestmove (none)").unwrap(), BestMove::NoMove);
        assert!(matches!(
            parse_bestmove("bestmove"),
            Err(EngineError::Protocol(_))
        ));
        assert!(matches!(
            parse_bestmove("bestmove zz99"),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn test_go_command() {
        assert_eq!(SearchBudget::Depth(14).go_command(), "go depth 14");
        assert_eq!(
            SearchBudget::MoveTime(Duration::from_millis(250)).go_command(),
            "go movetime 250"
        );
    }

    #[test]
    fn test_timeout_exceeds_search_time() {
        let evaluator = StockfishEvaluator::new(
            "stockfish",
            EngineOptions::default(),
            Duration::from_secs(5),
        );
        let budget = SearchBudget::MoveTime(Duration::from_secs(2));
        assert!(evaluator.timeout_for(budget) > budget.search_time());
        assert_eq!(
            evaluator.timeout_for(SearchBudget::Depth(20)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_locate_engine() {
        assert_eq!(locate_engine("/nonexistent/stockfish-binary"), None);
        assert_eq!(locate_engine("no-such-engine-on-path-1234"), None);
        #[cfg(unix)]
        assert!(locate_engine("sh").is_some());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let evaluator = StockfishEvaluator::new(
            "/nonexistent/stockfish-binary",
            EngineOptions::default(),
            Duration::from_secs(1),
        );
        let result = evaluator
            .evaluate("8/8/8/8/8/8/8/K6k w - - 0 1", SearchBudget::Depth(1))
            .await;
        assert!(matches!(result, Err(EngineError::Spawn(_))));
    }

    /// Engine sessions against a tiny shell script that speaks just enough UCI.
    #[cfg(unix)]
    mod fake_engine {
        use super::*;

        const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

        struct FakeEngine {
            script: PathBuf,
            pid_file: PathBuf,
        }

        impl FakeEngine {
            fn new(name: &str, on_go: &str) -> Self {
                Self::with_quit(name, on_go, "exit 0")
            }

            /// `on_quit` replaces the normal exit, e.g. to ignore `quit`.
            fn with_quit(name: &str, on_go: &str, on_quit: &str) -> Self {
                let stem = format!("fake-uci-{}-{name}", std::process::id());
                let script = std::env::temp_dir().join(format!("{stem}.sh"));
                let pid_file = std::env::temp_dir().join(format!("{stem}.pid"));
                let body = format!(
                    r#"echo $$ > "{pid}"
echo "FakeFish 1.0 by nobody"
while read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo "option name Hash type spin default 16"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) {on_go} ;;
    quit) {on_quit} ;;
  esac
done
"#,
                    pid = pid_file.display()
                );
                std::fs::write(&script, body).unwrap();
                Self { script, pid_file }
            }

            fn evaluator(&self, timeout: Duration) -> StockfishEvaluator {
                evaluator(&self.script, timeout)
            }

            /// The engine process must be gone once an evaluation returns.
            fn assert_exited(&self) {
                let pid = std::fs::read_to_string(&self.pid_file).unwrap();
                let alive = std::process::Command::new("kill")
                    .args(["-0", pid.trim()])
                    .stderr(Stdio::null())
                    .status()
                    .unwrap()
                    .success();
                assert!(!alive, "engine process {} still running", pid.trim());
            }
        }

        impl Drop for FakeEngine {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.script);
                let _ = std::fs::remove_file(&self.pid_file);
            }
        }

        fn evaluator(script: &Path, timeout: Duration) -> StockfishEvaluator {
            StockfishEvaluator::new("sh", EngineOptions::default(), timeout)
                .with_args(vec![script.to_string_lossy().into_owned()])
        }

        #[tokio::test]
        async fn test_final_line_wins() {
            let engine = FakeEngine::new(
                "final-line",
                r#"echo "info string NNUE evaluation enabled"; echo "info depth 1 multipv 1 score cp 20 nodes 20 pv e2e4"; echo "info depth 2 multipv 2 score cp 900 nodes 40 pv a2a3"; echo "info depth 2 multipv 1 score mate 3 nodes 80 pv d1h5 g7g6 h5f7"; echo "info depth 3 currmove d1h5 currmovenumber 1"; echo "bestmove d1h5 ponder g7g6""#,
            );
            let verdict = engine
                .evaluator(Duration::from_secs(5))
                .evaluate(START, SearchBudget::Depth(2))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(verdict.best_move.to_string(), "d1h5");
            assert_eq!(verdict.score, Score::Mate(3));
            assert_eq!(verdict.depth, Some(2));
            assert_eq!(verdict.pv, vec!["d1h5", "g7g6", "h5f7"]);
            engine.assert_exited();
        }

        #[tokio::test]
        async fn test_no_legal_move_is_not_an_error() {
            let engine = FakeEngine::new(
                "no-move",
                r#"echo "info depth 0 score mate 0"; echo "bestmove (none)""#,
            );
            let verdict = engine
                .evaluator(Duration::from_secs(5))
                .evaluate(START, SearchBudget::Depth(2))
                .await
                .unwrap();
            assert_eq!(verdict, None);
            engine.assert_exited();
        }

        #[tokio::test]
        async fn test_silent_engine_times_out() {
            let engine = FakeEngine::new("silent", ":");
            let started = std::time::Instant::now();
            let result = engine
                .evaluator(Duration::from_millis(300))
                .evaluate(START, SearchBudget::Depth(30))
                .await;
            assert!(matches!(result, Err(EngineError::Timeout(_))));
            assert!(started.elapsed() < Duration::from_secs(5));
            engine.assert_exited();
        }

        #[tokio::test]
        async fn test_engine_ignoring_quit_is_killed() {
            let engine = FakeEngine::with_quit("stubborn", ":", ":");
            let result = engine
                .evaluator(Duration::from_millis(300))
                .evaluate(START, SearchBudget::Depth(30))
                .await;
            assert!(matches!(result, Err(EngineError::Timeout(_))));
            engine.assert_exited();
        }

        #[tokio::test]
        async fn test_engine_exit_is_protocol_error() {
            let engine = FakeEngine::new("crash", "exit 1");
            let result = engine
                .evaluator(Duration::from_secs(5))
                .evaluate(START, SearchBudget::Depth(2))
                .await;
            assert!(matches!(result, Err(EngineError::Protocol(_))));
            engine.assert_exited();
        }

        #[tokio::test]
        async fn test_garbled_score_is_protocol_error() {
            let engine = FakeEngine::new(
                "garbled",
                r#"echo "info depth 1 score cp lots pv e2e4"; echo "bestmove e2e4""#,
            );
            let result = engine
                .evaluator(Duration::from_secs(5))
                .evaluate(START, SearchBudget::Depth(1))
                .await;
            assert!(matches!(result, Err(EngineError::Protocol(_))));
            engine.assert_exited();
        }
    }
}
