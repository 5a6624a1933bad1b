//! Local Stockfish over UCI (async I/O), as an evaluation provider.

use analysis_core::{EngineEval, EvaluationProvider, ProviderError, Score, SearchParams};
use async_trait::async_trait;
use chess_core::notation::uci_line_to_san;
use chess_core::PositionIdentity;
use shakmaty::{Color, Position};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A single PV line from multi-PV analysis, scores from the side to move.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PvLine {
    pub pv: Vec<String>,
    pub cp: Option<i32>,
    pub mate: Option<i32>,
    pub depth: Option<u32>,
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

fn engine_error(context: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Unavailable(format!("{context}: {e}"))
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str) -> Result<Self, ProviderError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| engine_error("Failed to spawn Stockfish", e))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Unavailable("Stockfish stdin unavailable".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Unavailable("Stockfish stdout unavailable".to_string()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send("setoption name Threads value 1").await?;
        engine.send("setoption name Hash value 256").await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), ProviderError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| engine_error("Failed to write to Stockfish", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| engine_error("Failed to flush stdin", e))?;
        Ok(())
    }

    async fn read_line(&mut self, line: &mut String) -> Result<(), ProviderError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| engine_error("Failed to read from Stockfish", e))?;
        if n == 0 {
            return Err(ProviderError::Unavailable("Stockfish exited".to_string()));
        }
        Ok(())
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), ProviderError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Search to `depth` and return up to `multipv` lines, best first.
    pub async fn evaluate_multipv(
        &mut self,
        fen: &str,
        depth: u32,
        multipv: u32,
    ) -> Result<Vec<PvLine>, ProviderError> {
        let multipv = multipv.max(1);
        self.send(&format!("setoption name MultiPV value {multipv}")).await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut lines = vec![PvLine::default(); multipv as usize];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                let pv_idx = parse_multipv_index(trimmed).unwrap_or(1).saturating_sub(1) as usize;
                if let Some(entry) = lines.get_mut(pv_idx) {
                    entry.cp = parse_cp(trimmed);
                    entry.mate = parse_mate(trimmed);
                    entry.pv = parse_pv(trimmed);
                    entry.depth = parse_depth(trimmed);
                }
            } else if trimmed.starts_with("bestmove") {
                break;
            }
        }

        lines.retain(|l| !l.pv.is_empty());
        Ok(lines)
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

/// Evaluation provider backed by one lazily started engine process. A
/// failed engine is dropped and respawned on the next call.
pub struct StockfishProvider {
    path: String,
    engine: Mutex<Option<StockfishEngine>>,
}

impl StockfishProvider {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            engine: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EvaluationProvider for StockfishProvider {
    fn name(&self) -> &str {
        "stockfish"
    }

    async fn evaluate(
        &self,
        identity: &PositionIdentity,
        params: SearchParams,
    ) -> Result<EngineEval, ProviderError> {
        let pos = identity
            .position()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let mut guard = self.engine.lock().await;
        if guard.is_none() {
            *guard = Some(StockfishEngine::new(&self.path).await?);
        }
        let Some(engine) = guard.as_mut() else {
            return Err(ProviderError::Unavailable("Stockfish not running".to_string()));
        };

        let pv_lines = match engine
            .evaluate_multipv(identity.as_str(), params.depth, params.multipv)
            .await
        {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "Stockfish failed, restarting on next request");
                *guard = None;
                return Err(e);
            }
        };
        drop(guard);

        let best = pv_lines
            .first()
            .ok_or_else(|| ProviderError::Unavailable("Stockfish returned no lines".to_string()))?;
        let score = white_score(best, pos.turn())
            .ok_or_else(|| ProviderError::Unavailable("Stockfish returned no score".to_string()))?;

        Ok(EngineEval {
            score,
            depth: best.depth,
            lines: pv_lines
                .iter()
                .map(|l| uci_line_to_san(&pos, &l.pv, l.pv.len()))
                .filter(|l| !l.is_empty())
                .collect(),
        })
    }
}

/// Convert a side-to-move score into White's point of view.
fn white_score(line: &PvLine, turn: Color) -> Option<Score> {
    let sign = match turn {
        Color::White => 1,
        Color::Black => -1,
    };
    if let Some(mate) = line.mate {
        return Some(Score::mate_in(mate * sign));
    }
    line.cp.map(|cp| Score::from_centipawns(cp * sign))
}

/// Value of the token following `key` in an info line.
fn parse_field<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

fn parse_cp(line: &str) -> Option<i32> {
    parse_field(line, "cp")
}

fn parse_mate(line: &str) -> Option<i32> {
    parse_field(line, "mate")
}

fn parse_multipv_index(line: &str) -> Option<u32> {
    parse_field(line, "multipv")
}

fn parse_depth(line: &str) -> Option<u32> {
    parse_field(line, "depth")
}

/// PV moves from an info line
fn parse_pv(line: &str) -> Vec<String> {
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in line.split_whitespace() {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}
