//! UCI engine adapter.
//!
//! The coordinator never talks to the engine subprocess directly; it goes
//! through the narrow [`MoveArbiter`] port, whose only job is "pick the best
//! of these candidate moves for this FEN". [`ArbiterFactory`] exists because
//! a game reset discards the running engine and starts a fresh one, and so
//! tests can substitute a scripted arbiter.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::EngineError;

/// Chooses one move among the candidates proposed for a position.
#[async_trait]
pub trait MoveArbiter: Send + Sync {
    /// Pick the strongest of `candidates` (LAN) for `fen`.
    ///
    /// The returned LAN is always one of the inputs.
    async fn choose(&self, fen: &str, candidates: &[String]) -> Result<String, EngineError>;

    /// Terminate whatever backs the arbiter. Idempotent best-effort.
    async fn quit(&self);
}

/// Creates arbiters; called once at startup and once per game reset.
#[async_trait]
pub trait ArbiterFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn MoveArbiter>, EngineError>;
}

/// If every candidate is the same move, that move; otherwise `None`.
pub fn unique_candidate(candidates: &[String]) -> Option<&String> {
    let distinct: HashSet<&String> = candidates.iter().collect();
    if distinct.len() == 1 {
        candidates.first()
    } else {
        None
    }
}

/// Extract the move from a `bestmove e2e4 [ponder ...]` line.
pub fn parse_bestmove(line: &str) -> Option<&str> {
    line.strip_prefix("bestmove")
        .map(str::trim_start)
        .and_then(|rest| rest.split_whitespace().next())
}

struct UciProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl UciProcess {
    async fn send(&mut self, command: &str) -> Result<(), EngineError> {
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read lines until one satisfies `pred`, returning that line.
    async fn read_until(&mut self, pred: impl Fn(&str) -> bool) -> Result<String, EngineError> {
        loop {
            match self.lines.next_line().await? {
                Some(line) => {
                    if pred(line.trim()) {
                        return Ok(line.trim().to_string());
                    }
                }
                None => return Err(EngineError::Terminated),
            }
        }
    }
}

/// A Stockfish (or any UCI) subprocess driven over stdin/stdout.
pub struct UciArbiter {
    inner: Mutex<UciProcess>,
    depth: u32,
    watchdog: Duration,
}

impl UciArbiter {
    /// Spawn the engine binary and complete the UCI handshake.
    pub async fn spawn(path: &str, depth: u32, watchdog: Duration) -> Result<Self, EngineError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(EngineError::Terminated)?;
        let stdout = child.stdout.take().ok_or(EngineError::Terminated)?;
        let mut process = UciProcess {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        };

        process.send("uci").await?;
        tokio::time::timeout(watchdog, process.read_until(|l| l == "uciok"))
            .await
            .map_err(|_| EngineError::NoReply)??;
        process.send("isready").await?;
        tokio::time::timeout(watchdog, process.read_until(|l| l == "readyok"))
            .await
            .map_err(|_| EngineError::NoReply)??;

        info!(engine = path, depth, "engine ready");
        Ok(Self {
            inner: Mutex::new(process),
            depth,
            watchdog,
        })
    }
}

#[async_trait]
impl MoveArbiter for UciArbiter {
    async fn choose(&self, fen: &str, candidates: &[String]) -> Result<String, EngineError> {
        if candidates.is_empty() {
            return Err(EngineError::NoReply);
        }
        // Unanimous proposals skip the engine entirely.
        if let Some(only) = unique_candidate(candidates) {
            return Ok(only.clone());
        }

        let mut process = self.inner.lock().await;
        process.send(&format!("position fen {fen}")).await?;
        process
            .send(&format!(
                "go depth {} searchmoves {}",
                self.depth,
                candidates.join(" ")
            ))
            .await?;

        let reply = tokio::time::timeout(
            self.watchdog,
            process.read_until(|l| l.starts_with("bestmove")),
        )
        .await;

        let chosen = match reply {
            Ok(line) => parse_bestmove(&line?).map(str::to_string),
            Err(_) => {
                // Watchdog fired. Ask the engine to wind down and fall back
                // to the first candidate so the turn can still commit.
                warn!(fen, "engine watchdog expired, falling back to first candidate");
                let _ = process.send("stop").await;
                return Ok(candidates[0].clone());
            }
        };

        match chosen {
            Some(lan) if candidates.contains(&lan) => Ok(lan),
            Some(lan) => {
                warn!(
                    fen,
                    reply = %lan,
                    "engine chose a move outside the candidate set, using first candidate"
                );
                Ok(candidates[0].clone())
            }
            None => Err(EngineError::NoReply),
        }
    }

    async fn quit(&self) {
        let mut process = self.inner.lock().await;
        let _ = process.send("quit").await;
        if tokio::time::timeout(Duration::from_secs(2), process.child.wait())
            .await
            .is_err()
        {
            let _ = process.child.start_kill();
        }
    }
}

/// Factory spawning [`UciArbiter`]s from the configured engine binary.
pub struct StockfishFactory {
    path: String,
    depth: u32,
    watchdog: Duration,
}

impl StockfishFactory {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            path: config.stockfish_path.clone(),
            depth: config.engine_depth,
            watchdog: config.engine_timeout,
        }
    }
}

#[async_trait]
impl ArbiterFactory for StockfishFactory {
    async fn create(&self) -> Result<Arc<dyn MoveArbiter>, EngineError> {
        Ok(Arc::new(
            UciArbiter::spawn(&self.path, self.depth, self.watchdog).await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_candidate_collapses_duplicates() {
        let all_same = vec!["e2e4".to_string(), "e2e4".to_string(), "e2e4".to_string()];
        assert_eq!(unique_candidate(&all_same), Some(&"e2e4".to_string()));

        let mixed = vec!["e2e4".to_string(), "d2d4".to_string()];
        assert_eq!(unique_candidate(&mixed), None);

        assert_eq!(unique_candidate(&[]), None);
    }

    #[test]
    fn test_parse_bestmove_variants() {
        assert_eq!(parse_bestmove("bestmove e2e4"), Some("e2e4"));
        assert_eq!(parse_bestmove("bestmove g7g8q ponder e7e5"), Some("g7g8q"));
        assert_eq!(parse_bestmove("info depth 15"), None);
        assert_eq!(parse_bestmove("bestmove"), None);
    }
}
