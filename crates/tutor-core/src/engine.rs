//! Engine process manager: one UCI subprocess, shared process-wide.
//!
//! The manager owns the subprocess lifecycle (`NotStarted -> Running ->
//! Stopped`, with `Failed` on unexpected termination) and serializes every
//! search behind a single async mutex. Analysis is advisory: an engine that
//! cannot be started yields a `RawAnalysis::Unavailable` value, never an error
//! that aborts the caller.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;

/// Upper bound for `uci`/`isready` handshakes
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a depth-limited search before the grace period
const DEPTH_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `quit` may take before the process is killed
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    MoveTime(Duration),
    Depth(u32),
}

impl SearchLimit {
    fn go_command(&self) -> String {
        match self {
            SearchLimit::MoveTime(t) => format!("go movetime {}", t.as_millis().max(1)),
            SearchLimit::Depth(d) => format!("go depth {}", (*d).max(1)),
        }
    }

    /// Wall-clock bound for one search, after which the engine is presumed hung
    pub fn hard_timeout(&self, grace: Duration) -> Duration {
        match self {
            SearchLimit::MoveTime(t) => *t + grace,
            SearchLimit::Depth(_) => DEPTH_SEARCH_TIMEOUT + grace,
        }
    }
}

/// How analysis is requested and trimmed
#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    pub limit: SearchLimit,
    /// Ranked lines requested from the engine (MultiPV)
    pub multipv: u32,
    /// PV truncation in plies; `None` keeps whole lines
    pub pv_plies: Option<usize>,
    /// Slack on top of the search limit before a search is declared hung
    pub grace: Duration,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            limit: SearchLimit::MoveTime(Duration::from_millis(300)),
            multipv: 3,
            pv_plies: Some(4),
            grace: Duration::from_secs(2),
        }
    }
}

/// UCI options applied after the handshake
#[derive(Debug, Clone, Copy)]
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

/// A single PV line, scored from the side to move's perspective
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PvLine {
    /// 1-based MultiPV rank
    pub rank: u32,
    /// Principal variation moves in UCI notation
    pub pv: Vec<String>,
    /// Centipawn score
    pub cp: Option<i32>,
    /// Mate in N (positive = side to move mates)
    pub mate: Option<i32>,
}

/// Outcome of a search request that did not crash or hang
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAnalysis {
    Lines(Vec<PvLine>),
    /// The engine could not be started; carries the reason
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    NotStarted,
    Running,
    Stopped,
    Failed,
}

/// A started engine speaking UCI
#[async_trait]
pub trait UciEngine: Send {
    /// Search `fen` and return up to `multipv` ranked lines
    async fn search(
        &mut self,
        fen: &str,
        limit: SearchLimit,
        multipv: u32,
    ) -> Result<Vec<PvLine>, EngineError>;

    /// Ask the engine to exit and reap it
    async fn quit(&mut self);
}

/// Starts engines; one call yields one fresh, handshaken process
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn UciEngine>, EngineError>;

    /// Short label for logs
    fn describe(&self) -> String;
}

// ---- Stockfish over tokio::process ----

pub struct StockfishLauncher {
    path: PathBuf,
    options: EngineOptions,
}

impl StockfishLauncher {
    pub fn new(path: impl Into<PathBuf>, options: EngineOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

#[async_trait]
impl EngineLauncher for StockfishLauncher {
    async fn launch(&self) -> Result<Box<dyn UciEngine>, EngineError> {
        let engine = StockfishEngine::new(&self.path, self.options).await?;
        Ok(Box::new(engine))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn the process and complete the UCI handshake
    pub async fn new(path: &std::path::Path, options: EngineOptions) -> Result<Self, EngineError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!("Failed to spawn {}: {e}", path.display()))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("Engine stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| EngineError::Unavailable("Engine stdout not captured".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        let handshake = async {
            engine.send("uci").await?;
            engine.wait_for("uciok").await?;
            engine
                .send(&format!("setoption name Threads value {}", options.threads))
                .await?;
            engine
                .send(&format!("setoption name Hash value {}", options.hash_mb))
                .await?;
            engine.send("setoption name UCI_AnalyseMode value true").await?;
            engine.send("isready").await?;
            engine.wait_for("readyok").await
        };

        let outcome = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake).await;
        match outcome {
            Ok(Ok(())) => Ok(engine),
            Ok(Err(e)) => Err(EngineError::Unavailable(format!("Handshake failed: {e}"))),
            Err(_) => Err(EngineError::Unavailable("Handshake timed out".into())),
        }
    }

    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "UCI <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| EngineError::Died(format!("Failed to write to engine: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::Died(format!("Failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    /// Read one line; EOF means the process is gone
    async fn read_line(&mut self, line: &mut String) -> Result<(), EngineError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| EngineError::Died(format!("Failed to read from engine: {e}")))?;
        if n == 0 {
            return Err(EngineError::Died("Engine closed its output".into()));
        }
        debug!(line = line.trim(), "UCI >");
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
}

#[async_trait]
impl UciEngine for StockfishEngine {
    async fn search(
        &mut self,
        fen: &str,
        limit: SearchLimit,
        multipv: u32,
    ) -> Result<Vec<PvLine>, EngineError> {
        let multipv = multipv.max(1);
        self.send(&format!("setoption name MultiPV value {multipv}")).await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&limit.go_command()).await?;

        let mut lines: Vec<Option<PvLine>> = vec![None; multipv as usize];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                if let Some(parsed) = parse_info_line(trimmed) {
                    let idx = parsed.rank.saturating_sub(1) as usize;
                    if idx < lines.len() {
                        lines[idx] = Some(parsed);
                    }
                }
            } else if trimmed.starts_with("bestmove") {
                break;
            }
        }

        Ok(lines.into_iter().flatten().collect())
    }

    async fn quit(&mut self) {
        let _ = self.send("quit").await;
        if tokio::time::timeout(QUIT_TIMEOUT, self.process.wait())
            .await
            .is_err()
        {
            warn!("Engine ignored quit, killing it");
            let _ = self.process.kill().await;
        }
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

// ---- Manager ----

enum Slot {
    NotStarted,
    Running(Box<dyn UciEngine>),
    Stopped,
    Failed,
}

impl Slot {
    fn state(&self) -> EngineState {
        match self {
            Slot::NotStarted => EngineState::NotStarted,
            Slot::Running(_) => EngineState::Running,
            Slot::Stopped => EngineState::Stopped,
            Slot::Failed => EngineState::Failed,
        }
    }
}

/// Owns the single engine subprocess and serializes access to it
pub struct EngineManager {
    launcher: Box<dyn EngineLauncher>,
    settings: AnalysisSettings,
    slot: Mutex<Slot>,
    launches: AtomicU32,
}

impl EngineManager {
    pub fn new(launcher: Box<dyn EngineLauncher>, settings: AnalysisSettings) -> Self {
        Self {
            launcher,
            settings,
            slot: Mutex::new(Slot::NotStarted),
            launches: AtomicU32::new(0),
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub async fn state(&self) -> EngineState {
        self.slot.lock().await.state()
    }

    /// State without waiting; `None` while a search holds the engine
    pub fn try_state(&self) -> Option<EngineState> {
        self.slot.try_lock().ok().map(|slot| slot.state())
    }

    /// Successful launches so far (the first start plus every restart)
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u32 {
        self.launches().saturating_sub(1)
    }

    /// Start the engine if it is not running. No retry.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut slot = self.slot.lock().await;
        self.start_locked(&mut slot).await
    }

    async fn start_locked(&self, slot: &mut Slot) -> Result<(), EngineError> {
        if matches!(slot, Slot::Running(_)) {
            return Ok(());
        }
        let previous = slot.state();
        let engine = self.launcher.describe();

        match self.launcher.launch().await {
            Ok(handle) => {
                *slot = Slot::Running(handle);
                self.launches.fetch_add(1, Ordering::Relaxed);
                if previous == EngineState::Failed {
                    info!(engine = %engine, "Engine restarted after failure");
                } else {
                    info!(engine = %engine, "Engine ready");
                }
                Ok(())
            }
            Err(e) => {
                warn!(engine = %engine, error = %e, "Engine failed to start");
                Err(match e {
                    EngineError::Unavailable(_) => e,
                    other => EngineError::Unavailable(other.to_string()),
                })
            }
        }
    }

    /// Analyse `fen`, returning up to `lines` ranked variations.
    ///
    /// Holds the engine lock for the whole search. A crash or hang leaves the
    /// manager `Failed` with the process killed; the next call makes exactly
    /// one restart attempt.
    pub async fn analyze(
        &self,
        fen: &str,
        limit: SearchLimit,
        lines: u32,
    ) -> Result<RawAnalysis, EngineError> {
        let mut slot = self.slot.lock().await;

        if let Err(e) = self.start_locked(&mut slot).await {
            let reason = match e {
                EngineError::Unavailable(reason) => reason,
                other => other.to_string(),
            };
            return Ok(RawAnalysis::Unavailable(reason));
        }

        // The engine lives outside the slot while it searches: if this future
        // is dropped mid-search the handle is dropped (and killed) with it and
        // the slot already reads `Failed`.
        let mut engine = match std::mem::replace(&mut *slot, Slot::Failed) {
            Slot::Running(engine) => engine,
            other => {
                *slot = other;
                return Ok(RawAnalysis::Unavailable("Engine not running".into()));
            }
        };

        let deadline = limit.hard_timeout(self.settings.grace);
        let outcome = tokio::time::timeout(deadline, engine.search(fen, limit, lines)).await;
        match outcome {
            Ok(Ok(found)) => {
                *slot = Slot::Running(engine);
                Ok(RawAnalysis::Lines(found))
            }
            Ok(Err(e)) => {
                error!(fen, error = %e, "Engine crashed during analysis");
                drop(engine);
                Err(match e {
                    EngineError::Died(_) => e,
                    other => EngineError::Died(other.to_string()),
                })
            }
            Err(_) => {
                let ms = deadline.as_millis() as u64;
                warn!(fen, timeout_ms = ms, "Engine search timed out, killing it");
                drop(engine);
                Err(EngineError::Timeout(ms))
            }
        }
    }

    /// Quit the engine if it is running. Idempotent.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Slot::Running(mut engine) = std::mem::replace(&mut *slot, Slot::Stopped) {
            engine.quit().await;
            info!(engine = %self.launcher.describe(), "Engine stopped");
        }
    }
}

// ---- UCI info parsing ----

fn token_after<'a>(parts: &[&'a str], key: &str) -> Option<&'a str> {
    parts
        .iter()
        .position(|p| *p == key)
        .and_then(|i| parts.get(i + 1).copied())
}

/// Parse an `info ... pv ...` line into a ranked PV line
fn parse_info_line(line: &str) -> Option<PvLine> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let pv = parse_pv(&parts);
    if pv.is_empty() {
        return None;
    }

    let rank = token_after(&parts, "multipv")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let score_at = parts.iter().position(|p| *p == "score")?;
    let kind = parts.get(score_at + 1)?;
    let value: i32 = parts.get(score_at + 2)?.parse().ok()?;
    let (cp, mate) = match *kind {
        "cp" => (Some(value), None),
        "mate" => (None, Some(value)),
        _ => return None,
    };

    Some(PvLine { rank, pv, cp, mate })
}

/// PV runs from `pv` to the end of the line or the next keyword
fn parse_pv(parts: &[&str]) -> Vec<String> {
    let Some(start) = parts.iter().position(|p| *p == "pv") else {
        return Vec::new();
    };
    parts[start + 1..]
        .iter()
        .take_while(|p| !p.starts_with("bmc") && **p != "string")
        .map(|p| p.to_string())
        .collect()
}
