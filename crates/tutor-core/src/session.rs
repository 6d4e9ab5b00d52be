//! A single game session: board, transcript and latest analysis, with the
//! shared engine and the tutor injected.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::analysis::{normalize, Analysis};
use crate::board::{DrawRules, GameBoard, GameStatus, MoveRecord, PromotionPiece};
use crate::engine::{EngineManager, RawAnalysis};
use crate::error::{EngineError, RulesError};
use crate::tutor::{system_prompt, ChatTurn, Transcript, Tutor};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub draw_rules: DrawRules,
    /// Run the engine right after every successful move
    pub analyze_on_move: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            draw_rules: DrawRules::default(),
            analyze_on_move: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub record: MoveRecord,
    pub fen: String,
    pub status: GameStatus,
    pub status_text: String,
    pub move_list: String,
    /// Present when analysis ran after the move
    pub analysis: Option<Analysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UndoOutcome {
    pub undone: MoveRecord,
    pub fen: String,
    pub status: GameStatus,
    pub status_text: String,
    pub move_list: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TutorReply {
    pub success: bool,
    pub reply: String,
    /// Error kind and message when the tutor was unavailable
    pub error: Option<String>,
    pub transcript: Vec<ChatTurn>,
}

/// Everything a presentation layer needs to draw the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub fen: String,
    pub status: GameStatus,
    pub status_text: String,
    pub moves: Vec<MoveRecord>,
    pub move_list: String,
    pub analysis: Option<Analysis>,
    pub transcript: Vec<ChatTurn>,
    pub system_prompt: Option<String>,
}

pub struct Session {
    board: GameBoard,
    transcript: Transcript,
    analysis: Option<Analysis>,
    system_prompt: Option<String>,
    engine: Option<Arc<EngineManager>>,
    tutor: Tutor,
    config: SessionConfig,
}

impl Session {
    pub fn new(engine: Option<Arc<EngineManager>>, tutor: Tutor, config: SessionConfig) -> Self {
        Self {
            board: GameBoard::new(config.draw_rules),
            transcript: Transcript::default(),
            analysis: None,
            system_prompt: None,
            engine,
            tutor,
            config,
        }
    }

    pub fn board(&self) -> &GameBoard {
        &self.board
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Cached analysis, only if it still matches the current position
    pub fn analysis(&self) -> Option<&Analysis> {
        let fen = self.board.fen();
        self.analysis.as_ref().filter(|a| a.is_for(&fen))
    }

    pub fn status(&self) -> GameStatus {
        self.board.status()
    }

    /// Back to the starting position. The chat transcript is kept.
    pub fn new_game(&mut self) -> SessionView {
        self.board.reset();
        self.analysis = None;
        self.snapshot()
    }

    /// Apply a move. Analysis afterwards is best-effort and cannot undo or
    /// fail the move.
    pub async fn apply_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> Result<MoveOutcome, RulesError> {
        let record = self.board.play(from, to, promotion)?.clone();
        self.analysis = None;
        debug!(san = %record.san, fen = %record.fen, "Move applied");

        let analysis = if self.config.analyze_on_move {
            Some(self.refresh_analysis().await)
        } else {
            None
        };

        let status = self.board.status();
        Ok(MoveOutcome {
            record,
            fen: self.board.fen(),
            status,
            status_text: status.describe(),
            move_list: self.board.move_list(),
            analysis,
        })
    }

    pub fn undo(&mut self) -> Result<UndoOutcome, RulesError> {
        let undone = self.board.undo()?;
        self.analysis = None;

        let status = self.board.status();
        Ok(UndoOutcome {
            undone,
            fen: self.board.fen(),
            status,
            status_text: status.describe(),
            move_list: self.board.move_list(),
        })
    }

    /// Latest analysis for the current position. Recomputed if missing, stale
    /// or degraded, so a recovered engine is picked up on the next call.
    pub async fn get_analysis(&mut self) -> Analysis {
        match self.analysis() {
            Some(current) if !matches!(current, Analysis::Unavailable { .. }) => current.clone(),
            _ => self.refresh_analysis().await,
        }
    }

    async fn refresh_analysis(&mut self) -> Analysis {
        let fen = self.board.fen();

        let analysis = if self.board.status().is_game_over() {
            Analysis::NoAnalysis { fen }
        } else if let Some(engine) = &self.engine {
            let settings = *engine.settings();
            match engine.analyze(&fen, settings.limit, settings.multipv).await {
                Ok(RawAnalysis::Lines(lines)) => {
                    normalize(&lines, self.board.position(), settings.pv_plies)
                }
                Ok(RawAnalysis::Unavailable(reason)) => {
                    Analysis::unavailable(fen, &EngineError::Unavailable(reason))
                }
                Err(e) => {
                    warn!(error = %e, "Analysis degraded");
                    Analysis::unavailable(fen, &e)
                }
            }
        } else {
            Analysis::unavailable(fen, &EngineError::Unavailable("Engine disabled".into()))
        };

        self.analysis = Some(analysis.clone());
        analysis
    }

    /// One chat turn with the tutor. Always returns a reply; on failure the
    /// reply is the synthetic apology that was appended to the transcript.
    pub async fn ask_tutor(&mut self, message: &str) -> TutorReply {
        let analysis = self.get_analysis().await;
        let prompt = system_prompt(&self.board, Some(&analysis));
        self.system_prompt = Some(prompt.clone());

        let result = self.tutor.ask(&mut self.transcript, &prompt, message).await;
        let transcript = self.transcript.turns().to_vec();

        match result {
            Ok(reply) => TutorReply {
                success: true,
                reply,
                error: None,
                transcript,
            },
            Err(e) => TutorReply {
                success: false,
                reply: transcript
                    .last()
                    .map(|t| t.content.clone())
                    .unwrap_or_default(),
                error: Some(format!("{}: {e}", e.kind())),
                transcript,
            },
        }
    }

    pub fn snapshot(&self) -> SessionView {
        let status = self.board.status();
        SessionView {
            fen: self.board.fen(),
            status,
            status_text: status.describe(),
            moves: self.board.records().to_vec(),
            move_list: self.board.move_list(),
            analysis: self.analysis().cloned(),
            transcript: self.transcript.turns().to_vec(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}
