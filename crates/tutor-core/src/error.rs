//! Error taxonomy for the tutor core

use thiserror::Error;

/// Rules-level failures. These are ordinary results: the board is never
/// touched when one of them is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid square: {0:?}")]
    InvalidSquare(String),

    #[error("Invalid promotion piece: {0:?}")]
    InvalidPromotion(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("No moves to undo")]
    EmptyHistory,

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),
}

impl RulesError {
    pub fn kind(&self) -> &'static str {
        match self {
            RulesError::InvalidSquare(_) => "InvalidSquare",
            RulesError::InvalidPromotion(_) => "InvalidPromotion",
            RulesError::IllegalMove(_) => "IllegalMove",
            RulesError::EmptyHistory => "EmptyHistory",
            RulesError::InvalidFen(_) => "InvalidFen",
        }
    }
}

/// Engine subprocess failures. Never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine died: {0}")]
    Died(String),

    #[error("Analysis timed out after {0} ms")]
    Timeout(u64),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Unavailable(_) => "EngineUnavailable",
            EngineError::Died(_) => "EngineDied",
            EngineError::Timeout(_) => "AnalysisTimeout",
        }
    }
}

/// LLM completion failures (network, HTTP status, malformed body, missing key)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TutorError {
    #[error("Tutor unavailable: {0}")]
    Unavailable(String),
}

impl TutorError {
    pub fn kind(&self) -> &'static str {
        match self {
            TutorError::Unavailable(_) => "TutorUnavailable",
        }
    }
}
