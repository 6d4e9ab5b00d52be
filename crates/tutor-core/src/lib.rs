pub mod analysis;
pub mod board;
pub mod engine;
pub mod error;
pub mod session;
pub mod tutor;

pub use analysis::{Analysis, Score, Suggestion};
pub use board::{DrawRules, GameBoard, GameStatus, MoveRecord, PromotionPiece, Side};
pub use engine::{
    AnalysisSettings, EngineLauncher, EngineManager, EngineOptions, EngineState, PvLine,
    RawAnalysis, SearchLimit, StockfishLauncher, UciEngine,
};
pub use error::{EngineError, RulesError, TutorError};
pub use session::{MoveOutcome, Session, SessionConfig, SessionView, TutorReply, UndoOutcome};
pub use tutor::{
    ChatCompletionsClient, ChatMessage, ChatRole, ChatTurn, CompletionService, LlmSettings,
    Transcript, Tutor,
};
