//! Tutor exchange: prompt construction, transcript upkeep, and the
//! chat-completions client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color, File, Position, Rank, Role, Square};
use tracing::{debug, warn};

use crate::analysis::Analysis;
use crate::board::GameBoard;
use crate::error::TutorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Wire message for the completion service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// One transcript entry
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Append-only chat history; every user turn is followed by exactly one
/// assistant turn.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.turns.push(ChatTurn {
            role,
            content: content.into(),
            at: Utc::now(),
        });
    }

    fn messages(&self) -> impl Iterator<Item = ChatMessage> + '_ {
        self.turns.iter().map(|t| ChatMessage {
            role: t.role,
            content: t.content.clone(),
        })
    }
}

/// A hosted LLM that turns role-tagged messages into one assistant reply
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TutorError>;
}

// ---- Prompt ----

fn glyph(position: &Chess, square: Square) -> char {
    match position.board().piece_at(square) {
        Some(piece) => {
            let c = match piece.role {
                Role::Pawn => 'p',
                Role::Knight => 'n',
                Role::Bishop => 'b',
                Role::Rook => 'r',
                Role::Queen => 'q',
                Role::King => 'k',
            };
            if piece.color == Color::White {
                c.to_ascii_uppercase()
            } else {
                c
            }
        }
        None => '.',
    }
}

const BOARD_LEGEND: &str = "Legend: K = White king, Q = White queen, R = White rook, B = White bishop, \
N = White knight, P = White pawn; k = Black king, q = Black queen, r = Black rook, b = Black bishop, \
n = Black knight, p = Black pawn; . = empty square.";

/// Fixed-width grid, rank 8 at the top, with file headers and a glyph legend
pub fn render_board(position: &Chess) -> String {
    let header = "    a b c d e f g h";
    let mut out = String::with_capacity(400);
    out.push_str(header);
    out.push('\n');

    for rank in (0..8u32).rev() {
        out.push_str(&format!(" {}  ", rank + 1));
        let row: Vec<String> = (0..8u32)
            .map(|file| {
                let sq = Square::from_coords(File::new(file), Rank::new(rank));
                glyph(position, sq).to_string()
            })
            .collect();
        out.push_str(&row.join(" "));
        out.push_str(&format!("  {}\n", rank + 1));
    }

    out.push_str(header);
    out.push('\n');
    out.push_str(BOARD_LEGEND);
    out
}

/// Build the system prompt from the live board and analysis. Called fresh on
/// every turn.
pub fn system_prompt(board: &GameBoard, analysis: Option<&Analysis>) -> String {
    let fen = board.fen();
    let history = board.move_list();
    let history = if history.is_empty() {
        "No moves yet.".to_string()
    } else {
        history
    };
    let status = board.status();

    let engine_section = match analysis {
        Some(a) if a.is_for(&fen) => a.prompt_section(),
        _ => "Engine analysis: unavailable for the current position.\n".to_string(),
    };

    format!(
        "You are a helpful and friendly chess tutor observing a game.\n\
Your goal is to help the user understand the current position resulting from the moves so far. \
Explain threats, opportunities and strategic ideas for the side to move. \
Avoid just giving the best move. Keep explanations concise for a beginner or intermediate player, \
under 200 words unless the user asks for more. \
Do not talk about the engine or its scores unless the user asks directly.\n\n\
### Current Position (FEN)\n{fen}\n\n\
### Move History\n{history}\n\n\
### Current Game State\n- {side} to move\n- Status: {status}\n\n\
### Board\n{grid}\n\n\
### Engine Analysis\n{engine_section}\n\
Based on this context and the user's question, give thoughtful chess analysis: key positional \
elements, threats, plans, and the reasoning behind good moves. Do not just repeat engine lines.",
        side = board.side_to_move(),
        status = status.describe(),
        grid = render_board(board.position()),
    )
}

// ---- Exchange ----

/// Relays chat turns to a completion service
#[derive(Clone)]
pub struct Tutor {
    service: Arc<dyn CompletionService>,
}

impl Tutor {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self { service }
    }

    /// Send `message` with the full prior transcript under `system_prompt`.
    ///
    /// The transcript gains exactly two turns either way: the user message and
    /// the reply, which is a synthetic apology when the service fails.
    pub async fn ask(
        &self,
        transcript: &mut Transcript,
        system_prompt: &str,
        message: &str,
    ) -> Result<String, TutorError> {
        let mut messages = Vec::with_capacity(transcript.len() + 2);
        messages.push(ChatMessage {
            role: ChatRole::System,
            content: system_prompt.to_string(),
        });
        messages.extend(transcript.messages());
        messages.push(ChatMessage {
            role: ChatRole::User,
            content: message.to_string(),
        });

        let result = self.service.complete(&messages).await;
        transcript.push(ChatRole::User, message);

        match result {
            Ok(reply) => {
                transcript.push(ChatRole::Assistant, reply.clone());
                Ok(reply)
            }
            Err(e) => {
                warn!(error = %e, "Tutor request failed");
                transcript.push(
                    ChatRole::Assistant,
                    format!("Sorry, the tutor is unavailable right now ({e}). Please try again."),
                );
                Err(e)
            }
        }
    }
}

// ---- OpenAI-compatible HTTP client ----

#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// e.g. https://api.groq.com/openai/v1
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

pub struct ChatCompletionsClient {
    client: Client,
    settings: LlmSettings,
}

impl ChatCompletionsClient {
    pub fn new(settings: LlmSettings) -> Result<Self, TutorError> {
        let client = Client::builder()
            .user_agent("ChessTutor/1.0")
            .timeout(settings.timeout)
            .build()
            .map_err(|e| TutorError::Unavailable(format!("HTTP client error: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionService for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TutorError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| TutorError::Unavailable("No API key configured".into()))?;

        let body = CompletionRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        debug!(model = %self.settings.model, messages = messages.len(), "LLM request");

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Unavailable(format!("Request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(TutorError::Unavailable(format!("HTTP {status}: {detail}")));
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| TutorError::Unavailable(format!("Response parse error: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| TutorError::Unavailable("Empty completion".into()))
    }
}
