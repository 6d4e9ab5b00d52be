//! Board state: one position, its move log, and rules-level queries.
//!
//! All legality, SAN and FEN work is delegated to shakmaty. This module only
//! decides which candidate move to build from user input and keeps the
//! snapshots needed for undo and repetition detection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Rank, Role, Square};

use crate::error::RulesError;

/// Side to move / side that moved, as plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("White"),
            Side::Black => f.write_str("Black"),
        }
    }
}

/// Explicit promotion choice. Under-promotion is never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPiece {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl PromotionPiece {
    fn role(self) -> Role {
        match self {
            PromotionPiece::Queen => Role::Queen,
            PromotionPiece::Rook => Role::Rook,
            PromotionPiece::Bishop => Role::Bishop,
            PromotionPiece::Knight => Role::Knight,
        }
    }
}

impl FromStr for PromotionPiece {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "q" | "queen" => Ok(PromotionPiece::Queen),
            "r" | "rook" => Ok(PromotionPiece::Rook),
            "b" | "bishop" => Ok(PromotionPiece::Bishop),
            "n" | "knight" => Ok(PromotionPiece::Knight),
            _ => Err(RulesError::InvalidPromotion(s.to_string())),
        }
    }
}

/// One applied move
#[derive(Debug, Clone, Serialize)]
pub struct MoveRecord {
    /// Coordinate notation, e.g. "e2e4" or "e7e8q"
    pub uci: String,
    /// SAN including the check/mate suffix
    pub san: String,
    /// Side that made the move
    pub side: Side,
    /// FEN of the resulting position
    pub fen: String,
    #[serde(skip)]
    position: Chess,
}

impl MoveRecord {
    /// Position after this move
    pub fn position(&self) -> &Chess {
        &self.position
    }
}

/// Thresholds for the draw rules whose exact form varies between hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRules {
    /// Occurrences of the same position that end the game (3 or 5)
    pub repetitions: u32,
    /// Halfmove clock value that ends the game (100 = fifty-move, 150 = seventy-five-move)
    pub halfmove_limit: u32,
}

impl Default for DrawRules {
    fn default() -> Self {
        Self {
            repetitions: 3,
            halfmove_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GameStatus {
    InProgress { side_to_move: Side, in_check: bool },
    Checkmate { winner: Side },
    Stalemate,
    DrawInsufficientMaterial,
    DrawFiftyMove,
    DrawRepetition,
}

impl GameStatus {
    pub fn is_game_over(&self) -> bool {
        !matches!(self, GameStatus::InProgress { .. })
    }

    /// Human-readable status line
    pub fn describe(&self) -> String {
        match self {
            GameStatus::InProgress {
                side_to_move,
                in_check: true,
            } => format!("{side_to_move} to move (in check)"),
            GameStatus::InProgress { side_to_move, .. } => format!("{side_to_move} to move"),
            GameStatus::Checkmate { winner } => format!("Checkmate! {winner} wins."),
            GameStatus::Stalemate => "Draw by stalemate.".to_string(),
            GameStatus::DrawInsufficientMaterial => "Draw due to insufficient material.".to_string(),
            GameStatus::DrawFiftyMove => "Draw by the move rule.".to_string(),
            GameStatus::DrawRepetition => "Draw by repetition.".to_string(),
        }
    }
}

/// Canonical FEN of a position
pub fn fen_of(position: &Chess) -> String {
    Fen::from_position(position.clone(), EnPassantMode::Legal).to_string()
}

/// Placement, side, castling and en passant fields only
fn repetition_key(position: &Chess) -> String {
    fen_of(position)
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Play a legal move on a copy of `position`, returning the new position and
/// the move's SAN with its `+`/`#` suffix.
pub(crate) fn play_with_san(position: &Chess, legal: &Move) -> (Chess, String) {
    let san = San::from_move(position, legal);
    let mut next = position.clone();
    next.play_unchecked(legal);

    let suffix = if next.is_checkmate() {
        "#"
    } else if next.is_check() {
        "+"
    } else {
        ""
    };
    (next, format!("{san}{suffix}"))
}

fn parse_square(text: &str) -> Result<Square, RulesError> {
    let trimmed = text.trim();
    if trimmed.len() != 2 {
        return Err(RulesError::InvalidSquare(text.to_string()));
    }
    trimmed
        .to_ascii_lowercase()
        .parse::<Square>()
        .map_err(|_| RulesError::InvalidSquare(text.to_string()))
}

/// Validate and apply a move given as coordinate squares.
///
/// A pawn reaching the last rank without an explicit promotion promotes to a
/// queen. Returns the resulting position and its record; `position` is left
/// untouched either way.
pub fn apply_move(
    position: &Chess,
    from: &str,
    to: &str,
    promotion: Option<PromotionPiece>,
) -> Result<(Chess, MoveRecord), RulesError> {
    let from_sq = parse_square(from)?;
    let to_sq = parse_square(to)?;

    let is_pawn = position
        .board()
        .piece_at(from_sq)
        .map(|p| p.role == Role::Pawn)
        .unwrap_or(false);
    let reaches_last_rank = matches!(to_sq.rank(), Rank::First | Rank::Eighth);

    let promotion = match promotion {
        Some(piece) => Some(piece.role()),
        None if is_pawn && reaches_last_rank => Some(Role::Queen),
        None => None,
    };

    let candidate = Uci::Normal {
        from: from_sq,
        to: to_sq,
        promotion,
    };
    let legal = candidate
        .to_move(position)
        .map_err(|_| RulesError::IllegalMove(candidate.to_string()))?;

    let (next, san) = play_with_san(position, &legal);

    let record = MoveRecord {
        uci: legal.to_uci(CastlingMode::Standard).to_string(),
        san,
        side: Side::from(position.turn()),
        fen: fen_of(&next),
        position: next.clone(),
    };

    Ok((next, record))
}

/// Mutable game state: starting snapshot plus an append-only move log.
#[derive(Debug, Clone)]
pub struct GameBoard {
    initial: Chess,
    records: Vec<MoveRecord>,
    rules: DrawRules,
}

impl Default for GameBoard {
    fn default() -> Self {
        Self::new(DrawRules::default())
    }
}

impl GameBoard {
    pub fn new(rules: DrawRules) -> Self {
        Self {
            initial: Chess::default(),
            records: Vec::new(),
            rules,
        }
    }

    /// Start from an arbitrary legal position instead of the initial one
    pub fn from_fen(fen: &str, rules: DrawRules) -> Result<Self, RulesError> {
        let initial: Chess = fen
            .trim()
            .parse::<Fen>()
            .map_err(|e| RulesError::InvalidFen(format!("{fen}: {e}")))?
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidFen(format!("{fen}: {e}")))?;
        Ok(Self {
            initial,
            records: Vec::new(),
            rules,
        })
    }

    pub fn position(&self) -> &Chess {
        self.records
            .last()
            .map(MoveRecord::position)
            .unwrap_or(&self.initial)
    }

    pub fn fen(&self) -> String {
        fen_of(self.position())
    }

    pub fn records(&self) -> &[MoveRecord] {
        &self.records
    }

    pub fn rules(&self) -> DrawRules {
        self.rules
    }

    pub fn side_to_move(&self) -> Side {
        Side::from(self.position().turn())
    }

    /// Apply a move to the current position. All-or-nothing.
    pub fn play(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> Result<&MoveRecord, RulesError> {
        let (_, record) = apply_move(self.position(), from, to, promotion)?;
        self.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    pub fn push(&mut self, record: MoveRecord) {
        self.records.push(record);
    }

    /// Drop the last move; the prior snapshot becomes current again.
    pub fn undo(&mut self) -> Result<MoveRecord, RulesError> {
        self.records.pop().ok_or(RulesError::EmptyHistory)
    }

    pub fn reset(&mut self) {
        self.initial = Chess::default();
        self.records.clear();
    }

    pub fn status(&self) -> GameStatus {
        let pos = self.position();

        if pos.is_checkmate() {
            return GameStatus::Checkmate {
                winner: Side::from(pos.turn()).opponent(),
            };
        }
        if pos.is_stalemate() {
            return GameStatus::Stalemate;
        }
        if pos.is_insufficient_material() {
            return GameStatus::DrawInsufficientMaterial;
        }
        if pos.halfmoves() >= self.rules.halfmove_limit {
            return GameStatus::DrawFiftyMove;
        }
        if self.repetition_count() >= self.rules.repetitions {
            return GameStatus::DrawRepetition;
        }

        GameStatus::InProgress {
            side_to_move: Side::from(pos.turn()),
            in_check: pos.is_check(),
        }
    }

    /// How often the current position has occurred, including now
    pub fn repetition_count(&self) -> u32 {
        let current = repetition_key(self.position());
        std::iter::once(&self.initial)
            .chain(self.records.iter().map(MoveRecord::position))
            .filter(|p| repetition_key(p) == current)
            .count() as u32
    }

    /// Numbered SAN history, e.g. "1. e4 e5 2. Nf3"
    pub fn move_list(&self) -> String {
        let mut parts = Vec::with_capacity(self.records.len() + self.records.len() / 2);
        for (ply, record) in self.records.iter().enumerate() {
            if ply % 2 == 0 {
                parts.push(format!("{}.", ply / 2 + 1));
            }
            parts.push(record.san.clone());
        }
        parts.join(" ")
    }
}
