//! Analysis formatting: raw engine lines in, ranked White-relative suggestions out.
//! Pure functions only; no engine or session dependencies.

use serde::Serialize;
use shakmaty::uci::Uci;
use shakmaty::{Chess, Color, Position};

use crate::board::{fen_of, play_with_san};
use crate::engine::PvLine;
use crate::error::EngineError;

/// Evaluation from White's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Centipawns(i32),
    /// Positive = White mates, negative = Black mates
    Mate(i32),
}

impl Score {
    /// Convert an engine score (relative to the side to move) to White's view
    pub fn from_engine(cp: Option<i32>, mate: Option<i32>, turn: Color) -> Option<Score> {
        let to_white = |v: i32| {
            if turn == Color::White {
                v
            } else {
                v.saturating_neg()
            }
        };
        match (mate, cp) {
            (Some(m), _) => Some(Score::Mate(to_white(m))),
            (None, Some(c)) => Some(Score::Centipawns(to_white(c))),
            (None, None) => None,
        }
    }

    /// `+1.23` / `-0.50` for centipawns, `Mate in N` for mates
    pub fn display(&self) -> String {
        match self {
            Score::Centipawns(cp) => format!("{:+.2}", *cp as f64 / 100.0),
            Score::Mate(m) => format!("Mate in {}", m.unsigned_abs()),
        }
    }
}

/// One ranked continuation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub rank: u32,
    pub score: Score,
    pub score_text: String,
    /// Principal variation in SAN, replayed from the analysed position
    pub san: Vec<String>,
    /// Same line in UCI notation
    pub uci: Vec<String>,
}

/// Latest analysis of one exact position
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    Lines { fen: String, lines: Vec<Suggestion> },
    /// The engine answered but no usable line survived
    NoAnalysis { fen: String },
    /// Engine unavailable, crashed or timed out
    Unavailable {
        fen: String,
        kind: String,
        reason: String,
    },
}

impl Analysis {
    pub fn unavailable(fen: impl Into<String>, error: &EngineError) -> Self {
        Analysis::Unavailable {
            fen: fen.into(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }

    pub fn fen(&self) -> &str {
        match self {
            Analysis::Lines { fen, .. }
            | Analysis::NoAnalysis { fen }
            | Analysis::Unavailable { fen, .. } => fen,
        }
    }

    /// True only if this analysis was computed for exactly `fen`
    pub fn is_for(&self, fen: &str) -> bool {
        self.fen() == fen
    }

    pub fn lines(&self) -> &[Suggestion] {
        match self {
            Analysis::Lines { lines, .. } => lines,
            _ => &[],
        }
    }

    pub fn best_score_text(&self) -> &str {
        match self {
            Analysis::Lines { lines, .. } => lines
                .first()
                .map(|s| s.score_text.as_str())
                .unwrap_or("N/A"),
            Analysis::NoAnalysis { .. } => "No analysis",
            Analysis::Unavailable { .. } => "Engine N/A",
        }
    }

    /// Block of text describing this analysis for the tutor prompt
    pub fn prompt_section(&self) -> String {
        match self {
            Analysis::Lines { lines, .. } => {
                let mut out = format!(
                    "Engine analysis (top {} lines; scores relative to White: + favors White, - favors Black):\n",
                    lines.len()
                );
                out.push_str(&format!("- Best score: {}\n", self.best_score_text()));
                for s in lines {
                    out.push_str(&format!("  {}. {} ({})\n", s.rank, s.san.join(" "), s.score_text));
                }
                out
            }
            Analysis::NoAnalysis { .. } => "Engine analysis: no moves found for this position.\n".to_string(),
            Analysis::Unavailable { reason, .. } => {
                format!("Engine analysis: unavailable ({reason}). Reason about the position without it.\n")
            }
        }
    }
}

/// Replay a UCI line on a scratch copy of `position`, stopping at the first
/// move that does not parse or is not legal there.
fn replay_line(position: &Chess, pv: &[String], max_plies: Option<usize>) -> (Vec<String>, Vec<String>) {
    let limit = max_plies.unwrap_or(usize::MAX);
    let mut scratch = position.clone();
    let mut san = Vec::new();
    let mut uci = Vec::new();

    for text in pv.iter().take(limit) {
        let Ok(parsed) = text.parse::<Uci>() else {
            break;
        };
        let Ok(legal) = parsed.to_move(&scratch) else {
            break;
        };
        let (next, notation) = play_with_san(&scratch, &legal);
        san.push(notation);
        uci.push(text.clone());
        scratch = next;
    }

    (san, uci)
}

/// Normalize raw engine lines for `position`.
///
/// Scores become White-relative, PVs become SAN truncated to `pv_plies`, and
/// lines whose first move is illegal are dropped. An empty result is reported
/// as `Analysis::NoAnalysis`.
pub fn normalize(raw: &[PvLine], position: &Chess, pv_plies: Option<usize>) -> Analysis {
    let fen = fen_of(position);
    let turn = position.turn();

    let mut ranked: Vec<&PvLine> = raw.iter().collect();
    ranked.sort_by_key(|l| l.rank);

    let lines: Vec<Suggestion> = ranked
        .into_iter()
        .filter_map(|line| {
            let score = Score::from_engine(line.cp, line.mate, turn)?;
            let (san, uci) = replay_line(position, &line.pv, pv_plies);
            if san.is_empty() {
                return None;
            }
            Some((score, san, uci))
        })
        .enumerate()
        .map(|(i, (score, san, uci))| Suggestion {
            rank: i as u32 + 1,
            score,
            score_text: score.display(),
            san,
            uci,
        })
        .collect();

    if lines.is_empty() {
        Analysis::NoAnalysis { fen }
    } else {
        Analysis::Lines { fen, lines }
    }
}
