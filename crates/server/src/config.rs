use std::env;
use std::str::FromStr;
use std::time::Duration;

use tutor_core::{AnalysisSettings, DrawRules, EngineOptions, LlmSettings, SearchLimit};

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Path to the Stockfish binary
    pub stockfish_path: String,
    /// When false, sessions run without an engine and analysis reads "unavailable"
    pub engine_enabled: bool,
    pub engine_options: EngineOptions,
    pub analysis: AnalysisSettings,

    pub draw_rules: DrawRules,
    pub llm: LlmSettings,

    /// Sessions idle this long are dropped when new ones are created
    pub session_idle_timeout: Duration,
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = AnalysisSettings::default();
        let limit = match parsed::<u32>("ANALYSIS_DEPTH") {
            Some(depth) if depth > 0 => SearchLimit::Depth(depth),
            _ => SearchLimit::MoveTime(Duration::from_millis(
                parsed("ANALYSIS_TIME_MS").unwrap_or(300),
            )),
        };
        let pv_plies = match parsed::<usize>("ANALYSIS_PV_PLIES") {
            Some(0) => None, // unbounded
            Some(n) => Some(n),
            None => defaults.pv_plies,
        };
        let analysis = AnalysisSettings {
            limit,
            multipv: parsed("ANALYSIS_MULTIPV").unwrap_or(defaults.multipv).max(1),
            pv_plies,
            grace: defaults.grace,
        };

        let llm_defaults = LlmSettings::default();
        let llm = LlmSettings {
            base_url: env::var("LLM_BASE_URL").unwrap_or(llm_defaults.base_url),
            api_key: env::var("GROQ_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: env::var("LLM_MODEL").unwrap_or(llm_defaults.model),
            temperature: parsed("LLM_TEMPERATURE").unwrap_or(llm_defaults.temperature),
            max_tokens: parsed("LLM_MAX_TOKENS").unwrap_or(llm_defaults.max_tokens),
            timeout: parsed("LLM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(llm_defaults.timeout),
        };

        let rule_defaults = DrawRules::default();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed("PORT").unwrap_or(8000),
            stockfish_path: env::var("STOCKFISH_PATH").unwrap_or_else(|_| "stockfish".to_string()),
            engine_enabled: flag("ENGINE_ENABLED", true),
            engine_options: EngineOptions {
                threads: parsed("ENGINE_THREADS").unwrap_or(1),
                hash_mb: parsed("ENGINE_HASH_MB").unwrap_or(64),
            },
            analysis,
            draw_rules: DrawRules {
                repetitions: parsed("DRAW_REPETITIONS").unwrap_or(rule_defaults.repetitions),
                halfmove_limit: parsed("DRAW_HALFMOVE_LIMIT").unwrap_or(rule_defaults.halfmove_limit),
            },
            llm,
            session_idle_timeout: Duration::from_secs(parsed("SESSION_IDLE_SECS").unwrap_or(3600)),
        }
    }
}
