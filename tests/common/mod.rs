//! Shared fakes for integration tests: a scripted UCI engine, a scripted
//! completion service and an in-process HTTP server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Position};
use tutor_core::{
    AnalysisSettings, ChatMessage, CompletionService, EngineError, EngineLauncher, EngineManager,
    PvLine, SearchLimit, Session, SessionConfig, Tutor, TutorError, UciEngine,
};

/// Plies the fake engine puts in every line; longer than the session keeps
pub const FAKE_PV_PLIES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Answer,
    Crash,
    Hang,
}

/// What the fake engine does, shared between the test and every launched engine
#[derive(Default)]
pub struct EngineScript {
    /// Consumed one per search; `Answer` once empty
    behaviors: Mutex<VecDeque<Behavior>>,
    refuse_launch: AtomicBool,
    launches: AtomicU32,
    searches: AtomicU32,
    /// Engines currently alive (launched and not yet dropped)
    alive: AtomicI32,
}

impl EngineScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn then(&self, behavior: Behavior) -> &Self {
        self.behaviors.lock().unwrap().push_back(behavior);
        self
    }

    pub fn refuse_launch(&self, refuse: bool) {
        self.refuse_launch.store(refuse, Ordering::SeqCst);
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> u32 {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn alive(&self) -> i32 {
        self.alive.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Behavior::Answer)
    }
}

pub struct FakeLauncher {
    script: Arc<EngineScript>,
}

impl FakeLauncher {
    pub fn new(script: Arc<EngineScript>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn UciEngine>, EngineError> {
        if self.script.refuse_launch.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("fake engine not installed".into()));
        }
        self.script.launches.fetch_add(1, Ordering::SeqCst);
        self.script.alive.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            script: self.script.clone(),
        }))
    }

    fn describe(&self) -> String {
        "fake-engine".to_string()
    }
}

struct FakeEngine {
    script: Arc<EngineScript>,
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.script.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UciEngine for FakeEngine {
    async fn search(
        &mut self,
        fen: &str,
        _limit: SearchLimit,
        multipv: u32,
    ) -> Result<Vec<PvLine>, EngineError> {
        self.script.searches.fetch_add(1, Ordering::SeqCst);
        match self.script.next_behavior() {
            Behavior::Answer => Ok(scripted_lines(fen, multipv)),
            Behavior::Crash => Err(EngineError::Died("fake engine exited".into())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn quit(&mut self) {}
}

/// Up to `multipv` lines, each starting with a different legal move and then
/// following the first legal reply, scored 40, 30, 20... for the side to move.
pub fn scripted_lines(fen: &str, multipv: u32) -> Vec<PvLine> {
    let Ok(position) = fen
        .parse::<Fen>()
        .map_err(|_| ())
        .and_then(|f| f.into_position::<Chess>(CastlingMode::Standard).map_err(|_| ()))
    else {
        return Vec::new();
    };

    position
        .legal_moves()
        .iter()
        .take(multipv as usize)
        .enumerate()
        .map(|(i, first)| {
            let mut scratch = position.clone();
            let mut pv = Vec::new();
            let mut next = Some(first.clone());
            while let Some(m) = next {
                pv.push(m.to_uci(CastlingMode::Standard).to_string());
                scratch.play_unchecked(&m);
                if pv.len() >= FAKE_PV_PLIES {
                    break;
                }
                next = scratch.legal_moves().first().cloned();
            }
            PvLine {
                rank: i as u32 + 1,
                pv,
                cp: Some(40 - 10 * i as i32),
                mate: None,
            }
        })
        .collect()
}

pub fn test_settings() -> AnalysisSettings {
    AnalysisSettings {
        limit: SearchLimit::MoveTime(Duration::from_millis(50)),
        multipv: 3,
        pv_plies: Some(4),
        grace: Duration::from_millis(150),
    }
}

pub fn fake_engine(script: &Arc<EngineScript>) -> Arc<EngineManager> {
    Arc::new(EngineManager::new(
        Box::new(FakeLauncher::new(script.clone())),
        test_settings(),
    ))
}

/// Completion service that answers "Reply #n" and records every request
#[derive(Default)]
pub struct FakeCompletions {
    failing: AtomicBool,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeCompletions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// System prompt sent with request `i`
    pub fn system_prompt(&self, i: usize) -> String {
        self.requests()[i][0].content.clone()
    }
}

#[async_trait]
impl CompletionService for FakeCompletions {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TutorError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            requests.len()
        };
        if self.failing.load(Ordering::SeqCst) {
            return Err(TutorError::Unavailable("HTTP 503".into()));
        }
        Ok(format!("Reply #{n}"))
    }
}

pub fn session_with(
    engine: Option<Arc<EngineManager>>,
    completions: &Arc<FakeCompletions>,
) -> Session {
    Session::new(
        engine,
        Tutor::new(completions.clone()),
        SessionConfig::default(),
    )
}

/// Build a reqwest client for tests.
pub fn client() -> Client {
    Client::new()
}

/// Serve the app on an ephemeral local port and return its base URL.
pub async fn spawn_app(
    engine: Option<Arc<EngineManager>>,
    completions: &Arc<FakeCompletions>,
) -> String {
    let store = Arc::new(server::store::SessionStore::new(
        engine,
        Tutor::new(completions.clone()),
        SessionConfig::default(),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, server::router(store))
            .await
            .expect("Test server error");
    });
    format!("http://{addr}")
}
