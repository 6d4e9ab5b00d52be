//! Drives the real `tokio::process` engine path against a scripted UCI stub.
//!
//! The stub answers the handshake, reports two PV lines per `go`, and exits
//! without a `bestmove` on the first `go` while its crash flag file exists.
//! Kept as the only test in this binary so no other test forks while the stub
//! is being written.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess};
use tutor_core::analysis::normalize;
use tutor_core::{
    AnalysisSettings, EngineError, EngineManager, EngineOptions, EngineState, RawAnalysis,
    SearchLimit, StockfishLauncher,
};

const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

fn write_stub(dir: &Path, crash_flag: &Path) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
while read -r cmd; do
  case "$cmd" in
    uci)
      echo "id name uci-stub"
      echo "uciok"
      ;;
    isready)
      echo "readyok"
      ;;
    go*)
      if [ -f "{flag}" ]; then
        rm -f "{flag}"
        exit 0
      fi
      echo "info depth 1 seldepth 1 multipv 1 score cp 20 nodes 10 pv e7e5 g1f3"
      echo "info depth 1 seldepth 1 multipv 2 score cp 5 nodes 10 pv d7d5 e4d5"
      echo "bestmove e7e5"
      ;;
    quit)
      exit 0
      ;;
  esac
done
"#,
        flag = crash_flag.display()
    );
    let path = dir.join("uci-stub.sh");
    std::fs::write(&path, script).expect("write stub");
    let mut perms = std::fs::metadata(&path).expect("stub metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

#[tokio::test]
async fn test_subprocess_crash_then_single_restart() {
    let dir = std::env::temp_dir().join(format!("uci-stub-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let crash_flag = dir.join("crash-next-go");
    std::fs::write(&crash_flag, b"").unwrap();
    let stub = write_stub(&dir, &crash_flag);

    let settings = AnalysisSettings {
        limit: SearchLimit::MoveTime(Duration::from_millis(50)),
        multipv: 2,
        pv_plies: Some(4),
        grace: Duration::from_secs(2),
    };
    let manager = EngineManager::new(
        Box::new(StockfishLauncher::new(&stub, EngineOptions::default())),
        settings,
    );

    manager.start().await.unwrap();
    assert_eq!(manager.state().await, EngineState::Running);

    // The stub exits mid-search: EOF on stdout becomes EngineDied
    let first = manager.analyze(AFTER_E4, settings.limit, settings.multipv).await;
    assert!(matches!(first, Err(EngineError::Died(_))), "got {first:?}");
    assert_eq!(manager.state().await, EngineState::Failed);

    let second = manager
        .analyze(AFTER_E4, settings.limit, settings.multipv)
        .await
        .unwrap();
    assert_eq!(manager.state().await, EngineState::Running);
    assert_eq!(manager.launches(), 2);
    assert_eq!(manager.restarts(), 1);

    let lines = match second {
        RawAnalysis::Lines(lines) => lines,
        other => panic!("expected engine lines, got {other:?}"),
    };
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].rank, 1);
    assert_eq!(lines[0].pv, vec!["e7e5", "g1f3"]);
    assert_eq!(lines[1].cp, Some(5));

    let position: Chess = AFTER_E4
        .parse::<Fen>()
        .unwrap()
        .into_position(CastlingMode::Standard)
        .unwrap();
    let analysis = normalize(&lines, &position, settings.pv_plies);
    assert_eq!(analysis.lines()[0].san, vec!["e5", "Nf3"]);
    assert_eq!(analysis.lines()[0].score_text, "-0.20");
    assert_eq!(analysis.lines()[1].san, vec!["d5", "exd5"]);

    manager.stop().await;
    manager.stop().await;
    assert_eq!(manager.state().await, EngineState::Stopped);

    let _ = std::fs::remove_dir_all(&dir);
}
