//! End-to-end tests against a live browser.
//!
//! These need a Chromium-family browser already running with remote
//! debugging enabled. They are skipped unless TABDRIVER_E2E_CDP_PORT is
//! set, e.g.:
//!
//!   chromium --headless=new --remote-debugging-port=9450 &
//!   TABDRIVER_E2E_CDP_PORT=9450 cargo test --test driver_e2e

use std::time::Duration;

use serial_test::serial;

use tabdriver::driver::{Action, DriverOptions, DriverSession};
use tabdriver::error::DriverError;

fn e2e_port() -> Option<u16> {
    std::env::var("TABDRIVER_E2E_CDP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
}

async fn e2e_session() -> Option<(DriverSession, tempfile::TempDir)> {
    let port = match e2e_port() {
        Some(port) => port,
        None => {
            eprintln!("Skipping e2e test: TABDRIVER_E2E_CDP_PORT not set");
            return None;
        }
    };

    let downloads = tempfile::tempdir().expect("tempdir");
    let session = DriverSession::connect(DriverOptions {
        cdp_port: port,
        browser_ws_url: None,
        settle_delay: Duration::from_millis(500),
        download_dir: downloads.path().to_path_buf(),
    })
    .await
    .expect("browser advertised via TABDRIVER_E2E_CDP_PORT must be reachable");

    Some((session, downloads))
}

fn parse_action(value: serde_json::Value) -> Action {
    serde_json::from_value(value).expect("valid action descriptor")
}

#[tokio::test]
#[serial]
async fn open_resolve_act_close_lifecycle() {
    let Some((session, _downloads)) = e2e_session().await else {
        return;
    };

    // Opened targets appear in the next listing
    let target = session
        .open_target("https://example.com/")
        .await
        .expect("open target");
    let listed = session.list_targets().await.expect("list targets");
    assert!(listed.iter().any(|t| t.id == target.id));

    // Resolution is idempotent while the tab stays open
    let first = session.resolve(&target.id).await.expect("resolve");
    let second = session.resolve(&target.id).await.expect("resolve again");
    assert_eq!(first.target_id(), second.target_id());

    // resize goes over the raw protocol
    session
        .dispatch(
            &target.id,
            &parse_action(serde_json::json!({ "kind": "resize", "width": 1024, "height": 768 })),
        )
        .await
        .expect("resize");

    // evaluate returns the function's value
    let result = session
        .dispatch(
            &target.id,
            &parse_action(serde_json::json!({ "kind": "evaluate", "fn": "() => 1 + 1" })),
        )
        .await
        .expect("evaluate");
    assert_eq!(result, serde_json::json!(2));

    // close removes the target from the listing
    session.close_target(&target.id).await.expect("close");
    let listed = session.list_targets().await.expect("list targets");
    assert!(!listed.iter().any(|t| t.id == target.id));
}

#[tokio::test]
#[serial]
async fn descriptor_validation_happens_before_protocol_traffic() {
    let Some((session, _downloads)) = e2e_session().await else {
        return;
    };

    // Missing ref fails validation even for a target id nothing knows about
    let result = session
        .dispatch("no-such-target", &parse_action(serde_json::json!({ "kind": "click" })))
        .await;
    assert!(matches!(result, Err(DriverError::MissingReference { .. })));

    let result = session
        .dispatch("no-such-target", &parse_action(serde_json::json!({ "kind": "bogus" })))
        .await;
    assert!(matches!(
        result,
        Err(DriverError::UnsupportedAction { kind, .. }) if kind == "bogus"
    ));
}

#[tokio::test]
#[serial]
async fn closed_target_cannot_be_resolved_while_others_are_bound() {
    let Some((session, _downloads)) = e2e_session().await else {
        return;
    };

    let kept = session
        .open_target("https://example.com/")
        .await
        .expect("open kept");
    let doomed = session
        .open_target("https://example.org/")
        .await
        .expect("open doomed");

    // Bind both so no unbound handle is left over
    session.resolve(&kept.id).await.expect("resolve kept");
    session.resolve(&doomed.id).await.expect("resolve doomed");

    session.close_target(&doomed.id).await.expect("close");

    let result = session.resolve(&doomed.id).await;
    assert!(matches!(result, Err(DriverError::ResolutionFailed(_))));

    // Buffers for the closed target are gone
    assert!(session.console_logs(&doomed.id, None).await.is_empty());
    assert!(session.network_logs(&doomed.id, None).await.is_empty());

    session.close_target(&kept.id).await.expect("cleanup");
}

#[tokio::test]
#[serial]
async fn console_capture_buffers_and_filters_by_level() {
    let Some((session, _downloads)) = e2e_session().await else {
        return;
    };

    let target = session
        .open_target("https://example.com/")
        .await
        .expect("open target");

    session
        .start_console_capture(&target.id)
        .await
        .expect("arm console capture");
    // Arming twice is a no-op
    session
        .start_console_capture(&target.id)
        .await
        .expect("re-arm console capture");

    session
        .dispatch(
            &target.id,
            &parse_action(serde_json::json!({
                "kind": "evaluate",
                "fn": "() => { console.log('plain'); console.warn('careful'); console.error('broken'); return true; }"
            })),
        )
        .await
        .expect("trigger console output");

    // Appends are asynchronous; allow capture to settle
    tokio::time::sleep(Duration::from_secs(1)).await;

    let all = session.console_logs(&target.id, None).await;
    assert_eq!(all.len(), 3, "expected exactly the three triggered entries");

    let errors = session.console_logs(&target.id, Some("error")).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].text.contains("broken"));

    session.clear_console_logs(&target.id).await;
    assert!(session.console_logs(&target.id, None).await.is_empty());

    session.close_target(&target.id).await.expect("cleanup");
}
