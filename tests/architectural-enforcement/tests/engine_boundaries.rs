//! Integration Test: Broadcast Engine Boundaries
//!
//! **Policy**: `logcast/core` is transport-agnostic. Sessions write to a
//! `LineSink`; the daemon supplies the WebSocket. The existence check is a
//! trait the daemon implements, never a call the engine makes.

use architectural_enforcement::{assert_no_violations, find_violations, production_lines};

const CORE: &str = "logcast/core/src";

#[test]
fn test_core_sources_are_scanned() {
    assert!(
        !production_lines(CORE).is_empty(),
        "no production code found under {CORE}"
    );
}

#[test]
fn test_core_has_no_http_dependencies() {
    let violations = find_violations(
        CORE,
        &["axum::", "hyper::", "http::", "tungstenite", "use axum", "use hyper"],
    );
    assert_no_violations("Broadcast engine must not depend on HTTP types", &violations);
}

#[test]
fn test_store_never_consults_project_status() {
    let violations = find_violations(
        "logcast/core/src/store.rs",
        &["ProjectStatusStore", "project_exists", "InMemoryProjectStatus"],
    );
    assert_no_violations(
        "Log store must not depend on the existence check",
        &violations,
    );
}

#[test]
fn test_core_does_not_use_dashmap() {
    // One lock in the store covers history and registry together.
    let violations = find_violations(CORE, &["dashmap", "DashMap"]);
    assert_no_violations("Broadcast engine keeps its state behind one lock", &violations);
}
