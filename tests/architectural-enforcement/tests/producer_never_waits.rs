//! Integration Test: Producer Never Waits
//!
//! **Policy**: `append`, `reset`, `subscribe` and `unsubscribe` are
//! synchronous. Subscriber queues are fed with `try_send`; a full queue is
//! evicted, never awaited.
//!
//! **Policy**: no `std::thread::sleep` in production code. Pauses go through
//! `tokio::time::sleep` raced against a cancellation token.

use architectural_enforcement::{assert_no_violations, find_violations};

#[test]
fn test_store_operations_never_await() {
    let violations = find_violations("logcast/core/src/store.rs", &[".await", "async fn"]);
    assert_no_violations("Store operations must not suspend", &violations);
}

#[test]
fn test_store_feeds_queues_with_try_send() {
    let violations = find_violations(
        "logcast/core/src/store.rs",
        &[".send(", "blocking_send", ".reserve("],
    );
    assert_no_violations("Subscriber queues must be fed with try_send", &violations);
}

#[test]
fn test_no_thread_sleep_in_production_code() {
    let mut violations = find_violations("logcast/core/src", &["std::thread::sleep", "thread::sleep("]);
    violations.extend(find_violations(
        "logcast/daemon/src",
        &["std::thread::sleep", "thread::sleep("],
    ));
    assert_no_violations(
        "Production code must not block a runtime thread with sleep",
        &violations,
    );
}

#[test]
fn test_no_blocking_http_client() {
    let violations = find_violations("logcast", &["reqwest::blocking", "ureq::"]);
    assert_no_violations("No blocking HTTP clients", &violations);
}
