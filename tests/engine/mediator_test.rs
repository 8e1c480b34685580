//! End-to-end mediation flows over an in-memory store.

use std::sync::Arc;

use dotnope::audit::DecisionLog;
use dotnope::caller::{CallerIdentifier, StaticCapture};
use dotnope::config;
use dotnope::mediator::Mediator;
use dotnope::store::{EnvStore, MemoryEnv};
use dotnope::types::Frame;

fn package_frame(name: &str) -> Frame {
    Frame::from_path(format!("/srv/app/node_modules/{name}/index.js"))
}

fn main_frame() -> Frame {
    Frame::from_path("/srv/app/server.js")
}

/// Build a mediator whose caller can be swapped between accesses.
fn switchable_mediator(
    config_json: &str,
    env: &[(&str, &str)],
) -> (Mediator, Arc<StaticCapture>, Arc<MemoryEnv>) {
    let model = config::load_from_json_str(config_json).expect("config parses");
    let capture = Arc::new(StaticCapture::new(vec![main_frame()]));
    let store = Arc::new(MemoryEnv::from_pairs(env.iter().copied()));
    let mediator = Mediator::new(
        Arc::clone(&store) as Arc<dyn EnvStore>,
        model,
        CallerIdentifier::new(Arc::clone(&capture) as Arc<dyn dotnope::caller::StackCapture>),
    );
    (mediator, capture, store)
}

#[test]
fn grants_compose_across_callers() {
    let (mediator, capture, _store) = switchable_mediator(
        r#"{
            "reader": {"allowed": ["SHARED"]},
            "writer": {"canWrite": ["SHARED"]}
        }"#,
        &[("SHARED", "before"), ("AWS_SECRET", "x")],
    );

    // Writer updates the variable.
    capture.set_frames(vec![package_frame("writer")]);
    mediator.set("SHARED", "after").expect("writer may write");

    // Reader observes the new value but cannot touch the secret.
    capture.set_frames(vec![package_frame("reader")]);
    assert_eq!(mediator.get("SHARED").expect("reader may read").as_deref(), Some("after"));
    assert!(mediator.get("AWS_SECRET").is_err());

    // The application sees everything.
    capture.set_frames(vec![main_frame()]);
    assert_eq!(mediator.get("AWS_SECRET").unwrap().as_deref(), Some("x"));
}

#[test]
fn enumeration_reflects_each_callers_view() {
    let (mediator, capture, _store) = switchable_mediator(
        r#"{
            "narrow": {"allowed": ["A"]},
            "wide": {"allowed": ["*"]}
        }"#,
        &[("A", "1"), ("B", "2"), ("C", "3")],
    );

    capture.set_frames(vec![package_frame("narrow")]);
    assert_eq!(mediator.keys(), vec!["A"]);

    capture.set_frames(vec![package_frame("wide")]);
    assert_eq!(mediator.keys(), vec!["A", "B", "C"]);

    capture.set_frames(vec![main_frame()]);
    assert_eq!(mediator.keys(), vec!["A", "B", "C"]);
}

#[test]
fn fail_open_unknown_caller_passes_everywhere() {
    let (mediator, capture, _store) = switchable_mediator(
        r#"{"__options__": {"failClosed": false}}"#,
        &[("HOME", "/root")],
    );
    capture.set_frames(Vec::new());
    assert_eq!(mediator.get("HOME").expect("fail-open").as_deref(), Some("/root"));
    assert_eq!(mediator.keys(), vec!["HOME"]);
}

#[test]
fn unprotected_writes_and_deletes_pass_reads_still_checked() {
    let (mediator, capture, store) = switchable_mediator(
        r#"{"__options__": {"protectWrites": false, "protectDeletes": false}}"#,
        &[("VICTIM", "v")],
    );
    capture.set_frames(vec![package_frame("anyone")]);
    mediator.set("VICTIM", "w").expect("writes unmediated");
    assert!(mediator.remove("VICTIM").expect("deletes unmediated"));
    assert!(mediator.get("VICTIM").is_err());
    assert_eq!(store.get("VICTIM"), None);
}

#[test]
fn decision_log_captures_denials_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("decisions.jsonl");

    let model = config::load_from_json_str("{}").expect("config parses");
    let capture = Arc::new(StaticCapture::new(vec![package_frame("sketchy")]));
    let mediator = Mediator::new(
        Arc::new(MemoryEnv::from_pairs([("AWS_SECRET", "x")])),
        model,
        CallerIdentifier::new(capture),
    )
    .with_decision_log(DecisionLog::new(&log_path).expect("log opens"));

    assert!(mediator.get("AWS_SECRET").is_err());

    let contents = std::fs::read_to_string(&log_path).expect("log exists");
    let entry: serde_json::Value =
        serde_json::from_str(contents.trim()).expect("entry is JSON");
    assert_eq!(entry["caller"], "sketchy");
    assert_eq!(entry["variable"], "AWS_SECRET");
    assert_eq!(entry["operation"], "read");
    assert_eq!(entry["outcome"], "denied");
    assert_eq!(entry["reason"], "ERR_DOTNOPE_UNAUTHORIZED");
    // The secret value itself never reaches the log.
    assert!(!contents.contains("\"x\""));
}

#[test]
fn restricted_main_is_filtered_like_a_package() {
    let (mediator, capture, _store) = switchable_mediator(
        r#"{
            "__options__": {"treatMainAsUnrestricted": false},
            "main": {"allowed": ["PUBLIC"]}
        }"#,
        &[("PUBLIC", "ok"), ("AWS_SECRET", "x")],
    );
    capture.set_frames(vec![main_frame()]);
    assert_eq!(mediator.get("PUBLIC").expect("granted").as_deref(), Some("ok"));
    assert!(mediator.get("AWS_SECRET").is_err());
    assert_eq!(mediator.keys(), vec!["PUBLIC"]);
}
