//! Worker-context initialization from the serializable configuration.
//!
//! A secondary execution context never shares the main mediator; it
//! re-runs the configuration loader on the payload the main thread
//! exports and installs its own mediator over its own environment view.

use std::sync::Arc;

use dotnope::caller::{CallerIdentifier, StaticCapture};
use dotnope::config;
use dotnope::mediator::Mediator;
use dotnope::store::MemoryEnv;
use dotnope::types::Frame;

const CONFIG: &str = r#"{
    "__options__": {"allowWorkers": true, "failClosed": true},
    "cfg": {"allowed": ["NODE_ENV"], "canWrite": ["CFG_CACHE"]}
}"#;

fn package_frame(name: &str) -> Frame {
    Frame::from_path(format!("/srv/app/node_modules/{name}/index.js"))
}

#[test]
fn worker_model_equals_main_model_after_round_trip() {
    let main_model = config::load_from_json_str(CONFIG).expect("main config");
    let payload = config::to_config_value(&main_model);
    let worker_model = config::load_from_value(&payload).expect("worker re-load");
    assert_eq!(worker_model, main_model);
}

#[test]
fn worker_mediator_enforces_identically() {
    let main_model = config::load_from_json_str(CONFIG).expect("main config");
    let payload = config::to_config_value(&main_model);
    let worker_model = config::load_from_value(&payload).expect("worker re-load");

    // The worker's own isolated environment view.
    let worker_env = Arc::new(MemoryEnv::from_pairs([
        ("NODE_ENV", "production"),
        ("AWS_SECRET", "x"),
    ]));
    let capture = Arc::new(StaticCapture::new(vec![package_frame("cfg")]));
    let mediator = Mediator::new(worker_env, worker_model, CallerIdentifier::new(capture));

    assert_eq!(
        mediator.get("NODE_ENV").expect("granted read").as_deref(),
        Some("production")
    );
    mediator.set("CFG_CACHE", "warm").expect("granted write");
    assert!(mediator.get("AWS_SECRET").is_err());
    assert_eq!(mediator.keys(), vec!["CFG_CACHE", "NODE_ENV"]);
}

#[test]
fn worker_refusal_is_a_policy_option() {
    let model = config::load_from_json_str(r#"{"__options__": {"allowWorkers": false}}"#)
        .expect("config");
    assert!(!model.options.allow_workers);

    // The option round-trips so a worker cannot launder it away.
    let payload = config::to_config_value(&model);
    let reloaded = config::load_from_value(&payload).expect("re-load");
    assert!(!reloaded.options.allow_workers);
}
