//! Caller attribution flows through the public surface.

use std::sync::Arc;

use dotnope::caller::{
    capture, CallerIdentifier, FallbackCapture, IdentifierConfig, StaticCapture,
};
use dotnope::types::{CallerId, Frame};

fn resolve(frames: Vec<Frame>) -> CallerId {
    CallerIdentifier::new(Arc::new(StaticCapture::new(frames)))
        .resolve()
        .id
}

#[test]
fn deep_dependency_chain_attributes_innermost_package() {
    // A reads the environment from inside B's callback: the innermost
    // attributable frame wins, so B is the responsible module.
    let id = resolve(vec![
        Frame::from_path("/srv/app/node_modules/b/lib/read.js"),
        Frame::from_path("/srv/app/node_modules/a/index.js"),
        Frame::from_path("/srv/app/main.js"),
    ]);
    assert_eq!(id, CallerId::Package("b".to_owned()));
}

#[test]
fn scoped_package_under_nested_install() {
    let id = resolve(vec![Frame::from_path(
        "/srv/app/node_modules/a/node_modules/@scope/b/dist/index.js",
    )]);
    assert_eq!(id, CallerId::Package("@scope/b".to_owned()));
}

#[test]
fn internal_only_stack_is_unknown() {
    let id = resolve(vec![
        Frame::from_path("node:internal/process/task_queues"),
        Frame::from_path("node:events"),
    ]);
    assert_eq!(id, CallerId::Unknown);
}

#[test]
fn frames_without_paths_are_unresolvable() {
    let id = resolve(vec![Frame::default(), Frame::default()]);
    assert_eq!(id, CallerId::Unknown);
}

#[test]
fn application_code_behind_internal_frames_is_main() {
    let id = resolve(vec![
        Frame::from_path("node:internal/modules/cjs/loader"),
        Frame::from_path("/srv/app/config/load.js"),
    ]);
    assert_eq!(id, CallerId::Main);
}

#[test]
fn eval_inside_package_keeps_package_identity_with_eval_flag() {
    let identifier = CallerIdentifier::new(Arc::new(StaticCapture::new(vec![
        Frame {
            function_name: Some("eval".to_owned()),
            ..Frame::default()
        },
        Frame::from_path("/srv/app/node_modules/sketchy/payload.js"),
    ])));
    let resolved = identifier.resolve();
    assert_eq!(resolved.id, CallerId::Package("sketchy".to_owned()));
    assert!(resolved.is_eval);
}

#[test]
fn custom_internal_prefixes_are_honored() {
    let config = IdentifierConfig {
        internal_prefixes: vec!["bun:".to_owned()],
        ..IdentifierConfig::default()
    };
    let identifier = CallerIdentifier::with_config(
        Arc::new(StaticCapture::new(vec![
            Frame::from_path("bun:ffi"),
            Frame::from_path("/srv/app/node_modules/p/index.js"),
        ])),
        config,
    );
    assert_eq!(identifier.resolve().id, CallerId::Package("p".to_owned()));
}

#[test]
fn fallback_backend_reports_prior_hook_tampering() {
    // A hook swapped in before initialization is recorded, not acted on.
    fn mangling_hook(_frames: Vec<Frame>) -> Vec<Frame> {
        Vec::new()
    }
    capture::set_format_hook(mangling_hook);
    let fallback = FallbackCapture::initialize();
    assert!(fallback.tampering_detected());

    // Restore the identity hook for other tests in this binary.
    fn identity(frames: Vec<Frame>) -> Vec<Frame> {
        frames
    }
    capture::set_format_hook(identity);
}

#[test]
fn fallback_backend_is_untrusted_static_trusted_is_not() {
    let fallback = CallerIdentifier::new(Arc::new(FallbackCapture::initialize()));
    assert!(!fallback.is_trusted());

    let trusted = CallerIdentifier::new(Arc::new(StaticCapture::trusted(Vec::new())));
    assert!(trusted.is_trusted());
}
