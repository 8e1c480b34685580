//! Control Handle — owns the installation and the token-gated teardown.
//!
//! The process-wide environment object and the mediator installation are
//! both inherently global; they are modeled as a single Installation value
//! behind a process-wide slot. Lifetime is install → sole active →
//! teardown. There is no reset-to-default side door: the only supported
//! teardown presents the handle's token, and the legacy unconditional
//! disable raises.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::DecisionLog;
use crate::caller::{CallerIdentifier, FallbackCapture, IdentifierConfig, StackCapture};
use crate::config;
use crate::errors::DotnopeError;
use crate::integrity::{self, IntegrityOutcome};
use crate::launcher;
use crate::mediator::{Mediator, StatsSnapshot};
use crate::store::{EnvStore, ProcessEnv};

/// Native caller-ID helper offered for the trusted capture path.
///
/// The library file is what the integrity verifier attests; the capture
/// backend is how the helper is actually consulted. On refusal the engine
/// never calls into the backend.
pub struct NativeHelperSpec {
    /// Shared-library file to attest.
    pub library: PathBuf,
    /// Manifest path; defaults to the adjacent conventional location.
    pub manifest: Option<PathBuf>,
    /// Trusted capture backend the helper provides.
    pub capture: Arc<dyn StackCapture>,
}

/// Posture of the native caller-ID path, surfaced through status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeStatus {
    /// No native helper was configured.
    NotConfigured,
    /// Helper attested and in use.
    Verified,
    /// Manifest absent; helper in use, unverified.
    WarningOnly(String),
    /// Hash or size mismatch; helper disabled, fallback backend in use.
    Refused(String),
}

struct Installation {
    mediator: Arc<Mediator>,
    token: String,
    policy_id: Uuid,
    installed_at: Instant,
    config_value: Value,
    native: NativeStatus,
    tampering_detected: bool,
    installing_thread: ThreadId,
}

static INSTALLATION: Mutex<Option<Arc<Installation>>> = Mutex::new(None);

fn installation_slot() -> std::sync::MutexGuard<'static, Option<Arc<Installation>>> {
    INSTALLATION.lock().unwrap_or_else(|e| e.into_inner())
}

/// Installation parameters for [`enable_strict_env`].
pub struct EnableOptions {
    /// Package descriptor carrying the `environmentWhitelist` record.
    pub config_path: PathBuf,
    /// Environment store to mediate; the process environment by default.
    pub store: Option<Arc<dyn EnvStore>>,
    /// Capture backend override; the fallback backend by default.
    pub capture: Option<Arc<dyn StackCapture>>,
    /// Native caller-ID helper to attest and prefer.
    pub native_helper: Option<NativeHelperSpec>,
    /// Append decision records to this JSONL file.
    pub decision_log: Option<PathBuf>,
}

impl EnableOptions {
    /// Options with only the descriptor path set.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        EnableOptions {
            config_path: config_path.into(),
            store: None,
            capture: None,
            native_helper: None,
            decision_log: None,
        }
    }
}

/// Install the mediator for this process.
///
/// Loads and normalizes the configuration, attests the native helper when
/// one is offered, and publishes the mediator behind a fresh control
/// handle. Fails with `ERR_DOTNOPE_ALREADY_INSTALLED` while an
/// installation is active.
pub fn enable_strict_env(options: EnableOptions) -> Result<ControlHandle> {
    let mut slot = installation_slot();
    if slot.is_some() {
        return Err(DotnopeError::AlreadyInstalled.into());
    }

    let model = config::load_from_descriptor(&options.config_path)
        .context("failed to load environment whitelist")?;
    let config_value = config::to_config_value(&model);

    let mut tampering_detected = false;
    let mut fallback = || -> Arc<dyn StackCapture> {
        let fb = FallbackCapture::initialize();
        tampering_detected = fb.tampering_detected();
        Arc::new(fb)
    };

    let (capture, native): (Arc<dyn StackCapture>, NativeStatus) = match options.native_helper {
        Some(spec) => {
            let manifest = spec
                .manifest
                .unwrap_or_else(|| integrity::manifest_path_for(&spec.library));
            match integrity::verify_native_file(&spec.library, &manifest) {
                IntegrityOutcome::Verified => (spec.capture, NativeStatus::Verified),
                IntegrityOutcome::WarningOnly { reason } => {
                    (spec.capture, NativeStatus::WarningOnly(reason))
                }
                IntegrityOutcome::Refused { reason } => {
                    warn!(
                        code = "ERR_DOTNOPE_INTEGRITY",
                        reason = %reason,
                        "native helper refused; continuing with fallback caller identification"
                    );
                    let capture = options.capture.unwrap_or_else(&mut fallback);
                    (capture, NativeStatus::Refused(reason))
                }
            }
        }
        None => {
            let capture = options.capture.unwrap_or_else(&mut fallback);
            (capture, NativeStatus::NotConfigured)
        }
    };

    let decision_log = match options.decision_log {
        Some(path) => Some(DecisionLog::new(&path).context("failed to open decision log")?),
        None => None,
    };

    let store: Arc<dyn EnvStore> = options.store.unwrap_or_else(|| Arc::new(ProcessEnv::new()));
    let identifier = CallerIdentifier::with_config(capture, IdentifierConfig::default());
    let mut mediator = Mediator::new(store, model, identifier);
    if let Some(log) = decision_log {
        mediator = mediator.with_decision_log(log);
    }

    let installation = Arc::new(Installation {
        mediator: Arc::new(mediator),
        token: format!("{:032x}", rand::random::<u128>()),
        policy_id: Uuid::new_v4(),
        installed_at: Instant::now(),
        config_value,
        native,
        tampering_detected,
        installing_thread: thread::current().id(),
    });

    info!(
        policy_id = %installation.policy_id,
        "strict environment mediation installed"
    );

    *slot = Some(Arc::clone(&installation));
    Ok(ControlHandle {
        inner: installation,
    })
}

/// Legacy unconditional disable. Removed for security; always raises
/// `ERR_DOTNOPE_DEPRECATED` without touching the mediator.
pub fn disable_strict_env() -> Result<(), DotnopeError> {
    Err(DotnopeError::Deprecated)
}

/// Token-guarded owner of an installation.
pub struct ControlHandle {
    inner: Arc<Installation>,
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle").finish_non_exhaustive()
    }
}

impl ControlHandle {
    /// Tear the mediator down. Requires the token issued at installation;
    /// any other token — empty, stale, mismatched — is rejected and the
    /// mediator keeps enforcing.
    pub fn disable(&self, token: &str) -> Result<(), DotnopeError> {
        if token.is_empty() || token != self.inner.token {
            return Err(DotnopeError::InvalidToken);
        }
        let mut slot = installation_slot();
        match slot.as_ref() {
            Some(active) if Arc::ptr_eq(active, &self.inner) => {
                self.inner.mediator.set_enforcing(false);
                *slot = None;
                info!("strict environment mediation uninstalled");
                Ok(())
            }
            // Token from a previous installation epoch.
            _ => Err(DotnopeError::InvalidToken),
        }
    }

    /// The teardown token. Hold it as carefully as the secrets the policy
    /// protects.
    pub fn get_token(&self) -> &str {
        &self.inner.token
    }

    /// Whether enforcement is active.
    pub fn is_enabled(&self) -> bool {
        self.inner.mediator.is_enforcing()
    }

    /// The mediator this installation published.
    pub fn mediator(&self) -> &Arc<Mediator> {
        &self.inner.mediator
    }

    /// Access counters since installation.
    pub fn get_access_stats(&self) -> StatsSnapshot {
        self.inner.mediator.stats()
    }

    /// Configuration in its serializable shape, suitable for re-loading
    /// in a worker context.
    pub fn get_serializable_config(&self) -> Value {
        self.inner.config_value.clone()
    }

    /// Whether the loader-level interposer is active for this process.
    pub fn is_preload_active(&self) -> bool {
        launcher::preload_active()
    }

    /// Whether the current thread is the one that installed the mediator.
    pub fn is_running_in_main_thread(&self) -> bool {
        thread::current().id() == self.inner.installing_thread
    }

    /// Whether policy permits creating secondary execution contexts.
    pub fn is_worker_allowed(&self) -> bool {
        self.inner.mediator.policy().options.allow_workers
    }

    /// Posture of the native caller-ID path.
    pub fn native_status(&self) -> &NativeStatus {
        &self.inner.native
    }

    /// Whether the native caller-ID path is in use.
    pub fn is_native_available(&self) -> bool {
        matches!(
            self.inner.native,
            NativeStatus::Verified | NativeStatus::WarningOnly(_)
        )
    }

    /// Whether the user-space stack hook was already modified when the
    /// fallback backend initialized. Reported, never acted on.
    pub fn tampering_detected(&self) -> bool {
        self.inner.tampering_detected
    }

    /// Opaque identifier of the installed policy.
    pub fn policy_id(&self) -> Uuid {
        self.inner.policy_id
    }

    /// Monotonic installation timestamp.
    pub fn installed_at(&self) -> Instant {
        self.inner.installed_at
    }

    /// Emit warnings for every posture downgrade currently in effect.
    pub fn emit_security_warnings(&self) {
        if !self.inner.mediator.identifier().is_trusted() {
            warn!("caller identification is using the fallback stack backend; attribution is advisory");
        }
        if self.inner.tampering_detected {
            warn!("stack-formatting hook was modified before initialization; frames may be forged");
        }
        if let NativeStatus::Refused(reason) = &self.inner.native {
            warn!(
                code = "ERR_DOTNOPE_INTEGRITY",
                reason = %reason,
                "native caller-ID helper failed integrity verification"
            );
        }
        if !self.is_preload_active() {
            warn!("loader preload is not active; native code can read the environment directly");
        }
    }
}
