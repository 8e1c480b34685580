//! Integrity Verifier — attests the native caller-ID helper before the
//! engine will call into it.
//!
//! The interposer is loaded by the OS loader and is not covered here; this
//! gate exists for the helper the engine itself would load. Refusal means
//! the native path stays disabled and the fallback capture backend is used.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Manifest document shipped adjacent to the native file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeManifest {
    /// Manifest format version.
    pub version: u32,
    /// When the manifest was generated.
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    /// The attested file.
    pub addon: AddonEntry,
    /// Runtime the file was built for.
    #[serde(rename = "node")]
    pub runtime: RuntimeEntry,
}

/// Attested-file fields of the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonEntry {
    /// Path the file was hashed at.
    pub path: String,
    /// Hex digest of the file contents.
    pub hash: String,
    /// Digest algorithm; `sha256` is the default and only supported value.
    pub algorithm: String,
    /// File size in bytes.
    pub size: u64,
    /// Modification time at hashing, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

/// Runtime-identification fields of the manifest. Informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeEntry {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub abi: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

/// Verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityOutcome {
    /// Hash and size match the manifest.
    Verified,
    /// No manifest was found; the native path may proceed, degraded.
    WarningOnly {
        /// Why verification could not run.
        reason: String,
    },
    /// Hash or size mismatch, or the manifest itself is unusable. The
    /// native caller-ID path is disabled for this process.
    Refused {
        /// Mismatch description.
        reason: String,
    },
}

impl IntegrityOutcome {
    /// Whether the native path may be used at all.
    pub fn allows_native(&self) -> bool {
        !matches!(self, IntegrityOutcome::Refused { .. })
    }
}

/// Conventional manifest location: `<file name>.manifest.json` in the same
/// directory as the native file.
pub fn manifest_path_for(library: &Path) -> PathBuf {
    let name = library
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    library.with_file_name(format!("{name}.manifest.json"))
}

/// Verify `library` against the manifest at `manifest_path`.
///
/// An absent manifest downgrades to [`IntegrityOutcome::WarningOnly`]; any
/// mismatch refuses.
pub fn verify_native_file(library: &Path, manifest_path: &Path) -> IntegrityOutcome {
    let manifest_text = match std::fs::read_to_string(manifest_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %manifest_path.display(), "native manifest absent, proceeding unverified");
            return IntegrityOutcome::WarningOnly {
                reason: "manifest absent".to_owned(),
            };
        }
        Err(e) => {
            return IntegrityOutcome::Refused {
                reason: format!("manifest unreadable: {e}"),
            }
        }
    };

    let manifest: NativeManifest = match serde_json::from_str(&manifest_text) {
        Ok(manifest) => manifest,
        Err(e) => {
            return IntegrityOutcome::Refused {
                reason: format!("manifest malformed: {e}"),
            }
        }
    };

    verify_against_manifest(library, &manifest)
}

/// Verify `library` against an already-parsed manifest.
pub fn verify_against_manifest(library: &Path, manifest: &NativeManifest) -> IntegrityOutcome {
    if !manifest.addon.algorithm.eq_ignore_ascii_case("sha256") {
        return IntegrityOutcome::Refused {
            reason: format!("unsupported digest algorithm '{}'", manifest.addon.algorithm),
        };
    }

    let bytes = match std::fs::read(library) {
        Ok(bytes) => bytes,
        Err(e) => {
            return IntegrityOutcome::Refused {
                reason: format!("native file unreadable: {e}"),
            }
        }
    };

    if bytes.len() as u64 != manifest.addon.size {
        return IntegrityOutcome::Refused {
            reason: format!(
                "size mismatch: manifest says {} bytes, file is {}",
                manifest.addon.size,
                bytes.len()
            ),
        };
    }

    let digest = sha256_hex(&bytes);
    if !digest.eq_ignore_ascii_case(&manifest.addon.hash) {
        return IntegrityOutcome::Refused {
            reason: "hash mismatch".to_owned(),
        };
    }

    IntegrityOutcome::Verified
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
