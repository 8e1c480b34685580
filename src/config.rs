//! Configuration Loader — package-descriptor JSON to the Policy Model.
//!
//! The configuration lives under the `environmentWhitelist` key of the
//! host-conventional package descriptor. Each package entry is either a
//! bare array of variable names (read-only grants) or a record with
//! optional `allowed` / `canWrite` / `canDelete` arrays. The `__options__`
//! key is reserved for global options and is never treated as a package.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::policy::{GlobalOptions, PackagePolicy, PolicyModel, WILDCARD};

/// Key of the configuration record inside the package descriptor.
pub const WHITELIST_KEY: &str = "environmentWhitelist";

/// Reserved key holding the global options.
pub const OPTIONS_KEY: &str = "__options__";

/// The two accepted per-package shapes. Unknown keys in the record shape
/// are ignored.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPackageEntry {
    List(Vec<String>),
    Record {
        #[serde(default)]
        allowed: Vec<String>,
        #[serde(default, rename = "canWrite")]
        can_write: Vec<String>,
        #[serde(default, rename = "canDelete")]
        can_delete: Vec<String>,
    },
}

impl From<RawPackageEntry> for PackagePolicy {
    fn from(raw: RawPackageEntry) -> Self {
        match raw {
            RawPackageEntry::List(allowed) => PackagePolicy {
                allowed: allowed.into_iter().collect(),
                ..PackagePolicy::default()
            },
            RawPackageEntry::Record {
                allowed,
                can_write,
                can_delete,
            } => PackagePolicy {
                allowed: allowed.into_iter().collect(),
                can_write: can_write.into_iter().collect(),
                can_delete: can_delete.into_iter().collect(),
            },
        }
    }
}

/// Load the policy from a package descriptor file.
///
/// A descriptor without an `environmentWhitelist` key yields the empty
/// configuration, which together with the fail-closed default is the
/// maximally restrictive policy: only the host application has access.
pub fn load_from_descriptor(path: &Path) -> Result<PolicyModel> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read package descriptor {}", path.display()))?;
    let descriptor: Value =
        serde_json::from_str(&contents).context("package descriptor is not valid JSON")?;
    match descriptor.get(WHITELIST_KEY) {
        Some(whitelist) => load_from_value(whitelist),
        None => Ok(PolicyModel::default()),
    }
}

/// Normalize a raw configuration value into the Policy Model.
///
/// This is also the re-load path for worker contexts fed from
/// [`crate::handle::ControlHandle::get_serializable_config`].
pub fn load_from_value(value: &Value) -> Result<PolicyModel> {
    let Some(entries) = value.as_object() else {
        bail!("{WHITELIST_KEY} must be a JSON object");
    };

    let options: GlobalOptions = match entries.get(OPTIONS_KEY) {
        Some(raw) => serde_json::from_value(raw.clone()).context("invalid __options__ record")?,
        None => GlobalOptions::default(),
    };

    let mut packages = BTreeMap::new();
    for (name, entry) in entries {
        if name == OPTIONS_KEY {
            continue;
        }
        let raw: RawPackageEntry = serde_json::from_value(entry.clone())
            .with_context(|| format!("invalid policy entry for package '{name}'"))?;
        packages.insert(name.clone(), PackagePolicy::from(raw));
    }

    Ok(PolicyModel { packages, options })
}

/// Parse a configuration from a JSON string (for testing and tooling).
pub fn load_from_json_str(json_str: &str) -> Result<PolicyModel> {
    let value: Value = serde_json::from_str(json_str).context("configuration is not valid JSON")?;
    load_from_value(&value)
}

/// Serialize a Policy Model back into the configuration shape.
///
/// Re-loading the returned value through [`load_from_value`] yields an
/// equal model.
pub fn to_config_value(model: &PolicyModel) -> Value {
    let options = &model.options;
    let mut entries = serde_json::Map::new();
    entries.insert(
        OPTIONS_KEY.to_owned(),
        json!({
            "failClosed": options.fail_closed,
            "protectWrites": options.protect_writes,
            "protectDeletes": options.protect_deletes,
            "protectEnumeration": options.protect_enumeration,
            "allowEval": options.allow_eval,
            "treatMainAsUnrestricted": options.treat_main_as_unrestricted,
            "allowWorkers": options.allow_workers,
        }),
    );
    for (name, policy) in &model.packages {
        entries.insert(
            name.clone(),
            json!({
                "allowed": &policy.allowed,
                "canWrite": &policy.can_write,
                "canDelete": &policy.can_delete,
            }),
        );
    }
    Value::Object(entries)
}

/// Serialize the native-plane allow-set.
///
/// The union of every package's three sets, sorted and deduplicated. Any
/// wildcard anywhere collapses the output to `*`; no grants at all yield
/// the empty string (allow-none). Permuting package entries cannot change
/// the output.
pub fn generate_policy(model: &PolicyModel) -> String {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for policy in model.packages.values() {
        if policy.has_wildcard() {
            return WILDCARD.to_owned();
        }
        names.extend(policy.allowed.iter().map(String::as_str));
        names.extend(policy.can_write.iter().map(String::as_str));
        names.extend(policy.can_delete.iter().map(String::as_str));
    }
    names.into_iter().collect::<Vec<_>>().join(",")
}
