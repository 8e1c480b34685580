//! Policy Model — normalized per-package rules and global options.
//!
//! Pure value type. Immutable after construction; reconfiguration replaces
//! the whole model. The decision engine consults it through the membership
//! queries below; `*` in any set short-circuits membership to true.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Sentinel meaning "any variable" inside a policy set.
pub const WILDCARD: &str = "*";

/// Per-package variable sets.
///
/// `can_write` and `can_delete` also grant read; `allowed` grants read
/// only. The sets are permissive unions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePolicy {
    /// Variables the package may read.
    #[serde(default)]
    pub allowed: BTreeSet<String>,
    /// Variables the package may write (implies read).
    #[serde(default, rename = "canWrite")]
    pub can_write: BTreeSet<String>,
    /// Variables the package may delete (implies read).
    #[serde(default, rename = "canDelete")]
    pub can_delete: BTreeSet<String>,
}

impl PackagePolicy {
    /// Policy granting read access to the listed variables only.
    pub fn read_only<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PackagePolicy {
            allowed: vars.into_iter().map(Into::into).collect(),
            ..PackagePolicy::default()
        }
    }

    /// True when any of the three sets contains the wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.allowed.contains(WILDCARD)
            || self.can_write.contains(WILDCARD)
            || self.can_delete.contains(WILDCARD)
    }

    fn set_grants(set: &BTreeSet<String>, var: &str) -> bool {
        set.contains(WILDCARD) || set.contains(var)
    }

    /// Read grant: union of all three sets.
    pub fn grants_read(&self, var: &str) -> bool {
        Self::set_grants(&self.allowed, var)
            || Self::set_grants(&self.can_write, var)
            || Self::set_grants(&self.can_delete, var)
    }

    /// Write grant.
    pub fn grants_write(&self, var: &str) -> bool {
        Self::set_grants(&self.can_write, var)
    }

    /// Delete grant.
    pub fn grants_delete(&self, var: &str) -> bool {
        Self::set_grants(&self.can_delete, var)
    }
}

/// Global enforcement options (the `__options__` configuration entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalOptions {
    /// Deny when the caller is unknown.
    pub fail_closed: bool,
    /// Whether writes are mediated at all.
    pub protect_writes: bool,
    /// Whether deletes are mediated at all.
    pub protect_deletes: bool,
    /// Whether key enumeration is mediated at all.
    pub protect_enumeration: bool,
    /// Whether callers from dynamically generated code are eligible for
    /// any policy. When false they always deny regardless of identity.
    pub allow_eval: bool,
    /// The host application always passes.
    pub treat_main_as_unrestricted: bool,
    /// Whether secondary execution contexts may be created while the
    /// mediator is installed.
    pub allow_workers: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        GlobalOptions {
            fail_closed: true,
            protect_writes: true,
            protect_deletes: true,
            protect_enumeration: true,
            allow_eval: false,
            treat_main_as_unrestricted: true,
            allow_workers: true,
        }
    }
}

/// The full policy: per-package rules plus global options.
///
/// An empty `packages` map combined with `fail_closed` is the maximally
/// restrictive policy in which only the host application has access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyModel {
    /// Per-package variable sets, keyed by package name.
    pub packages: BTreeMap<String, PackagePolicy>,
    /// Global enforcement options.
    pub options: GlobalOptions,
}

/// Shared empty policy returned for packages with no entry.
static EMPTY_POLICY: PackagePolicy = PackagePolicy {
    allowed: BTreeSet::new(),
    can_write: BTreeSet::new(),
    can_delete: BTreeSet::new(),
};

impl PolicyModel {
    /// Per-package policy; a missing entry yields the empty policy.
    pub fn package(&self, name: &str) -> &PackagePolicy {
        self.packages.get(name).unwrap_or(&EMPTY_POLICY)
    }

    /// May `name` read `var`?
    pub fn may_read(&self, name: &str, var: &str) -> bool {
        self.package(name).grants_read(var)
    }

    /// May `name` write `var`?
    pub fn may_write(&self, name: &str, var: &str) -> bool {
        self.package(name).grants_write(var)
    }

    /// May `name` delete `var`?
    pub fn may_delete(&self, name: &str, var: &str) -> bool {
        self.package(name).grants_delete(var)
    }

    /// Keys of `all_keys` visible to `name` under enumeration.
    ///
    /// A wildcard in any of the package's sets yields `all_keys` whole;
    /// otherwise the result is the subset lying in the union of the three
    /// sets. Order of `all_keys` is preserved.
    pub fn visible_keys(&self, name: &str, all_keys: &[String]) -> Vec<String> {
        let policy = self.package(name);
        if policy.has_wildcard() {
            return all_keys.to_vec();
        }
        all_keys
            .iter()
            .filter(|key| policy.grants_read(key))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(name: &str, policy: PackagePolicy) -> PolicyModel {
        let mut packages = BTreeMap::new();
        packages.insert(name.to_owned(), policy);
        PolicyModel {
            packages,
            options: GlobalOptions::default(),
        }
    }

    #[test]
    fn defaults_are_fail_closed() {
        let options = GlobalOptions::default();
        assert!(options.fail_closed);
        assert!(options.protect_writes);
        assert!(options.protect_deletes);
        assert!(options.protect_enumeration);
        assert!(!options.allow_eval);
        assert!(options.treat_main_as_unrestricted);
        assert!(options.allow_workers);
    }

    #[test]
    fn missing_package_is_empty_policy() {
        let model = PolicyModel::default();
        assert!(!model.may_read("anything", "HOME"));
        assert!(!model.may_write("anything", "HOME"));
        assert!(!model.may_delete("anything", "HOME"));
    }

    #[test]
    fn write_and_delete_imply_read() {
        let model = model_with(
            "p",
            PackagePolicy {
                can_write: ["A".to_owned()].into(),
                can_delete: ["B".to_owned()].into(),
                ..PackagePolicy::default()
            },
        );
        assert!(model.may_read("p", "A"));
        assert!(model.may_read("p", "B"));
        assert!(!model.may_write("p", "B"));
        assert!(!model.may_delete("p", "A"));
    }

    #[test]
    fn allowed_grants_read_only() {
        let model = model_with("p", PackagePolicy::read_only(["NODE_ENV"]));
        assert!(model.may_read("p", "NODE_ENV"));
        assert!(!model.may_write("p", "NODE_ENV"));
        assert!(!model.may_delete("p", "NODE_ENV"));
    }

    #[test]
    fn wildcard_short_circuits() {
        let model = model_with(
            "p",
            PackagePolicy {
                can_write: [WILDCARD.to_owned()].into(),
                ..PackagePolicy::default()
            },
        );
        assert!(model.may_write("p", "ANY"));
        assert!(model.may_read("p", "OTHER"));
    }

    #[test]
    fn visible_keys_filters_to_union() {
        let model = model_with("p", PackagePolicy::read_only(["A"]));
        let keys = vec!["A".to_owned(), "B".to_owned(), "C".to_owned()];
        assert_eq!(model.visible_keys("p", &keys), vec!["A".to_owned()]);
    }

    #[test]
    fn visible_keys_wildcard_is_everything() {
        let model = model_with("p", PackagePolicy::read_only([WILDCARD]));
        let keys = vec!["A".to_owned(), "B".to_owned()];
        assert_eq!(model.visible_keys("p", &keys), keys);
    }

    #[test]
    fn visible_keys_missing_package_is_empty() {
        let model = PolicyModel::default();
        let keys = vec!["A".to_owned()];
        assert!(model.visible_keys("nobody", &keys).is_empty());
    }
}
