use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of permission keys.
///
/// Call sites name permissions through this enum rather than free-form
/// strings, so a typo'd key is a compile error instead of a silent deny.
/// The string form (e.g. `"invoices_create"`) is what gets stored in a
/// role's permission map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    CustomersView,
    CustomersCreate,
    CustomersUpdate,
    CustomersDelete,
    InvoicesView,
    InvoicesCreate,
    InvoicesUpdate,
    InvoicesDelete,
    RolesView,
    RolesManage,
    UsersManage,
    TrashView,
    TrashRestore,
    TrashPurge,
    DashboardView,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::CustomersView,
        Permission::CustomersCreate,
        Permission::CustomersUpdate,
        Permission::CustomersDelete,
        Permission::InvoicesView,
        Permission::InvoicesCreate,
        Permission::InvoicesUpdate,
        Permission::InvoicesDelete,
        Permission::RolesView,
        Permission::RolesManage,
        Permission::UsersManage,
        Permission::TrashView,
        Permission::TrashRestore,
        Permission::TrashPurge,
        Permission::DashboardView,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Permission::CustomersView => "customers_view",
            Permission::CustomersCreate => "customers_create",
            Permission::CustomersUpdate => "customers_update",
            Permission::CustomersDelete => "customers_delete",
            Permission::InvoicesView => "invoices_view",
            Permission::InvoicesCreate => "invoices_create",
            Permission::InvoicesUpdate => "invoices_update",
            Permission::InvoicesDelete => "invoices_delete",
            Permission::RolesView => "roles_view",
            Permission::RolesManage => "roles_manage",
            Permission::UsersManage => "users_manage",
            Permission::TrashView => "trash_view",
            Permission::TrashRestore => "trash_restore",
            Permission::TrashPurge => "trash_purge",
            Permission::DashboardView => "dashboard_view",
        }
    }

    pub fn from_key(key: &str) -> Option<Permission> {
        Permission::ALL.iter().copied().find(|p| p.key() == key)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A role's permission map: key -> granted.
///
/// An absent key is equivalent to an explicit `false` (default-deny). The map
/// is stored as a JSON object in the `roles.permissions` column; unknown keys
/// are kept on round-trip but never grant anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, bool>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known permission granted. Used for the implicit `owner` role.
    pub fn all() -> Self {
        let mut set = Self::new();
        for perm in Permission::ALL {
            set.0.insert(perm.key().to_string(), true);
        }
        set
    }

    pub fn grant(mut self, perm: Permission) -> Self {
        self.0.insert(perm.key().to_string(), true);
        self
    }

    pub fn revoke(mut self, perm: Permission) -> Self {
        self.0.insert(perm.key().to_string(), false);
        self
    }

    pub fn allows(&self, perm: Permission) -> bool {
        self.0.get(perm.key()).copied().unwrap_or(false)
    }

    pub fn allows_any(&self, perms: &[Permission]) -> bool {
        perms.iter().any(|p| self.allows(*p))
    }

    /// Parse the stored JSON map. A malformed map yields an empty set so a
    /// corrupted role denies everything rather than erroring.
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "malformed permission map, treating as empty");
            Self::new()
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_denies() {
        let set = PermissionSet::new().grant(Permission::InvoicesCreate);
        assert!(set.allows(Permission::InvoicesCreate));
        assert!(!set.allows(Permission::InvoicesView));
    }

    #[test]
    fn explicit_false_denies() {
        let set = PermissionSet::all().revoke(Permission::TrashPurge);
        assert!(!set.allows(Permission::TrashPurge));
        assert!(set.allows(Permission::TrashView));
    }

    #[test]
    fn all_grants_every_key() {
        let set = PermissionSet::all();
        for perm in Permission::ALL {
            assert!(set.allows(*perm), "{perm} should be granted");
        }
    }

    #[test]
    fn allows_any_needs_one_match() {
        let set = PermissionSet::new().grant(Permission::CustomersView);
        assert!(set.allows_any(&[Permission::CustomersUpdate, Permission::CustomersView]));
        assert!(!set.allows_any(&[Permission::CustomersUpdate, Permission::CustomersDelete]));
    }

    #[test]
    fn malformed_json_denies_everything() {
        let set = PermissionSet::from_json("not-json");
        for perm in Permission::ALL {
            assert!(!set.allows(*perm));
        }
    }

    #[test]
    fn unknown_keys_round_trip_without_granting() {
        let set = PermissionSet::from_json(r#"{"legacy_flag": true, "customers_view": true}"#);
        assert!(set.allows(Permission::CustomersView));
        assert!(!set.allows(Permission::CustomersCreate));
        assert!(set.to_json().contains("legacy_flag"));
    }

    #[test]
    fn key_round_trip() {
        for perm in Permission::ALL {
            assert_eq!(Permission::from_key(perm.key()), Some(*perm));
        }
        assert_eq!(Permission::from_key("no_such_key"), None);
    }
}
