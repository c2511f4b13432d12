//! Authorization module.
//!
//! Implements the permission model used across all routes:
//! - a closed, enumerated set of permission keys ([`Permission`])
//! - per-role boolean permission maps with default-deny semantics
//!   ([`PermissionSet`])
//! - per-request principal resolution with no caching ([`Principal`])
//! - boolean checks that fail closed and never error ([`check_permission`])
//! - guards for actions (structured error) and pages (redirect)
//!
//! A role edit is visible to the very next check because every check re-reads
//! the role's permission map from storage.

mod checker;
mod guard;
mod permission;
mod principal;

pub use checker::{check_any_permission, check_permission, require_any_permission, require_permission};
pub use guard::PageGuard;
pub use permission::{Permission, PermissionSet};
pub use principal::Principal;

/// Well-known role names. Only `owner` is created implicitly (at
/// registration); everything else is organization-defined through the RBAC
/// API.
pub mod roles {
    pub const OWNER: &str = "owner";
    pub const ACCOUNTANT: &str = "accountant";
    pub const VIEWER: &str = "viewer";
}
