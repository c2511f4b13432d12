use axum::response::Redirect;
use sqlx::SqlitePool;

use crate::jwt::AuthUser;

use super::permission::Permission;
use super::principal::Principal;

/// Guard for page routes, where denial is a redirect instead of an error
/// body.
///
/// The guard itself stays a plain `Result`; the handler's return type is what
/// turns the `Err` variant into an HTTP redirect. No exception-style control
/// flow is involved.
#[derive(Debug, Clone)]
pub struct PageGuard {
    permission: Option<Permission>,
    any_of: Vec<Permission>,
    redirect_to: String,
}

impl Default for PageGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl PageGuard {
    pub fn new() -> Self {
        Self {
            permission: None,
            any_of: Vec::new(),
            redirect_to: "/".to_string(),
        }
    }

    pub fn permission(mut self, perm: Permission) -> Self {
        self.permission = Some(perm);
        self
    }

    pub fn any_of(mut self, perms: &[Permission]) -> Self {
        self.any_of = perms.to_vec();
        self
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = path.into();
        self
    }

    /// Evaluate the guard. Unauthenticated callers, unresolvable principals
    /// and missing permissions all redirect to the configured fallback path.
    pub async fn evaluate(
        &self,
        pool: &SqlitePool,
        auth: Option<&AuthUser>,
    ) -> Result<Principal, Redirect> {
        let denied = || Redirect::to(&self.redirect_to);

        let auth = auth.ok_or_else(denied)?;
        let principal = Principal::resolve(pool, auth).await.ok_or_else(denied)?;

        if let Some(perm) = self.permission {
            if !principal.has_permission(perm) {
                return Err(denied());
            }
        }

        if !self.any_of.is_empty() && !principal.has_any_permission(&self.any_of) {
            return Err(denied());
        }

        Ok(principal)
    }
}
