//! Authorization guard: composable predicates evaluated at the entry of every
//! protected action. Each predicate returns a [`Decision`]; denial carries the
//! redirect target (and optional notice) so handlers can short-circuit without
//! raising.

use tracing::warn;

use super::forwarding::ForwardingStore;
use super::principal::{User, UserId};
use super::session::SessionManager;
use crate::store::SharedStore;

pub const SIGN_IN_NOTICE: &str = "Please sign in.";

/// Well-known redirect targets.
#[derive(Debug, Clone)]
pub struct Locations {
    pub root: String,
    pub sign_in: String,
}

impl Default for Locations {
    fn default() -> Self {
        Locations { root: "/".to_string(), sign_in: "/signin".to_string() }
    }
}

/// Terminal outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { redirect: String, notice: Option<String> },
}

impl Decision {
    pub fn is_allow(&self) -> bool { matches!(self, Decision::Allow) }
}

/// Resolve the context's current user. A session whose user no longer exists
/// is invalid: it is dropped and the context is treated as anonymous.
pub fn current_user(sessions: &SessionManager, store: &SharedStore, ctx: &str) -> Option<User> {
    let session = sessions.current(ctx)?;
    match store.find(session.user_id) {
        Some(user) => Some(user),
        None => {
            warn!(target: "guard", "session references deleted user {}, treating as anonymous", session.user_id);
            sessions.sign_out(ctx);
            None
        }
    }
}

/// Any action tagged "requires sign-in": anonymous contexts are denied,
/// the requested location is remembered for friendly forwarding, and the
/// redirect goes to the sign-in entry point. Applies to page views and
/// direct state-mutating requests alike.
pub fn require_signed_in(
    current: Option<&User>,
    forwarding: &ForwardingStore,
    locations: &Locations,
    ctx: &str,
    requested: &str,
) -> Decision {
    if current.is_some() {
        return Decision::Allow;
    }
    forwarding.remember(ctx, requested);
    warn!(target: "guard", "deny anonymous access to {}", requested);
    Decision::Deny {
        redirect: locations.sign_in.clone(),
        notice: Some(SIGN_IN_NOTICE.to_string()),
    }
}

/// Editing/updating a user record: allowed for the record's own user or an
/// admin. Denial redirects to root without recording a forwarding location;
/// the caller is already authenticated.
pub fn require_self_or_admin(current: &User, target: UserId, locations: &Locations) -> Decision {
    if current.id == target || current.admin {
        return Decision::Allow;
    }
    warn!(target: "guard", "deny user {} editing user {}", current.id, target);
    Decision::Deny { redirect: locations.root.clone(), notice: None }
}

/// Destroying a user record: self-destroy is always allowed for a signed-in
/// user; destroying anyone else requires the admin flag. Self-targeting is
/// never a special-cased denial.
pub fn require_admin_for_cross_user_destroy(
    current: &User,
    target: UserId,
    locations: &Locations,
) -> Decision {
    if current.id == target || current.admin {
        return Decision::Allow;
    }
    warn!(target: "guard", "deny non-admin {} destroying user {}", current.id, target);
    Decision::Deny { redirect: locations.root.clone(), notice: None }
}

/// Destroying owned content: only the owner may delete their micropost.
pub fn require_owner(current: &User, owner: UserId, locations: &Locations) -> Decision {
    if current.id == owner {
        return Decision::Allow;
    }
    warn!(target: "guard", "deny user {} deleting content owned by {}", current.id, owner);
    Decision::Deny { redirect: locations.root.clone(), notice: None }
}
