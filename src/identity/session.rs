use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use super::principal::UserId;

/// Opaque per-client context identifier; carried by the transport (a cookie
/// over HTTP) and passed explicitly into every session/guard call.
pub type ContextId = String;

/// 128-bit random token, base64url without padding.
pub fn gen_context_id() -> ContextId {
    let mut buf = [0u8; 16];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
}

/// Per-context session map. One active session per context; signing in again
/// replaces the previous session rather than stacking. All state is owned by
/// the manager instance, no process-global registry.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<ContextId, Session>>,
}

impl SessionManager {
    pub fn new() -> Self { Self::default() }

    pub fn sign_in(&self, ctx: &str, user_id: UserId) -> Session {
        let session = Session { user_id, issued_at: Utc::now() };
        self.sessions.write().insert(ctx.to_string(), session.clone());
        info!(target: "session", "session.start user={} ctx_len={}", user_id, ctx.len());
        session
    }

    pub fn current(&self, ctx: &str) -> Option<Session> {
        self.sessions.read().get(ctx).cloned()
    }

    pub fn is_signed_in(&self, ctx: &str) -> bool {
        self.sessions.read().contains_key(ctx)
    }

    /// Idempotent; ending an absent session is not an error.
    pub fn sign_out(&self, ctx: &str) -> bool {
        let removed = self.sessions.write().remove(ctx);
        if let Some(s) = &removed {
            info!(target: "session", "session.end user={}", s.user_id);
        }
        removed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_replaces_prior_session() {
        let sm = SessionManager::new();
        let ctx = gen_context_id();
        let a = UserId::new();
        let b = UserId::new();
        sm.sign_in(&ctx, a);
        sm.sign_in(&ctx, b);
        assert_eq!(sm.current(&ctx).map(|s| s.user_id), Some(b));
    }

    #[test]
    fn sign_out_is_idempotent() {
        let sm = SessionManager::new();
        let ctx = gen_context_id();
        sm.sign_in(&ctx, UserId::new());
        assert!(sm.sign_out(&ctx));
        assert!(!sm.sign_out(&ctx));
        assert!(!sm.is_signed_in(&ctx));
        assert!(sm.current(&ctx).is_none());
    }

    #[test]
    fn contexts_are_independent() {
        let sm = SessionManager::new();
        let ctx_a = gen_context_id();
        let ctx_b = gen_context_id();
        sm.sign_in(&ctx_a, UserId::new());
        assert!(sm.is_signed_in(&ctx_a));
        assert!(!sm.is_signed_in(&ctx_b));
    }
}
