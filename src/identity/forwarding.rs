//! Friendly-forwarding and flash stores: single-slot, take-once values keyed
//! by client context.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::session::ContextId;

/// Remembers at most one protected-resource location per context. `remember`
/// overwrites; `consume` returns-and-clears or falls back to the configured
/// default, so no stored location ever survives more than one sign-in.
pub struct ForwardingStore {
    default_location: String,
    stored: RwLock<HashMap<ContextId, String>>,
}

impl ForwardingStore {
    pub fn new<S: Into<String>>(default_location: S) -> Self {
        ForwardingStore { default_location: default_location.into(), stored: RwLock::new(HashMap::new()) }
    }

    pub fn default_location(&self) -> &str { &self.default_location }

    pub fn remember(&self, ctx: &str, location: &str) {
        debug!(target: "forwarding", "remember location={}", location);
        self.stored.write().insert(ctx.to_string(), location.to_string());
    }

    /// Take the stored location, or the default when nothing is stored.
    /// Calling with nothing stored is not an error.
    pub fn consume(&self, ctx: &str) -> String {
        self.stored.write().remove(ctx).unwrap_or_else(|| self.default_location.clone())
    }
}

/// One pending notice per context, consumed by the next page render.
#[derive(Default)]
pub struct FlashStore {
    notices: RwLock<HashMap<ContextId, String>>,
}

impl FlashStore {
    pub fn new() -> Self { Self::default() }

    pub fn set(&self, ctx: &str, notice: &str) {
        self.notices.write().insert(ctx.to_string(), notice.to_string());
    }

    pub fn take(&self, ctx: &str) -> Option<String> {
        self.notices.write().remove(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::session::gen_context_id;

    #[test]
    fn consume_is_single_use_then_default() {
        let fwd = ForwardingStore::new("/");
        let ctx = gen_context_id();
        fwd.remember(&ctx, "/users/42/edit");
        assert_eq!(fwd.consume(&ctx), "/users/42/edit");
        assert_eq!(fwd.consume(&ctx), "/", "second consume must fall back to the default");
    }

    #[test]
    fn remember_overwrites_no_queue() {
        let fwd = ForwardingStore::new("/");
        let ctx = gen_context_id();
        fwd.remember(&ctx, "/users");
        fwd.remember(&ctx, "/users/7/edit");
        assert_eq!(fwd.consume(&ctx), "/users/7/edit");
    }

    #[test]
    fn flash_is_take_once() {
        let flash = FlashStore::new();
        let ctx = gen_context_id();
        flash.set(&ctx, "Please sign in.");
        assert_eq!(flash.take(&ctx).as_deref(), Some("Please sign in."));
        assert_eq!(flash.take(&ctx), None);
    }
}
