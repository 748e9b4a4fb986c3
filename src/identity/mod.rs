//! Central identity, session and authorization management for gatehouse.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
pub mod session;
mod forwarding;
mod guard;
mod fields;

pub use principal::{Micropost, MicropostId, PublicUser, User, UserId};
pub use session::{gen_context_id, ContextId, Session, SessionManager};
pub use forwarding::{FlashStore, ForwardingStore};
pub use guard::{
    current_user, require_admin_for_cross_user_destroy, require_owner, require_self_or_admin,
    require_signed_in, Decision, Locations, SIGN_IN_NOTICE,
};
pub use fields::{bind_fields, UserFields, ALLOWED_FIELDS, PRIVILEGE_FIELD};
