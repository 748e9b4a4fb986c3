use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for UserId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MicropostId(pub Uuid);

impl MicropostId {
    pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for MicropostId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for MicropostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

/// A registered identity record. Deliberately not serde-serializable so the
/// password hash can never leak through a response body; use [`PublicUser`]
/// for anything that leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Stored lowercased; lookups are case-insensitive.
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Never settable through field binding; see `identity::fields` and
    /// `SharedStore::set_admin`.
    pub admin: bool,
}

/// Response-safe projection of a [`User`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub admin: bool,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        PublicUser { id: u.id, name: u.name.clone(), email: u.email.clone(), admin: u.admin }
    }
}

/// Content record owned by a user; deleting the user cascades to these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Micropost {
    pub id: MicropostId,
    pub user_id: UserId,
    pub content: String,
}
