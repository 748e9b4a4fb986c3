//!
//! gatehouse identity store
//! ------------------------
//! In-memory backing store for user and micropost records. The public API
//! centers around [`SharedStore`], a cheaply clonable handle wrapping the
//! maps in a `parking_lot::RwLock`.
//!
//! Key responsibilities:
//! - User registration from guarded field bundles (see `identity::fields`),
//!   with duplicate-email and confirmation checks.
//! - Case-insensitive email lookup for credential verification.
//! - User deletion cascading to owned microposts.
//! - The one sanctioned privilege-elevation path, `set_admin`; no store
//!   operation ever writes the admin flag from bound input.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::AppError;
use crate::identity::{Micropost, MicropostId, User, UserFields, UserId};
use crate::security::hash_password;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    /// lowercased email -> user id
    email_index: HashMap<String, UserId>,
    posts: HashMap<MicropostId, Micropost>,
}

/// Thread-safe handle to the identity store.
#[derive(Clone, Default)]
pub struct SharedStore(Arc<RwLock<Inner>>);

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl SharedStore {
    pub fn new() -> Self { Self::default() }

    /// Register a new user from guarded fields. Name, email and password are
    /// required; the admin flag always starts false.
    pub fn register(&self, fields: UserFields) -> Result<User, AppError> {
        fields.check_confirmation()?;
        let Some(name) = fields.name.filter(|s| !s.trim().is_empty()) else {
            return Err(AppError::user("missing_field", "name is required"));
        };
        let Some(email) = fields.email.filter(|s| !s.trim().is_empty()) else {
            return Err(AppError::user("missing_field", "email is required"));
        };
        let Some(password) = fields.password.filter(|s| !s.is_empty()) else {
            return Err(AppError::user("missing_field", "password is required"));
        };
        let email = normalize_email(&email);
        let password_hash = hash_password(&password)?;

        let mut inner = self.0.write();
        if inner.email_index.contains_key(&email) {
            return Err(AppError::conflict("email_taken", "email is already registered"));
        }
        let user = User { id: UserId::new(), name, email: email.clone(), password_hash, admin: false };
        inner.email_index.insert(email, user.id);
        inner.users.insert(user.id, user.clone());
        info!(target: "store", "user.register id={} email={}", user.id, user.email);
        Ok(user)
    }

    pub fn find(&self, id: UserId) -> Option<User> {
        self.0.read().users.get(&id).cloned()
    }

    pub fn find_by_email(&self, email: &str) -> Option<User> {
        let inner = self.0.read();
        let id = inner.email_index.get(&normalize_email(email))?;
        inner.users.get(id).cloned()
    }

    /// All users, ordered by name for stable listings.
    pub fn all_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.0.read().users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        users
    }

    /// Apply guarded fields to an existing user. Absent fields keep their
    /// current value; the admin flag is untouchable here by construction.
    pub fn update(&self, id: UserId, fields: UserFields) -> Result<User, AppError> {
        fields.check_confirmation()?;
        let new_hash = match &fields.password {
            Some(pw) if !pw.is_empty() => Some(hash_password(pw)?),
            Some(_) => return Err(AppError::user("missing_field", "password must not be empty")),
            None => None,
        };

        let mut inner = self.0.write();
        if let Some(new_email) = fields.email.as_deref().map(normalize_email) {
            let current = inner.users.get(&id).ok_or_else(user_not_found)?;
            if new_email != current.email {
                if inner.email_index.contains_key(&new_email) {
                    return Err(AppError::conflict("email_taken", "email is already registered"));
                }
                let old = inner.users.get(&id).map(|u| u.email.clone()).unwrap_or_default();
                inner.email_index.remove(&old);
                inner.email_index.insert(new_email.clone(), id);
                if let Some(u) = inner.users.get_mut(&id) { u.email = new_email; }
            }
        }
        let user = inner.users.get_mut(&id).ok_or_else(user_not_found)?;
        if let Some(name) = fields.name { user.name = name; }
        if let Some(hash) = new_hash { user.password_hash = hash; }
        Ok(user.clone())
    }

    /// Delete a user and every micropost they own.
    pub fn delete_user(&self, id: UserId) -> Result<(), AppError> {
        let mut inner = self.0.write();
        let Some(user) = inner.users.remove(&id) else {
            return Err(user_not_found());
        };
        inner.email_index.remove(&user.email);
        let before = inner.posts.len();
        inner.posts.retain(|_, p| p.user_id != id);
        info!(target: "store", "user.delete id={} cascaded_posts={}", id, before - inner.posts.len());
        Ok(())
    }

    /// The administrative elevation path. Not reachable through field binding.
    pub fn set_admin(&self, id: UserId, admin: bool) -> Result<(), AppError> {
        let mut inner = self.0.write();
        let user = inner.users.get_mut(&id).ok_or_else(user_not_found)?;
        user.admin = admin;
        info!(target: "store", "user.set_admin id={} admin={}", id, admin);
        Ok(())
    }

    pub fn create_post(&self, owner: UserId, content: &str) -> Result<Micropost, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::user("missing_field", "content is required"));
        }
        let mut inner = self.0.write();
        if !inner.users.contains_key(&owner) {
            return Err(user_not_found());
        }
        let post = Micropost { id: MicropostId::new(), user_id: owner, content: content.to_string() };
        inner.posts.insert(post.id, post.clone());
        Ok(post)
    }

    pub fn find_post(&self, id: MicropostId) -> Option<Micropost> {
        self.0.read().posts.get(&id).cloned()
    }

    pub fn delete_post(&self, id: MicropostId) -> Result<(), AppError> {
        let mut inner = self.0.write();
        inner.posts.remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found("micropost_not_found", "no such micropost"))
    }

    pub fn posts_of(&self, owner: UserId) -> Vec<Micropost> {
        self.0.read().posts.values().filter(|p| p.user_id == owner).cloned().collect()
    }
}

fn user_not_found() -> AppError {
    AppError::not_found("user_not_found", "no such user")
}
