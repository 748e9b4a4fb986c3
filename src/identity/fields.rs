//! Privileged-field guard: the only path from externally supplied key/value
//! input to a user record's mutable fields. The admin flag is not on the
//! allow-list and asking for it is a hard security error, not a silent drop.

use serde_json::{Map, Value};
use tracing::error;

use crate::error::AppError;

/// Fields a client may set through generic input binding.
pub const ALLOWED_FIELDS: [&str; 4] = ["name", "email", "password", "password_confirmation"];

/// The privilege flag; mutable only via `SharedStore::set_admin`.
pub const PRIVILEGE_FIELD: &str = "admin";

/// Validated bundle of externally supplied user fields. Absent fields keep
/// their current value on update; registration requires name, email and
/// password to be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

impl UserFields {
    /// Convenience constructor for callers assembling fields in code (tests,
    /// seeding). Confirmation mirrors the password.
    pub fn new(name: &str, email: &str, password: &str) -> Self {
        UserFields {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            password_confirmation: Some(password.to_string()),
        }
    }

    /// Password and confirmation must agree whenever a password is supplied.
    pub fn check_confirmation(&self) -> Result<(), AppError> {
        if self.password.is_some() && self.password != self.password_confirmation {
            return Err(AppError::user("password_mismatch", "password confirmation does not match"));
        }
        Ok(())
    }
}

/// Bind an external field map to [`UserFields`].
///
/// Rejections:
/// - the privilege flag (`admin`), with any value, is a `Security` error and
///   is logged; callers must not be able to probe elevation quietly;
/// - any other key outside [`ALLOWED_FIELDS`] is a `UserInput` error;
/// - non-string values for allowed keys are a `UserInput` error.
pub fn bind_fields(input: &Map<String, Value>) -> Result<UserFields, AppError> {
    // Scan for the privilege flag before any per-key validation so its
    // rejection wins no matter what else the map contains.
    if let Some(value) = input.get(PRIVILEGE_FIELD) {
        error!(target: "identity", "mass assignment attempt on privilege flag (value={})", value);
        return Err(AppError::security(
            "mass_assignment",
            "admin is not assignable through field binding",
        ));
    }
    let mut out = UserFields::default();
    for (key, value) in input.iter() {
        if !ALLOWED_FIELDS.contains(&key.as_str()) {
            return Err(AppError::user("unknown_field", format!("unknown field: {}", key).as_str()));
        }
        let Some(s) = value.as_str() else {
            return Err(AppError::user("invalid_field", format!("field {} must be a string", key).as_str()));
        };
        match key.as_str() {
            "name" => out.name = Some(s.to_string()),
            "email" => out.email = Some(s.to_string()),
            "password" => out.password = Some(s.to_string()),
            "password_confirmation" => out.password_confirmation = Some(s.to_string()),
            _ => unreachable!("allow-list covered above"),
        }
    }
    Ok(out)
}
