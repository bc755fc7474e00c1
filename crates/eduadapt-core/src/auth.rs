//! Registration and login.
//!
//! Passwords are compared by plain equality. There is no lockout, rate
//! limiting or password policy.

use tracing::{info, warn};

use crate::error::{EduError, Result};
use crate::model::{require, Credential, Role};
use crate::store::Records;

/// Registers a new credential.
///
/// Usernames are unique across all roles.
///
/// # Errors
///
/// Returns `EduError::Validation` for an empty username or password and
/// `EduError::UserExists` if the username is already registered.
pub fn register(records: &Records, username: &str, password: &str, role: Role) -> Result<()> {
    require("username", username)?;
    require("password", password)?;

    let credential = Credential {
        username: username.trim().to_string(),
        password: password.to_string(),
        role,
    };
    if let Err(e) = records.insert_credential(&credential) {
        warn!(username = %credential.username, error = %e, "Registration rejected");
        return Err(e);
    }

    info!(username = %credential.username, %role, "Registered user");
    Ok(())
}

/// Checks a username, password and role against the stored credential.
///
/// The role is part of the contract: a student credential cannot log into
/// the teacher workflow even with the right password.
///
/// # Errors
///
/// Returns `UserNotFound`, `WrongPassword` or `WrongRole`, checked in that order.
pub fn login(records: &Records, username: &str, password: &str, role: Role) -> Result<()> {
    require("username", username)?;
    require("password", password)?;

    let username = username.trim();
    let credential = records
        .credential(username)?
        .ok_or_else(|| EduError::user_not_found(username))?;

    if credential.password != password {
        warn!(username, "Login rejected: wrong password");
        return Err(EduError::WrongPassword);
    }
    if credential.role != role {
        warn!(username, expected = %role, "Login rejected: wrong role");
        return Err(EduError::WrongRole { expected: role });
    }

    info!(username, %role, "User logged in");
    Ok(())
}
