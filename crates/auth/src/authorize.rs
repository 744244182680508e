use thiserror::Error;

use labstock_core::DomainError;

use crate::{Actor, Permission};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: {role} is missing permission '{permission}'")]
    Forbidden { role: String, permission: String },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden { permission, .. } => DomainError::forbidden(permission),
        }
    }
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require permissions. Requirements may
/// depend on the actor (e.g. "self" vs "any" borrower), hence the parameter.
pub trait CommandAuthorization {
    fn required_permissions(&self, actor: &Actor) -> Vec<Permission>;
}

/// Authorize an actor for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: &Permission) -> Result<(), AuthzError> {
    let granted = actor.role.permissions();

    if granted
        .iter()
        .any(|p| p.is_wildcard() || p.as_str() == required.as_str())
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: actor.role.to_string(),
            permission: required.as_str().to_string(),
        })
    }
}

/// Authorize every permission a command requires.
pub fn authorize_all<C: CommandAuthorization + ?Sized>(
    actor: &Actor,
    command: &C,
) -> Result<(), AuthzError> {
    for perm in command.required_permissions(actor) {
        authorize(actor, &perm)?;
    }
    Ok(())
}
