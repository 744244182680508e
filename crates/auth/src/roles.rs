use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::permissions::{self, Permission};

/// Role of an actor in the lab.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Permissions granted by this role.
    ///
    /// Students manage their own loans, staff run the lending desk for anyone,
    /// admins hold the wildcard.
    pub fn permissions(&self) -> &'static [Permission] {
        const STUDENT: &[Permission] = &[
            permissions::CATALOG_READ,
            permissions::CHECKOUT_SELF,
            permissions::RETURN_SELF,
        ];
        const STAFF: &[Permission] = &[
            permissions::CATALOG_READ,
            permissions::CHECKOUT_SELF,
            permissions::CHECKOUT_ANY,
            permissions::RETURN_SELF,
            permissions::RETURN_ANY,
            permissions::MARK_LOST,
        ];
        const ADMIN: &[Permission] = &[permissions::WILDCARD];

        match self {
            Role::Student => STUDENT,
            Role::Staff => STAFF,
            Role::Admin => ADMIN,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = labstock_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(labstock_core::DomainError::validation(format!(
                "unknown role '{other}' (expected student, staff or admin)"
            ))),
        }
    }
}
