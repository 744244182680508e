use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "loans.checkout.self").
/// The wildcard permission `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const WILDCARD: Permission = Permission::from_static("*");

pub const CATALOG_READ: Permission = Permission::from_static("catalog.read");
pub const CATALOG_WRITE: Permission = Permission::from_static("catalog.write");

/// Check out on one's own behalf.
pub const CHECKOUT_SELF: Permission = Permission::from_static("loans.checkout.self");
/// Check out on behalf of any borrower.
pub const CHECKOUT_ANY: Permission = Permission::from_static("loans.checkout.any");
pub const RETURN_SELF: Permission = Permission::from_static("loans.return.self");
pub const RETURN_ANY: Permission = Permission::from_static("loans.return.any");
pub const MARK_LOST: Permission = Permission::from_static("loans.mark_lost");

pub const WRITE_OFF: Permission = Permission::from_static("stock.write_off");
