//! `labstock-auth`: authorization boundary for lab actors.
//!
//! This crate is intentionally decoupled from HTTP, sessions and storage: it
//! only answers "may this actor do that?".

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, authorize, authorize_all};
pub use permissions::Permission;
pub use principal::Actor;
pub use roles::Role;
