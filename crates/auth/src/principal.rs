use serde::{Deserialize, Serialize};

use labstock_core::ActorId;

use crate::Role;

/// An authenticated actor, as resolved by whatever session layer sits in front.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn student(id: ActorId) -> Self {
        Self::new(id, Role::Student)
    }

    pub fn staff(id: ActorId) -> Self {
        Self::new(id, Role::Staff)
    }

    pub fn admin(id: ActorId) -> Self {
        Self::new(id, Role::Admin)
    }

    /// `true` when `other` is this actor's own id.
    pub fn is(&self, other: ActorId) -> bool {
        self.id == other
    }
}

