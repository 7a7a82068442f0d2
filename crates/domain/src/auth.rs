//! Authenticated principals.
//!
//! Identity is issued upstream; services receive the principal explicitly
//! instead of reading ambient request state.

use common::{Role, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A registered marketplace user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

impl User {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            role,
        }
    }

    /// Returns the principal this user authenticates as.
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// The caller of a service operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the principal has `role`.
    pub fn require(&self, role: Role, action: &str) -> Result<(), DomainError> {
        if self.role == role {
            Ok(())
        } else {
            tracing::warn!(user = %self.username, role = %self.role, action, "forbidden");
            Err(DomainError::Forbidden(format!(
                "Only {} users can {action}",
                role.as_str().to_lowercase()
            )))
        }
    }
}
