use std::collections::HashMap;

use async_trait::async_trait;

/// What a verified requester may do. Admins bypass reservation ownership
/// checks; teachers act only on their own reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Admin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A verified requester: the owner string the engine sees, plus the role
/// the presentation layer maps to the `as_admin` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

/// Credential checking lives at the boundary. The engine never sees
/// passwords, only the resulting owner string and admin flag.
#[async_trait]
pub trait Credentials: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> Option<Identity>;
}

/// Fixed account table for demos and tests. Production credential checking
/// replaces this behind the same trait.
#[derive(Default)]
pub struct StaticCredentials {
    accounts: HashMap<String, (String, Role)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, email: &str, password: &str, role: Role) -> Self {
        self.accounts
            .insert(email.to_string(), (password.to_string(), role));
        self
    }
}

#[async_trait]
impl Credentials for StaticCredentials {
    async fn verify(&self, email: &str, password: &str) -> Option<Identity> {
        let (expected, role) = self.accounts.get(email)?;
        if expected == password {
            Some(Identity {
                email: email.to_string(),
                role: *role,
            })
        } else {
            None
        }
    }
}
