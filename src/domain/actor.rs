use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ActorId = Uuid;

/// Role of an authenticated user, as supplied by the identity provider.
/// The ledger trusts the caller's identity but performs its own
/// authorization check against this role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }

    /// Only managers and admins may approve or reject transactions.
    pub fn can_approve(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    /// Deleting a pending transaction is an admin-only operation.
    pub fn can_delete(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The already-authenticated caller of a ledger operation.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::Admin, Role::Manager, Role::Staff] {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("owner"), None);
    }

    #[test]
    fn test_approval_permissions() {
        assert!(Role::Admin.can_approve());
        assert!(Role::Manager.can_approve());
        assert!(!Role::Staff.can_approve());
    }

    #[test]
    fn test_delete_is_admin_only() {
        assert!(Role::Admin.can_delete());
        assert!(!Role::Manager.can_delete());
        assert!(!Role::Staff.can_delete());
    }
}
