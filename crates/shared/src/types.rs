//! Common types used across Bazaar

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Roles
// =============================================================================

/// Marketplace account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Provider,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Provider => "provider",
            Role::Customer => "customer",
        }
    }

    /// Parse the role as stored in the `users.role` column.
    /// Unknown values are treated as `None` rather than defaulting to a role.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "provider" => Some(Role::Provider),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Identities
// =============================================================================

/// The authenticated caller of a core operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Directory view of an account, as resolved by the user service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub role: Role,
    pub is_active: bool,
    pub is_restricted: bool,
}

impl Account {
    /// Whether the account may receive broadcast traffic
    pub fn is_reachable(&self) -> bool {
        self.is_active && !self.is_restricted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_column_value() {
        for role in [Role::Admin, Role::Provider, Role::Customer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Provider).unwrap();
        assert_eq!(json, r#""provider""#);
    }

    #[test]
    fn test_restricted_account_is_not_reachable() {
        let account = Account {
            id: Uuid::new_v4(),
            role: Role::Customer,
            is_active: true,
            is_restricted: true,
        };
        assert!(!account.is_reachable());
    }
}
