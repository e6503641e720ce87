//! # Principals
//!
//! The authenticated caller, as handed over by the identity provider.
//! Admin-only ledger operations take an [`AdminPrincipal`], which can only be
//! obtained from a principal that carries the admin role.

use crate::error::{ShopError, ShopResult};
use crate::ids::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => Err(ShopError::Unauthorized(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    user_id: UserId,
    role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Upgrade to the admin capability, or `Forbidden`
    pub fn into_admin(self) -> ShopResult<AdminPrincipal> {
        if self.is_admin() {
            Ok(AdminPrincipal(self))
        } else {
            Err(ShopError::Forbidden("admin access required".to_string()))
        }
    }
}

/// Proof that the caller holds the admin role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminPrincipal(Principal);

impl AdminPrincipal {
    pub fn user_id(&self) -> UserId {
        self.0.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_upgrade() {
        let admin = Principal::admin(UserId(1)).into_admin().unwrap();
        assert_eq!(admin.user_id(), UserId(1));

        let err = Principal::customer(UserId(2)).into_admin().unwrap_err();
        assert!(matches!(err, ShopError::Forbidden(_)));
    }

    #[test]
    fn test_parse_role() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }
}
