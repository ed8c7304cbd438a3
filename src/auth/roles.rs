// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles, ordered by privilege.
///
/// ## Role Hierarchy
///
/// `User < Support < Admin < SuperAdmin`. A handler-declared minimum role
/// passes iff the caller's rank is at least the minimum's rank.
///
/// - `User` - Normal account: deposits, stakes, withdrawals
/// - `Support` - Read access to user records for support tooling
/// - `Admin` - Withdrawal review, pool management
/// - `SuperAdmin` - Treasury mutation, balance adjustments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Support,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Position in the privilege order.
    fn rank(&self) -> u8 {
        match self {
            Role::User => 0,
            Role::Support => 1,
            Role::Admin => 2,
            Role::SuperAdmin => 3,
        }
    }

    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Roles that must have two-factor enabled before login succeeds.
    pub fn requires_two_factor(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_uppercase().as_str() {
            "USER" => Some(Role::User),
            "SUPPORT" => Some(Role::Support),
            "ADMIN" => Some(Role::Admin),
            "SUPER_ADMIN" | "SUPERADMIN" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
}

impl Default for Role {
    /// Default role is User (least privilege).
    fn default() -> Self {
        Role::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Support => write!(f, "SUPPORT"),
            Role::Admin => write!(f, "ADMIN"),
            Role::SuperAdmin => write!(f, "SUPER_ADMIN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_order_is_total() {
        assert!(Role::SuperAdmin.has_privilege(Role::Admin));
        assert!(Role::Admin.has_privilege(Role::Support));
        assert!(Role::Support.has_privilege(Role::User));
        assert!(Role::User.has_privilege(Role::User));

        assert!(!Role::User.has_privilege(Role::Support));
        assert!(!Role::Admin.has_privilege(Role::SuperAdmin));
        assert!(!Role::Support.has_privilege(Role::Admin));
    }

    #[test]
    fn admins_require_two_factor() {
        assert!(Role::Admin.requires_two_factor());
        assert!(Role::SuperAdmin.requires_two_factor());
        assert!(!Role::User.requires_two_factor());
        assert!(!Role::Support.requires_two_factor());
    }

    #[test]
    fn parse_round_trips_display() {
        for role in [Role::User, Role::Support, Role::Admin, Role::SuperAdmin] {
            assert_eq!(Role::parse(&role.to_string()), Some(role));
        }
        assert_eq!(Role::parse("unknown"), None);
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(Role::default(), Role::User);
    }
}
