//! Role-based access checks used by the route layer

use crate::auth::errors::AuthError;
use crate::auth::models::{Claims, Permission, UserRole};
use tracing::warn;

/// Fails with `Forbidden` unless the token's role is one of `allowed`.
pub fn require_role(claims: &Claims, allowed: &[UserRole]) -> Result<(), AuthError> {
    if allowed.contains(&claims.role) {
        Ok(())
    } else {
        warn!(
            "Forbidden: {} ({}) requires one of {:?}",
            claims.sub, claims.role, allowed
        );
        Err(AuthError::Forbidden)
    }
}

/// Per-operation rule: the permission needed to act on any resource, and whether the
/// resource owner may always act on their own.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    pub permission: Permission,
    pub self_permitted: bool,
}

impl AccessPolicy {
    pub const LIST_USERS: AccessPolicy = AccessPolicy {
        permission: Permission::ListUsers,
        self_permitted: false,
    };

    pub const VIEW_USER: AccessPolicy = AccessPolicy {
        permission: Permission::ViewAnyUser,
        self_permitted: true,
    };

    pub const UPDATE_USER: AccessPolicy = AccessPolicy {
        permission: Permission::UpdateAnyUser,
        self_permitted: true,
    };

    pub const DELETE_USER: AccessPolicy = AccessPolicy {
        permission: Permission::DeleteUser,
        self_permitted: false,
    };

    /// `owner` is the identifier of the resource's owner, when the resource has one.
    pub fn check(&self, claims: &Claims, owner: Option<&str>) -> Result<(), AuthError> {
        if self.self_permitted && owner == Some(claims.sub.as_str()) {
            return Ok(());
        }
        if claims.role.can(self.permission) {
            return Ok(());
        }
        warn!(
            "Forbidden: {} ({}) lacks {:?}",
            claims.sub, claims.role, self.permission
        );
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::TokenType;

    fn claims(sub: &str, role: UserRole) -> Claims {
        Claims::new(sub, role, TokenType::Access, 0, 60)
    }

    #[test]
    fn test_require_role_membership() {
        let moderator = claims("mod@example.com", UserRole::Moderator);
        assert!(require_role(&moderator, &[UserRole::Moderator, UserRole::Admin]).is_ok());
        assert!(matches!(
            require_role(&moderator, &[UserRole::Admin]),
            Err(AuthError::Forbidden)
        ));
        assert!(require_role(&moderator, &[]).is_err());
    }

    #[test]
    fn test_self_access_override() {
        let user = claims("alice@example.com", UserRole::User);

        assert!(AccessPolicy::VIEW_USER.check(&user, Some("alice@example.com")).is_ok());
        assert!(AccessPolicy::UPDATE_USER.check(&user, Some("alice@example.com")).is_ok());
        assert!(AccessPolicy::VIEW_USER.check(&user, Some("bob@example.com")).is_err());

        // Not self-permitted, so ownership does not help.
        assert!(AccessPolicy::DELETE_USER.check(&user, Some("alice@example.com")).is_err());
        assert!(AccessPolicy::LIST_USERS.check(&user, None).is_err());
    }

    #[test]
    fn test_policy_roles_for_other_users_records() {
        let other = Some("other@example.com");
        let user = claims("someone@example.com", UserRole::User);
        let moderator = claims("mod@example.com", UserRole::Moderator);
        let admin = claims("admin@example.com", UserRole::Admin);

        assert!(AccessPolicy::LIST_USERS.check(&user, None).is_err());
        assert!(AccessPolicy::LIST_USERS.check(&moderator, None).is_ok());

        assert!(AccessPolicy::VIEW_USER.check(&moderator, other).is_ok());
        assert!(AccessPolicy::UPDATE_USER.check(&moderator, other).is_err());
        assert!(AccessPolicy::DELETE_USER.check(&moderator, other).is_err());

        assert!(AccessPolicy::UPDATE_USER.check(&admin, other).is_ok());
        assert!(AccessPolicy::DELETE_USER.check(&admin, other).is_ok());
    }
}
