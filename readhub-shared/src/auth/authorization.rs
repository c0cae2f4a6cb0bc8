/// Authorization checks
///
/// Two rules cover the whole platform:
///
/// 1. **Admin-only**: catalogue management, analytics, user administration
/// 2. **Owner or admin**: editing/deleting comments and posts
///
/// ```
/// use readhub_shared::auth::authorization::{require_admin, require_owner_or_admin};
/// use readhub_shared::auth::middleware::AuthContext;
/// use readhub_shared::domain::UserId;
/// use readhub_shared::models::user::UserRole;
///
/// let reader = AuthContext::new(UserId::new(), UserRole::Reader);
/// assert!(require_admin(&reader).is_err());
/// assert!(require_owner_or_admin(&reader, reader.user_id).is_ok());
/// ```

use super::middleware::AuthContext;
use crate::domain::UserId;

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// Caller must be an admin
    #[error("Admin role required")]
    AdminRequired,

    /// Caller does not own the resource
    #[error("Not authorized to modify this resource")]
    NotOwner,
}

/// Requires the caller to be an admin
pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    if auth.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

/// Requires the caller to own the resource, admins always pass
pub fn require_owner_or_admin(auth: &AuthContext, owner_id: UserId) -> Result<(), AuthzError> {
    if auth.user_id == owner_id || auth.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}

/// Requires the caller to own the resource; admins do not bypass this
///
/// Used for edits, where an admin rewriting someone else's words would be
/// misattributed.
pub fn require_owner(auth: &AuthContext, owner_id: UserId) -> Result<(), AuthzError> {
    if auth.user_id == owner_id {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;

    #[test]
    fn test_require_admin() {
        let admin = AuthContext::new(UserId::new(), UserRole::Admin);
        let reader = AuthContext::new(UserId::new(), UserRole::Reader);

        assert!(require_admin(&admin).is_ok());
        assert_eq!(require_admin(&reader), Err(AuthzError::AdminRequired));
    }

    #[test]
    fn test_require_owner_or_admin() {
        let owner = UserId::new();
        let reader = AuthContext::new(owner, UserRole::Reader);
        let stranger = AuthContext::new(UserId::new(), UserRole::Reader);
        let admin = AuthContext::new(UserId::new(), UserRole::Admin);

        assert!(require_owner_or_admin(&reader, owner).is_ok());
        assert!(require_owner_or_admin(&admin, owner).is_ok());
        assert_eq!(require_owner_or_admin(&stranger, owner), Err(AuthzError::NotOwner));
    }

    #[test]
    fn test_require_owner_excludes_admin() {
        let owner = UserId::new();
        let admin = AuthContext::new(UserId::new(), UserRole::Admin);

        assert!(require_owner(&AuthContext::new(owner, UserRole::Reader), owner).is_ok());
        assert_eq!(require_owner(&admin, owner), Err(AuthzError::NotOwner));
    }
}
