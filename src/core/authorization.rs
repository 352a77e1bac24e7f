use crate::core::{error::GatewayError, route_table::Access, token::TokenClaims};

/// Check the caller's role against the route's access requirement.
///
/// Only role-restricted routes are checked; a missing identity or role on
/// such a route is a denial.
pub fn authorize(access: &Access, identity: Option<&TokenClaims>) -> Result<(), GatewayError> {
    let Access::Roles(allowed) = access else {
        return Ok(());
    };

    match identity.and_then(|claims| claims.role.as_deref()) {
        Some(role) if allowed.iter().any(|r| r == role) => Ok(()),
        _ => Err(GatewayError::Forbidden),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn claims(role: Option<&str>) -> TokenClaims {
        TokenClaims {
            subject: "u1".to_string(),
            username: None,
            email: None,
            role: role.map(str::to_string),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_routes() {
        let admin_only = Access::Roles(vec!["admin".to_string()]);
        assert!(authorize(&admin_only, Some(&claims(Some("admin")))).is_ok());
        assert!(matches!(
            authorize(&admin_only, Some(&claims(Some("user")))),
            Err(GatewayError::Forbidden)
        ));
        assert!(matches!(
            authorize(&admin_only, Some(&claims(None))),
            Err(GatewayError::Forbidden)
        ));
        assert!(matches!(
            authorize(&admin_only, None),
            Err(GatewayError::Forbidden)
        ));
    }

    #[test]
    fn test_non_role_routes_are_not_checked() {
        assert!(authorize(&Access::Public, None).is_ok());
        assert!(authorize(&Access::Authenticated, Some(&claims(None))).is_ok());
    }
}
