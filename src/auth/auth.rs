use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};
use std::str::FromStr;

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::role::Role;
use crate::models::{Claims, TokenType};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub department: String,
}

impl TryFrom<Claims> for AuthUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }
        let role = Role::from_str(&claims.role)
            .map_err(|_| AppError::Unauthorized("Invalid role".into()))?;
        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            name: claims.name,
            role,
            department: claims.department,
        })
    }
}

/// Pulls the raw token out of `Authorization: Bearer <token>`.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn authenticate(req: &HttpRequest) -> AppResult<AuthUser> {
    // Set by auth_middleware on protected scopes.
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = bearer_token(req).ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    let config = req.app_data::<Data<Config>>().ok_or_else(|| {
        tracing::error!("Config missing from app data");
        AppError::Internal
    })?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    AuthUser::try_from(claims)
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> AppResult<()> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Admin only"))
        }
    }

    /// Employees may only act on their own records.
    pub fn require_self_or_admin(&self, owner_id: u64) -> AppResult<()> {
        if self.role.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::forbidden("Not allowed to access this record"))
        }
    }

    /// The user whose records a query should cover: admins may ask for anyone,
    /// everybody else is pinned to themselves.
    pub fn scoped_user_id(&self, requested: Option<u64>) -> Option<u64> {
        if self.role.is_admin() {
            requested
        } else {
            Some(self.user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 7,
            email: "asha@company.com".into(),
            name: "Asha".into(),
            role,
            department: "Sales".into(),
        }
    }

    #[test]
    fn approver_roles() {
        assert!(user(Role::Admin).require_admin().is_ok());
        assert!(user(Role::MasterAdmin).require_admin().is_ok());
        assert!(user(Role::Employee).require_admin().is_err());
    }

    #[test]
    fn employees_are_scoped_to_themselves() {
        assert_eq!(user(Role::Employee).scoped_user_id(Some(99)), Some(7));
        assert_eq!(user(Role::Employee).scoped_user_id(None), Some(7));
        assert_eq!(user(Role::Admin).scoped_user_id(None), None);
        assert_eq!(user(Role::Admin).scoped_user_id(Some(99)), Some(99));
    }

    #[test]
    fn owners_and_admins_see_records() {
        assert!(user(Role::Employee).require_self_or_admin(7).is_ok());
        assert!(user(Role::Employee).require_self_or_admin(8).is_err());
        assert!(user(Role::Admin).require_self_or_admin(8).is_ok());
    }

    #[test]
    fn refresh_claims_cannot_authenticate() {
        let claims = Claims {
            user_id: 7,
            sub: "asha@company.com".into(),
            role: "employee".into(),
            name: "Asha".into(),
            department: "Sales".into(),
            exp: usize::MAX,
            jti: "x".into(),
            token_type: TokenType::Refresh,
        };
        assert!(AuthUser::try_from(claims).is_err());
    }
}
