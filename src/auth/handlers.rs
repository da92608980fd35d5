use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Executor, MySql, MySqlPool};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        auth::{AuthUser, bearer_token},
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{check_password_strength, hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult, db_error},
    model::user::User,
    models::{LoginReqDto, PasswordResetConfirm, PasswordResetReq, TokenType, UserSql},
};

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

const USER_SQL_COLUMNS: &str = "id, email, password, display_name, department, role, is_active";

/// Token identity for a stored account; deactivated accounts get none.
fn active_subject(user: UserSql) -> Option<TokenSubject> {
    user.is_active.then(|| TokenSubject {
        user_id: user.id,
        email: user.email,
        role: user.role,
        name: user.display_name,
        department: user.department,
    })
}

/// Revokes every live refresh token of `user_id`.
pub async fn revoke_sessions<'e, E>(executor: E, user_id: u64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let result =
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ? AND revoked = FALSE")
            .bind(user_id)
            .execute(executor)
            .await?;
    Ok(result.rows_affected())
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    error!(error = %e, "Failed to sign token");
    AppError::Internal
}

/// Issues an access/refresh pair and persists the refresh jti.
async fn issue_token_pair(
    subject: &TokenSubject,
    pool: &MySqlPool,
    config: &Config,
) -> AppResult<LoginResponse> {
    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl)
            .map_err(token_error)?;

    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(token_error)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(db_error("Failed to store refresh token"))?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
    })
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(AppError::bad_request("Email and password required"));
    }

    let email = user.email.trim().to_lowercase();

    let db_user = sqlx::query_as::<_, UserSql>(&format!(
        "SELECT {USER_SQL_COLUMNS} FROM users WHERE email = ?"
    ))
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Database error while fetching user"))?;

    let Some(db_user) = db_user else {
        info!("Invalid credentials: user not found");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let Some(subject) = active_subject(db_user) else {
        info!("Login refused: account deactivated");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    let tokens = issue_token_pair(&subject, pool.get_ref(), &config).await?;

    // Non-fatal.
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(subject.user_id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = subject.user_id, "Login successful");

    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = LoginResponse),
        (status = 401, description = "Refresh token missing, invalid or revoked")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let token = bearer_token(&req).ok_or_else(|| AppError::Unauthorized("No token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    // Revoking is the existence check: only a live jti flips.
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to revoke refresh token"))?;

    if revoked.rows_affected() == 0 {
        return Err(AppError::Unauthorized("Refresh token revoked".into()));
    }

    // Role, department and activation are read fresh, never carried over from the old claims.
    let db_user = sqlx::query_as::<_, UserSql>(&format!(
        "SELECT {USER_SQL_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(claims.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to reload user for refresh"))?;

    let Some(subject) = db_user.and_then(active_subject) else {
        info!(user_id = claims.user_id, "Refresh refused: account missing or deactivated");
        return Err(AppError::Unauthorized("Account is deactivated".into()));
    };

    let tokens = issue_token_pair(&subject, pool.get_ref(), &config).await?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out (always)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let Ok(claims) = verify_token(token, &config.jwt_secret) else {
        return HttpResponse::NoContent().finish();
    };

    // Only refresh tokens can log out.
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

/// Request a password reset token
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = PasswordResetReq,
    responses((status = 202, description = "Accepted whether or not the email exists")),
    tag = "Auth"
)]
pub async fn request_password_reset(
    body: web::Json<PasswordResetReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let email = body.email.trim().to_lowercase();
    let accepted = HttpResponse::Accepted().json(json!({
        "message": "If the account exists, a reset link has been sent"
    }));

    let user_id = sqlx::query_scalar::<_, u64>(
        "SELECT id FROM users WHERE email = ? AND is_active = TRUE",
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to look up user for password reset"))?;

    let Some(user_id) = user_id else {
        return Ok(accepted);
    };

    let token = Uuid::new_v4().to_simple().to_string();
    let expires_at = Utc::now() + Duration::seconds(config.password_reset_ttl);

    sqlx::query("INSERT INTO password_resets (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(&token)
        .bind(expires_at)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to store password reset token"))?;

    // Mail delivery belongs to the outbound mailer; the token is only logged here.
    debug!(user_id, reset_token = %token, "Password reset token issued");

    Ok(accepted)
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Token invalid, used or expired, or weak password")
    ),
    tag = "Auth"
)]
pub async fn confirm_password_reset(
    body: web::Json<PasswordResetConfirm>,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    check_password_strength(&body.new_password).map_err(AppError::bad_request)?;

    let hashed = hash_password(&body.new_password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        AppError::Internal
    })?;

    let mut tx = pool
        .begin()
        .await
        .map_err(db_error("Failed to open transaction"))?;

    let user_id = sqlx::query_scalar::<_, u64>(
        r#"
        SELECT user_id FROM password_resets
        WHERE token = ? AND used = FALSE AND expires_at > NOW()
        FOR UPDATE
        "#,
    )
    .bind(&body.token)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error("Failed to look up reset token"))?
    .ok_or_else(|| AppError::bad_request("Reset token is invalid or expired"))?;

    sqlx::query("UPDATE password_resets SET used = TRUE WHERE token = ?")
        .bind(&body.token)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to consume reset token"))?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(&hashed)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update password"))?;

    // Existing sessions end with the old password.
    revoke_sessions(&mut *tx, user_id)
        .await
        .map_err(db_error("Failed to revoke sessions"))?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit password reset"))?;

    info!(user_id, "Password reset completed");

    Ok(HttpResponse::Ok().json(json!({ "message": "Password updated" })))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfile {
    #[schema(example = "Asha R.")]
    pub display_name: Option<String>,
    #[schema(example = "+919800000000")]
    pub phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

pub async fn fetch_user(pool: &MySqlPool, user_id: u64) -> AppResult<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, display_name, phone, department, role, is_active, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch user"))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, body = User),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<impl Responder> {
    let user = fetch_user(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(user))
}

/// Update own display name or phone
#[utoipa::path(
    put,
    path = "/api/me",
    request_body = UpdateProfile,
    responses(
        (status = 200, body = User),
        (status = 400, description = "Nothing to update")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn update_me(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<UpdateProfile>,
) -> AppResult<impl Responder> {
    if body.display_name.is_none() && body.phone.is_none() {
        return Err(AppError::bad_request("No fields provided for update"));
    }
    if body
        .display_name
        .as_deref()
        .is_some_and(|n| n.trim().is_empty())
    {
        return Err(AppError::bad_request("display_name cannot be empty"));
    }

    sqlx::query(
        r#"
        UPDATE users
        SET display_name = COALESCE(?, display_name),
            phone = COALESCE(?, phone)
        WHERE id = ?
        "#,
    )
    .bind(body.display_name.as_deref().map(str::trim))
    .bind(body.phone.as_deref())
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to update profile"))?;

    let user = fetch_user(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(user))
}

/// Change own password
#[utoipa::path(
    put,
    path = "/api/me/password",
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Weak password"),
        (status = 401, description = "Current password wrong")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<ChangePassword>,
) -> AppResult<impl Responder> {
    check_password_strength(&body.new_password).map_err(AppError::bad_request)?;

    let stored = sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE id = ?")
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch password hash"))?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if verify_password(&body.current_password, &stored).is_err() {
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }

    let hashed = hash_password(&body.new_password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        AppError::Internal
    })?;

    let mut tx = pool
        .begin()
        .await
        .map_err(db_error("Failed to open transaction"))?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(&hashed)
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to change password"))?;

    let revoked = revoke_sessions(&mut *tx, auth.user_id)
        .await
        .map_err(db_error("Failed to revoke sessions"))?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit password change"))?;

    info!(user_id = auth.user_id, revoked, "Password changed; refresh tokens revoked");

    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed" })))
}
