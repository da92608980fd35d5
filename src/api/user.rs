use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::auth::handlers::{fetch_user, revoke_sessions};
use crate::auth::password::{check_password_strength, hash_password};
use crate::error::{AppError, AppResult, db_error, is_duplicate_key};
use crate::model::role::Role;
use crate::model::user::User;
use crate::models::page_bounds;
use crate::utils::db_utils::{ColumnKind, build_update_sql, execute_update};
use crate::utils::{email_cache, email_filter};

/// Columns an admin may patch through `PUT /users/{id}`.
const UPDATABLE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("display_name", ColumnKind::RequiredText),
    ("phone", ColumnKind::Text),
    ("department", ColumnKind::RequiredText),
    ("is_active", ColumnKind::Bool),
];

/// Columns copied into issued tokens; changing one ends the user's sessions.
const SESSION_COLUMNS: &[&str] = &["display_name", "department", "is_active"];

fn touches_session(payload: &Value) -> bool {
    payload
        .as_object()
        .is_some_and(|obj| SESSION_COLUMNS.iter().any(|c| obj.contains_key(*c)))
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "asha@company.com")]
    pub email: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
    #[schema(example = "Asha Raman")]
    pub display_name: String,
    pub phone: Option<String>,
    #[schema(example = "Sales")]
    pub department: String,
    #[schema(example = "employee")]
    pub role: Role,
}

#[derive(Deserialize, IntoParams)]
pub struct UserFilter {
    pub department: Option<String>,
    /// `master_admin`, `admin` or `employee`
    pub role: Option<String>,
    /// Matches display name or email
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<User>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    }
}

/// true => email AVAILABLE
///
/// Filter answers "definitely unused" cheaply, the owner cache answers "taken"
/// cheaply, and only the remainder reaches the database.
async fn is_email_available(email: &str, pool: &MySqlPool) -> AppResult<bool> {
    if !email_filter::might_exist(email) {
        return Ok(true);
    }

    if email_cache::owner(email).await.is_some() {
        return Ok(false);
    }

    let owner = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE email = ? LIMIT 1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to check email availability"))?;

    match owner {
        Some(user_id) => {
            email_cache::remember(email, user_id).await;
            Ok(false)
        }
        None => Ok(true),
    }
}

/// Create a user account (admin)
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, body = User),
        (status = 400, description = "Invalid payload or weak password"),
        (status = 403, description = "Role cannot be assigned by caller"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateUser>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let body = body.into_inner();

    if !auth.role.can_assign(body.role) {
        return Err(AppError::forbidden(format!(
            "{} cannot create {} accounts",
            auth.role, body.role
        )));
    }

    let email = email_filter::normalize(&body.email);
    if !looks_like_email(&email) {
        return Err(AppError::bad_request("A valid email is required"));
    }
    let display_name = body.display_name.trim();
    let department = body.department.trim();
    if display_name.is_empty() || department.is_empty() {
        return Err(AppError::bad_request("display_name and department are required"));
    }
    check_password_strength(&body.password).map_err(AppError::bad_request)?;

    if !is_email_available(&email, pool.get_ref()).await? {
        return Err(AppError::conflict("Email already registered"));
    }

    let hashed = hash_password(&body.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        AppError::Internal
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password, display_name, phone, department, role)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&email)
    .bind(&hashed)
    .bind(display_name)
    .bind(body.phone.as_deref().map(str::trim))
    .bind(department)
    .bind(body.role.as_ref())
    .execute(pool.get_ref())
    .await;

    let user_id = match result {
        Ok(done) => done.last_insert_id(),
        Err(e) if is_duplicate_key(&e) => {
            return Err(AppError::conflict("Email already registered"));
        }
        Err(e) => {
            error!(error = %e, "Failed to create user");
            return Err(AppError::Internal);
        }
    };

    email_filter::insert(&email);
    email_cache::remember(&email, user_id).await;
    info!(user_id, role = %body.role, by = auth.user_id, "User created");

    let user = fetch_user(pool.get_ref(), user_id)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Created().json(user))
}

/// List users (admin)
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserFilter),
    responses(
        (status = 200, body = UserListResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserFilter>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let (page, per_page, offset) = page_bounds(query.page, query.per_page);

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<String> = Vec::new();

    if let Some(department) = query.department.as_deref() {
        where_sql.push_str(" AND department = ?");
        args.push(department.trim().to_string());
    }
    if let Some(role) = query.role.as_deref() {
        let role = Role::from_str(role.trim())
            .map_err(|_| AppError::bad_request(format!("Unknown role '{role}'")))?;
        where_sql.push_str(" AND role = ?");
        args.push(role.to_string());
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        where_sql.push_str(" AND (display_name LIKE ? OR email LIKE ?)");
        let pattern = format!("%{search}%");
        args.push(pattern.clone());
        args.push(pattern);
    }

    let count_sql = format!("SELECT COUNT(*) FROM users{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = count_q.bind(arg.as_str());
    }
    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count users"))?;

    let data_sql = format!(
        r#"
        SELECT id, email, display_name, phone, department, role, is_active, created_at
        FROM users{where_sql}
        ORDER BY display_name
        LIMIT ? OFFSET ?
        "#
    );
    let mut data_q = sqlx::query_as::<_, User>(&data_sql);
    for arg in args {
        data_q = data_q.bind(arg);
    }
    let data = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to list users"))?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Fetch a user (admin)
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, body = User),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let user = fetch_user(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(user))
}

/// Partially update a user (admin). Set `is_active=false` to deactivate.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    request_body(content = Object, example = json!({ "department": "Operations", "is_active": false })),
    responses(
        (status = 200, body = User),
        (status = 400, description = "Unknown or invalid field"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    let update = build_update_sql("users", &body, UPDATABLE_COLUMNS, "id", user_id)?;

    let target = fetch_user(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let target_role = Role::from_str(&target.role).map_err(|e| {
        error!(error = %e, user_id, "Stored role is invalid");
        AppError::Internal
    })?;
    // Admins manage employees; only a master admin touches admin accounts.
    if !auth.role.can_assign(target_role) {
        return Err(AppError::forbidden("Cannot modify this account"));
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(db_error("Failed to update user"))?;

    if touches_session(&body) {
        let revoked = revoke_sessions(pool.get_ref(), user_id)
            .await
            .map_err(db_error("Failed to revoke sessions"))?;
        info!(user_id, revoked, "Refresh tokens revoked after account change");
    }

    info!(user_id, by = auth.user_id, "User updated");

    let user = fetch_user(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer, lazy_pool, peer, test_app};
    use actix_web::{http::StatusCode, test as actix_test};

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("asha@company.com"));
        assert!(!looks_like_email("asha.company.com"));
        assert!(!looks_like_email("@company.com"));
        assert!(!looks_like_email("asha@localhost"));
        assert!(!looks_like_email("as ha@company.com"));
    }

    #[test]
    fn deactivation_and_transfers_end_sessions() {
        assert!(touches_session(&serde_json::json!({ "is_active": false })));
        assert!(touches_session(&serde_json::json!({ "department": "Operations" })));
        assert!(!touches_session(&serde_json::json!({ "phone": "+914400000000" })));
    }

    #[actix_web::test]
    async fn admin_cannot_create_another_admin() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/users")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({
                "email": "new.admin@company.com",
                "password": "long-enough",
                "display_name": "New Admin",
                "department": "HR",
                "role": "admin"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn weak_password_is_refused_before_any_query() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/users")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({
                "email": "newbie@company.com",
                "password": "short",
                "display_name": "Newbie",
                "department": "Sales",
                "role": "employee"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn cached_owner_short_circuits_duplicate_email() {
        email_filter::insert("taken.once@company.com");
        email_cache::remember("taken.once@company.com", 11).await;

        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/users")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({
                "email": "Taken.Once@company.com",
                "password": "long-enough",
                "display_name": "Second Try",
                "department": "Sales",
                "role": "employee"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn employees_cannot_list_users() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::get()
            .peer_addr(peer())
            .uri("/api/users")
            .insert_header(bearer("employee"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn role_column_is_not_patchable() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::put()
            .peer_addr(peer())
            .uri("/api/users/5")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({ "role": "master_admin" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
