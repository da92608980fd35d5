use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult, db_error};
use crate::model::customer::Customer;
use crate::utils::db_utils::{ColumnKind, build_update_sql, execute_update};

const UPDATABLE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("name", ColumnKind::RequiredText),
    ("email", ColumnKind::Text),
    ("phone", ColumnKind::Text),
    ("address", ColumnKind::Text),
    ("gst_number", ColumnKind::Text),
];

#[derive(Deserialize, ToSchema)]
pub struct CreateCustomer {
    #[schema(example = "Acme Traders")]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gst_number: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct CustomerQuery {
    /// Matches name or email
    pub search: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn fetch_customer(pool: &MySqlPool, id: u64) -> AppResult<Option<Customer>> {
    sqlx::query_as::<_, Customer>(
        "SELECT id, name, email, phone, address, gst_number, created_at FROM customers WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch customer"))
}

#[utoipa::path(
    post,
    path = "/api/customers",
    request_body = CreateCustomer,
    responses(
        (status = 201, body = Customer),
        (status = 400, description = "Name missing"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn create_customer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateCustomer>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let body = body.into_inner();
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Customer name is required"));
    }

    let id = sqlx::query(
        "INSERT INTO customers (name, email, phone, address, gst_number) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(blank_to_none(body.email))
    .bind(blank_to_none(body.phone))
    .bind(blank_to_none(body.address))
    .bind(blank_to_none(body.gst_number))
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to create customer"))?
    .last_insert_id();

    info!(customer_id = id, by = auth.user_id, "Customer created");

    let customer = fetch_customer(pool.get_ref(), id)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Created().json(customer))
}

#[utoipa::path(
    get,
    path = "/api/customers",
    params(CustomerQuery),
    responses((status = 200, body = [Customer])),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn list_customers(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CustomerQuery>,
) -> AppResult<impl Responder> {
    let pattern = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));

    let customers = sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, name, email, phone, address, gst_number, created_at
        FROM customers
        WHERE ? IS NULL OR name LIKE ? OR email LIKE ?
        ORDER BY name
        "#,
    )
    .bind(pattern.as_deref())
    .bind(pattern.as_deref())
    .bind(pattern.as_deref())
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list customers"))?;

    Ok(HttpResponse::Ok().json(customers))
}

#[utoipa::path(
    get,
    path = "/api/customers/{id}",
    params(("id" = u64, Path, description = "Customer id")),
    responses(
        (status = 200, body = Customer),
        (status = 404, description = "Customer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn get_customer(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let customer = fetch_customer(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("Customer not found"))?;
    Ok(HttpResponse::Ok().json(customer))
}

#[utoipa::path(
    put,
    path = "/api/customers/{id}",
    params(("id" = u64, Path, description = "Customer id")),
    request_body(content = Object, example = json!({ "phone": "+914400000000", "gst_number": null })),
    responses(
        (status = 200, body = Customer),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404, description = "Customer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn update_customer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();
    let update = build_update_sql("customers", &body, UPDATABLE_COLUMNS, "id", id)?;

    if fetch_customer(pool.get_ref(), id).await?.is_none() {
        return Err(AppError::not_found("Customer not found"));
    }
    execute_update(pool.get_ref(), update)
        .await
        .map_err(db_error("Failed to update customer"))?;

    let customer = fetch_customer(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Customer not found"))?;
    Ok(HttpResponse::Ok().json(customer))
}

#[utoipa::path(
    delete,
    path = "/api/customers/{id}",
    params(("id" = u64, Path, description = "Customer id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Customer not found"),
        (status = 409, description = "Customer has quotations or invoices")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn delete_customer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();

    let references = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT (SELECT COUNT(*) FROM quotations WHERE customer_id = ?)
             + (SELECT COUNT(*) FROM invoices WHERE customer_id = ?)
        "#,
    )
    .bind(id)
    .bind(id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(db_error("Failed to check customer references"))?;

    if references > 0 {
        return Err(AppError::conflict("Customer has quotations or invoices"));
    }

    let deleted = sqlx::query("DELETE FROM customers WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to delete customer"))?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found("Customer not found"));
    }

    info!(customer_id = id, by = auth.user_id, "Customer deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer, lazy_pool, peer, test_app};
    use actix_web::{http::StatusCode, test as actix_test};

    #[test]
    fn blanks_are_stored_as_null() {
        assert_eq!(blank_to_none(Some("  ".into())), None);
        assert_eq!(blank_to_none(Some(" x ".into())), Some("x".into()));
        assert_eq!(blank_to_none(None), None);
    }

    #[actix_web::test]
    async fn employees_cannot_delete_customers() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::delete()
            .peer_addr(peer())
            .uri("/api/customers/1")
            .insert_header(bearer("employee"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn nameless_customer_is_rejected() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/customers")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({ "name": "   " }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
