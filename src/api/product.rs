use actix_web::{HttpResponse, Responder, web};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult, db_error, is_duplicate_key};
use crate::model::product::Product;
use crate::service::billing::MAX_AMOUNT;
use crate::utils::db_utils::{ColumnKind, SqlValue, build_update_sql, execute_update};

const UPDATABLE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("name", ColumnKind::RequiredText),
    ("sku", ColumnKind::RequiredText),
    ("unit_price", ColumnKind::Money),
    ("description", ColumnKind::Text),
];

#[derive(Deserialize, ToSchema)]
pub struct CreateProduct {
    #[schema(example = "Thermal printer")]
    pub name: String,
    #[schema(example = "TP-80")]
    pub sku: String,
    #[schema(example = "4500.00", value_type = String)]
    pub unit_price: Decimal,
    pub description: Option<String>,
}

async fn fetch_product(pool: &MySqlPool, id: u64) -> AppResult<Option<Product>> {
    sqlx::query_as::<_, Product>(
        "SELECT id, name, sku, unit_price, description, created_at FROM products WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch product"))
}

fn check_price(price: &Decimal) -> AppResult<()> {
    if price.is_sign_negative() {
        return Err(AppError::bad_request("unit_price cannot be negative"));
    }
    if *price > MAX_AMOUNT {
        return Err(AppError::bad_request("unit_price is out of range"));
    }
    Ok(())
}

fn sku_conflict(e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::conflict("SKU already exists")
    } else {
        error!(error = %e, "Product write failed");
        AppError::Internal
    }
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProduct,
    responses(
        (status = 201, body = Product),
        (status = 400, description = "Invalid name, sku or price"),
        (status = 409, description = "SKU already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn create_product(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateProduct>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let body = body.into_inner();
    let (name, sku) = (body.name.trim(), body.sku.trim());
    if name.is_empty() || sku.is_empty() {
        return Err(AppError::bad_request("name and sku are required"));
    }
    check_price(&body.unit_price)?;

    let id = sqlx::query(
        "INSERT INTO products (name, sku, unit_price, description) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(sku)
    .bind(body.unit_price.round_dp(2))
    .bind(body.description.as_deref().map(str::trim))
    .execute(pool.get_ref())
    .await
    .map_err(sku_conflict)?
    .last_insert_id();

    info!(product_id = id, sku, by = auth.user_id, "Product created");

    let product = fetch_product(pool.get_ref(), id)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Created().json(product))
}

#[utoipa::path(
    get,
    path = "/api/products",
    responses((status = 200, body = [Product])),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn list_products(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT id, name, sku, unit_price, description, created_at FROM products ORDER BY name",
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list products"))?;
    Ok(HttpResponse::Ok().json(products))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = u64, Path, description = "Product id")),
    responses(
        (status = 200, body = Product),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn get_product(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let product = fetch_product(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = u64, Path, description = "Product id")),
    request_body(content = Object, example = json!({ "unit_price": "4750.00" })),
    responses(
        (status = 200, body = Product),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "SKU already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn update_product(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();
    let update = build_update_sql("products", &body, UPDATABLE_COLUMNS, "id", id)?;

    for value in &update.values {
        if let SqlValue::Decimal(price) = value {
            check_price(price)?;
        }
    }
    if fetch_product(pool.get_ref(), id).await?.is_none() {
        return Err(AppError::not_found("Product not found"));
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(sku_conflict)?;

    let product = fetch_product(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = u64, Path, description = "Product id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn delete_product(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();

    // Line items copy description and price, so old documents survive this.
    let deleted = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to delete product"))?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found("Product not found"));
    }
    info!(product_id = id, by = auth.user_id, "Product deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{bearer, lazy_pool, peer, test_app};
    use actix_web::{http::StatusCode, test as actix_test};

    #[actix_web::test]
    async fn negative_price_is_rejected() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/products")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({ "name": "Cable", "sku": "C-1", "unit_price": "-1.00" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn negative_price_patch_is_rejected() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::put()
            .peer_addr(peer())
            .uri("/api/products/3")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({ "unit_price": "-5" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn price_beyond_column_precision_is_rejected() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/products")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({ "name": "Cable", "sku": "C-1", "unit_price": "10000000000" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "unit_price is out of range");
    }

    #[actix_web::test]
    async fn employees_cannot_create_products() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/products")
            .insert_header(bearer("employee"))
            .set_json(serde_json::json!({ "name": "Cable", "sku": "C-1", "unit_price": "10" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
