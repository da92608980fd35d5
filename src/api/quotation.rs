use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::api::customer::fetch_customer;
use crate::api::invoice::{NewInvoice, fetch_invoice, insert_invoice, office_today};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{AppError, AppResult, db_error, is_duplicate_key};
use crate::model::quotation::{Quotation, QuotationRow, QuotationStatus};
use crate::models::page_bounds;
use crate::service::billing::{BillingError, LineItem, Totals, compute_totals};

const QUOTATION_COLUMNS: &str = r#"
    id, customer_id, items, subtotal, tax, total, status, notes, valid_until, created_by, created_at
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateQuotation {
    #[schema(example = 1)]
    pub customer_id: u64,
    pub items: Vec<LineItem>,
    pub notes: Option<String>,
    #[schema(example = "2026-02-01", format = "date", value_type = Option<String>)]
    pub valid_until: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct QuotationStatusBody {
    #[schema(example = "sent")]
    pub status: QuotationStatus,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct ConvertBody {
    #[schema(example = "2026-02-15", format = "date", value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct QuotationFilter {
    pub status: Option<QuotationStatus>,
    pub customer_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct QuotationListResponse {
    pub data: Vec<Quotation>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

fn decode(row: QuotationRow) -> AppResult<Quotation> {
    let id = row.id;
    Quotation::try_from(row).map_err(|e| {
        error!(error = %e, quotation_id = id, "Corrupt quotation row");
        AppError::Internal
    })
}

async fn fetch_quotation(pool: &MySqlPool, id: u64) -> AppResult<Option<Quotation>> {
    sqlx::query_as::<_, QuotationRow>(&format!(
        "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch quotation"))?
    .map(decode)
    .transpose()
}

/// Create a quotation; totals are computed server-side (admin)
#[utoipa::path(
    post,
    path = "/api/quotations",
    request_body = CreateQuotation,
    responses(
        (status = 201, body = Quotation),
        (status = 400, description = "Invalid line items or unknown customer", body = Object, example = json!({
            "message": "Line item 2: quantity must be greater than zero"
        })),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn create_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateQuotation>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let body = body.into_inner();
    let Totals { subtotal, tax, total } = compute_totals(&body.items)?;

    if fetch_customer(pool.get_ref(), body.customer_id).await?.is_none() {
        return Err(AppError::bad_request("Unknown customer"));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO quotations
            (customer_id, items, subtotal, tax, total, status, notes, valid_until, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(body.customer_id)
    .bind(Json(&body.items))
    .bind(subtotal)
    .bind(tax)
    .bind(total)
    .bind(QuotationStatus::Draft.as_ref())
    .bind(body.notes.as_deref().map(str::trim))
    .bind(body.valid_until)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to create quotation"))?
    .last_insert_id();

    info!(quotation_id = id, %total, by = auth.user_id, "Quotation created");

    let quotation = fetch_quotation(pool.get_ref(), id)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Created().json(quotation))
}

#[utoipa::path(
    get,
    path = "/api/quotations",
    params(QuotationFilter),
    responses((status = 200, body = QuotationListResponse)),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn list_quotations(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<QuotationFilter>,
) -> AppResult<impl Responder> {
    let (page, per_page, offset) = page_bounds(query.page, query.per_page);
    let status = query.status.map(|s| s.to_string());

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM quotations
        WHERE (? IS NULL OR status = ?) AND (? IS NULL OR customer_id = ?)
        "#,
    )
    .bind(status.as_deref())
    .bind(status.as_deref())
    .bind(query.customer_id)
    .bind(query.customer_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(db_error("Failed to count quotations"))?;

    let data = sqlx::query_as::<_, QuotationRow>(&format!(
        r#"
        SELECT {QUOTATION_COLUMNS} FROM quotations
        WHERE (? IS NULL OR status = ?) AND (? IS NULL OR customer_id = ?)
        ORDER BY created_at DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(status.as_deref())
    .bind(status.as_deref())
    .bind(query.customer_id)
    .bind(query.customer_id)
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list quotations"))?
    .into_iter()
    .map(decode)
    .collect::<AppResult<Vec<_>>>()?;

    Ok(HttpResponse::Ok().json(QuotationListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/quotations/{id}",
    params(("id" = u64, Path, description = "Quotation id")),
    responses(
        (status = 200, body = Quotation),
        (status = 404, description = "Quotation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn get_quotation(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let quotation = fetch_quotation(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("Quotation not found"))?;
    Ok(HttpResponse::Ok().json(quotation))
}

/// Move a quotation between draft, sent, accepted and rejected (admin)
#[utoipa::path(
    put,
    path = "/api/quotations/{id}/status",
    params(("id" = u64, Path, description = "Quotation id")),
    request_body = QuotationStatusBody,
    responses(
        (status = 200, body = Quotation),
        (status = 404, description = "Quotation not found"),
        (status = 409, description = "Status change not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn update_quotation_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<QuotationStatusBody>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();

    let current = fetch_quotation(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Quotation not found"))?;
    let next = current.status.transition(body.status)?;

    let changed = sqlx::query("UPDATE quotations SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_ref())
        .bind(id)
        .bind(current.status.as_ref())
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to update quotation status"))?
        .rows_affected();

    if changed == 0 {
        return Err(AppError::conflict("Quotation status changed concurrently"));
    }
    info!(quotation_id = id, status = %next, by = auth.user_id, "Quotation status updated");

    let quotation = fetch_quotation(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Quotation not found"))?;
    Ok(HttpResponse::Ok().json(quotation))
}

/// Turn a sent or accepted quotation into an invoice (admin)
#[utoipa::path(
    post,
    path = "/api/quotations/{id}/convert",
    params(("id" = u64, Path, description = "Quotation id")),
    request_body = ConvertBody,
    responses(
        (status = 201, body = crate::model::invoice::Invoice),
        (status = 404, description = "Quotation not found"),
        (status = 409, description = "Already converted or not convertible")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn convert_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    body: Option<web::Json<ConvertBody>>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();
    let due_date = body.map(|b| b.into_inner()).unwrap_or_default().due_date;

    let mut tx = pool
        .begin()
        .await
        .map_err(db_error("Failed to start conversion"))?;

    // Row lock keeps two conversions of the same quotation serialized.
    let quotation = sqlx::query_as::<_, QuotationRow>(&format!(
        "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = ? FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error("Failed to lock quotation"))?
    .map(decode)
    .transpose()?
    .ok_or_else(|| AppError::not_found("Quotation not found"))?;

    if !quotation.status.can_convert() {
        return Err(BillingError::NotConvertible(quotation.status.to_string()).into());
    }

    let invoice_id = insert_invoice(
        &mut *tx,
        NewInvoice {
            customer_id: quotation.customer_id,
            quotation_id: Some(quotation.id),
            items: quotation.items,
            totals: Totals {
                subtotal: quotation.subtotal,
                tax: quotation.tax,
                total: quotation.total,
            },
            due_date,
            created_by: auth.user_id,
        },
        office_today(&config),
    )
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::conflict("Quotation already converted")
        } else {
            error!(error = %e, quotation_id = id, "Failed to insert invoice");
            AppError::Internal
        }
    })?;

    sqlx::query("UPDATE quotations SET status = ? WHERE id = ?")
        .bind(QuotationStatus::Converted.as_ref())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to mark quotation converted"))?;

    tx.commit()
        .await
        .map_err(db_error("Failed to commit conversion"))?;

    info!(quotation_id = id, invoice_id, by = auth.user_id, "Quotation converted");

    let invoice = fetch_invoice(pool.get_ref(), invoice_id)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Created().json(invoice))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{bearer, lazy_pool, peer, test_app};
    use actix_web::{http::StatusCode, test as actix_test};

    #[actix_web::test]
    async fn zero_quantity_line_is_rejected() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/quotations")
            .insert_header(bearer("admin"))
            .set_json(serde_json::json!({
                "customer_id": 1,
                "items": [
                    { "description": "Printer", "quantity": "1", "unit_price": "4500" },
                    { "description": "Paper", "quantity": "0", "unit_price": "50" }
                ]
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "Line item 2: quantity must be greater than zero");
    }

    #[actix_web::test]
    async fn employees_cannot_convert() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/quotations/1/convert")
            .insert_header(bearer("employee"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
