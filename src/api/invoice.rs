use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::api::customer::fetch_customer;
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{AppError, AppResult, db_error, is_duplicate_key};
use crate::model::invoice::{Invoice, InvoiceRow, InvoiceStatus};
use crate::models::page_bounds;
use crate::service::billing::{LineItem, Totals, compute_totals, invoice_number};

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, customer_id, quotation_id, items, subtotal, tax, total,
    status, due_date, created_by, created_at
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateInvoice {
    #[schema(example = 1)]
    pub customer_id: u64,
    pub items: Vec<LineItem>,
    #[schema(example = "2026-02-15", format = "date", value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct InvoiceStatusBody {
    #[schema(example = "paid")]
    pub status: InvoiceStatus,
}

#[derive(Deserialize, IntoParams)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct InvoiceListResponse {
    pub data: Vec<Invoice>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

/// Everything needed to write an `invoices` row.
pub struct NewInvoice {
    pub customer_id: u64,
    pub quotation_id: Option<u64>,
    pub items: Vec<LineItem>,
    pub totals: Totals,
    pub due_date: Option<NaiveDate>,
    pub created_by: u64,
}

/// Inserts on the given connection so conversion can run it inside its transaction.
pub async fn insert_invoice(
    conn: &mut MySqlConnection,
    invoice: NewInvoice,
    issued_on: NaiveDate,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO invoices
            (invoice_number, customer_id, quotation_id, items, subtotal, tax, total, status, due_date, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(invoice_number(issued_on))
    .bind(invoice.customer_id)
    .bind(invoice.quotation_id)
    .bind(Json(&invoice.items))
    .bind(invoice.totals.subtotal)
    .bind(invoice.totals.tax)
    .bind(invoice.totals.total)
    .bind(InvoiceStatus::Unpaid.as_ref())
    .bind(invoice.due_date)
    .bind(invoice.created_by)
    .execute(conn)
    .await?;

    Ok(result.last_insert_id())
}

fn decode(row: InvoiceRow) -> AppResult<Invoice> {
    let id = row.id;
    Invoice::try_from(row).map_err(|e| {
        error!(error = %e, invoice_id = id, "Corrupt invoice row");
        AppError::Internal
    })
}

pub async fn fetch_invoice(pool: &MySqlPool, id: u64) -> AppResult<Option<Invoice>> {
    sqlx::query_as::<_, InvoiceRow>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch invoice"))?
    .map(decode)
    .transpose()
}

/// Issue date for new invoice numbers, on the office calendar.
pub fn office_today(config: &Config) -> NaiveDate {
    Utc::now().with_timezone(&config.office_offset).date_naive()
}

/// Create an invoice directly (admin)
#[utoipa::path(
    post,
    path = "/api/invoices",
    request_body = CreateInvoice,
    responses(
        (status = 201, body = Invoice),
        (status = 400, description = "Invalid line items or unknown customer"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn create_invoice(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<CreateInvoice>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let body = body.into_inner();
    let totals = compute_totals(&body.items)?;

    if fetch_customer(pool.get_ref(), body.customer_id).await?.is_none() {
        return Err(AppError::bad_request("Unknown customer"));
    }

    let mut conn = pool
        .acquire()
        .await
        .map_err(db_error("Failed to acquire connection"))?;

    let new_invoice = NewInvoice {
        customer_id: body.customer_id,
        quotation_id: None,
        items: body.items,
        totals,
        due_date: body.due_date,
        created_by: auth.user_id,
    };
    let id = insert_invoice(&mut *conn, new_invoice, office_today(&config))
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::conflict("Invoice number collision, retry")
            } else {
                error!(error = %e, "Failed to create invoice");
                AppError::Internal
            }
        })?;
    drop(conn);

    info!(invoice_id = id, total = %totals.total, by = auth.user_id, "Invoice created");

    let invoice = fetch_invoice(pool.get_ref(), id)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Created().json(invoice))
}

#[utoipa::path(
    get,
    path = "/api/invoices",
    params(InvoiceFilter),
    responses((status = 200, body = InvoiceListResponse)),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn list_invoices(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<InvoiceFilter>,
) -> AppResult<impl Responder> {
    let (page, per_page, offset) = page_bounds(query.page, query.per_page);
    let status = query.status.map(|s| s.to_string());

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM invoices
        WHERE (? IS NULL OR status = ?) AND (? IS NULL OR customer_id = ?)
        "#,
    )
    .bind(status.as_deref())
    .bind(status.as_deref())
    .bind(query.customer_id)
    .bind(query.customer_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(db_error("Failed to count invoices"))?;

    let data = sqlx::query_as::<_, InvoiceRow>(&format!(
        r#"
        SELECT {INVOICE_COLUMNS} FROM invoices
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
    .map_err(db_error("Failed to list invoices"))?
    .into_iter()
    .map(decode)
    .collect::<AppResult<Vec<_>>>()?;

    Ok(HttpResponse::Ok().json(InvoiceListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/invoices/{id}",
    params(("id" = u64, Path, description = "Invoice id")),
    responses(
        (status = 200, body = Invoice),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn get_invoice(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let invoice = fetch_invoice(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("Invoice not found"))?;
    Ok(HttpResponse::Ok().json(invoice))
}

/// Mark an unpaid invoice paid or cancelled (admin)
#[utoipa::path(
    put,
    path = "/api/invoices/{id}/status",
    params(("id" = u64, Path, description = "Invoice id")),
    request_body = InvoiceStatusBody,
    responses(
        (status = 200, body = Invoice),
        (status = 404, description = "Invoice not found"),
        (status = 409, description = "Status change not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Billing"
)]
pub async fn update_invoice_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<InvoiceStatusBody>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();

    let current = fetch_invoice(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Invoice not found"))?;
    let next = current.status.transition(body.status)?;

    let changed = sqlx::query("UPDATE invoices SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_ref())
        .bind(id)
        .bind(current.status.as_ref())
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to update invoice status"))?
        .rows_affected();

    if changed == 0 {
        return Err(AppError::conflict("Invoice status changed concurrently"));
    }
    info!(invoice_id = id, status = %next, by = auth.user_id, "Invoice status updated");

    let invoice = fetch_invoice(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Invoice not found"))?;
    Ok(HttpResponse::Ok().json(invoice))
}
