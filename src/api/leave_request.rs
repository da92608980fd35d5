use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult, db_error};
use crate::model::leave_request::{
    EscalationTarget, LeaveDecision, LeaveRequest, LeaveRow, LeaveStatus, LeaveType,
};
use crate::models::page_bounds;
use crate::service::leave_rules::{
    LeaveDraft, balance_for_month, business_days, check_balance, duration_days,
    validate_draft,
};
use crate::service::policy_cache::PolicyCache;
use crate::utils::month::{first_of_month, month_bounds, parse_month};

const LEAVE_COLUMNS: &str = r#"
    id, user_id, user_name, department, leave_type, start_date, end_date, permission_hours,
    reason, status, approved_by, rejected_by, escalated_to, approval_notes, decided_at, created_at
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "casual")]
    pub leave_type: LeaveType,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-06", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "Family function")]
    pub reason: String,
    /// Required for `permission` leave.
    #[schema(example = 2)]
    pub permission_hours: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct DecisionBody {
    #[schema(example = "Enjoy the break")]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct EscalateBody {
    #[schema(example = "HR")]
    pub target: EscalationTarget,
    pub notes: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by user (admins only; employees always see their own)
    pub user_id: Option<u64>,
    /// Filter by leave status
    #[schema(example = "pending")]
    pub status: Option<LeaveStatus>,
    /// Filter by leave type
    pub leave_type: Option<LeaveType>,
    /// Filter by department
    pub department: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    /// Items per page
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct MonthQuery {
    /// `YYYY-MM`; defaults to the current month
    pub month: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveResponse {
    pub id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub department: String,
    pub leave_type: LeaveType,
    #[schema(format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub permission_hours: Option<u32>,
    pub reason: String,
    pub status: LeaveStatus,
    pub approved_by: Option<String>,
    pub rejected_by: Option<String>,
    pub escalated_to: Option<EscalationTarget>,
    pub approval_notes: Option<String>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub decided_at: Option<DateTime<Utc>>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
    /// Calendar days, both ends included
    pub duration_days: u32,
    /// Days excluding Sundays
    pub business_days: u32,
}

impl From<LeaveRequest> for LeaveResponse {
    fn from(l: LeaveRequest) -> Self {
        LeaveResponse {
            duration_days: duration_days(l.start_date, l.end_date),
            business_days: business_days(l.start_date, l.end_date),
            id: l.id,
            user_id: l.user_id,
            user_name: l.user_name,
            department: l.department,
            leave_type: l.leave_type,
            start_date: l.start_date,
            end_date: l.end_date,
            permission_hours: l.permission_hours,
            reason: l.reason,
            status: l.status,
            approved_by: l.approved_by,
            rejected_by: l.rejected_by,
            escalated_to: l.escalated_to,
            approval_notes: l.approval_notes,
            decided_at: l.decided_at,
            created_at: l.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveResponse>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

fn decode_rows(rows: Vec<LeaveRow>) -> AppResult<Vec<LeaveRequest>> {
    rows.into_iter()
        .map(|row| {
            let id = row.id;
            LeaveRequest::try_from(row).map_err(|e| {
                error!(error = %e, leave_id = id, "Corrupt leave row");
                AppError::Internal
            })
        })
        .collect()
}

async fn fetch_leave(pool: &MySqlPool, leave_id: u64) -> AppResult<Option<LeaveRequest>> {
    let row = sqlx::query_as::<_, LeaveRow>(&format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?"
    ))
    .bind(leave_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch leave request"))?;

    Ok(decode_rows(row.into_iter().collect())?.pop())
}

/// The user's leave requests overlapping `from..=to`.
async fn fetch_user_leaves_between(
    pool: &MySqlPool,
    user_id: u64,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<LeaveRequest>> {
    let rows = sqlx::query_as::<_, LeaveRow>(&format!(
        r#"
        SELECT {LEAVE_COLUMNS}
        FROM leave_requests
        WHERE user_id = ? AND start_date <= ? AND end_date >= ?
        "#
    ))
    .bind(user_id)
    .bind(to)
    .bind(from)
    .fetch_all(pool)
    .await
    .map_err(db_error("Failed to fetch leave history"))?;

    decode_rows(rows)
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(content = CreateLeave, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveResponse),
        (status = 400, description = "Invalid dates or insufficient balance", body = Object, example = json!({
            "message": "Insufficient permission hours balance: requested 3 hour(s), 2 remaining for 2024-06"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policies: web::Data<PolicyCache>,
    payload: web::Json<CreateLeave>,
) -> AppResult<impl Responder> {
    let payload = payload.into_inner();
    let draft = LeaveDraft {
        leave_type: payload.leave_type,
        start_date: payload.start_date,
        end_date: payload.end_date,
        reason: payload.reason.trim().to_string(),
        permission_hours: match payload.leave_type {
            LeaveType::Permission => payload.permission_hours,
            _ => None,
        },
    };

    validate_draft(&draft)?;

    let policy = policies
        .lookup(pool.get_ref(), &auth.department)
        .await
        .map_err(db_error("Failed to fetch department policy"))?;

    let (_, window_end) = month_bounds(draft.end_date);
    let existing = fetch_user_leaves_between(
        pool.get_ref(),
        auth.user_id,
        first_of_month(draft.start_date),
        window_end,
    )
    .await?;

    check_balance(&draft, &policy, &existing)?;

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (user_id, user_name, department, leave_type, start_date, end_date, permission_hours, reason)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(&auth.name)
    .bind(&auth.department)
    .bind(draft.leave_type.as_ref())
    .bind(draft.start_date)
    .bind(draft.end_date)
    .bind(draft.permission_hours)
    .bind(&draft.reason)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, user_id = auth.user_id, "Failed to create leave request");
        AppError::Internal
    })?;

    let leave_id = result.last_insert_id();
    info!(leave_id, user_id = auth.user_id, leave_type = %draft.leave_type, "Leave request submitted");

    let created = fetch_leave(pool.get_ref(), leave_id)
        .await?
        .ok_or(AppError::Internal)?;

    Ok(HttpResponse::Created().json(LeaveResponse::from(created)))
}

/// Apply an approver decision; only a pending request moves.
async fn decide(
    auth: &AuthUser,
    pool: &MySqlPool,
    leave_id: u64,
    decision: LeaveDecision,
    notes: Option<String>,
) -> AppResult<LeaveResponse> {
    auth.require_admin()?;

    let current = fetch_leave(pool, leave_id)
        .await?
        .ok_or_else(|| AppError::not_found("Leave request not found"))?;

    let next = current.status.apply(decision)?;
    let notes = notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let (approved_by, rejected_by, escalated_to) = match &decision {
        LeaveDecision::Approve => (Some(auth.name.as_str()), None, None),
        LeaveDecision::Reject => (None, Some(auth.name.as_str()), None),
        LeaveDecision::Escalate(target) => (None, None, Some(target.as_ref())),
    };

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, approved_by = ?, rejected_by = ?, escalated_to = ?,
            approval_notes = ?, decided_at = NOW()
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(next.as_ref())
    .bind(approved_by)
    .bind(rejected_by)
    .bind(escalated_to)
    .bind(notes)
    .bind(leave_id)
    .execute(pool)
    .await
    .map_err(|e| {
        error!(error = %e, leave_id, "Leave decision failed");
        AppError::Internal
    })?;

    // Another approver got there between the read and the write.
    if result.rows_affected() == 0 {
        return Err(AppError::conflict("Leave request already processed"));
    }

    info!(leave_id, status = %next, by = auth.user_id, "Leave request decided");

    let updated = fetch_leave(pool, leave_id)
        .await?
        .ok_or_else(|| AppError::not_found("Leave request not found"))?;
    Ok(LeaveResponse::from(updated))
}

/* =========================
Approve / reject / escalate (admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "ID of the leave request to approve")),
    request_body = DecisionBody,
    responses(
        (status = 200, description = "Leave approved", body = LeaveResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> AppResult<impl Responder> {
    let notes = body.and_then(|b| b.into_inner().notes);
    let leave = decide(&auth, pool.get_ref(), path.into_inner(), LeaveDecision::Approve, notes).await?;
    Ok(HttpResponse::Ok().json(leave))
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "ID of the leave request to reject")),
    request_body = DecisionBody,
    responses(
        (status = 200, description = "Leave rejected", body = LeaveResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> AppResult<impl Responder> {
    let notes = body.and_then(|b| b.into_inner().notes);
    let leave = decide(&auth, pool.get_ref(), path.into_inner(), LeaveDecision::Reject, notes).await?;
    Ok(HttpResponse::Ok().json(leave))
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/escalate",
    params(("leave_id" = u64, Path, description = "ID of the leave request to escalate")),
    request_body = EscalateBody,
    responses(
        (status = 200, description = "Leave escalated", body = LeaveResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn escalate_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<EscalateBody>,
) -> AppResult<impl Responder> {
    let body = body.into_inner();
    let leave = decide(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        LeaveDecision::Escalate(body.target),
        body.notes,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}

#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let leave = fetch_leave(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("Leave request not found"))?;

    auth.require_self_or_admin(leave.user_id)?;

    Ok(HttpResponse::Ok().json(LeaveResponse::from(leave)))
}

// Typed binding for the dynamic WHERE clause.
enum FilterValue {
    U64(u64),
    Str(String),
}

#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> AppResult<impl Responder> {
    let (page, per_page, offset) = page_bounds(query.page, query.per_page);

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(user_id) = auth.scoped_user_id(query.user_id) {
        where_sql.push_str(" AND user_id = ?");
        args.push(FilterValue::U64(user_id));
    }
    if let Some(status) = query.status {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }
    if let Some(leave_type) = query.leave_type {
        where_sql.push_str(" AND leave_type = ?");
        args.push(FilterValue::Str(leave_type.to_string()));
    }
    if let Some(department) = query.department.as_deref() {
        where_sql.push_str(" AND department = ?");
        args.push(FilterValue::Str(department.to_string()));
    }

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
        };
    }
    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count leave requests"))?;

    let data_sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests{where_sql} ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );
    let mut data_q = sqlx::query_as::<_, LeaveRow>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }
    let rows = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch leave list"))?;

    let data = decode_rows(rows)?
        .into_iter()
        .map(LeaveResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Resolves `?month=YYYY-MM`, defaulting to the current month at the office.
pub fn resolve_month(raw: Option<&str>, today: NaiveDate) -> AppResult<NaiveDate> {
    match raw {
        Some(raw) => parse_month(raw).ok_or_else(|| AppError::bad_request("month must be YYYY-MM")),
        None => Ok(first_of_month(today)),
    }
}

#[utoipa::path(
    get,
    path = "/api/leave/balance",
    params(MonthQuery),
    responses(
        (status = 200, description = "Monthly allowance for the caller", body = crate::service::leave_rules::LeaveBalance),
        (status = 400, description = "Bad month")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policies: web::Data<PolicyCache>,
    config: web::Data<crate::config::Config>,
    query: web::Query<MonthQuery>,
) -> AppResult<impl Responder> {
    let today = Utc::now().with_timezone(&config.office_offset).date_naive();
    let month = resolve_month(query.month.as_deref(), today)?;
    let (first, last) = month_bounds(month);

    let policy = policies
        .lookup(pool.get_ref(), &auth.department)
        .await
        .map_err(db_error("Failed to fetch department policy"))?;
    let existing = fetch_user_leaves_between(pool.get_ref(), auth.user_id, first, last).await?;

    Ok(HttpResponse::Ok().json(balance_for_month(&policy, &existing, month)))
}
