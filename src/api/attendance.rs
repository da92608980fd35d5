use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::api::leave_request::resolve_month;
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{AppError, AppResult, db_error, is_duplicate_key};
use crate::model::attendance::{Attendance, AttendanceRow, AttendanceStatus, WorkLocation};
use crate::service::attendance_rules::{
    CheckOutInput, evaluate_check_in, evaluate_check_out, summarize,
};
use crate::service::geofence::is_within_office;
use crate::service::policy_cache::PolicyCache;
use crate::utils::month::month_bounds;

const ATTENDANCE_COLUMNS: &str = r#"
    id, user_id, date, check_in_time, check_out_time, check_out_date, work_location, is_late, is_overtime,
    late_reason, overtime_reason, location_details, in_office_at_check_out, photo_url, status
"#;

#[derive(Deserialize, ToSchema)]
pub struct CheckInBody {
    #[schema(example = "office")]
    pub work_location: WorkLocation,
    /// Required when checking in after the department's start time.
    #[schema(example = "Traffic on the ring road")]
    pub late_reason: Option<String>,
    #[schema(example = "Client site, Guindy")]
    pub location_details: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckOutBody {
    pub overtime_reason: Option<String>,
    #[schema(example = 13.0827)]
    pub latitude: Option<f64>,
    #[schema(example = 80.2707)]
    pub longitude: Option<f64>,
    /// Required when checking out away from the office.
    #[schema(example = "https://files.example.com/checkout/1234.jpg")]
    pub photo_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckOutResponse {
    pub attendance: Attendance,
    /// Overtime was worked in a department that does not allow it.
    pub unapproved_overtime: bool,
}

#[derive(Deserialize, IntoParams)]
pub struct AttendanceQuery {
    /// `YYYY-MM`; defaults to the current month
    pub month: Option<String>,
    /// Another user's records (admins only)
    pub user_id: Option<u64>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Date and wall-clock time at the office, truncated to whole seconds.
fn office_now(config: &Config) -> (NaiveDate, NaiveTime) {
    let now = Utc::now().with_timezone(&config.office_offset).naive_local();
    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        chrono::Timelike::num_seconds_from_midnight(&now.time()),
        0,
    )
    .unwrap_or(now.time());
    (now.date(), time)
}

fn decode(row: AttendanceRow) -> AppResult<Attendance> {
    let id = row.id;
    Attendance::try_from(row).map_err(|e| {
        error!(error = %e, attendance_id = id, "Corrupt attendance row");
        AppError::Internal
    })
}

async fn fetch_day(pool: &MySqlPool, user_id: u64, date: NaiveDate) -> AppResult<Option<Attendance>> {
    sqlx::query_as::<_, AttendanceRow>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE user_id = ? AND date = ?"
    ))
    .bind(user_id)
    .bind(date)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch attendance"))?
    .map(decode)
    .transpose()
}

/// Latest record still checked in, starting no earlier than `since`.
async fn fetch_open(pool: &MySqlPool, user_id: u64, since: NaiveDate) -> AppResult<Option<Attendance>> {
    sqlx::query_as::<_, AttendanceRow>(&format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS}
        FROM attendance
        WHERE user_id = ? AND status = 'checked_in' AND date >= ?
        ORDER BY date DESC
        LIMIT 1
        "#
    ))
    .bind(user_id)
    .bind(since)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to fetch attendance"))?
    .map(decode)
    .transpose()
}

async fn fetch_month(
    pool: &MySqlPool,
    user_id: u64,
    month: NaiveDate,
) -> AppResult<Vec<Attendance>> {
    let (first, last) = month_bounds(month);
    sqlx::query_as::<_, AttendanceRow>(&format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS}
        FROM attendance
        WHERE user_id = ? AND date BETWEEN ? AND ?
        ORDER BY date
        "#
    ))
    .bind(user_id)
    .bind(first)
    .bind(last)
    .fetch_all(pool)
    .await
    .map_err(db_error("Failed to fetch attendance history"))?
    .into_iter()
    .map(decode)
    .collect()
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = CheckInBody,
    responses(
        (status = 201, description = "Checked in", body = Attendance),
        (status = 400, description = "Late reason missing or off-site not allowed", body = Object, example = json!({
            "message": "Late reason required"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Already checked in today")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    policies: web::Data<PolicyCache>,
    body: web::Json<CheckInBody>,
) -> AppResult<impl Responder> {
    let body = body.into_inner();
    let late_reason = trimmed(body.late_reason);
    let (date, now) = office_now(&config);

    let policy = policies
        .lookup(pool.get_ref(), &auth.department)
        .await
        .map_err(db_error("Failed to fetch department policy"))?;

    let outcome = evaluate_check_in(now, body.work_location, late_reason.as_deref(), &policy)?;

    let result = sqlx::query(
        r#"
        INSERT INTO attendance
            (user_id, date, check_in_time, work_location, is_late, late_reason, location_details, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(date)
    .bind(now)
    .bind(body.work_location.as_ref())
    .bind(outcome.is_late)
    .bind(late_reason.filter(|_| outcome.is_late))
    .bind(trimmed(body.location_details))
    .bind(AttendanceStatus::CheckedIn.as_ref())
    .execute(pool.get_ref())
    .await;

    if let Err(e) = result {
        if is_duplicate_key(&e) {
            return Err(AppError::conflict("Already checked in today"));
        }
        error!(error = %e, user_id = auth.user_id, "Check-in failed");
        return Err(AppError::Internal);
    }

    info!(user_id = auth.user_id, %date, late = outcome.is_late, "Checked in");

    let record = fetch_day(pool.get_ref(), auth.user_id, date)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Created().json(record))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body = CheckOutBody,
    responses(
        (status = 200, description = "Checked out", body = CheckOutResponse),
        (status = 400, description = "No open check-in, missing photo or overtime reason", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    policies: web::Data<PolicyCache>,
    body: web::Json<CheckOutBody>,
) -> AppResult<impl Responder> {
    let body = body.into_inner();
    let overtime_reason = trimmed(body.overtime_reason);
    let photo_url = trimmed(body.photo_url);
    let in_office = is_within_office(body.latitude, body.longitude, &config.office);
    let (date, now) = office_now(&config);

    // A shift may run past midnight, so yesterday's open record still counts.
    let since = date.pred_opt().unwrap_or(date);
    let open = fetch_open(pool.get_ref(), auth.user_id, since)
        .await?
        .ok_or_else(|| AppError::bad_request("No active check-in found for today"))?;

    let policy = policies
        .lookup(pool.get_ref(), &auth.department)
        .await
        .map_err(db_error("Failed to fetch department policy"))?;

    let outcome = evaluate_check_out(
        &CheckOutInput {
            check_in: open.date.and_time(open.check_in_time),
            now: date.and_time(now),
            overtime_reason: overtime_reason.as_deref(),
            in_office,
            photo_url: photo_url.as_deref(),
        },
        &policy,
    )?;

    let result = sqlx::query(
        r#"
        UPDATE attendance
        SET check_out_time = ?, check_out_date = ?, is_overtime = ?, overtime_reason = ?,
            in_office_at_check_out = ?, photo_url = ?, status = ?
        WHERE id = ?
        AND status = 'checked_in'
        "#,
    )
    .bind(now)
    .bind(date)
    .bind(outcome.is_overtime)
    .bind(overtime_reason.filter(|_| outcome.is_overtime))
    .bind(in_office)
    .bind(photo_url)
    .bind(AttendanceStatus::CheckedOut.as_ref())
    .bind(open.id)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Check-out failed"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("No active check-in found for today"));
    }

    if outcome.unapproved_overtime {
        warn!(
            user_id = auth.user_id,
            department = %auth.department,
            "Overtime recorded where the department does not allow it"
        );
    }
    info!(user_id = auth.user_id, date = %open.date, overtime = outcome.is_overtime, in_office, "Checked out");

    let attendance = fetch_day(pool.get_ref(), auth.user_id, open.date)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Ok().json(CheckOutResponse {
        attendance,
        unapproved_overtime: outcome.unapproved_overtime,
    }))
}

/// Caller's record for today
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, body = Attendance),
        (status = 404, description = "Not checked in today")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let (date, _) = office_now(&config);
    let record = fetch_day(pool.get_ref(), auth.user_id, date)
        .await?
        .ok_or_else(|| AppError::not_found("No attendance recorded today"))?;
    Ok(HttpResponse::Ok().json(record))
}

/// Monthly attendance records
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, body = [Attendance]),
        (status = 400, description = "Bad month"),
        (status = 403, description = "Another user's records")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<AttendanceQuery>,
) -> AppResult<impl Responder> {
    let (user_id, month) = resolve_scope(&auth, &config, &query)?;
    let records = fetch_month(pool.get_ref(), user_id, month).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Monthly attendance summary
#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(AttendanceQuery),
    responses(
        (status = 200, body = crate::service::attendance_rules::AttendanceSummary),
        (status = 400, description = "Bad month"),
        (status = 403, description = "Another user's records")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<AttendanceQuery>,
) -> AppResult<impl Responder> {
    let (user_id, month) = resolve_scope(&auth, &config, &query)?;
    let records = fetch_month(pool.get_ref(), user_id, month).await?;
    Ok(HttpResponse::Ok().json(summarize(&records)))
}

fn resolve_scope(
    auth: &AuthUser,
    config: &Config,
    query: &AttendanceQuery,
) -> AppResult<(u64, NaiveDate)> {
    let user_id = query.user_id.unwrap_or(auth.user_id);
    auth.require_self_or_admin(user_id)?;
    let (today, _) = office_now(config);
    let month = resolve_month(query.month.as_deref(), today)?;
    Ok((user_id, month))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer, lazy_pool, peer, test_app};
    use actix_web::{http::StatusCode, test as actix_test};

    #[test]
    fn blank_reasons_count_as_missing() {
        assert_eq!(trimmed(Some("   ".into())), None);
        assert_eq!(trimmed(Some(" bus ".into())), Some("bus".into()));
    }

    #[test]
    fn office_clock_has_no_fractional_seconds() {
        let (_, now) = office_now(&crate::config::test_support::test_config());
        assert_eq!(chrono::Timelike::nanosecond(&now), 0);
    }

    #[actix_web::test]
    async fn employee_cannot_read_someone_elses_summary() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::get()
            .peer_addr(peer())
            .uri("/api/attendance/summary?user_id=424242")
            .insert_header(bearer("employee"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn malformed_month_is_a_bad_request() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::get()
            .peer_addr(peer())
            .uri("/api/attendance?month=June")
            .insert_header(bearer("employee"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn unknown_work_location_is_rejected() {
        let app = actix_test::init_service(test_app(lazy_pool())).await;
        let req = actix_test::TestRequest::post()
            .peer_addr(peer())
            .uri("/api/attendance/check-in")
            .insert_header(bearer("employee"))
            .set_json(serde_json::json!({ "work_location": "beach" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
