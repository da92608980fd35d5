use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveTime;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult, db_error};
use crate::model::department_policy::DepartmentPolicy;
use crate::service::policy_cache::PolicyCache;

#[derive(Deserialize, ToSchema)]
pub struct UpsertPolicy {
    #[schema(example = "09:30")]
    pub required_check_in_time: String,
    #[schema(example = "18:30")]
    pub required_check_out_time: String,
    #[schema(example = "19:30")]
    pub overtime_threshold: Option<String>,
    pub allows_off_site_work: bool,
    pub overtime_allowed: bool,
    #[schema(example = 2)]
    pub max_monthly_permission_hours: u32,
    #[schema(example = 1)]
    pub max_monthly_casual_leaves: u32,
}

/// Accepts `HH:MM` only; policy times are minute-resolution.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M").ok()
}

fn clock_field(name: &str, raw: &str) -> AppResult<NaiveTime> {
    parse_clock(raw).ok_or_else(|| AppError::bad_request(format!("{name} must be HH:MM")))
}

impl UpsertPolicy {
    fn into_policy(self, department: String) -> AppResult<DepartmentPolicy> {
        let check_in = clock_field("required_check_in_time", &self.required_check_in_time)?;
        let check_out = clock_field("required_check_out_time", &self.required_check_out_time)?;
        if check_out <= check_in {
            return Err(AppError::bad_request(
                "required_check_out_time must be after required_check_in_time",
            ));
        }
        let overtime_threshold = self
            .overtime_threshold
            .as_deref()
            .map(|raw| clock_field("overtime_threshold", raw))
            .transpose()?;
        if overtime_threshold.is_some_and(|t| t <= check_in) {
            return Err(AppError::bad_request(
                "overtime_threshold must be after required_check_in_time",
            ));
        }
        Ok(DepartmentPolicy {
            department,
            required_check_in_time: check_in,
            required_check_out_time: check_out,
            overtime_threshold,
            allows_off_site_work: self.allows_off_site_work,
            overtime_allowed: self.overtime_allowed,
            max_monthly_permission_hours: self.max_monthly_permission_hours,
            max_monthly_casual_leaves: self.max_monthly_casual_leaves,
        })
    }
}

/// List stored department policies
#[utoipa::path(
    get,
    path = "/api/policies",
    responses(
        (status = 200, body = [DepartmentPolicy]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Policy"
)]
pub async fn list_policies(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    let policies = sqlx::query_as::<_, DepartmentPolicy>(
        r#"
        SELECT department, required_check_in_time, required_check_out_time, overtime_threshold,
               allows_off_site_work, overtime_allowed,
               max_monthly_permission_hours, max_monthly_casual_leaves
        FROM department_policies
        ORDER BY department
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list department policies"))?;

    Ok(HttpResponse::Ok().json(policies))
}

/// Effective policy for a department (defaults when none is stored)
#[utoipa::path(
    get,
    path = "/api/policies/{department}",
    params(("department" = String, Path, description = "Department name")),
    responses(
        (status = 200, body = DepartmentPolicy),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Policy"
)]
pub async fn get_policy(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policies: web::Data<PolicyCache>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let department = path.into_inner();
    let policy = policies
        .lookup(pool.get_ref(), &department)
        .await
        .map_err(db_error("Failed to fetch department policy"))?;
    Ok(HttpResponse::Ok().json(policy))
}

/// Create or replace a department policy (admin)
#[utoipa::path(
    put,
    path = "/api/policies/{department}",
    params(("department" = String, Path, description = "Department name")),
    request_body = UpsertPolicy,
    responses(
        (status = 200, body = DepartmentPolicy),
        (status = 400, description = "Invalid times"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Policy"
)]
pub async fn upsert_policy(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policies: web::Data<PolicyCache>,
    path: web::Path<String>,
    body: web::Json<UpsertPolicy>,
) -> AppResult<impl Responder> {
    auth.require_admin()?;

    let department = path.into_inner().trim().to_string();
    if department.is_empty() {
        return Err(AppError::bad_request("Department is required"));
    }
    let policy = body.into_inner().into_policy(department)?;

    sqlx::query(
        r#"
        INSERT INTO department_policies
            (department, required_check_in_time, required_check_out_time, overtime_threshold,
             allows_off_site_work, overtime_allowed,
             max_monthly_permission_hours, max_monthly_casual_leaves)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            required_check_in_time = VALUES(required_check_in_time),
            required_check_out_time = VALUES(required_check_out_time),
            overtime_threshold = VALUES(overtime_threshold),
            allows_off_site_work = VALUES(allows_off_site_work),
            overtime_allowed = VALUES(overtime_allowed),
            max_monthly_permission_hours = VALUES(max_monthly_permission_hours),
            max_monthly_casual_leaves = VALUES(max_monthly_casual_leaves)
        "#,
    )
    .bind(&policy.department)
    .bind(policy.required_check_in_time)
    .bind(policy.required_check_out_time)
    .bind(policy.overtime_threshold)
    .bind(policy.allows_off_site_work)
    .bind(policy.overtime_allowed)
    .bind(policy.max_monthly_permission_hours)
    .bind(policy.max_monthly_casual_leaves)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to upsert department policy"))?;

    policies.invalidate(&policy.department).await;
    tracing::info!(department = %policy.department, by = auth.user_id, "Department policy updated");

    Ok(HttpResponse::Ok().json(policy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> UpsertPolicy {
        UpsertPolicy {
            required_check_in_time: "09:30".into(),
            required_check_out_time: "18:30".into(),
            overtime_threshold: Some("19:30".into()),
            allows_off_site_work: true,
            overtime_allowed: true,
            max_monthly_permission_hours: 2,
            max_monthly_casual_leaves: 1,
        }
    }

    #[test]
    fn clock_is_hours_and_minutes_only() {
        assert_eq!(parse_clock("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock(" 18:30 "), NaiveTime::from_hms_opt(18, 30, 0));
        // Stored times stay at minute resolution.
        assert_eq!(parse_clock("09:30:15"), None);
        assert_eq!(parse_clock("9.30am"), None);
    }

    #[test]
    fn valid_body_becomes_policy() {
        let policy = body().into_policy("Sales".into()).unwrap();
        assert_eq!(policy.department, "Sales");
        assert_eq!(policy.overtime_threshold, NaiveTime::from_hms_opt(19, 30, 0));
    }

    #[test]
    fn check_out_must_follow_check_in() {
        let mut b = body();
        b.required_check_out_time = "09:00".into();
        assert!(b.into_policy("Sales".into()).is_err());
    }

    #[test]
    fn garbage_threshold_is_rejected() {
        let mut b = body();
        b.overtime_threshold = Some("late".into());
        assert!(b.into_policy("Sales".into()).is_err());
    }
}
