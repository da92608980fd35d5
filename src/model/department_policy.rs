use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Per-department attendance hours and monthly allowances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "department": "Sales",
    "required_check_in_time": "09:30:00",
    "required_check_out_time": "18:30:00",
    "overtime_threshold": null,
    "allows_off_site_work": true,
    "overtime_allowed": true,
    "max_monthly_permission_hours": 2,
    "max_monthly_casual_leaves": 1
}))]
pub struct DepartmentPolicy {
    pub department: String,
    #[schema(value_type = String)]
    pub required_check_in_time: NaiveTime,
    #[schema(value_type = String)]
    pub required_check_out_time: NaiveTime,
    /// Overrides `required_check_out_time` when deciding overtime.
    #[schema(value_type = Option<String>)]
    pub overtime_threshold: Option<NaiveTime>,
    pub allows_off_site_work: bool,
    pub overtime_allowed: bool,
    pub max_monthly_permission_hours: u32,
    pub max_monthly_casual_leaves: u32,
}
