//! Validation and monthly-allowance rules for leave requests.
//!
//! Everything here is pure: handlers fetch the user's existing requests and
//! the department policy, then ask these functions whether a new request fits.

use chrono::{Datelike, NaiveDate, Weekday};
use derive_more::Display;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::department_policy::DepartmentPolicy;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use crate::utils::month::{month_bounds, months_between};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum LeaveRuleError {
    #[display(fmt = "Reason is required")]
    MissingReason,
    #[display(fmt = "start_date cannot be after end_date")]
    EndBeforeStart,
    #[display(fmt = "Permission must start and end on the same day")]
    PermissionSpansDays,
    #[display(fmt = "permission_hours must be between 1 and 24")]
    InvalidPermissionHours,
    #[display(
        fmt = "Insufficient casual leave balance: requested {} day(s), {} remaining for {}",
        requested,
        remaining,
        month
    )]
    InsufficientCasualBalance {
        month: String,
        requested: u32,
        remaining: u32,
    },
    #[display(
        fmt = "Insufficient permission hours balance: requested {} hour(s), {} remaining for {}",
        requested,
        remaining,
        month
    )]
    InsufficientPermissionBalance {
        month: String,
        requested: u32,
        remaining: u32,
    },
    #[display(fmt = "Leave request already processed ({})", _0)]
    AlreadyProcessed(LeaveStatus),
}

impl From<LeaveRuleError> for AppError {
    fn from(e: LeaveRuleError) -> Self {
        match e {
            LeaveRuleError::AlreadyProcessed(_) => AppError::conflict(e.to_string()),
            _ => AppError::bad_request(e.to_string()),
        }
    }
}

/// A leave request as submitted, before it has an id.
#[derive(Debug, Clone)]
pub struct LeaveDraft {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub permission_hours: Option<u32>,
}

pub fn validate_draft(draft: &LeaveDraft) -> Result<(), LeaveRuleError> {
    if draft.reason.trim().is_empty() {
        return Err(LeaveRuleError::MissingReason);
    }
    if draft.start_date > draft.end_date {
        return Err(LeaveRuleError::EndBeforeStart);
    }
    if draft.leave_type == LeaveType::Permission {
        if draft.start_date != draft.end_date {
            return Err(LeaveRuleError::PermissionSpansDays);
        }
        match draft.permission_hours {
            Some(h) if (1..=24).contains(&h) => {}
            _ => return Err(LeaveRuleError::InvalidPermissionHours),
        }
    }
    Ok(())
}

/// Calendar days, both ends included.
pub fn duration_days(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    u32::try_from((end - start).num_days() + 1).unwrap_or(u32::MAX)
}

/// Days in range that are not Sundays.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> u32 {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| d.weekday() != Weekday::Sun)
        .count() as u32
}

fn business_days_in_month(start: NaiveDate, end: NaiveDate, month: NaiveDate) -> u32 {
    let (first, last) = month_bounds(month);
    let from = start.max(first);
    let to = end.min(last);
    if from > to { 0 } else { business_days(from, to) }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyUsage {
    pub casual_days: u32,
    pub permission_hours: u32,
}

/// Allowance consumed in `month` by pending and approved requests.
pub fn usage_in_month<'a>(
    leaves: impl IntoIterator<Item = &'a LeaveRequest>,
    month: NaiveDate,
) -> MonthlyUsage {
    let (first, last) = month_bounds(month);
    leaves
        .into_iter()
        .filter(|l| l.status.consumes_balance())
        .fold(MonthlyUsage::default(), |mut usage, l| {
            match l.leave_type {
                LeaveType::Casual => {
                    usage.casual_days += business_days_in_month(l.start_date, l.end_date, month);
                }
                LeaveType::Permission if l.start_date >= first && l.start_date <= last => {
                    usage.permission_hours += l.permission_hours.unwrap_or(0);
                }
                _ => {}
            }
            usage
        })
}

/// Sick and vacation leave are uncapped; casual is capped per month touched,
/// permission hours against the month of the request.
pub fn check_balance(
    draft: &LeaveDraft,
    policy: &DepartmentPolicy,
    existing: &[LeaveRequest],
) -> Result<(), LeaveRuleError> {
    match draft.leave_type {
        LeaveType::Casual => {
            for month in months_between(draft.start_date, draft.end_date) {
                let requested = business_days_in_month(draft.start_date, draft.end_date, month);
                let used = usage_in_month(existing, month).casual_days;
                if used + requested > policy.max_monthly_casual_leaves {
                    return Err(LeaveRuleError::InsufficientCasualBalance {
                        month: month.format("%Y-%m").to_string(),
                        requested,
                        remaining: policy.max_monthly_casual_leaves.saturating_sub(used),
                    });
                }
            }
            Ok(())
        }
        LeaveType::Permission => {
            let requested = draft.permission_hours.unwrap_or(0);
            let used = usage_in_month(existing, draft.start_date).permission_hours;
            if used + requested > policy.max_monthly_permission_hours {
                return Err(LeaveRuleError::InsufficientPermissionBalance {
                    month: draft.start_date.format("%Y-%m").to_string(),
                    requested,
                    remaining: policy.max_monthly_permission_hours.saturating_sub(used),
                });
            }
            Ok(())
        }
        LeaveType::Sick | LeaveType::Vacation => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaveBalance {
    #[schema(example = "2026-01")]
    pub month: String,
    pub casual_allowed: u32,
    pub casual_used: u32,
    pub casual_remaining: u32,
    pub permission_hours_allowed: u32,
    pub permission_hours_used: u32,
    pub permission_hours_remaining: u32,
}

pub fn balance_for_month(
    policy: &DepartmentPolicy,
    existing: &[LeaveRequest],
    month: NaiveDate,
) -> LeaveBalance {
    let usage = usage_in_month(existing, month);
    LeaveBalance {
        month: month.format("%Y-%m").to_string(),
        casual_allowed: policy.max_monthly_casual_leaves,
        casual_used: usage.casual_days,
        casual_remaining: policy
            .max_monthly_casual_leaves
            .saturating_sub(usage.casual_days),
        permission_hours_allowed: policy.max_monthly_permission_hours,
        permission_hours_used: usage.permission_hours,
        permission_hours_remaining: policy
            .max_monthly_permission_hours
            .saturating_sub(usage.permission_hours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn policy() -> DepartmentPolicy {
        DepartmentPolicy {
            department: "Sales".into(),
            required_check_in_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            required_check_out_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            overtime_threshold: None,
            allows_off_site_work: true,
            overtime_allowed: true,
            max_monthly_permission_hours: 2,
            max_monthly_casual_leaves: 2,
        }
    }

    fn draft(leave_type: LeaveType, start: NaiveDate, end: NaiveDate) -> LeaveDraft {
        LeaveDraft {
            leave_type,
            start_date: start,
            end_date: end,
            reason: "personal".into(),
            permission_hours: None,
        }
    }

    fn existing(
        leave_type: LeaveType,
        start: NaiveDate,
        end: NaiveDate,
        status: LeaveStatus,
        hours: Option<u32>,
    ) -> LeaveRequest {
        LeaveRequest {
            id: 1,
            user_id: 7,
            user_name: "Asha".into(),
            department: "Sales".into(),
            leave_type,
            start_date: start,
            end_date: end,
            permission_hours: hours,
            reason: "earlier".into(),
            status,
            approved_by: None,
            rejected_by: None,
            escalated_to: None,
            approval_notes: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn casual_over_a_weekend_counts_business_days() {
        // 2024-06-01 is a Saturday, 2024-06-02 a Sunday.
        assert_eq!(duration_days(d(2024, 6, 1), d(2024, 6, 3)), 3);
        assert_eq!(business_days(d(2024, 6, 1), d(2024, 6, 3)), 2);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let result = validate_draft(&draft(LeaveType::Sick, d(2024, 6, 3), d(2024, 6, 1)));
        assert_eq!(result, Err(LeaveRuleError::EndBeforeStart));
    }

    #[test]
    fn permission_must_be_single_day_with_hours() {
        let mut p = draft(LeaveType::Permission, d(2024, 6, 3), d(2024, 6, 4));
        p.permission_hours = Some(1);
        assert_eq!(validate_draft(&p), Err(LeaveRuleError::PermissionSpansDays));

        p.end_date = p.start_date;
        p.permission_hours = None;
        assert_eq!(validate_draft(&p), Err(LeaveRuleError::InvalidPermissionHours));

        p.permission_hours = Some(2);
        assert_eq!(validate_draft(&p), Ok(()));
    }

    #[test]
    fn blank_reason_is_rejected() {
        let mut p = draft(LeaveType::Vacation, d(2024, 6, 3), d(2024, 6, 7));
        p.reason = "   ".into();
        assert_eq!(validate_draft(&p), Err(LeaveRuleError::MissingReason));
    }

    #[test]
    fn three_permission_hours_exceed_two_hour_allowance() {
        let mut p = draft(LeaveType::Permission, d(2024, 6, 3), d(2024, 6, 3));
        p.permission_hours = Some(3);
        let err = check_balance(&p, &policy(), &[]).unwrap_err();
        assert!(matches!(
            err,
            LeaveRuleError::InsufficientPermissionBalance {
                requested: 3,
                remaining: 2,
                ..
            }
        ));
        assert!(err.to_string().starts_with("Insufficient permission hours balance"));
    }

    #[test]
    fn rejected_requests_do_not_consume_allowance() {
        let earlier = vec![
            existing(LeaveType::Permission, d(2024, 6, 4), d(2024, 6, 4), LeaveStatus::Rejected, Some(2)),
            existing(LeaveType::Permission, d(2024, 6, 5), d(2024, 6, 5), LeaveStatus::Pending, Some(1)),
        ];
        let mut p = draft(LeaveType::Permission, d(2024, 6, 10), d(2024, 6, 10));
        p.permission_hours = Some(1);
        assert_eq!(check_balance(&p, &policy(), &earlier), Ok(()));

        p.permission_hours = Some(2);
        assert!(check_balance(&p, &policy(), &earlier).is_err());
    }

    #[test]
    fn casual_allowance_is_checked_per_month() {
        // One approved casual day already used in June.
        let earlier = vec![existing(
            LeaveType::Casual,
            d(2024, 6, 10),
            d(2024, 6, 10),
            LeaveStatus::Approved,
            None,
        )];
        // Jun 28 (Fri), Jun 29 (Sat), Jul 1 (Mon): two days fall in June.
        let spanning = draft(LeaveType::Casual, d(2024, 6, 28), d(2024, 7, 1));
        let err = check_balance(&spanning, &policy(), &earlier).unwrap_err();
        assert_eq!(
            err,
            LeaveRuleError::InsufficientCasualBalance {
                month: "2024-06".into(),
                requested: 2,
                remaining: 1,
            }
        );

        let fits = draft(LeaveType::Casual, d(2024, 6, 29), d(2024, 7, 1));
        assert_eq!(check_balance(&fits, &policy(), &earlier), Ok(()));
    }

    #[test]
    fn sick_leave_is_uncapped() {
        let long = draft(LeaveType::Sick, d(2024, 6, 1), d(2024, 6, 30));
        assert_eq!(check_balance(&long, &policy(), &[]), Ok(()));
    }

    #[test]
    fn balance_reports_remaining_allowance() {
        let earlier = vec![
            existing(LeaveType::Casual, d(2024, 6, 10), d(2024, 6, 10), LeaveStatus::Pending, None),
            existing(LeaveType::Permission, d(2024, 6, 11), d(2024, 6, 11), LeaveStatus::Approved, Some(1)),
            existing(LeaveType::Casual, d(2024, 5, 10), d(2024, 5, 10), LeaveStatus::Approved, None),
        ];
        let balance = balance_for_month(&policy(), &earlier, d(2024, 6, 1));
        assert_eq!(balance.month, "2024-06");
        assert_eq!(balance.casual_used, 1);
        assert_eq!(balance.casual_remaining, 1);
        assert_eq!(balance.permission_hours_used, 1);
        assert_eq!(balance.permission_hours_remaining, 1);
    }

    #[test]
    fn already_processed_maps_to_conflict() {
        use actix_web::ResponseError;
        let err: AppError = LeaveRuleError::AlreadyProcessed(LeaveStatus::Approved).into();
        assert_eq!(err.status_code(), actix_web::http::StatusCode::CONFLICT);
        let err: AppError = LeaveRuleError::EndBeforeStart.into();
        assert_eq!(err.status_code(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    fn any_date() -> impl Strategy<Value = NaiveDate> {
        (0i64..3650).prop_map(|offset| d(2020, 1, 1) + chrono::Duration::days(offset))
    }

    proptest! {
        #[test]
        fn draft_accepted_only_when_end_not_before_start(start in any_date(), end in any_date()) {
            let result = validate_draft(&draft(LeaveType::Vacation, start, end));
            prop_assert_eq!(result.is_ok(), end >= start);
        }

        #[test]
        fn permission_accepted_only_on_one_day(start in any_date(), end in any_date(), hours in 1u32..=24) {
            let mut p = draft(LeaveType::Permission, start, end);
            p.permission_hours = Some(hours);
            prop_assert_eq!(validate_draft(&p).is_ok(), start == end);
        }

        #[test]
        fn business_days_never_exceed_duration(start in any_date(), len in 0i64..60) {
            let end = start + chrono::Duration::days(len);
            let business = business_days(start, end);
            let total = duration_days(start, end);
            prop_assert!(business <= total);
            // At most one Sunday in every seven days.
            prop_assert!(total - business <= total.div_ceil(7));
        }
    }
}
