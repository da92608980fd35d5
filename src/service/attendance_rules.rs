//! Late/overtime derivation and the check-in/check-out preconditions.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use derive_more::Display;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::attendance::{Attendance, AttendanceStatus, WorkLocation};
use crate::model::department_policy::DepartmentPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum AttendanceRuleError {
    #[display(fmt = "Off-site work is not allowed for {}", _0)]
    OffSiteNotAllowed(String),
    #[display(fmt = "Late reason required")]
    LateReasonRequired,
    #[display(fmt = "Overtime reason required")]
    OvertimeReasonRequired,
    #[display(fmt = "Photo proof required when checking out away from the office")]
    PhotoRequired,
    #[display(fmt = "Check-out time must be after check-in time")]
    CheckOutBeforeCheckIn,
}

impl From<AttendanceRuleError> for AppError {
    fn from(e: AttendanceRuleError) -> Self {
        AppError::bad_request(e.to_string())
    }
}

/// Wall-clock comparisons are done at minute resolution on both sides.
fn to_minute(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

pub fn is_late(check_in: NaiveTime, policy: &DepartmentPolicy) -> bool {
    to_minute(check_in) > to_minute(policy.required_check_in_time)
}

/// The department override wins over the regular check-out time.
pub fn overtime_threshold(policy: &DepartmentPolicy) -> NaiveTime {
    policy
        .overtime_threshold
        .unwrap_or(policy.required_check_out_time)
}

pub fn is_overtime(check_out: NaiveTime, policy: &DepartmentPolicy) -> bool {
    to_minute(check_out) > to_minute(overtime_threshold(policy))
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInOutcome {
    pub is_late: bool,
}

pub fn evaluate_check_in(
    now: NaiveTime,
    location: WorkLocation,
    late_reason: Option<&str>,
    policy: &DepartmentPolicy,
) -> Result<CheckInOutcome, AttendanceRuleError> {
    if location == WorkLocation::OffSite && !policy.allows_off_site_work {
        return Err(AttendanceRuleError::OffSiteNotAllowed(
            policy.department.clone(),
        ));
    }
    let late = is_late(now, policy);
    if late && !has_text(late_reason) {
        return Err(AttendanceRuleError::LateReasonRequired);
    }
    Ok(CheckInOutcome { is_late: late })
}

pub struct CheckOutInput<'a> {
    pub check_in: NaiveDateTime,
    pub now: NaiveDateTime,
    pub overtime_reason: Option<&'a str>,
    pub in_office: bool,
    pub photo_url: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutOutcome {
    pub is_overtime: bool,
    /// Overtime happened although the department does not allow it.
    pub unapproved_overtime: bool,
}

pub fn evaluate_check_out(
    input: &CheckOutInput<'_>,
    policy: &DepartmentPolicy,
) -> Result<CheckOutOutcome, AttendanceRuleError> {
    if input.now <= input.check_in {
        return Err(AttendanceRuleError::CheckOutBeforeCheckIn);
    }
    if !input.in_office && !has_text(input.photo_url) {
        return Err(AttendanceRuleError::PhotoRequired);
    }
    // Checking out on a later day is past any threshold.
    let overtime =
        input.now.date() > input.check_in.date() || is_overtime(input.now.time(), policy);
    if overtime && !has_text(input.overtime_reason) {
        return Err(AttendanceRuleError::OvertimeReasonRequired);
    }
    Ok(CheckOutOutcome {
        is_overtime: overtime,
        unapproved_overtime: overtime && !policy.overtime_allowed,
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    pub days_present: u32,
    pub late_days: u32,
    pub overtime_days: u32,
    pub off_site_days: u32,
    /// Checked in but never checked out.
    pub open_days: u32,
    pub worked_minutes: i64,
}

pub fn summarize(records: &[Attendance]) -> AttendanceSummary {
    records
        .iter()
        .fold(AttendanceSummary::default(), |mut summary, r| {
            summary.days_present += 1;
            summary.late_days += u32::from(r.is_late);
            summary.overtime_days += u32::from(r.is_overtime);
            summary.off_site_days += u32::from(r.work_location == WorkLocation::OffSite);
            summary.open_days += u32::from(r.status == AttendanceStatus::CheckedIn);
            summary.worked_minutes += r.worked_minutes().unwrap_or(0);
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_time(t(h, m))
    }

    fn sales() -> DepartmentPolicy {
        DepartmentPolicy {
            department: "Sales".into(),
            required_check_in_time: t(9, 30),
            required_check_out_time: t(18, 30),
            overtime_threshold: None,
            allows_off_site_work: false,
            overtime_allowed: true,
            max_monthly_permission_hours: 2,
            max_monthly_casual_leaves: 1,
        }
    }

    fn record(is_late: bool, out: Option<NaiveTime>, location: WorkLocation) -> Attendance {
        Attendance {
            id: 1,
            user_id: 7,
            date: day(),
            check_in_time: t(9, 0),
            check_out_time: out,
            check_out_date: out.map(|_| day()),
            work_location: location,
            is_late,
            is_overtime: false,
            late_reason: None,
            overtime_reason: None,
            location_details: None,
            in_office_at_check_out: None,
            photo_url: None,
            status: if out.is_some() {
                AttendanceStatus::CheckedOut
            } else {
                AttendanceStatus::CheckedIn
            },
        }
    }

    #[test]
    fn sales_check_in_at_0945_is_late() {
        assert!(is_late(t(9, 45), &sales()));
        assert!(!is_late(t(9, 30), &sales()));
        // Seconds inside the required minute do not count.
        assert!(!is_late(NaiveTime::from_hms_opt(9, 30, 59).unwrap(), &sales()));
    }

    #[test]
    fn late_check_in_needs_a_reason() {
        let err = evaluate_check_in(t(9, 45), WorkLocation::Office, None, &sales()).unwrap_err();
        assert_eq!(err, AttendanceRuleError::LateReasonRequired);

        let ok = evaluate_check_in(t(9, 45), WorkLocation::Office, Some("traffic"), &sales()).unwrap();
        assert!(ok.is_late);

        let on_time = evaluate_check_in(t(9, 10), WorkLocation::Office, None, &sales()).unwrap();
        assert!(!on_time.is_late);
    }

    #[test]
    fn off_site_requires_policy_permission() {
        let err = evaluate_check_in(t(9, 0), WorkLocation::OffSite, None, &sales()).unwrap_err();
        assert_eq!(err, AttendanceRuleError::OffSiteNotAllowed("Sales".into()));

        let mut field = sales();
        field.allows_off_site_work = true;
        assert!(evaluate_check_in(t(9, 0), WorkLocation::OffSite, None, &field).is_ok());
    }

    #[test]
    fn override_threshold_replaces_check_out_time() {
        let mut policy = sales();
        assert!(is_overtime(t(19, 0), &policy));
        policy.overtime_threshold = Some(t(19, 30));
        assert!(!is_overtime(t(19, 0), &policy));
        assert!(!is_overtime(t(19, 30), &policy));
        assert!(is_overtime(t(19, 31), &policy));
    }

    #[test]
    fn check_out_outside_office_needs_photo() {
        let input = CheckOutInput {
            check_in: at(9, 0),
            now: at(18, 0),
            overtime_reason: None,
            in_office: false,
            photo_url: None,
        };
        assert_eq!(
            evaluate_check_out(&input, &sales()),
            Err(AttendanceRuleError::PhotoRequired)
        );

        let with_photo = CheckOutInput {
            photo_url: Some("https://storage.example/proof.jpg"),
            ..input
        };
        assert!(evaluate_check_out(&with_photo, &sales()).is_ok());
    }

    #[test]
    fn overtime_is_flagged_even_when_not_allowed() {
        let mut policy = sales();
        policy.overtime_allowed = false;
        let input = CheckOutInput {
            check_in: at(9, 0),
            now: at(20, 0),
            overtime_reason: Some("release"),
            in_office: true,
            photo_url: None,
        };
        let outcome = evaluate_check_out(&input, &policy).unwrap();
        assert!(outcome.is_overtime);
        assert!(outcome.unapproved_overtime);

        let no_reason = CheckOutInput {
            overtime_reason: None,
            ..input
        };
        assert_eq!(
            evaluate_check_out(&no_reason, &policy),
            Err(AttendanceRuleError::OvertimeReasonRequired)
        );
    }

    #[test]
    fn check_out_must_follow_check_in() {
        let input = CheckOutInput {
            check_in: at(9, 0),
            now: at(9, 0),
            overtime_reason: None,
            in_office: true,
            photo_url: None,
        };
        assert_eq!(
            evaluate_check_out(&input, &sales()),
            Err(AttendanceRuleError::CheckOutBeforeCheckIn)
        );
    }

    #[test]
    fn overnight_check_out_counts_as_overtime() {
        let next_day = day().succ_opt().unwrap().and_time(t(0, 30));
        let input = CheckOutInput {
            check_in: at(9, 0),
            now: next_day,
            overtime_reason: Some("quarter close"),
            in_office: true,
            photo_url: None,
        };
        let outcome = evaluate_check_out(&input, &sales()).unwrap();
        assert!(outcome.is_overtime);

        let silent = CheckOutInput {
            overtime_reason: None,
            ..input
        };
        assert_eq!(
            evaluate_check_out(&silent, &sales()),
            Err(AttendanceRuleError::OvertimeReasonRequired)
        );

        let mut shift = record(false, Some(t(0, 30)), WorkLocation::Office);
        shift.check_out_date = Some(next_day.date());
        assert_eq!(shift.worked_minutes(), Some(15 * 60 + 30));
    }

    #[test]
    fn policy_seconds_are_ignored_like_check_in_seconds() {
        let mut policy = sales();
        policy.required_check_in_time = NaiveTime::from_hms_opt(9, 30, 30).unwrap();
        assert!(!is_late(NaiveTime::from_hms_opt(9, 30, 45).unwrap(), &policy));
        assert!(is_late(t(9, 31), &policy));

        policy.overtime_threshold = Some(NaiveTime::from_hms_opt(19, 0, 40).unwrap());
        assert!(!is_overtime(NaiveTime::from_hms_opt(19, 0, 50).unwrap(), &policy));
        assert!(is_overtime(t(19, 1), &policy));
    }

    #[test]
    fn summary_counts_flags_and_minutes() {
        let records = vec![
            record(true, Some(t(18, 0)), WorkLocation::Office),
            record(false, Some(t(17, 30)), WorkLocation::OffSite),
            record(false, None, WorkLocation::Office),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.days_present, 3);
        assert_eq!(summary.late_days, 1);
        assert_eq!(summary.off_site_days, 1);
        assert_eq!(summary.open_days, 1);
        assert_eq!(summary.worked_minutes, 9 * 60 + 8 * 60 + 30);
    }

    proptest! {
        #[test]
        fn late_iff_strictly_after_required_minute(h in 0u32..24, m in 0u32..60, rh in 0u32..24, rm in 0u32..60) {
            let mut policy = sales();
            policy.required_check_in_time = t(rh, rm);
            prop_assert_eq!(is_late(t(h, m), &policy), t(h, m) > t(rh, rm));
        }

        #[test]
        fn overtime_iff_strictly_after_threshold(h in 0u32..24, m in 0u32..60, override_on in any::<bool>()) {
            let mut policy = sales();
            if override_on {
                policy.overtime_threshold = Some(t(19, 30));
            }
            let threshold = if override_on { t(19, 30) } else { t(18, 30) };
            prop_assert_eq!(is_overtime(t(h, m), &policy), t(h, m) > threshold);
        }
    }
}
