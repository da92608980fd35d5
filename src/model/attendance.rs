use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum WorkLocation {
    Office,
    OffSite,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    CheckedIn,
    CheckedOut,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub check_in_time: NaiveTime,
    pub check_out_time: Option<NaiveTime>,
    pub check_out_date: Option<NaiveDate>,
    pub work_location: String,
    pub is_late: bool,
    pub is_overtime: bool,
    pub late_reason: Option<String>,
    pub overtime_reason: Option<String>,
    pub location_details: Option<String>,
    pub in_office_at_check_out: Option<bool>,
    pub photo_url: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Attendance {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "09:42:10", value_type = String)]
    pub check_in_time: NaiveTime,
    #[schema(example = "18:35:00", value_type = Option<String>)]
    pub check_out_time: Option<NaiveTime>,
    /// Differs from `date` when the shift ran past midnight.
    #[schema(example = "2026-01-05", format = "date", value_type = Option<String>)]
    pub check_out_date: Option<NaiveDate>,
    pub work_location: WorkLocation,
    pub is_late: bool,
    pub is_overtime: bool,
    pub late_reason: Option<String>,
    pub overtime_reason: Option<String>,
    pub location_details: Option<String>,
    pub in_office_at_check_out: Option<bool>,
    pub photo_url: Option<String>,
    pub status: AttendanceStatus,
}

impl Attendance {
    /// Minutes between check-in and check-out; `None` while still checked in.
    pub fn worked_minutes(&self) -> Option<i64> {
        let out = self.check_out_date?.and_time(self.check_out_time?);
        let start = self.date.and_time(self.check_in_time);
        Some((out - start).num_minutes().max(0))
    }
}

impl TryFrom<AttendanceRow> for Attendance {
    type Error = strum::ParseError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Attendance {
            id: row.id,
            user_id: row.user_id,
            date: row.date,
            check_in_time: row.check_in_time,
            check_out_time: row.check_out_time,
            check_out_date: row.check_out_date,
            work_location: WorkLocation::from_str(&row.work_location)?,
            is_late: row.is_late,
            is_overtime: row.is_overtime,
            late_reason: row.late_reason,
            overtime_reason: row.overtime_reason,
            location_details: row.location_details,
            in_office_at_check_out: row.in_office_at_check_out,
            photo_url: row.photo_url,
            status: AttendanceStatus::from_str(&row.status)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_site_is_hyphenated_everywhere() {
        assert_eq!(WorkLocation::OffSite.as_ref(), "off-site");
        assert_eq!(
            serde_json::from_str::<WorkLocation>("\"off-site\"").unwrap(),
            WorkLocation::OffSite
        );
        assert_eq!(
            AttendanceStatus::from_str("checked_out").unwrap(),
            AttendanceStatus::CheckedOut
        );
    }
}
