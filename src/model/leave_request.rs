use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::service::leave_rules::LeaveRuleError;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Casual,
    Permission,
    Sick,
    Vacation,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
}

/// Role a pending request is forwarded to.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EscalationTarget {
    Tl,
    Hr,
    Gm,
    Md,
}

/// An approver action. Each request accepts exactly one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LeaveDecision {
    Approve,
    Reject,
    Escalate(EscalationTarget),
}

impl LeaveDecision {
    pub fn resulting_status(&self) -> LeaveStatus {
        match self {
            LeaveDecision::Approve => LeaveStatus::Approved,
            LeaveDecision::Reject => LeaveStatus::Rejected,
            LeaveDecision::Escalate(_) => LeaveStatus::Escalated,
        }
    }
}

impl LeaveStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LeaveStatus::Pending)
    }

    /// Pending is the only state that accepts a decision; the rest are final.
    pub fn apply(self, decision: LeaveDecision) -> Result<LeaveStatus, LeaveRuleError> {
        if self.is_terminal() {
            return Err(LeaveRuleError::AlreadyProcessed(self));
        }
        Ok(decision.resulting_status())
    }

    /// Counts against the monthly allowance.
    pub fn consumes_balance(&self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
}

/// Raw `leave_requests` row; enum columns are stored as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaveRow {
    pub id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub department: String,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub permission_hours: Option<u32>,
    pub reason: String,
    pub status: String,
    pub approved_by: Option<String>,
    pub rejected_by: Option<String>,
    pub escalated_to: Option<String>,
    pub approval_notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveRequest {
    pub id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub department: String,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub permission_hours: Option<u32>,
    pub reason: String,
    pub status: LeaveStatus,
    pub approved_by: Option<String>,
    pub rejected_by: Option<String>,
    pub escalated_to: Option<EscalationTarget>,
    pub approval_notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LeaveRow> for LeaveRequest {
    type Error = strum::ParseError;

    fn try_from(row: LeaveRow) -> Result<Self, Self::Error> {
        Ok(LeaveRequest {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            department: row.department,
            leave_type: LeaveType::from_str(&row.leave_type)?,
            start_date: row.start_date,
            end_date: row.end_date,
            permission_hours: row.permission_hours,
            reason: row.reason,
            status: LeaveStatus::from_str(&row.status)?,
            approved_by: row.approved_by,
            rejected_by: row.rejected_by,
            escalated_to: row
                .escalated_to
                .as_deref()
                .map(EscalationTarget::from_str)
                .transpose()?,
            approval_notes: row.approval_notes,
            decided_at: row.decided_at,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_DECISIONS: [LeaveDecision; 3] = [
        LeaveDecision::Approve,
        LeaveDecision::Reject,
        LeaveDecision::Escalate(EscalationTarget::Hr),
    ];

    #[test]
    fn pending_accepts_every_decision() {
        for decision in ALL_DECISIONS {
            let next = LeaveStatus::Pending.apply(decision).unwrap();
            assert_eq!(next, decision.resulting_status());
        }
    }

    #[test]
    fn escalated_cannot_become_approved_or_rejected() {
        for decision in ALL_DECISIONS {
            assert!(matches!(
                LeaveStatus::Escalated.apply(decision),
                Err(LeaveRuleError::AlreadyProcessed(LeaveStatus::Escalated))
            ));
        }
    }

    #[test]
    fn decided_requests_stay_decided() {
        for status in [LeaveStatus::Approved, LeaveStatus::Rejected] {
            for decision in ALL_DECISIONS {
                assert!(status.apply(decision).is_err());
            }
        }
    }

    #[test]
    fn escalation_targets_use_uppercase_codes() {
        assert_eq!(EscalationTarget::Tl.as_ref(), "TL");
        assert_eq!(EscalationTarget::from_str("MD").unwrap(), EscalationTarget::Md);
        let json = serde_json::to_string(&EscalationTarget::Gm).unwrap();
        assert_eq!(json, "\"GM\"");
    }

    #[test]
    fn row_with_unknown_status_is_rejected() {
        let row = LeaveRow {
            id: 1,
            user_id: 7,
            user_name: "Asha".into(),
            department: "Sales".into(),
            leave_type: "casual".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            permission_hours: None,
            reason: "family".into(),
            status: "archived".into(),
            approved_by: None,
            rejected_by: None,
            escalated_to: None,
            approval_notes: None,
            decided_at: None,
            created_at: Utc::now(),
        };
        assert!(LeaveRequest::try_from(row.clone()).is_err());

        let ok = LeaveRequest::try_from(LeaveRow {
            status: "pending".into(),
            ..row
        })
        .unwrap();
        assert_eq!(ok.leave_type, LeaveType::Casual);
        assert_eq!(ok.status, LeaveStatus::Pending);
    }
}
