use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::service::billing::{BillingError, LineItem};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Converted,
}

impl QuotationStatus {
    /// Manual status changes; `Converted` is only reached through conversion.
    pub fn transition(self, next: QuotationStatus) -> Result<QuotationStatus, BillingError> {
        use QuotationStatus::*;
        let allowed = match (self, next) {
            (Converted, _) | (_, Converted) => false,
            (Draft, Sent | Rejected) => true,
            (Sent, Accepted | Rejected | Draft) => true,
            (Accepted, Rejected) | (Rejected, Draft) => true,
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(BillingError::InvalidStatusChange {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn can_convert(&self) -> bool {
        matches!(self, QuotationStatus::Sent | QuotationStatus::Accepted)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuotationRow {
    pub id: u64,
    pub customer_id: u64,
    pub items: Json<Vec<LineItem>>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub valid_until: Option<NaiveDate>,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Quotation {
    pub id: u64,
    pub customer_id: u64,
    pub items: Vec<LineItem>,
    #[schema(value_type = String, example = "1000.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "180.00")]
    pub tax: Decimal,
    #[schema(value_type = String, example = "1180.00")]
    pub total: Decimal,
    pub status: QuotationStatus,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub valid_until: Option<NaiveDate>,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl TryFrom<QuotationRow> for Quotation {
    type Error = strum::ParseError;

    fn try_from(row: QuotationRow) -> Result<Self, Self::Error> {
        Ok(Quotation {
            id: row.id,
            customer_id: row.customer_id,
            items: row.items.0,
            subtotal: row.subtotal,
            tax: row.tax,
            total: row.total,
            status: QuotationStatus::from_str(&row.status)?,
            notes: row.notes,
            valid_until: row.valid_until,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converted_is_reserved_for_conversion() {
        assert!(QuotationStatus::Accepted
            .transition(QuotationStatus::Converted)
            .is_err());
        assert!(QuotationStatus::Converted
            .transition(QuotationStatus::Draft)
            .is_err());
    }

    #[test]
    fn normal_sales_flow() {
        let sent = QuotationStatus::Draft.transition(QuotationStatus::Sent).unwrap();
        let accepted = sent.transition(QuotationStatus::Accepted).unwrap();
        assert!(accepted.can_convert());
        assert!(!QuotationStatus::Draft.can_convert());
        assert!(QuotationStatus::Draft.transition(QuotationStatus::Accepted).is_err());
    }
}
