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
pub enum InvoiceStatus {
    Unpaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn transition(self, next: InvoiceStatus) -> Result<InvoiceStatus, BillingError> {
        match (self, next) {
            (InvoiceStatus::Unpaid, InvoiceStatus::Paid | InvoiceStatus::Cancelled) => Ok(next),
            _ => Err(BillingError::InvalidStatusChange {
                from: self.to_string(),
                to: next.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    pub id: u64,
    pub invoice_number: String,
    pub customer_id: u64,
    pub quotation_id: Option<u64>,
    pub items: Json<Vec<LineItem>>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Invoice {
    pub id: u64,
    #[schema(example = "INV-20260105-3F2A1B")]
    pub invoice_number: String,
    pub customer_id: u64,
    pub quotation_id: Option<u64>,
    pub items: Vec<LineItem>,
    #[schema(value_type = String, example = "1000.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "180.00")]
    pub tax: Decimal,
    #[schema(value_type = String, example = "1180.00")]
    pub total: Decimal,
    pub status: InvoiceStatus,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = strum::ParseError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row.id,
            invoice_number: row.invoice_number,
            customer_id: row.customer_id,
            quotation_id: row.quotation_id,
            items: row.items.0,
            subtotal: row.subtotal,
            tax: row.tax,
            total: row.total,
            status: InvoiceStatus::from_str(&row.status)?,
            due_date: row.due_date,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}
