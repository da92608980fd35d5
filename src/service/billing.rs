use chrono::NaiveDate;
use derive_more::Display;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Flat 18% tax applied to every quotation and invoice.
pub const TAX_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);

/// Largest value a DECIMAL(12,2) money column holds: 9_999_999_999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum BillingError {
    #[display(fmt = "At least one line item is required")]
    NoItems,
    #[display(fmt = "Line item {}: quantity must be greater than zero", _0)]
    InvalidQuantity(usize),
    #[display(fmt = "Line item {}: unit_price cannot be negative", _0)]
    NegativePrice(usize),
    #[display(fmt = "Line item {}: description is required", _0)]
    MissingDescription(usize),
    #[display(fmt = "Line item {}: amount is out of range", _0)]
    LineAmountOutOfRange(usize),
    #[display(fmt = "Total is out of range")]
    TotalOutOfRange,
    #[display(fmt = "Cannot change status from {} to {}", from, to)]
    InvalidStatusChange { from: String, to: String },
    #[display(fmt = "Quotation cannot be converted from status {}", _0)]
    NotConvertible(String),
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::InvalidStatusChange { .. } | BillingError::NotConvertible(_) => {
                AppError::conflict(e.to_string())
            }
            _ => AppError::bad_request(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    #[schema(example = 3)]
    pub product_id: Option<u64>,
    #[schema(example = "Thermal printer")]
    pub description: String,
    #[schema(value_type = String, example = "2")]
    pub quantity: Decimal,
    #[schema(value_type = String, example = "4500.00")]
    pub unit_price: Decimal,
}

impl LineItem {
    /// `None` when quantity times price overflows.
    pub fn amount(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Totals {
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub tax: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn validate_items(items: &[LineItem]) -> Result<(), BillingError> {
    if items.is_empty() {
        return Err(BillingError::NoItems);
    }
    for (i, item) in items.iter().enumerate() {
        let line = i + 1;
        if item.description.trim().is_empty() {
            return Err(BillingError::MissingDescription(line));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(BillingError::InvalidQuantity(line));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(BillingError::NegativePrice(line));
        }
        if item.quantity > MAX_AMOUNT || item.unit_price > MAX_AMOUNT {
            return Err(BillingError::LineAmountOutOfRange(line));
        }
    }
    Ok(())
}

pub fn compute_totals(items: &[LineItem]) -> Result<Totals, BillingError> {
    validate_items(items)?;
    let mut subtotal = Decimal::ZERO;
    for (i, item) in items.iter().enumerate() {
        let amount = item
            .amount()
            .ok_or(BillingError::LineAmountOutOfRange(i + 1))?;
        subtotal = subtotal
            .checked_add(amount)
            .ok_or(BillingError::TotalOutOfRange)?;
    }
    let subtotal = round2(subtotal);
    let tax = round2(
        subtotal
            .checked_mul(TAX_RATE)
            .ok_or(BillingError::TotalOutOfRange)?,
    );
    let total = subtotal
        .checked_add(tax)
        .ok_or(BillingError::TotalOutOfRange)?;
    if total > MAX_AMOUNT {
        return Err(BillingError::TotalOutOfRange);
    }
    Ok(Totals {
        subtotal,
        tax,
        total,
    })
}

/// `INV-YYYYMMDD-XXXXXX`, suffix taken from a fresh v4 uuid.
pub fn invoice_number(date: NaiveDate) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .to_simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("INV-{}-{}", date.format("%Y%m%d"), suffix.to_uppercase())
}
