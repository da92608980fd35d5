use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Product {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Thermal printer")]
    pub name: String,
    #[schema(example = "TP-80")]
    pub sku: String,
    #[schema(example = "4500.00", value_type = String)]
    pub unit_price: Decimal,
    pub description: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
