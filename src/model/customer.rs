use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Customer {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Acme Traders")]
    pub name: String,
    #[schema(example = "accounts@acme.in", nullable = true)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[schema(example = "33AAACA1234A1Z5", nullable = true)]
    pub gst_number: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
