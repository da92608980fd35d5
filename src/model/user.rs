use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Public view of a `users` row; the password hash never leaves `UserSql`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1000,
    "email": "asha@company.com",
    "display_name": "Asha Raman",
    "phone": "+919800000000",
    "department": "Sales",
    "role": "employee",
    "is_active": true,
    "created_at": "2026-01-01T00:00:00Z"
}))]
pub struct User {
    pub id: u64,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub department: String,
    pub role: String,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
