use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::MySqlPool;
use std::str::FromStr;

use crate::error::AppError;

/// Bindable value for a dynamically built statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    Decimal(Decimal),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

/// Column type a JSON patch value must coerce into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Nullable text.
    Text,
    /// NOT NULL text; empty strings are refused too.
    RequiredText,
    Unsigned,
    Money,
    Bool,
    Date,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn coerce(column: &str, kind: ColumnKind, value: &Value) -> Result<SqlValue, AppError> {
    let invalid = || AppError::bad_request(format!("Invalid value for field '{column}'"));
    Ok(match (kind, value) {
        (ColumnKind::Text | ColumnKind::Date, Value::Null) => SqlValue::Null,
        (ColumnKind::Text, Value::String(s)) => SqlValue::String(s.trim().to_string()),
        (ColumnKind::RequiredText, Value::String(s)) if !s.trim().is_empty() => {
            SqlValue::String(s.trim().to_string())
        }
        (ColumnKind::Unsigned, Value::Number(n)) => SqlValue::U64(n.as_u64().ok_or_else(invalid)?),
        (ColumnKind::Money, Value::String(s)) => {
            SqlValue::Decimal(Decimal::from_str(s.trim()).map_err(|_| invalid())?)
        }
        (ColumnKind::Money, Value::Number(n)) => {
            SqlValue::Decimal(Decimal::from_str(&n.to_string()).map_err(|_| invalid())?)
        }
        (ColumnKind::Bool, Value::Bool(b)) => SqlValue::Bool(*b),
        (ColumnKind::Date, Value::String(s)) => {
            SqlValue::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())?)
        }
        _ => return Err(invalid()),
    })
}

/// Builds `UPDATE <table> SET ... WHERE <id_column> = ?` from a JSON object.
///
/// Only keys listed in `allowed` may appear; anything else is a 400, so the
/// column names interpolated into the statement never come from the client.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[(&str, ColumnKind)],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::bad_request("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let (column, kind) = allowed
            .iter()
            .find(|(name, _)| *name == key.as_str())
            .ok_or_else(|| AppError::bad_request(format!("Field '{key}' cannot be updated")))?;
        columns.push(format!("{column} = ?"));
        values.push(coerce(column, *kind, value)?);
    }

    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table,
            columns.join(", "),
            id_column
        ),
        values,
    })
}

pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::Decimal(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PRODUCT_COLUMNS: &[(&str, ColumnKind)] = &[
        ("name", ColumnKind::RequiredText),
        ("description", ColumnKind::Text),
        ("unit_price", ColumnKind::Money),
    ];

    #[test]
    fn builds_statement_for_whitelisted_fields() {
        let update = build_update_sql(
            "products",
            &json!({ "name": " Printer ", "unit_price": "4500.50" }),
            PRODUCT_COLUMNS,
            "id",
            9,
        )
        .unwrap();
        assert!(update.sql.starts_with("UPDATE products SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.values.contains(&SqlValue::String("Printer".into())));
        assert!(update
            .values
            .contains(&SqlValue::Decimal(Decimal::from_str("4500.50").unwrap())));
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
    }

    #[test]
    fn nullable_text_accepts_null() {
        let update =
            build_update_sql("products", &json!({ "description": null }), PRODUCT_COLUMNS, "id", 2)
                .unwrap();
        assert_eq!(update.values, vec![SqlValue::Null, SqlValue::U64(2)]);
    }

    #[test]
    fn unknown_columns_are_refused() {
        let err = build_update_sql(
            "products",
            &json!({ "id = 1; DROP TABLE products; --": "x" }),
            PRODUCT_COLUMNS,
            "id",
            1,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be updated"));
    }

    #[test]
    fn mismatched_types_are_refused() {
        assert!(build_update_sql("products", &json!({ "unit_price": true }), PRODUCT_COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("products", &json!({ "name": null }), PRODUCT_COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("products", &json!({ "name": "  " }), PRODUCT_COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("products", &json!({}), PRODUCT_COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("products", &json!([1]), PRODUCT_COLUMNS, "id", 1).is_err());
    }
}
