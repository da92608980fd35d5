use anyhow::{Context, Result};
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::utils::email_filter::normalize;

/// Normalized email to the id of the account that owns it.
/// Emails are never reassigned, so entries only expire.
static OWNERS: Lazy<Cache<String, u64>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(12 * 3600))
        .build()
});

pub async fn remember(email: &str, user_id: u64) {
    OWNERS.insert(normalize(email), user_id).await;
}

/// `None` only means "not cached"; the database stays authoritative.
pub async fn owner(email: &str) -> Option<u64> {
    OWNERS.get(&normalize(email)).await
}

/// Preloads active accounts seen in the last `days` days, `batch_size` rows at a time.
pub async fn warmup_email_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut chunks = sqlx::query_as::<_, (u64, String)>(
        r#"
        SELECT id, email
        FROM users
        WHERE is_active = TRUE
        AND COALESCE(last_login_at, created_at) >= NOW() - INTERVAL ? DAY
        "#,
    )
    .bind(days)
    .fetch(pool)
    .chunks(batch_size.max(1));

    let mut loaded = 0usize;
    while let Some(chunk) = chunks.next().await {
        let rows = chunk
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .context("email cache warmup query failed")?;
        loaded += rows.len();
        futures::future::join_all(rows.iter().map(|(id, email)| remember(email, *id))).await;
    }

    tracing::info!(loaded, days, "Email cache warmed up");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn owner_is_found_under_any_casing() {
        assert_eq!(owner("owner.test@company.com").await, None);
        remember(" Owner.Test@Company.com", 42).await;
        assert_eq!(owner("owner.test@company.com").await, Some(42));
        assert_eq!(owner("OWNER.TEST@COMPANY.COM ").await, Some(42));
    }
}
