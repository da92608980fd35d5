use moka::future::Cache;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::config::PolicyDefaults;
use crate::model::department_policy::DepartmentPolicy;

/// Department policies are read on every check-in and leave submission but
/// change rarely, so lookups go through a short-lived cache.
#[derive(Clone)]
pub struct PolicyCache {
    cache: Cache<String, DepartmentPolicy>,
    defaults: PolicyDefaults,
}

impl PolicyCache {
    pub fn new(ttl_secs: u64, defaults: PolicyDefaults) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
            defaults,
        }
    }

    /// Stored policy for `department`, or the configured defaults.
    pub async fn lookup(
        &self,
        pool: &MySqlPool,
        department: &str,
    ) -> Result<DepartmentPolicy, sqlx::Error> {
        if let Some(policy) = self.cache.get(department).await {
            return Ok(policy);
        }

        let stored = fetch_policy(pool, department).await?;
        let policy = stored.unwrap_or_else(|| self.defaults.for_department(department));
        self.cache
            .insert(department.to_string(), policy.clone())
            .await;
        Ok(policy)
    }

    pub async fn invalidate(&self, department: &str) {
        self.cache.invalidate(department).await;
    }
}

async fn fetch_policy(
    pool: &MySqlPool,
    department: &str,
) -> Result<Option<DepartmentPolicy>, sqlx::Error> {
    sqlx::query_as::<_, DepartmentPolicy>(
        r#"
        SELECT department, required_check_in_time, required_check_out_time, overtime_threshold,
               allows_off_site_work, overtime_allowed,
               max_monthly_permission_hours, max_monthly_casual_leaves
        FROM department_policies
        WHERE department = ?
        "#,
    )
    .bind(department)
    .fetch_optional(pool)
    .await
}
