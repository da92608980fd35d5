use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

use crate::model::department_policy::DepartmentPolicy;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub password_reset_ttl: i64,
    pub log_level: String,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_reset_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Office geofence + wall clock
    pub office: OfficeLocation,
    pub office_offset: FixedOffset,

    // Fallback for departments without a stored policy
    pub default_policy: PolicyDefaults,
    pub policy_cache_ttl_secs: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct OfficeLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

#[derive(Clone, Debug)]
pub struct PolicyDefaults {
    pub required_check_in_time: NaiveTime,
    pub required_check_out_time: NaiveTime,
    pub allows_off_site_work: bool,
    pub overtime_allowed: bool,
    pub max_monthly_permission_hours: u32,
    pub max_monthly_casual_leaves: u32,
}

impl PolicyDefaults {
    pub fn for_department(&self, department: &str) -> DepartmentPolicy {
        DepartmentPolicy {
            department: department.to_string(),
            required_check_in_time: self.required_check_in_time,
            required_check_out_time: self.required_check_out_time,
            overtime_threshold: None,
            allows_off_site_work: self.allows_off_site_work,
            overtime_allowed: self.overtime_allowed,
            max_monthly_permission_hours: self.max_monthly_permission_hours,
            max_monthly_casual_leaves: self.max_monthly_casual_leaves,
        }
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}

fn time_or(key: &str, default: &str) -> Result<NaiveTime> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("{key} must be HH:MM, got '{raw}'"))
}

fn offset_or(key: &str, default_minutes: i32) -> Result<FixedOffset> {
    let minutes: i32 = parsed_or(key, default_minutes)?;
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("{key} is out of range: {minutes} minutes"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parsed_or("RUN_MIGRATIONS", false)?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days
            password_reset_ttl: parsed_or("PASSWORD_RESET_TTL", 3600)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_reset_per_min: parsed_or("RATE_RESET_PER_MIN", 10)?,
            rate_refresh_per_min: parsed_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            office: OfficeLocation {
                latitude: parsed_or("OFFICE_LATITUDE", 13.0827)?,
                longitude: parsed_or("OFFICE_LONGITUDE", 80.2707)?,
                radius_meters: parsed_or("OFFICE_RADIUS_METERS", 200.0)?,
            },
            office_offset: offset_or("OFFICE_UTC_OFFSET_MINUTES", 330)?,

            default_policy: PolicyDefaults {
                required_check_in_time: time_or("DEFAULT_CHECK_IN_TIME", "09:30")?,
                required_check_out_time: time_or("DEFAULT_CHECK_OUT_TIME", "18:30")?,
                allows_off_site_work: parsed_or("DEFAULT_ALLOWS_OFF_SITE", false)?,
                overtime_allowed: parsed_or("DEFAULT_OVERTIME_ALLOWED", true)?,
                max_monthly_permission_hours: parsed_or("DEFAULT_MAX_PERMISSION_HOURS", 2)?,
                max_monthly_casual_leaves: parsed_or("DEFAULT_MAX_CASUAL_LEAVES", 1)?,
            },
            policy_cache_ttl_secs: parsed_or("POLICY_CACHE_TTL_SECS", 300)?,
        })
    }
}
