//! Shared helpers for handler tests. The pool never connects, so only
//! paths that fail before the first query can be exercised here.

use actix_web::{
    App, Error,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    http::header,
    web::Data,
};
use sqlx::{MySqlPool, mysql::MySqlPoolOptions};
use std::net::SocketAddr;

use crate::auth::jwt::{TokenSubject, generate_access_token};
use crate::config::test_support::test_config;
use crate::routes::{self, RateLimiters};
use crate::service::policy_cache::PolicyCache;

pub fn lazy_pool() -> MySqlPool {
    MySqlPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&test_config().database_url)
        .expect("valid test database url")
}

/// The rate limiters key on the peer IP, so every test request needs one.
pub fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().expect("valid socket address")
}

/// Authorization header for a token with the given role.
pub fn bearer(role: &str) -> (header::HeaderName, String) {
    let subject = TokenSubject {
        user_id: 7,
        email: "asha@company.com".into(),
        role: role.into(),
        name: "Asha Raman".into(),
        department: "Sales".into(),
    };
    let token = generate_access_token(&subject, &test_config().jwt_secret, 900)
        .expect("token signs");
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

pub fn test_app(
    pool: MySqlPool,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let config = test_config();
    let limiters = RateLimiters::from_config(&config).expect("test limits are valid");
    let policies = PolicyCache::new(config.policy_cache_ttl_secs, config.default_policy.clone());

    App::new()
        .app_data(Data::new(pool))
        .app_data(Data::new(config.clone()))
        .app_data(Data::new(policies))
        .configure(move |cfg| routes::configure(cfg, &config, &limiters))
}
