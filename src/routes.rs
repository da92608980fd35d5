use crate::{
    api::{attendance, customer, invoice, leave_request, policy, product, quotation, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Context, Result};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-route limiters, built once and shared by every worker.
#[derive(Clone)]
pub struct RateLimiters {
    login: Limiter,
    reset: Limiter,
    refresh: Limiter,
    protected: Limiter,
}

fn build_limiter(name: &str, requests_per_min: u32) -> Result<Limiter> {
    let burst = requests_per_min.max(1);
    let per_ms = 60_000 / u64::from(burst);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .with_context(|| format!("invalid {name} rate limit: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: build_limiter("login", config.rate_login_per_min)?,
            reset: build_limiter("password reset", config.rate_reset_per_min)?,
            refresh: build_limiter("refresh", config.rate_refresh_per_min)?,
            protected: build_limiter("protected", config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::logout)),
            )
            .service(
                web::resource("/password-reset")
                    .wrap(limiters.reset.clone())
                    .route(web::post().to(handlers::request_password_reset)),
            )
            .service(
                web::resource("/password-reset/confirm")
                    .wrap(limiters.reset.clone())
                    .route(web::post().to(handlers::confirm_password_reset)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .service(
                web::resource("/me")
                    .route(web::get().to(handlers::me))
                    .route(web::put().to(handlers::update_me)),
            )
            .service(web::resource("/me/password").route(web::put().to(handlers::change_password)))
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::post().to(user::create_user))
                            .route(web::get().to(user::list_users)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(user::get_user))
                            .route(web::put().to(user::update_user)),
                    ),
            )
            .service(
                web::scope("/policies")
                    .service(web::resource("").route(web::get().to(policy::list_policies)))
                    .service(
                        web::resource("/{department}")
                            .route(web::get().to(policy::get_policy))
                            .route(web::put().to(policy::upsert_policy)),
                    ),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // before /{id} so "balance" is not taken for an id
                    .service(
                        web::resource("/balance").route(web::get().to(leave_request::leave_balance)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(leave_request::reject_leave)),
                    )
                    .service(
                        web::resource("/{id}/escalate")
                            .route(web::put().to(leave_request::escalate_leave)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
                    .service(
                        web::resource("/check-out").route(web::post().to(attendance::check_out)),
                    )
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(
                        web::resource("/summary")
                            .route(web::get().to(attendance::attendance_summary)),
                    ),
            )
            .service(
                web::scope("/customers")
                    .service(
                        web::resource("")
                            .route(web::post().to(customer::create_customer))
                            .route(web::get().to(customer::list_customers)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(customer::get_customer))
                            .route(web::put().to(customer::update_customer))
                            .route(web::delete().to(customer::delete_customer)),
                    ),
            )
            .service(
                web::scope("/products")
                    .service(
                        web::resource("")
                            .route(web::post().to(product::create_product))
                            .route(web::get().to(product::list_products)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(product::get_product))
                            .route(web::put().to(product::update_product))
                            .route(web::delete().to(product::delete_product)),
                    ),
            )
            .service(
                web::scope("/quotations")
                    .service(
                        web::resource("")
                            .route(web::post().to(quotation::create_quotation))
                            .route(web::get().to(quotation::list_quotations)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(quotation::get_quotation)))
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(quotation::update_quotation_status)),
                    )
                    .service(
                        web::resource("/{id}/convert")
                            .route(web::post().to(quotation::convert_quotation)),
                    ),
            )
            .service(
                web::scope("/invoices")
                    .service(
                        web::resource("")
                            .route(web::post().to(invoice::create_invoice))
                            .route(web::get().to(invoice::list_invoices)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(invoice::get_invoice)))
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(invoice::update_invoice_status)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ rotates: old refresh revoked, new pair returned

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;

    #[test]
    fn zero_rate_still_builds_a_limiter() {
        let mut config = test_config();
        config.rate_login_per_min = 0;
        assert!(RateLimiters::from_config(&config).is_ok());
    }
}
