//! HTTP request handlers

pub mod accounts;
pub mod billing;
pub mod health;
pub mod purchases;
pub mod rates;

pub use accounts::configure as configure_accounts;
pub use billing::configure as configure_billing;
pub use health::configure as configure_health;
pub use purchases::configure as configure_purchases;
pub use rates::configure as configure_rates;

use actix_web::web;

/// Mount every route: `/health` at the root, the rest under `/api/v1`
pub fn configure(cfg: &mut web::ServiceConfig) {
    configure_health(cfg);
    cfg.service(
        web::scope("/api/v1")
            .configure(configure_accounts)
            .configure(configure_rates)
            .configure(configure_purchases)
            .configure(configure_billing),
    );
}
