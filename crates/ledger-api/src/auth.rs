//! Service token authentication
//!
//! Internal callers (cron, payment webhook relay, feature services) present a
//! shared token in the `X-Service-Token` header.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use ledger_core::AppError;
use tracing::{debug, warn};

/// Header carrying the service token
pub const SERVICE_TOKEN_HEADER: &str = "X-Service-Token";

/// Optional header naming the calling service
pub const SERVICE_NAME_HEADER: &str = "X-Service-Name";

/// Expected token, registered as `web::Data<ServiceAuth>`
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    token: String,
}

impl ServiceAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Compare without short-circuiting on the first differing byte
    fn matches(&self, presented: &str) -> bool {
        let expected = self.token.as_bytes();
        let presented = presented.as_bytes();
        if expected.is_empty() || expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Authenticated internal caller
///
/// Use as a handler argument to require a valid service token.
#[derive(Debug, Clone)]
pub struct ServiceCaller {
    /// Value of `X-Service-Name`, or "service" when absent
    pub name: String,
}

impl FromRequest for ServiceCaller {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(auth) = req.app_data::<web::Data<ServiceAuth>>() else {
            warn!("ServiceAuth not found in app data");
            return ready(Err(AppError::Unauthorized(
                "Authentication not configured".to_string(),
            )));
        };

        let token = req
            .headers()
            .get(SERVICE_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());

        match token {
            Some(token) if auth.matches(token) => {
                let name = req
                    .headers()
                    .get(SERVICE_NAME_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("service")
                    .to_string();
                debug!(caller = %name, "Service authenticated");
                ready(Ok(ServiceCaller { name }))
            }
            Some(_) => {
                warn!(path = %req.path(), "Invalid service token");
                ready(Err(AppError::Unauthorized("Invalid service token".to_string())))
            }
            None => {
                debug!(path = %req.path(), "Missing service token");
                ready(Err(AppError::Unauthorized(format!(
                    "Missing {} header",
                    SERVICE_TOKEN_HEADER
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_extract_service_caller() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ServiceAuth::new("s3cret")))
                .route(
                    "/test",
                    web::get().to(|caller: ServiceCaller| async move {
                        assert_eq!(caller.name, "billing-cron");
                        "OK"
                    }),
                ),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header((SERVICE_TOKEN_HEADER, "s3cret"))
            .insert_header((SERVICE_NAME_HEADER, "billing-cron"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_missing_auth_config() {
        let app = test::init_service(
            App::new().route("/test", web::get().to(|_caller: ServiceCaller| async { "OK" })),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header((SERVICE_TOKEN_HEADER, "anything"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[::core::prelude::v1::test]
    fn test_token_matching() {
        let auth = ServiceAuth::new("s3cret");
        assert!(auth.matches("s3cret"));
        assert!(!auth.matches("s3cres"));
        assert!(!auth.matches("s3cret-longer"));
        assert!(!ServiceAuth::new("").matches(""));
    }
}
