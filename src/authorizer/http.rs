//! HTTP authorizer
//!
//! POSTs `{"owner_id": "...", "amount": "..."}` as JSON and hands the
//! status and decoded body back to the gateway. A body that is not JSON
//! becomes `payload: None` and is parsed as a denial upstream.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::client::{AuthCallError, AuthResponse, Authorizer};
use crate::core_types::OwnerId;

#[derive(Debug, Serialize)]
struct AuthorizeBody {
    owner_id: OwnerId,
    amount: Decimal,
}

/// [`Authorizer`] backed by a remote HTTP endpoint
pub struct HttpAuthorizer {
    client: reqwest::Client,
    url: String,
}

impl HttpAuthorizer {
    /// `timeout` bounds connect + request + body; the gateway applies its own bound as well
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Only timeouts and failed connects are worth another attempt
fn classify(e: reqwest::Error) -> AuthCallError {
    if e.is_timeout() {
        AuthCallError::Timeout
    } else if e.is_connect() {
        AuthCallError::Connect(e.to_string())
    } else {
        AuthCallError::Request(e.to_string())
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn check(&self, owner_id: OwnerId, amount: Decimal) -> Result<AuthResponse, AuthCallError> {
        let response = self
            .client
            .post(&self.url)
            .json(&AuthorizeBody { owner_id, amount })
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let payload = match response.bytes().await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(status, error = %e, "Authorizer body is not JSON");
                    None
                }
            },
            Err(e) if e.is_timeout() => return Err(AuthCallError::Timeout),
            Err(e) => {
                debug!(status, error = %e, "Failed to read authorizer body");
                None
            }
        };

        Ok(AuthResponse::new(status, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn authorizer(addr: SocketAddr, path: &str) -> HttpAuthorizer {
        HttpAuthorizer::new(format!("http://{addr}{path}"), Duration::from_millis(200)).unwrap()
    }

    #[tokio::test]
    async fn test_sends_owner_and_amount() {
        let app = Router::new().route(
            "/authorize",
            post(|Json(body): Json<Value>| async move {
                let ok = body["amount"] == "12.50" && body["owner_id"].is_string();
                let message = if ok { "Autorizado" } else { "Negado" };
                Json(json!({ "message": message }))
            }),
        );
        let addr = serve(app).await;

        let response = authorizer(addr, "/authorize")
            .check(OwnerId::new(), dec!(12.50))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.payload, Some(json!({"message": "Autorizado"})));
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let app = Router::new().route(
            "/authorize",
            post(|| async { (StatusCode::FORBIDDEN, Json(json!({"message": "Negado"}))) }),
        );
        let addr = serve(app).await;

        let response = authorizer(addr, "/authorize")
            .check(OwnerId::new(), dec!(1))
            .await
            .unwrap();
        assert_eq!(response.status, 403);
    }

    #[tokio::test]
    async fn test_non_json_body_has_no_payload() {
        let app = Router::new().route("/authorize", post(|| async { "Autorizado" }));
        let addr = serve(app).await;

        let response = authorizer(addr, "/authorize")
            .check(OwnerId::new(), dec!(1))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.payload, None);
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let app = Router::new().route(
            "/authorize",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"message": "Autorizado"}))
            }),
        );
        let addr = serve(app).await;

        let result = authorizer(addr, "/authorize")
            .check(OwnerId::new(), dec!(1))
            .await;
        assert_eq!(result, Err(AuthCallError::Timeout));
    }

    #[tokio::test]
    async fn test_malformed_url_is_not_transient() {
        let authorizer = HttpAuthorizer::new("not a url", Duration::from_millis(200)).unwrap();
        let err = authorizer.check(OwnerId::new(), dec!(1)).await.unwrap_err();
        assert!(matches!(err, AuthCallError::Request(_)), "unexpected error: {err}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = authorizer(addr, "/authorize")
            .check(OwnerId::new(), dec!(1))
            .await;
        let err = result.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
