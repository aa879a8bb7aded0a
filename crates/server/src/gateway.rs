use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use treadline_core::gateway::{GatewayError, GatewayReceipt, NotificationGateway, OrderMessage};

/// Form-post notification delivery. One POST per call; non-2xx responses are
/// reported as [`GatewayError::Rejected`] with the response body attached.
pub struct FormspreeGateway {
    client: reqwest::Client,
    timeout: Duration,
}

impl FormspreeGateway {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl NotificationGateway for FormspreeGateway {
    async fn send(
        &self,
        endpoint: &str,
        message: &OrderMessage,
    ) -> Result<GatewayReceipt, GatewayError> {
        let response = self
            .client
            .post(endpoint)
            .header(ACCEPT, "application/json")
            .form(&message.form_fields())
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| self.transport_error(error))?;

        if status.is_success() {
            Ok(GatewayReceipt { status: status.as_u16(), body })
        } else {
            Err(GatewayError::Rejected { status: status.as_u16(), body })
        }
    }
}

impl FormspreeGateway {
    fn transport_error(&self, error: reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Transport(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{extract::Path, extract::State, http::StatusCode, routing::post, Form, Json, Router};
    use serde_json::{json, Value};
    use treadline_core::gateway::{GatewayError, NotificationGateway, OrderMessage};

    use super::FormspreeGateway;

    type Captured = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

    async fn capture(
        Path(key): Path<String>,
        State(captured): State<Captured>,
        Form(fields): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        let status = if key == "unknown" { StatusCode::NOT_FOUND } else { StatusCode::OK };
        captured.lock().expect("capture lock").push((key, fields));
        if status.is_success() {
            (status, Json(json!({ "ok": true })))
        } else {
            (status, Json(json!({ "error": "Form not found" })))
        }
    }

    async fn stub_endpoint() -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new().route("/f/{key}", post(capture)).with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server");
        });
        (format!("http://{address}/f"), captured)
    }

    fn message() -> OrderMessage {
        OrderMessage {
            reply_to: "nimal@fleet.example".to_string(),
            subject: "Tire Order Request - Vehicle WP-CAB-4821 - Request #3".to_string(),
            body: "Dear Ceylon Tyre House,".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_form_fields_to_endpoint() {
        let (base, captured) = stub_endpoint().await;
        let gateway = FormspreeGateway::new(Duration::from_secs(5)).expect("client");

        let receipt =
            gateway.send(&format!("{base}/xseedkey"), &message()).await.expect("accepted");

        assert_eq!(receipt.status, 200);
        assert!(receipt.body.contains("ok"));
        let captured = captured.lock().expect("capture lock");
        assert_eq!(captured.len(), 1);
        let (key, fields) = &captured[0];
        assert_eq!(key, "xseedkey");
        assert_eq!(fields.get("email").map(String::as_str), Some("nimal@fleet.example"));
        assert_eq!(
            fields.get("_subject").map(String::as_str),
            Some("Tire Order Request - Vehicle WP-CAB-4821 - Request #3")
        );
        assert_eq!(fields.get("message").map(String::as_str), Some("Dear Ceylon Tyre House,"));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected_with_body() {
        let (base, _) = stub_endpoint().await;
        let gateway = FormspreeGateway::new(Duration::from_secs(5)).expect("client");

        let error =
            gateway.send(&format!("{base}/unknown"), &message()).await.expect_err("rejected");

        match error {
            GatewayError::Rejected { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("Form not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        drop(listener);
        let gateway = FormspreeGateway::new(Duration::from_secs(5)).expect("client");

        let error = gateway
            .send(&format!("http://{address}/f/xseedkey"), &message())
            .await
            .expect_err("connection refused");

        assert!(matches!(error, GatewayError::Transport(_)), "{error:?}");
    }
}
