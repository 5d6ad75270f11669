use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock,
};

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DetectionError, Frame};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Outcome of a successful round-trip to the recognition service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MarkReading {
    Found {
        value: String,
        confidence: Option<f64>,
    },
    /// The service answered but could not read a mark; `hint` is its own
    /// explanation when it gave one.
    NotFound { hint: Option<String> },
}

#[async_trait::async_trait]
pub trait MarkRecognizer: Send + Sync {
    async fn recognize(&self, frame: &Frame) -> Result<MarkReading, DetectionError>;
}

#[derive(Serialize)]
struct MarkRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct MarkResponse {
    #[serde(default)]
    mark: Option<Value>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    raw_response: Option<Value>,
}

/// Posts frames to the configured recognition endpoint. One attempt per
/// call; timeouts are the HTTP client defaults.
pub struct HttpMarkRecognizer {
    http: Client,
    endpoint: RwLock<String>,
    verbose: AtomicBool,
}

impl HttpMarkRecognizer {
    pub fn new(endpoint: impl Into<String>, verbose: bool) -> anyhow::Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: RwLock::new(endpoint.into()),
            verbose: AtomicBool::new(verbose),
        })
    }

    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        match self.endpoint.write() {
            Ok(mut guard) => *guard = endpoint,
            Err(poisoned) => *poisoned.into_inner() = endpoint,
        }
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    fn endpoint(&self) -> String {
        match self.endpoint.read() {
            Ok(guard) => guard.trim().to_string(),
            Err(poisoned) => poisoned.into_inner().trim().to_string(),
        }
    }

    fn diagnostic(&self, message: &str) {
        if self.verbose.load(Ordering::Relaxed) {
            log_info!("{}", message);
        } else {
            log::debug!("{}", message);
        }
    }
}

#[async_trait::async_trait]
impl MarkRecognizer for HttpMarkRecognizer {
    async fn recognize(&self, frame: &Frame) -> Result<MarkReading, DetectionError> {
        let endpoint = self.endpoint();
        if endpoint.is_empty() {
            return Err(DetectionError::NotConfigured);
        }

        let image = frame.to_data_url();
        self.diagnostic(&format!(
            "Sending {} byte frame ({} chars encoded) to {}",
            frame.bytes.len(),
            image.len(),
            endpoint
        ));

        let started = std::time::Instant::now();
        let response = self
            .http
            .post(&endpoint)
            .json(&MarkRequest { image: &image })
            .send()
            .await
            .map_err(|err| {
                log_error!("Mark service request to {} failed: {}", endpoint, err);
                DetectionError::Network(err.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            log_error!("Failed to read mark service response body: {}", err);
            DetectionError::Network(err.to_string())
        })?;

        self.diagnostic(&format!(
            "Mark service answered {} in {}ms: {}",
            status,
            started.elapsed().as_millis(),
            body
        ));

        interpret_response(status.as_u16(), &body)
    }
}

/// Map an HTTP status and body from the recognition service to a reading.
pub fn interpret_response(status: u16, body: &str) -> Result<MarkReading, DetectionError> {
    if !(200..300).contains(&status) {
        let body = match serde_json::from_str::<Value>(body) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_else(|_| body.to_string()),
            Err(_) => body.to_string(),
        };
        log_warn!("Mark service error {}: {}", status, body);
        return Err(DetectionError::Service { status, body });
    }

    let parsed: MarkResponse = serde_json::from_str(body)
        .map_err(|err| DetectionError::MalformedResponse(err.to_string()))?;

    let hint = parsed.raw_response.as_ref().and_then(value_text);

    let reading = match parsed.mark.as_ref() {
        None | Some(Value::Null) => MarkReading::NotFound { hint },
        Some(Value::Number(number)) => MarkReading::Found {
            value: number_text(number),
            confidence: parsed.confidence,
        },
        Some(Value::String(text)) if !text.trim().is_empty() => MarkReading::Found {
            value: text.trim().to_string(),
            confidence: parsed.confidence,
        },
        Some(Value::String(_)) => MarkReading::NotFound { hint },
        Some(other) => {
            log_warn!("Unexpected mark format in service response: {}", other);
            MarkReading::NotFound { hint }
        }
    };

    match &reading {
        MarkReading::Found { value, confidence } => {
            log_info!("Mark service read {} (confidence {:?})", value, confidence)
        }
        MarkReading::NotFound { hint } => {
            log_warn!("Mark service could not read a mark (hint: {:?})", hint)
        }
    }

    Ok(reading)
}

fn number_text(number: &serde_json::Number) -> String {
    if let Some(integer) = number.as_i64() {
        return integer.to_string();
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => format!("{}", float as i64),
        _ => number.to_string(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.trim().to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use crate::detection::frame::png_fixture;

    fn frame() -> Frame {
        Frame {
            mime: "image/png".into(),
            bytes: png_fixture(2, 2),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/detect")
    }

    #[test]
    fn numeric_and_string_marks_are_found() {
        assert_eq!(
            interpret_response(200, r#"{"mark": 87, "confidence": 0.9}"#).unwrap(),
            MarkReading::Found {
                value: "87".into(),
                confidence: Some(0.9)
            }
        );
        assert_eq!(
            interpret_response(200, r#"{"mark": " 42 "}"#).unwrap(),
            MarkReading::Found {
                value: "42".into(),
                confidence: None
            }
        );
        assert_eq!(
            interpret_response(200, r#"{"mark": 65.0}"#).unwrap(),
            MarkReading::Found {
                value: "65".into(),
                confidence: None
            }
        );
        assert_eq!(
            interpret_response(200, r#"{"mark": 0}"#).unwrap(),
            MarkReading::Found {
                value: "0".into(),
                confidence: None
            }
        );
    }

    #[test]
    fn null_or_missing_mark_is_not_found_with_hint() {
        assert_eq!(
            interpret_response(200, r#"{"mark": null, "raw_response": "unclear"}"#).unwrap(),
            MarkReading::NotFound {
                hint: Some("unclear".into())
            }
        );
        assert_eq!(
            interpret_response(200, "{}").unwrap(),
            MarkReading::NotFound { hint: None }
        );
        assert_eq!(
            interpret_response(200, r#"{"mark": ""}"#).unwrap(),
            MarkReading::NotFound { hint: None }
        );
    }

    #[test]
    fn error_statuses_carry_status_and_body() {
        let err = interpret_response(502, r#"{"error":"upstream"}"#).unwrap_err();
        match err {
            DetectionError::Service { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("\"error\": \"upstream\""));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            interpret_response(500, "boom").unwrap_err(),
            DetectionError::Service {
                status: 500,
                body: "boom".into()
            }
        );
    }

    #[test]
    fn unparseable_success_body_is_malformed() {
        assert!(matches!(
            interpret_response(200, "<html>"),
            Err(DetectionError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn posts_data_url_and_reads_mark() {
        let router = Router::new().route(
            "/detect",
            post(|Json(body): Json<Value>| async move {
                let image = body["image"].as_str().unwrap_or_default();
                if image.starts_with("data:image/png;base64,") {
                    Json(serde_json::json!({ "mark": "87", "confidence": 0.75 }))
                } else {
                    Json(serde_json::json!({ "mark": null, "raw_response": "no image" }))
                }
            }),
        );
        let endpoint = serve(router).await;

        let recognizer = HttpMarkRecognizer::new(endpoint, true).unwrap();
        let reading = recognizer.recognize(&frame()).await.unwrap();
        assert_eq!(
            reading,
            MarkReading::Found {
                value: "87".into(),
                confidence: Some(0.75)
            }
        );
    }

    #[tokio::test]
    async fn service_errors_are_surfaced() {
        let router = Router::new().route(
            "/detect",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "model offline" })),
                )
            }),
        );
        let endpoint = serve(router).await;

        let recognizer = HttpMarkRecognizer::new(endpoint, false).unwrap();
        let err = recognizer.recognize(&frame()).await.unwrap_err();
        assert!(matches!(err, DetectionError::Service { status: 500, .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let recognizer = HttpMarkRecognizer::new(format!("http://{addr}/detect"), false).unwrap();
        let err = recognizer.recognize(&frame()).await.unwrap_err();
        assert!(matches!(err, DetectionError::Network(_)));
    }

    #[tokio::test]
    async fn empty_endpoint_is_not_configured() {
        let recognizer = HttpMarkRecognizer::new("  ", false).unwrap();
        assert_eq!(
            recognizer.recognize(&frame()).await.unwrap_err(),
            DetectionError::NotConfigured
        );

        recognizer.set_endpoint("http://127.0.0.1:9/detect");
        assert_eq!(recognizer.endpoint(), "http://127.0.0.1:9/detect");
    }
}
