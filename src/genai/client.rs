use std::time::Duration;

use reqwest::Client;

use super::error::GenAiError;
use super::types::{GenerateRequest, GenerateResponse};

const API_URL: &str = "https://api.textgen.example.com/v1/generate";

/// Anything that can service a generation request. The HTTP client
/// implements this; tests substitute scripted mocks.
pub trait TextGenerator {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenAiError>;
}

pub struct GenAiClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl GenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Self {
            api_key,
            client,
            base_url,
        }
    }
}

impl TextGenerator for GenAiClient {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenAiError> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(GenAiError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenAiError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<GenerateResponse>().await?;
        Ok(body)
    }
}

/// Offline generator backing the built-in demo. Produces deterministic,
/// schema-valid content for every task kind with a short artificial
/// latency so the terminal spinner has something to show.
pub struct StubGenerator;

impl TextGenerator for StubGenerator {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenAiError> {
        tokio::time::sleep(Duration::from_millis(120)).await;
        let payload = match req.task.as_str() {
            "outline" => serde_json::json!({
                "title": "Course Outline",
                "summary": "A structured walkthrough of the requested topic, \
                            built module by module with hands-on lessons.",
                "depth": "intermediate",
                "modules": ["Foundations", "Core concepts", "Applied practice"],
            }),
            "module" => serde_json::json!({
                "title": "Module Overview",
                "overview": "This module introduces the central ideas of its \
                             topic and connects them to the lessons that follow.",
                "objectives": [
                    "Explain the core concepts in your own words",
                    "Apply them to a small worked example",
                ],
            }),
            "lesson" => serde_json::json!({
                "title": "Lesson Walkthrough",
                "body": "This lesson develops one idea from the module overview \
                         in depth. It opens with the motivating problem, works \
                         through a concrete example step by step, and closes \
                         with common pitfalls to avoid when applying the \
                         technique on your own projects and exercises.",
                "key_points": [
                    "Start from the motivating problem",
                    "Work one concrete example end to end",
                ],
            }),
            _ => serde_json::json!({
                "title": "Module Checkpoint",
                "questions": [
                    "Summarize the module's central idea in two sentences.",
                    "Work the example from lesson one with changed inputs.",
                    "Name one pitfall discussed and how to avoid it.",
                ],
            }),
        };

        Ok(GenerateResponse {
            id: "gen_stub".to_string(),
            text: payload.to_string(),
            model: "stub".to_string(),
            usage: super::types::Usage {
                input_tokens: 0,
                output_tokens: 0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_parses_success_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(bearer_token("sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen_1",
                "text": "{\"title\": \"Rust Basics\"}",
                "model": "textgen-large",
                "usage": {"input_tokens": 10, "output_tokens": 42}
            })))
            .mount(&server)
            .await;

        let client =
            GenAiClient::with_base_url("sk-test".into(), format!("{}/v1/generate", server.uri()));
        let req = GenerateRequest {
            task: "outline".into(),
            prompt: "outline please".into(),
            max_tokens: 1024,
        };
        let resp = client.generate(&req).await.unwrap();
        assert_eq!(resp.id, "gen_1");
        assert_eq!(resp.usage.output_tokens, 42);
    }

    #[tokio::test]
    async fn generate_maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = GenAiClient::with_base_url("sk-test".into(), server.uri());
        let req = GenerateRequest {
            task: "lesson".into(),
            prompt: "p".into(),
            max_tokens: 16,
        };
        let err = client.generate(&req).await.unwrap_err();
        match err {
            GenAiError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 7000),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_maps_server_error_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let client = GenAiClient::with_base_url("sk-test".into(), server.uri());
        let req = GenerateRequest {
            task: "module".into(),
            prompt: "p".into(),
            max_tokens: 16,
        };
        let err = client.generate(&req).await.unwrap_err();
        match err {
            GenAiError::ApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
