use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::{config::CollaboratorsConfig, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Transcription,
    MeetingMinutes,
    FileManagement,
}

impl Service {
    pub const ALL: [Service; 3] = [
        Service::Transcription,
        Service::MeetingMinutes,
        Service::FileManagement,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Service::Transcription => "transcription",
            Service::MeetingMinutes => "meeting_minutes",
            Service::FileManagement => "file_management",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reachability of one collaborator, as reported by `/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorHealth {
    pub ok: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// JSON-over-HTTP client for the transcription, minutes, and file services.
pub struct CollaboratorClient {
    http: reqwest::Client,
    transcription: Url,
    meeting_minutes: Url,
    file_management: Url,
}

impl CollaboratorClient {
    pub fn new(config: &CollaboratorsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("minutes-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            transcription: config.transcription_url.clone(),
            meeting_minutes: config.meeting_minutes_url.clone(),
            file_management: config.file_management_url.clone(),
        })
    }

    pub fn base_url(&self, service: Service) -> &Url {
        match service {
            Service::Transcription => &self.transcription,
            Service::MeetingMinutes => &self.meeting_minutes,
            Service::FileManagement => &self.file_management,
        }
    }

    fn endpoint(&self, service: Service, path: &str) -> Result<Url> {
        self.base_url(service)
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("bad {} endpoint '{}': {}", service, path, e)))
    }

    /// POST `body` to `service` at `path` and return the decoded JSON reply.
    ///
    /// A non-2xx status, a non-JSON body, a timeout, or `"success": false`
    /// all come back as `Error::Collaborator`.
    pub async fn call(&self, service: Service, path: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let url = self.endpoint(service, path)?;
        debug!("Calling {} at {}", service, url);

        let response = self
            .http
            .post(url.clone())
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| describe_transport_error(service, path, timeout, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| describe_transport_error(service, path, timeout, e))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
            return Err(Error::Collaborator(match detail {
                Some(detail) => format!("{} {} returned HTTP {}: {}", service, path, status.as_u16(), detail),
                None => format!("{} {} returned HTTP {}", service, path, status.as_u16()),
            }));
        }

        let reply: Value = serde_json::from_str(&text).map_err(|e| {
            Error::Collaborator(format!("{} {} returned a malformed response: {}", service, path, e))
        })?;

        if reply.get("success").and_then(Value::as_bool) == Some(false) {
            let detail = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no error detail");
            return Err(Error::Collaborator(format!("{} {} failed: {}", service, path, detail)));
        }

        Ok(reply)
    }

    /// GET the service's `/health` endpoint.
    pub async fn probe(&self, service: Service, timeout: Duration) -> CollaboratorHealth {
        let started = Instant::now();
        let url = match self.endpoint(service, "health") {
            Ok(url) => url,
            Err(e) => {
                return CollaboratorHealth {
                    ok: false,
                    url: self.base_url(service).to_string(),
                    status_code: None,
                    latency_ms: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        let outcome = self.http.get(url.clone()).timeout(timeout).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => CollaboratorHealth {
                ok: response.status().is_success(),
                url: url.to_string(),
                status_code: Some(response.status().as_u16()),
                latency_ms,
                error: None,
            },
            Err(e) => CollaboratorHealth {
                ok: false,
                url: url.to_string(),
                status_code: None,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }
}

fn describe_transport_error(service: Service, path: &str, timeout: Duration, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Collaborator(format!("{} {} timed out after {:?}", service, path, timeout))
    } else {
        Error::Collaborator(format!("{} {} request failed: {}", service, path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::{get, post}, Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    fn client(url: Url) -> CollaboratorClient {
        CollaboratorClient::new(&CollaboratorsConfig {
            transcription_url: url.clone(),
            meeting_minutes_url: url.clone(),
            file_management_url: url,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn decodes_successful_reply() {
        let url = serve(Router::new().route(
            "/create-dated-folder",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"success": true, "folder_path": format!("/out/{}", body["meeting_title"].as_str().unwrap())}))
            }),
        ))
        .await;

        let reply = client(url)
            .call(
                Service::FileManagement,
                "/create-dated-folder",
                &json!({"meeting_title": "standup"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(reply["folder_path"], "/out/standup");
    }

    #[tokio::test]
    async fn rejected_and_http_errors_are_collaborator_errors() {
        let url = serve(
            Router::new()
                .route(
                    "/transcribe",
                    post(|| async { Json(json!({"success": false, "error": "Video file not found"})) }),
                )
                .route(
                    "/generate-minutes",
                    post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "model offline"}))) }),
                )
                .route("/format-transcript", post(|| async { "not json" })),
        )
        .await;
        let client = client(url);
        let timeout = Duration::from_secs(5);

        let err = client
            .call(Service::Transcription, "/transcribe", &json!({}), timeout)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Collaborator error: transcription /transcribe failed: Video file not found"
        );

        let err = client
            .call(Service::MeetingMinutes, "/generate-minutes", &json!({}), timeout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("returned HTTP 500: model offline"));

        let err = client
            .call(Service::Transcription, "/format-transcript", &json!({}), timeout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed response"));
    }

    #[tokio::test]
    async fn slow_collaborator_times_out() {
        let url = serve(Router::new().route(
            "/zip-output-folder",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"success": true}))
            }),
        ))
        .await;

        let err = client(url)
            .call(
                Service::FileManagement,
                "/zip-output-folder",
                &json!({}),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.detail(),
            "file_management /zip-output-folder timed out after 100ms"
        );
    }

    #[tokio::test]
    async fn probe_reports_reachability() {
        let url = serve(Router::new().route("/health", get(|| async { Json(json!({"status": "healthy"})) }))).await;
        let health = client(url).probe(Service::Transcription, Duration::from_secs(2)).await;
        assert!(health.ok);
        assert_eq!(health.status_code, Some(200));

        let unreachable = client(Url::parse("http://127.0.0.1:1/").unwrap())
            .probe(Service::FileManagement, Duration::from_millis(500))
            .await;
        assert!(!unreachable.ok);
        assert!(unreachable.error.is_some());
    }
}
