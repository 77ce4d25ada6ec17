//! Typed HTTP client for the registry API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::model::{DiagnosticDomain, NewParticipant, Participant, ParticipantPatch};
use crate::server::{ErrorBody, Health};
use crate::storage::{ParticipantQuery, StorageStats};

/// Participant operations a remote registry offers.
///
/// [`ApiClient`] is the production implementation; the offline-aware
/// [`super::ParticipantService`] only depends on this trait.
#[async_trait]
pub trait RemoteParticipants: Send + Sync {
    /// List participants.
    async fn list(&self, query: &ParticipantQuery) -> Result<Vec<Participant>>;
    /// Fetch one participant.
    async fn get(&self, id: &str) -> Result<Participant>;
    /// Register a participant.
    async fn create(&self, input: &NewParticipant) -> Result<Participant>;
    /// Store a full document under its id, creating it if needed.
    async fn put(&self, participant: &Participant) -> Result<Participant>;
    /// Partially update a participant.
    async fn patch(&self, id: &str, patch: &ParticipantPatch) -> Result<Participant>;
    /// Remove a participant.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// HTTP client bound to one API base URL, e.g. `http://localhost:5000/api`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cohort/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from the `[client]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.api_url, Duration::from_millis(config.timeout_ms))
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Service health.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` or `Api` on failure.
    pub async fn health(&self) -> Result<Health> {
        self.json(self.http.get(self.url("/health"))).await
    }

    /// Storage statistics.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` or `Api` on failure.
    pub async fn stats(&self) -> Result<StorageStats> {
        self.json(self.http.get(self.url("/stats"))).await
    }

    /// Diagnostic domains in display order.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` or `Api` on failure.
    pub async fn domains(&self) -> Result<Vec<DiagnosticDomain>> {
        self.json(self.http.get(self.url("/diagnostic-domains")))
            .await
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        debug!(url = %response.url(), %status, "API response");
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.message,
            Err(_) if !text.trim().is_empty() => text.trim().to_string(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_connect() || err.is_timeout() {
            Error::unreachable(&self.base_url, err.to_string())
        } else {
            Error::Http(err)
        }
    }
}

#[async_trait]
impl RemoteParticipants for ApiClient {
    async fn list(&self, query: &ParticipantQuery) -> Result<Vec<Participant>> {
        self.json(self.http.get(self.url("/participants")).query(query))
            .await
    }

    async fn get(&self, id: &str) -> Result<Participant> {
        self.json(self.http.get(self.url(&format!("/participants/{id}"))))
            .await
    }

    async fn create(&self, input: &NewParticipant) -> Result<Participant> {
        self.json(self.http.post(self.url("/participants")).json(input))
            .await
    }

    async fn put(&self, participant: &Participant) -> Result<Participant> {
        let url = self.url(&format!("/participants/{}", participant.id));
        self.json(self.http.put(url).json(participant)).await
    }

    async fn patch(&self, id: &str, patch: &ParticipantPatch) -> Result<Participant> {
        let url = self.url(&format!("/participants/{id}"));
        self.json(self.http.patch(url).json(patch)).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/participants/{id}"));
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParticipantStatus;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &Server) -> ApiClient {
        ApiClient::new(&format!("{}/api", server.url()), Duration::from_secs(2)).unwrap()
    }

    fn participant_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.org",
            "status": "active",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_get_participant() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/participants/p1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(participant_json("p1").to_string())
            .create_async()
            .await;

        let participant = client(&server).get("p1").await.unwrap();
        assert_eq!(participant.id, "p1");
        assert!(participant.formations.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_sends_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/participants")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "ada".into()),
                Matcher::UrlEncoded("status".into(), "active".into()),
                Matcher::UrlEncoded("limit".into(), "10".into()),
            ]))
            .with_status(200)
            .with_body(json!([participant_json("p1")]).to_string())
            .create_async()
            .await;

        let query = ParticipantQuery {
            search: Some("ada".to_string()),
            status: Some(ParticipantStatus::Active),
            limit: 10,
            offset: 0,
        };
        let list = client(&server).list(&query).await.unwrap();
        assert_eq!(list.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_uses_body_message() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/participants/missing")
            .with_status(404)
            .with_body(json!({ "code": "not_found", "message": "participant missing not found" }).to_string())
            .create_async()
            .await;

        let err = client(&server).get("missing").await.unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "participant missing not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_api_error_plain_text() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/api/participants/p1")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = client(&server).delete("p1").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, ref message } if message == "boom"));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Port 9 (discard) is closed on test hosts.
        let client = ApiClient::new("http://127.0.0.1:9/api", Duration::from_secs(1)).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(err.is_unreachable(), "got {err}");
    }

    /// Accept connections and never answer, so requests time out.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        format!("http://{addr}/api")
    }

    #[tokio::test]
    async fn test_timeout_is_unreachable() {
        let url = silent_server().await;
        let client = ApiClient::new(&url, Duration::from_millis(100)).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(err.is_unreachable(), "got {err}");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:5000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api");
        assert_eq!(client.url("/health"), "http://localhost:5000/api/health");
    }
}
