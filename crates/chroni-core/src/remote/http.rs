//! Journal backend API client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::error::{Error, Result};
use crate::models::Record;
use crate::util::{compact_text, normalize_base_url};

/// Upper bound passed to the listing endpoint; the backend defaults to 100.
const LIST_LIMIT: u32 = 10_000;

/// `RemoteStore` backed by the journal REST API (`{base}/api/entries`).
///
/// Listed entries may carry integer ids and ISO datetimes; [`Record`] reads
/// both. A backend that assigns its own ids on create does not echo the
/// client's id back, so the local copy and the listed copy stay separate
/// rows. Round-tripping ids needs a backend that stores the posted `id`.
/// Backends that ignore the `owner_id` query parameter return every entry.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url).ok_or_else(|| {
            Error::Config(format!(
                "remote API URL '{base_url}' must include http:// or https://"
            ))
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            client,
            bearer_token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn entries_url(&self) -> String {
        format!("{}/api/entries", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json(response: reqwest::Response) -> RemoteResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| RemoteError::Malformed(error.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn name(&self) -> &'static str {
        "journal-api"
    }

    async fn create_record(&self, record: &Record) -> RemoteResult<Value> {
        let request = self
            .client
            .post(self.entries_url())
            .header("Accept", "application/json")
            .json(record);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        let payload = Self::read_json(response).await?;
        if payload.is_object() {
            Ok(payload)
        } else {
            Err(RemoteError::Malformed(
                "create response is not a JSON object".to_string(),
            ))
        }
    }

    async fn list_records(&self, owner_id: Option<&str>) -> RemoteResult<Vec<Value>> {
        let mut query = vec![("limit", LIST_LIMIT.to_string())];
        if let Some(owner_id) = owner_id {
            query.push(("owner_id", owner_id.to_string()));
        }

        let request = self
            .client
            .get(self.entries_url())
            .header("Accept", "application/json")
            .query(&query);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        match Self::read_json(response).await? {
            Value::Array(items) => Ok(items),
            _ => Err(RemoteError::Malformed(
                "list response is not a JSON array".to_string(),
            )),
        }
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Unreachable(error.to_string())
}

/// Server outages and throttling are transient; every other failure status
/// means the payload itself was refused.
fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(body);
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        RemoteError::Unreachable(format!("HTTP {}: {message}", status.as_u16()))
    } else {
        RemoteError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn parse_api_error(body: &str) -> String {
    if let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(body) {
        for field in ["detail", "message", "error"] {
            match payload.get(field) {
                Some(Value::String(message)) if !message.trim().is_empty() => {
                    return compact_text(message);
                }
                Some(Value::Null) | None => {}
                Some(other) => return compact_text(&other.to_string()),
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        compact_text(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_rejects_urls_without_scheme() {
        assert!(HttpRemoteStore::new("localhost:8000").is_err());
        let store = HttpRemoteStore::new("http://localhost:8000/").unwrap();
        assert_eq!(store.base_url(), "http://localhost:8000");
        assert_eq!(store.entries_url(), "http://localhost:8000/api/entries");
    }

    #[test]
    fn server_errors_are_transient() {
        let error = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(error.is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
    }

    #[test]
    fn client_errors_are_rejections() {
        let error = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"detail": "Failed to create entry: bad date"}"#,
        );
        assert_eq!(
            error,
            RemoteError::Rejected {
                status: 400,
                message: "Failed to create entry: bad date".to_string(),
            }
        );
    }

    #[test]
    fn parse_api_error_handles_structured_and_plain_bodies() {
        assert_eq!(parse_api_error(r#"{"message": "nope"}"#), "nope");
        assert_eq!(parse_api_error(r#"{"error": "denied"}"#), "denied");
        assert_eq!(parse_api_error("plain failure"), "plain failure");
        assert_eq!(parse_api_error("  "), "empty response body");
        assert!(parse_api_error(r#"{"detail": [{"loc": ["body"]}]}"#).contains("loc"));
    }
}
