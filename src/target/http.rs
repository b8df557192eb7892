//! REST target backend.
//!
//! This module provides the HTTP client for reconciling against a
//! conventional REST collection endpoint: `GET ?key=value` to list,
//! `POST` to create, `PATCH /{id}` to update, `DELETE /{id}` to delete.
//!
//! Transient failures (rate limiting, network errors) are retried a
//! bounded number of times here, in the transport; the pipeline above
//! never retries.

use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{
    ActionError, AuthError, ConnectionError, ConvergeError, Result, ValidationError,
};
use crate::model::{CurrentState, Delta, DesiredState, ParamValue, ResourceIdentity};
use crate::schema::TargetConfig;

use super::TargetSystem;

use async_trait::async_trait;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// REST target backend.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    /// HTTP client.
    client: Client,
    /// Base URL of the resource collection.
    base_url: String,
    /// Bearer token presented on every request.
    token: String,
}

impl HttpTarget {
    /// Creates a REST target from connection settings.
    ///
    /// The bearer token is read from the environment variable named in
    /// `config.auth_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing, the credential
    /// environment variable is unset, or the HTTP client cannot be built.
    pub fn new(config: &TargetConfig) -> Result<Self> {
        let token = std::env::var(&config.auth_env).map_err(|_| {
            ConvergeError::Auth(AuthError::MissingCredentials {
                env_var: config.auth_env.clone(),
            })
        })?;

        Self::with_token(config, token)
    }

    /// Creates a REST target with an explicit bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or the HTTP client
    /// cannot be built.
    pub fn with_token(config: &TargetConfig, token: impl Into<String>) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| ValidationError::schema("http targets require target.base_url"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ConnectionError::unreachable(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Returns the URL of a single resource.
    fn item_url(&self, id: &str) -> String {
        format!("{}/{id}", self.base_url)
    }

    /// Sends a request, retrying transient failures.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.header(header::AUTHORIZATION, format!("Bearer {}", self.token));

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            let Some(cloned) = request.try_clone() else {
                // Non-replayable body; single attempt only.
                return self.send_once(request).await;
            };

            match self.send_once(cloned).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ConvergeError::Connection(ConnectionError::unreachable("Max retries exceeded"))
        }))
    }

    /// Sends a single request and maps transport-level failures.
    async fn send_once(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ConvergeError::Connection(ConnectionError::Timeout {
                    message: e.to_string(),
                })
            } else {
                ConvergeError::Connection(ConnectionError::unreachable(e.to_string()))
            }
        })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(ConvergeError::Connection(ConnectionError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ConvergeError::Auth(AuthError::Rejected {
                message: if body.is_empty() {
                    String::from("Invalid or expired token")
                } else {
                    body
                },
            }));
        }

        Ok(response)
    }

    /// Parses a mutation response into remote state, re-fetching when the
    /// response does not carry the full object.
    async fn state_from_mutation(
        &self,
        operation: &str,
        response: Response,
    ) -> Result<CurrentState> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ConvergeError::Action(ActionError::rejected(
                operation,
                status.as_u16(),
                raw_payload(&body),
            )));
        }

        if body.trim().is_empty() {
            return Err(ConvergeError::Action(ActionError::IncompleteState {
                operation: operation.to_string(),
                message: String::from("target returned an empty mutation response"),
            }));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: format!("Failed to parse mutation response: {e}"),
            })
        })?;

        let serde_json::Value::Object(object) = value else {
            return Err(ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: String::from("mutation response is not a JSON object"),
            }));
        };

        // A bare id acknowledgement means the full object must be fetched.
        if object.len() == 1 && object.contains_key("id") {
            let id = object
                .get("id")
                .map(id_to_string)
                .ok_or_else(|| {
                    ConvergeError::Action(ActionError::IncompleteState {
                        operation: operation.to_string(),
                        message: String::from("mutation response id is not readable"),
                    })
                })?;
            trace!("Mutation returned bare id {id}, re-fetching full object");
            return self.fetch_by_id(&id).await;
        }

        Ok(state_from_object(object))
    }

    /// Fetches a single resource by id.
    async fn fetch_by_id(&self, id: &str) -> Result<CurrentState> {
        let response = self.send(self.client.get(self.item_url(id))).await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: format!("Failed to fetch resource {id}: {body}"),
            }));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: format!("Failed to parse resource {id}: {e}"),
            })
        })?;

        match value {
            serde_json::Value::Object(object) => Ok(state_from_object(object)),
            _ => Err(ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: String::from("resource response is not a JSON object"),
            })),
        }
    }
}

#[async_trait]
impl TargetSystem for HttpTarget {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list_candidates(&self, identity: &ResourceIdentity) -> Result<Vec<CurrentState>> {
        let query: Vec<(String, String)> = identity
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect();

        debug!("Listing candidates from {} for ({identity})", self.base_url);

        let response = self
            .send(self.client.get(&self.base_url).query(&query))
            .await?;
        let status = response.status();

        // A collection that does not exist yet has no members.
        if status == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }

        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: body,
            }));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: format!("Failed to parse list response: {e}"),
            })
        })?;

        let serde_json::Value::Array(items) = value else {
            return Err(ConvergeError::Connection(ConnectionError::InvalidResponse {
                status: status.as_u16(),
                message: String::from("list response is not a JSON array"),
            }));
        };

        let candidates = items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::Object(object) => Some(state_from_object(object)),
                _ => None,
            })
            .collect();

        Ok(candidates)
    }

    async fn create(&self, desired: &DesiredState) -> Result<CurrentState> {
        let body: serde_json::Map<String, serde_json::Value> = desired
            .values()
            .iter()
            .map(|(key, value)| (key.clone(), serde_json::Value::from(value)))
            .collect();

        debug!("Creating resource at {}", self.base_url);

        let response = self
            .send(self.client.post(&self.base_url).json(&body))
            .await?;
        self.state_from_mutation("create", response).await
    }

    async fn update(&self, id: &str, delta: &Delta) -> Result<CurrentState> {
        let body: serde_json::Map<String, serde_json::Value> = delta
            .changes
            .iter()
            .map(|(key, value)| (key.clone(), serde_json::Value::from(value)))
            .collect();

        debug!("Updating resource {id} ({delta})");

        let response = self
            .send(self.client.patch(self.item_url(id)).json(&body))
            .await?;
        self.state_from_mutation("update", response).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        debug!("Deleting resource {id}");

        let response = self.send(self.client.delete(self.item_url(id))).await?;
        let status = response.status();

        // Already gone counts as deleted.
        if status == StatusCode::NOT_FOUND || status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ConvergeError::Action(ActionError::rejected(
            "delete",
            status.as_u16(),
            raw_payload(&body),
        )))
    }
}

/// Converts a JSON object into remote state, splitting off the id field.
fn state_from_object(object: serde_json::Map<String, serde_json::Value>) -> CurrentState {
    let mut id = None;
    let mut attributes = std::collections::BTreeMap::new();

    for (key, value) in object {
        if key == "id" {
            id = Some(id_to_string(&value));
        } else {
            attributes.insert(key, ParamValue::from(value));
        }
    }

    CurrentState::new(id, attributes)
}

/// Renders a JSON id value as a string.
fn id_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Preserves a remote error body verbatim, as JSON when possible.
fn raw_payload(body: &str) -> serde_json::Value {
    serde_json::from_str(body)
        .unwrap_or_else(|_| serde_json::Value::String(body.to_string()))
}
