//! Request model: what a collaborator asks for (`RequestSpec`) and what the
//! queue keeps (`QueuedRequest`).
//!
//! Bodies and metadata are `serde_json::Value` so the queue can persist them
//! without knowing the backend's schema.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RequestId;
use super::priority::Priority;
use crate::error::CourierError;

/// HTTP method of a queued call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(CourierError::InvalidRequest(format!(
                "unsupported HTTP method {other:?}"
            ))),
        }
    }
}

/// What a collaborator hands to `enqueue`.
///
/// Validated at the enqueue boundary; see [`RequestSpec::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub endpoint: String,
    pub method: HttpMethod,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    #[serde(default)]
    pub priority: Priority,

    /// Overrides the manager-wide default when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
            priority: Priority::Normal,
            max_retries: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Reject specs the executor could never send.
    ///
    /// - endpoint: absolute `http(s)://` URL, or a `/path` when a base URL is configured
    /// - header names: non-empty token characters only
    /// - max_retries: at least 1 when given
    pub fn validate(&self, base_url: Option<&str>) -> Result<(), CourierError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(CourierError::InvalidRequest("endpoint is empty".into()));
        }
        if endpoint.chars().any(char::is_whitespace) {
            return Err(CourierError::InvalidRequest(format!(
                "endpoint {endpoint:?} contains whitespace"
            )));
        }
        let absolute = endpoint.starts_with("http://") || endpoint.starts_with("https://");
        if !absolute {
            if !endpoint.starts_with('/') {
                return Err(CourierError::InvalidRequest(format!(
                    "endpoint {endpoint:?} must be an http(s) URL or start with '/'"
                )));
            }
            if base_url.is_none() {
                return Err(CourierError::InvalidRequest(format!(
                    "relative endpoint {endpoint:?} needs a configured base_url"
                )));
            }
        }

        for name in self.headers.keys() {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c));
            if !valid {
                return Err(CourierError::InvalidRequest(format!(
                    "invalid header name {name:?}"
                )));
            }
        }

        if self.max_retries == Some(0) {
            return Err(CourierError::InvalidRequest(
                "max_retries must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// One pending outbound call in the live queue.
///
/// Mutated only by a processing pass (`retry_count`, `next_attempt_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: RequestId,
    pub endpoint: String,
    pub method: HttpMethod,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Earliest time of the next attempt (retry backoff). `None` = ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedRequest {
    pub fn from_spec(
        id: RequestId,
        spec: RequestSpec,
        enqueued_at: DateTime<Utc>,
        default_max_retries: u32,
    ) -> Self {
        Self {
            id,
            endpoint: spec.endpoint.trim().to_string(),
            method: spec.method,
            headers: spec.headers,
            body: spec.body,
            enqueued_at,
            retry_count: 0,
            max_retries: spec.max_retries.unwrap_or(default_max_retries),
            priority: spec.priority,
            metadata: spec.metadata,
            next_attempt_at: None,
        }
    }

    /// Is this request eligible for an attempt at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_none_or(|at| at <= now)
    }
}
