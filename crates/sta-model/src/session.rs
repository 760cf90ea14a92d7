//! The session capability: how entities and sets reach the server.
//!
//! Entities, entity sets and queries never talk to a transport directly.
//! They hold an `Arc<dyn Session>` and issue synchronous [`Request`]s
//! through it. `sta-client` provides the production implementation; tests
//! provide in-memory ones.

use std::fmt;

use crate::error::ServiceError;
use crate::registry::ModelRegistry;

/// HTTP method of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to the transport. `url` is absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

impl Request {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    #[must_use]
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn patch(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Patch,
            url: url.into(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            body: None,
        }
    }
}

/// What the transport got back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
    /// The `Location` header, set by servers on create.
    pub location: Option<String>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// `404 Not Found` or `204 No Content`: the target does not exist.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self.status, 204 | 404)
    }

    /// Return the response unchanged on success.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Status`] with the body for any non-2xx status.
    pub fn error_for_status(self) -> Result<Self, ServiceError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ServiceError::Status {
            status: self.status,
            body: self.body,
        })
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Json`] if the body is not valid JSON.
    pub fn json(&self) -> Result<serde_json::Value, ServiceError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Server capabilities that shape pub/sub topics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PubSubCapabilities {
    /// The server accepts `$expand` in topics.
    pub expand_allowed: bool,
    /// The server accepts `$filter` in topics.
    pub filter_allowed: bool,
}

/// A connection to one service endpoint.
pub trait Session: Send + Sync {
    /// The model every entity of this session is typed against.
    fn registry(&self) -> &ModelRegistry;

    /// Service root, e.g. `https://example.org/FROST-Server/v1.1`.
    fn base_url(&self) -> &str;

    /// Issue one request and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] (or [`ServiceError::Other`]) when
    /// no response was received. Non-2xx statuses are returned as responses.
    fn execute(&self, request: &Request) -> Result<Response, ServiceError>;

    /// Prefix prepended to every pub/sub topic, e.g. `v1.1/`.
    fn topic_prefix(&self) -> &str {
        ""
    }

    fn pubsub_capabilities(&self) -> PubSubCapabilities {
        PubSubCapabilities::default()
    }

    /// Resolve a service-relative path. Absolute URLs pass through.
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET a URL and parse the JSON body.
    ///
    /// # Errors
    ///
    /// Propagates transport failures, non-2xx statuses and invalid JSON.
    fn get_json(&self, url: &str) -> Result<serde_json::Value, ServiceError> {
        tracing::debug!(url, "GET");
        self.execute(&Request::get(url))?.error_for_status()?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Session for Fixed {
        fn registry(&self) -> &ModelRegistry {
            unreachable!("not used in these tests")
        }

        fn base_url(&self) -> &str {
            "http://localhost:8080/v1.1/"
        }

        fn execute(&self, request: &Request) -> Result<Response, ServiceError> {
            match request.url.as_str() {
                "http://localhost:8080/v1.1/Things" => Ok(Response::new(200, r#"{"value":[]}"#)),
                _ => Ok(Response::new(404, "not here")),
            }
        }
    }

    #[test]
    fn url_for_joins_relative_paths() {
        let session = Fixed;
        assert_eq!(session.url_for("Things(1)"), "http://localhost:8080/v1.1/Things(1)");
        assert_eq!(session.url_for("/Things"), "http://localhost:8080/v1.1/Things");
        assert_eq!(
            session.url_for("https://other.org/Things?$skip=100"),
            "https://other.org/Things?$skip=100"
        );
    }

    #[test]
    fn get_json_checks_status() {
        let session = Fixed;
        let json = session.get_json(&session.url_for("Things")).unwrap();
        assert_eq!(json, serde_json::json!({"value": []}));

        let err = session.get_json(&session.url_for("Nope")).unwrap_err();
        assert!(matches!(err, ServiceError::Status { status: 404, .. }));
    }

    #[test]
    fn absent_statuses() {
        assert!(Response::new(404, "").is_absent());
        assert!(Response::new(204, "").is_absent());
        assert!(!Response::new(500, "").is_absent());
        assert!(Response::new(201, "").with_location("x").is_success());
    }
}
