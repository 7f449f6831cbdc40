//! Remote uniqueness checks.
//!
//! A [`UniquenessOracle`] answers "is this value already taken?". The
//! [`RemoteUnique`] rule wraps an oracle so it can sit in a field's rule
//! chain like any other rule. A failed lookup never counts as "taken": it
//! becomes a `RemoteUnavailable` error so the user can retry.
//!
//! [`HttpOracle`] queries a REST collection (`GET {base}/users?email=...`)
//! and treats a non-empty JSON array as "exists".

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use formstate_core::{FieldError, Settings};

use crate::record::Record;
use crate::rules::Rule;
use crate::value::Value;

/// Message attached to `RemoteUnavailable` errors.
pub const UNAVAILABLE_MESSAGE: &str = "Could not verify this value, please try again";

/// Errors raised while consulting an oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Transport failure or timeout.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The response body had an unexpected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The configured base URL is invalid.
    #[error("invalid oracle URL: {0}")]
    Url(#[from] url::ParseError),

    /// The configured base URL cannot have a path appended.
    #[error("oracle URL cannot be a base: {0}")]
    InvalidBase(String),
}

/// Answers whether a value is already in use.
#[async_trait]
pub trait UniquenessOracle: Send + Sync {
    /// Returns `true` if `value` is already taken for `field`.
    async fn exists(&self, field: &str, value: &str) -> Result<bool, OracleError>;
}

/// An oracle backed by a JSON REST collection.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    base: Url,
    resource: String,
}

impl HttpOracle {
    /// Creates an oracle querying `{base_url}/users`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(OracleError::InvalidBase(base_url.to_string()));
        }
        let client = Client::builder()
            .user_agent(concat!("formstate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base,
            resource: "users".to_string(),
        })
    }

    /// Creates an oracle from the configured URL and timeout.
    pub fn from_settings(settings: &Settings) -> Result<Self, OracleError> {
        Self::new(&settings.oracle_url, settings.http_timeout())
    }

    /// Sets the collection queried under the base URL.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Builds the lookup URL for a field/value pair.
    pub fn lookup_url(&self, field: &str, value: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.resource);
        }
        url.query_pairs_mut().append_pair(field, value);
        url
    }
}

#[async_trait]
impl UniquenessOracle for HttpOracle {
    async fn exists(&self, field: &str, value: &str) -> Result<bool, OracleError> {
        let url = self.lookup_url(field, value);
        tracing::debug!(%url, "querying uniqueness oracle");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }
        let body: serde_json::Value = response.json().await?;
        existing_records(&body)
    }
}

/// Interprets an oracle response body: a non-empty array means "exists".
pub fn existing_records(body: &serde_json::Value) -> Result<bool, OracleError> {
    body.as_array()
        .map(|records| !records.is_empty())
        .ok_or_else(|| OracleError::Decode("expected a JSON array".to_string()))
}

/// An oracle holding its taken values in memory.
#[derive(Debug, Default)]
pub struct InMemoryOracle {
    taken: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemoryOracle {
    /// Creates an empty oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `value` as taken for `field`.
    pub fn insert(&self, field: impl Into<String>, value: impl Into<String>) {
        self.taken
            .write()
            .expect("oracle lock poisoned")
            .entry(field.into())
            .or_default()
            .insert(value.into());
    }

    /// Builder variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }
}

#[async_trait]
impl UniquenessOracle for InMemoryOracle {
    async fn exists(&self, field: &str, value: &str) -> Result<bool, OracleError> {
        let taken = self.taken.read().expect("oracle lock poisoned");
        Ok(taken.get(field).is_some_and(|values| values.contains(value)))
    }
}

/// Rejects values the oracle reports as taken.
#[derive(Clone)]
pub struct RemoteUnique {
    oracle: Arc<dyn UniquenessOracle>,
    field: String,
    message: String,
}

impl RemoteUnique {
    /// Creates a new `RemoteUnique` rule querying `field`.
    pub fn new(
        oracle: Arc<dyn UniquenessOracle>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Debug for RemoteUnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteUnique")
            .field("field", &self.field)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Rule for RemoteUnique {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        let Some(candidate) = value.as_str().filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        match self.oracle.exists(&self.field, candidate).await {
            Ok(true) => Err(FieldError::conflict(&self.message)),
            Ok(false) => Ok(()),
            Err(err) => {
                tracing::warn!(field = %self.field, error = %err, "uniqueness check failed");
                Err(FieldError::remote_unavailable(UNAVAILABLE_MESSAGE))
            }
        }
    }

    fn name(&self) -> &str {
        "RemoteUnique"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstate_core::ErrorKind;

    struct Failing;

    #[async_trait]
    impl UniquenessOracle for Failing {
        async fn exists(&self, _field: &str, _value: &str) -> Result<bool, OracleError> {
            Err(OracleError::Status(503))
        }
    }

    #[test]
    fn test_lookup_url() {
        let oracle =
            HttpOracle::new("https://jsonplaceholder.typicode.com", Duration::from_secs(1)).unwrap();
        assert_eq!(
            oracle.lookup_url("email", "bruce@wayne.com").as_str(),
            "https://jsonplaceholder.typicode.com/users?email=bruce%40wayne.com"
        );
    }

    #[test]
    fn test_lookup_url_with_base_path_and_resource() {
        let oracle = HttpOracle::new("http://localhost:8080/api/", Duration::from_secs(1))
            .unwrap()
            .resource("accounts");
        assert_eq!(
            oracle.lookup_url("email", "a b").as_str(),
            "http://localhost:8080/api/accounts?email=a+b"
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(matches!(
            HttpOracle::new("not a url", Duration::from_secs(1)),
            Err(OracleError::Url(_))
        ));
        assert!(matches!(
            HttpOracle::new("mailto:someone@example.com", Duration::from_secs(1)),
            Err(OracleError::InvalidBase(_))
        ));
    }

    #[test]
    fn test_existing_records() {
        assert!(existing_records(&serde_json::json!([{"id": 1}])).unwrap());
        assert!(!existing_records(&serde_json::json!([])).unwrap());
        assert!(matches!(
            existing_records(&serde_json::json!({"id": 1})),
            Err(OracleError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_oracle() {
        let oracle = InMemoryOracle::new().with("email", "taken@example.com");
        assert!(oracle.exists("email", "taken@example.com").await.unwrap());
        assert!(!oracle.exists("email", "free@example.com").await.unwrap());
        assert!(!oracle.exists("username", "taken@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_unique_conflict() {
        let oracle = Arc::new(InMemoryOracle::new().with("email", "taken@example.com"));
        let rule = RemoteUnique::new(oracle, "email", "Email already exists");
        let err = rule
            .check(&Value::from("taken@example.com"), &Record::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.message, "Email already exists");
        assert!(rule
            .check(&Value::from("free@example.com"), &Record::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_remote_unique_unavailable() {
        let rule = RemoteUnique::new(Arc::new(Failing), "email", "Email already exists");
        let err = rule
            .check(&Value::from("bruce@wayne.com"), &Record::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemoteUnavailable);
        assert_eq!(err.message, UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_remote_unique_skips_empty() {
        let rule = RemoteUnique::new(Arc::new(Failing), "email", "Email already exists");
        assert!(rule.check(&Value::from(""), &Record::default()).await.is_ok());
    }
}
