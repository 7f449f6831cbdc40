//! Default-value providers.
//!
//! A form's defaults may come from somewhere slow, such as a user profile
//! endpoint. A [`DefaultsProvider`] produces a JSON object of defaults; the
//! controller loads it once and becomes ready when it resolves.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use formstate_core::{FormError, FormResult, Settings};

/// Asynchronously produces a form's default values.
#[async_trait]
pub trait DefaultsProvider: Send + Sync {
    /// Loads the defaults as a JSON object.
    async fn load(&self) -> FormResult<serde_json::Value>;

    /// Defaults to use when [`load`](Self::load) fails. `None` starts every
    /// field blank.
    fn fallback(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Defaults known up front.
#[derive(Debug, Clone)]
pub struct StaticDefaults(pub serde_json::Value);

#[async_trait]
impl DefaultsProvider for StaticDefaults {
    async fn load(&self) -> FormResult<serde_json::Value> {
        Ok(self.0.clone())
    }
}

/// Defaults built from a fixed template, with selected fields copied from a
/// remote JSON resource.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use formstate_forms::defaults::RemoteDefaults;
///
/// let provider = RemoteDefaults::new(
///     "https://jsonplaceholder.typicode.com/users/1",
///     serde_json::json!({"username": "Batman", "email": ""}),
///     Duration::from_secs(5),
/// )
/// .unwrap()
/// .copy_field("email");
/// assert_eq!(provider.url().path(), "/users/1");
/// ```
#[derive(Debug, Clone)]
pub struct RemoteDefaults {
    client: Client,
    url: Url,
    template: serde_json::Value,
    copy_fields: Vec<String>,
}

impl RemoteDefaults {
    /// Creates a provider fetching `url` and filling `template`.
    pub fn new(url: &str, template: serde_json::Value, timeout: Duration) -> FormResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| FormError::ConfigurationError(format!("invalid defaults URL: {e}")))?;
        let client = Client::builder()
            .user_agent(concat!("formstate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FormError::ConfigurationError(e.to_string()))?;
        Ok(Self {
            client,
            url,
            template,
            copy_fields: Vec::new(),
        })
    }

    /// Creates a provider fetching `{defaults_url}/{resource}`.
    pub fn from_settings(
        settings: &Settings,
        resource: &str,
        template: serde_json::Value,
    ) -> FormResult<Self> {
        let url = format!(
            "{}/{}",
            settings.defaults_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        );
        Self::new(&url, template, settings.http_timeout())
    }

    /// Copies the named top-level field from the remote resource.
    #[must_use]
    pub fn copy_field(mut self, field: impl Into<String>) -> Self {
        self.copy_fields.push(field.into());
        self
    }

    /// Returns the resource URL.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Merges the listed fields of `remote` into the template.
    ///
    /// A field the resource lacks keeps its template value. Only a template
    /// that is not a JSON object is an error.
    pub fn merge(&self, remote: &serde_json::Value) -> FormResult<serde_json::Value> {
        let mut defaults = self.template.clone();
        let target = defaults
            .as_object_mut()
            .ok_or_else(|| FormError::Defaults("template must be a JSON object".to_string()))?;
        for field in &self.copy_fields {
            match remote.get(field) {
                Some(value) => {
                    target.insert(field.clone(), value.clone());
                }
                None => {
                    tracing::warn!(
                        url = %self.url,
                        field = %field,
                        "remote defaults missing field, keeping template value"
                    );
                }
            }
        }
        Ok(defaults)
    }
}

#[async_trait]
impl DefaultsProvider for RemoteDefaults {
    async fn load(&self) -> FormResult<serde_json::Value> {
        tracing::debug!(url = %self.url, "fetching default values");
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| FormError::Defaults(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FormError::Defaults(format!("unexpected status {status}")));
        }
        let remote: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FormError::Defaults(e.to_string()))?;
        self.merge(&remote)
    }

    fn fallback(&self) -> Option<serde_json::Value> {
        Some(self.template.clone())
    }
}
