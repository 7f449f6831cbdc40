//! Settings for form controllers.
//!
//! [`Settings`] holds the knobs a controller reads at construction: when
//! binding events trigger validation, where the remote oracle and defaults
//! provider live, and how logging is configured. Every field has a default,
//! so partial configuration files are fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When binding events trigger validation of a field.
///
/// Explicit calls (`set_value` with validation, `trigger`, `submit`) always
/// validate regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Validate only on submit.
    OnSubmit,
    /// Validate on blur.
    OnBlur,
    /// Validate on every change.
    OnChange,
    /// Validate on the first blur, then on every change.
    #[default]
    OnTouched,
    /// Validate on blur and on every change.
    All,
}

impl ValidationMode {
    /// Returns `true` if a change event should validate a field with the
    /// given touched state.
    pub const fn validates_on_change(self, touched: bool) -> bool {
        match self {
            Self::OnChange | Self::All => true,
            Self::OnTouched => touched,
            Self::OnSubmit | Self::OnBlur => false,
        }
    }

    /// Returns `true` if a blur event should validate.
    pub const fn validates_on_blur(self) -> bool {
        matches!(self, Self::OnBlur | Self::OnTouched | Self::All)
    }
}

/// The complete set of controller settings.
///
/// # Examples
///
/// ```
/// use formstate_core::settings::{Settings, ValidationMode};
///
/// let settings = Settings::default();
/// assert_eq!(settings.mode, ValidationMode::OnTouched);
/// assert!(settings.reset_on_successful_submit);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    // ── Validation ───────────────────────────────────────────────────

    /// Validation trigger before the first submit.
    pub mode: ValidationMode,
    /// Validation trigger after the first submit.
    pub revalidate_mode: ValidationMode,
    /// Whether a successful submit resets the form to its defaults.
    pub reset_on_successful_submit: bool,

    // ── Remote endpoints ─────────────────────────────────────────────

    /// Base URL of the uniqueness oracle.
    pub oracle_url: String,
    /// Base URL of the default-value provider.
    pub defaults_url: String,
    /// Timeout for remote requests, in seconds.
    pub http_timeout_secs: u64,

    // ── Logging ──────────────────────────────────────────────────────

    /// Whether debug mode (pretty logs) is enabled.
    pub debug: bool,
    /// Tracing filter directive, e.g. "info" or "formstate_forms=debug".
    pub log_level: String,
}

impl Settings {
    /// Returns the remote request timeout as a [`Duration`].
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Returns the validation mode in effect, given whether the form has
    /// been submitted at least once.
    pub const fn effective_mode(&self, submitted: bool) -> ValidationMode {
        if submitted {
            self.revalidate_mode
        } else {
            self.mode
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: ValidationMode::OnTouched,
            revalidate_mode: ValidationMode::OnChange,
            reset_on_successful_submit: true,
            oracle_url: "https://jsonplaceholder.typicode.com".to_string(),
            defaults_url: "https://jsonplaceholder.typicode.com".to_string(),
            http_timeout_secs: 10,
            debug: true,
            log_level: "info".to_string(),
        }
    }
}
