//! Field validation rules.
//!
//! A [`Rule`] checks one constraint on an already-coerced value. Rules are
//! attached to a [`FieldDef`](crate::fields::FieldDef) and evaluated in
//! declaration order; the first failure becomes the field's error and the
//! remaining rules are skipped.
//!
//! Rules receive the whole record so they can express cross-field
//! constraints. Synchronous rules simply never await; the oracle-backed
//! [`RemoteUnique`](crate::oracle::RemoteUnique) rule is the asynchronous one.

use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use formstate_core::FieldError;

use crate::record::Record;
use crate::value::Value;

/// A single validation constraint.
///
/// # Examples
///
/// ```
/// use formstate_forms::record::Record;
/// use formstate_forms::rules::{MinLength, Rule};
/// use formstate_forms::value::Value;
///
/// # futures::executor::block_on(async {
/// let rule = MinLength::new(3, "Too short");
/// let record = Record::default();
/// assert!(rule.check(&Value::from("abcd"), &record).await.is_ok());
/// assert!(rule.check(&Value::from("ab"), &record).await.is_err());
/// # });
/// ```
#[async_trait]
pub trait Rule: Send + Sync + fmt::Debug {
    /// Checks the value, returning the field error if the constraint fails.
    async fn check(&self, value: &Value, record: &Record) -> Result<(), FieldError>;

    /// Returns a human-readable name for this rule.
    fn name(&self) -> &str;
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

/// Returns `true` if `s` looks like an email address.
pub fn is_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

/// Validates that a string has at least `min` characters.
#[derive(Debug, Clone)]
pub struct MinLength {
    min: usize,
    message: String,
}

impl MinLength {
    /// Creates a new `MinLength` rule.
    pub fn new(min: usize, message: impl Into<String>) -> Self {
        Self {
            min,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for MinLength {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value {
            Value::String(s) if s.chars().count() < self.min => {
                Err(FieldError::out_of_range(&self.message))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinLength"
    }
}

/// Validates that a string has at most `max` characters.
#[derive(Debug, Clone)]
pub struct MaxLength {
    max: usize,
    message: String,
}

impl MaxLength {
    /// Creates a new `MaxLength` rule.
    pub fn new(max: usize, message: impl Into<String>) -> Self {
        Self {
            max,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for MaxLength {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value {
            Value::String(s) if s.chars().count() > self.max => {
                Err(FieldError::out_of_range(&self.message))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxLength"
    }
}

/// Validates that a string is an email address.
#[derive(Debug, Clone)]
pub struct EmailFormat {
    message: String,
}

impl EmailFormat {
    /// Creates a new `EmailFormat` rule.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for EmailFormat {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value {
            Value::String(s) if !is_email(s) => Err(FieldError::format_invalid(&self.message)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "EmailFormat"
    }
}

/// Rejects a fixed set of values.
#[derive(Debug, Clone)]
pub struct NotOneOf {
    disallowed: Vec<Value>,
    message: String,
}

impl NotOneOf {
    /// Creates a new `NotOneOf` rule.
    pub fn new(disallowed: impl IntoIterator<Item = impl Into<Value>>, message: impl Into<String>) -> Self {
        Self {
            disallowed: disallowed.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for NotOneOf {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        if self.disallowed.contains(value) {
            Err(FieldError::conflict(&self.message))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        "NotOneOf"
    }
}

/// Rejects strings ending with a suffix (e.g. a blocked email domain).
#[derive(Debug, Clone)]
pub struct NotEndsWith {
    suffix: String,
    message: String,
}

impl NotEndsWith {
    /// Creates a new `NotEndsWith` rule.
    pub fn new(suffix: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for NotEndsWith {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value {
            Value::String(s) if s.ends_with(&self.suffix) => {
                Err(FieldError::conflict(&self.message))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "NotEndsWith"
    }
}

/// Validates that a number is at least `min`.
#[derive(Debug, Clone)]
pub struct MinValue {
    min: f64,
    message: String,
}

impl MinValue {
    /// Creates a new `MinValue` rule.
    pub fn new(min: f64, message: impl Into<String>) -> Self {
        Self {
            min,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for MinValue {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value.as_f64() {
            Some(n) if n < self.min => Err(FieldError::out_of_range(&self.message)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinValue"
    }
}

/// Validates that a number is at most `max`.
#[derive(Debug, Clone)]
pub struct MaxValue {
    max: f64,
    message: String,
}

impl MaxValue {
    /// Creates a new `MaxValue` rule.
    pub fn new(max: f64, message: impl Into<String>) -> Self {
        Self {
            max,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for MaxValue {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value.as_f64() {
            Some(n) if n > self.max => Err(FieldError::out_of_range(&self.message)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxValue"
    }
}

/// Validates that a number is strictly greater than zero.
#[derive(Debug, Clone)]
pub struct Positive {
    message: String,
}

impl Positive {
    /// Creates a new `Positive` rule.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for Positive {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value.as_f64() {
            Some(n) if n <= 0.0 => Err(FieldError::out_of_range(&self.message)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "Positive"
    }
}

/// Validates that a number has no fractional part.
#[derive(Debug, Clone)]
pub struct Integer {
    message: String,
}

impl Integer {
    /// Creates a new `Integer` rule.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Rule for Integer {
    async fn check(&self, value: &Value, _record: &Record) -> Result<(), FieldError> {
        match value {
            Value::Float(f) if f.fract() != 0.0 => Err(FieldError::format_invalid(&self.message)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "Integer"
    }
}

/// A synchronous rule backed by a plain function.
///
/// The function sees the value and the record, so it can express
/// cross-field constraints.
pub struct Predicate {
    name: String,
    test: Box<dyn Fn(&Value, &Record) -> bool + Send + Sync>,
    error: FieldError,
}

impl Predicate {
    /// Creates a new `Predicate` rule that fails with `error` when `test`
    /// returns `false`.
    pub fn new(
        name: impl Into<String>,
        test: impl Fn(&Value, &Record) -> bool + Send + Sync + 'static,
        error: FieldError,
    ) -> Self {
        Self {
            name: name.into(),
            test: Box::new(test),
            error,
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("name", &self.name)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Rule for Predicate {
    async fn check(&self, value: &Value, record: &Record) -> Result<(), FieldError> {
        if (self.test)(value, record) {
            Ok(())
        } else {
            Err(self.error.clone())
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
