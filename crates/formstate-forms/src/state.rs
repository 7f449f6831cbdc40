//! Field metadata, form state snapshots, and change events.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use formstate_core::FieldError;

/// Per-field metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMeta {
    /// The field has been blurred at least once.
    pub touched: bool,
    /// The value differs from its default.
    pub dirty: bool,
    /// A validation pass is in flight.
    pub validating: bool,
    /// The latest validation error, if any.
    pub error: Option<FieldError>,
}

/// What caused a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A bound input changed.
    Change,
    /// `set_value` was called.
    SetValue,
    /// A list item was appended.
    Append,
    /// A list item was removed.
    Remove,
    /// The form was reset.
    Reset,
    /// Default values finished loading.
    DefaultsLoaded,
}

/// A value change notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchEvent {
    /// The whole record after the change.
    pub values: serde_json::Value,
    /// The changed path, or `None` when the whole record changed.
    pub name: Option<String>,
    /// What caused the change.
    pub kind: ChangeKind,
}

/// A snapshot of the derived form state.
///
/// Every flag is computed from field metadata and submit counters when the
/// snapshot is taken; nothing here is stored independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormState {
    /// Default values have been loaded.
    pub is_ready: bool,
    /// Any field or list differs from its default.
    pub is_dirty: bool,
    /// No errors, every required field populated, nothing validating.
    pub is_valid: bool,
    /// A validation pass is in flight for at least one field.
    pub is_validating: bool,
    /// A submit is running.
    pub is_submitting: bool,
    /// At least one submit attempt has completed.
    pub is_submitted: bool,
    /// The last submit attempt passed validation.
    pub is_submit_successful: bool,
    /// Number of submit attempts.
    pub submit_count: u32,
    /// Current errors by path.
    pub errors: BTreeMap<String, FieldError>,
    /// Paths of dirty fields and of lists whose length changed.
    pub dirty_fields: BTreeSet<String>,
    /// Paths of touched fields.
    pub touched_fields: BTreeSet<String>,
}
