//! Field bindings.
//!
//! A [`FieldBinding`] is what an input holds after
//! [`FormController::register`]. It pairs a leaf path with the controller
//! and exposes the value, the change and blur handlers, and the field's
//! metadata. Bindings own no state, so every binding for a path observes
//! the same underlying cell.

use formstate_core::FormResult;

use crate::controller::{FormController, SetValueOptions};
use crate::path::FieldPath;
use crate::state::{ChangeKind, FieldMeta};
use crate::value::Value;

/// An input bound to one leaf of a form.
#[derive(Debug, Clone)]
pub struct FieldBinding {
    form: FormController,
    path: FieldPath,
    name: String,
}

impl FieldBinding {
    pub(crate) fn new(form: FormController, path: FieldPath) -> Self {
        let name = path.to_string();
        Self { form, path, name }
    }

    /// Returns the bound path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field label.
    pub fn label(&self) -> &str {
        self.form
            .schema()
            .field(&self.path)
            .map_or(self.name.as_str(), |def| def.label.as_str())
    }

    /// Returns the current value.
    pub fn value(&self) -> Value {
        self.form.value_at(&self.path)
    }

    /// Returns the current metadata.
    pub fn meta(&self) -> FieldMeta {
        self.form.meta_at(&self.path)
    }

    /// Handles an input change.
    ///
    /// The value is stored and marked dirty, then validated if the form's
    /// validation mode asks for it.
    pub async fn on_change(&self, value: impl Into<Value>) -> FormResult<()> {
        let options = SetValueOptions {
            mark_dirty: true,
            ..SetValueOptions::default()
        };
        self.form
            .write_value(&self.path, value.into(), options, ChangeKind::Change)?;
        if self.form.mode().validates_on_change(self.meta().touched) {
            self.form.validate_path(&self.path).await?;
        }
        Ok(())
    }

    /// Handles an input losing focus: marks the field touched and validates
    /// it if the form's validation mode asks for it.
    pub async fn on_blur(&self) -> FormResult<()> {
        self.form.touch(&self.path)?;
        if self.form.mode().validates_on_blur() {
            self.form.validate_path(&self.path).await?;
        }
        Ok(())
    }

    /// Returns `true` while the field's presentation rule disables it.
    ///
    /// This never affects validation or the record.
    pub fn is_disabled(&self) -> bool {
        self.form
            .schema()
            .field(&self.path)
            .and_then(|def| def.disabled_when_empty.as_ref())
            .is_some_and(|gate| self.form.value_at(gate).is_empty())
    }
}
