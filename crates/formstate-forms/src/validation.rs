//! Validation pipeline for a single field.
//!
//! Validating a field runs three stages, stopping at the first failure:
//! 1. Presence: an empty value fails with `Required` if the field is required
//! 2. Coercion: the raw value is converted to the field type (`TypeMismatch`)
//! 3. Rules: each rule runs in declaration order on the coerced value
//!
//! Only one error is ever reported per field. Optional fields left empty
//! skip coercion and rules.

use formstate_core::FieldError;

use crate::fields::FieldDef;
use crate::record::Record;
use crate::value::Value;

/// Checks presence and coerces a raw value for a field.
///
/// Returns the coerced value, or the raw value unchanged if it is empty and
/// the field is optional.
pub fn clean_field_value(field: &FieldDef, raw: &Value) -> Result<Value, FieldError> {
    if raw.is_empty() {
        if field.required {
            return Err(FieldError::required(
                field.message_for("required", "This field is required."),
            ));
        }
        return Ok(raw.clone());
    }

    field.field_type.coerce(raw).ok_or_else(|| {
        FieldError::type_mismatch(
            field.message_for("type_mismatch", field.field_type.default_type_error()),
        )
    })
}

/// Runs the field's rules against a coerced value, stopping at the first
/// failure.
pub async fn run_rules(field: &FieldDef, value: &Value, record: &Record) -> Result<(), FieldError> {
    for rule in &field.rules {
        if let Err(err) = rule.check(value, record).await {
            tracing::trace!(field = %field.name, rule = rule.name(), code = err.kind.code(), "rule failed");
            return Err(err);
        }
    }
    Ok(())
}

/// Runs the full pipeline for one field and returns the coerced value.
pub async fn validate_value(
    field: &FieldDef,
    raw: &Value,
    record: &Record,
) -> Result<Value, FieldError> {
    let value = clean_field_value(field, raw)?;
    if value.is_empty() {
        return Ok(value);
    }
    run_rules(field, &value, record).await?;
    Ok(value)
}
