//! Validation resolvers.
//!
//! A [`Resolver`] decides whether one field's value is acceptable given the
//! whole record. The controller only talks to this trait, so a form can plug
//! in its own validation engine. [`SchemaResolver`] is the standard one,
//! running each field's declared pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use formstate_core::FieldError;

use crate::fields::FormSchema;
use crate::path::FieldPath;
use crate::record::Record;
use crate::validation;
use crate::value::Value;

/// Validates one field against the current record.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the coerced value, or the field's single error.
    async fn resolve(
        &self,
        path: &FieldPath,
        value: &Value,
        record: &Record,
    ) -> Result<Value, FieldError>;
}

/// Resolves fields using the rules declared in a [`FormSchema`].
#[derive(Debug, Clone)]
pub struct SchemaResolver {
    schema: Arc<FormSchema>,
}

impl SchemaResolver {
    /// Creates a resolver for the given schema.
    pub const fn new(schema: Arc<FormSchema>) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Resolver for SchemaResolver {
    async fn resolve(
        &self,
        path: &FieldPath,
        value: &Value,
        record: &Record,
    ) -> Result<Value, FieldError> {
        match self.schema.field(path) {
            Some(def) => validation::validate_value(def, value, record).await,
            None => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldDef, FieldType, SchemaNode};
    use formstate_core::ErrorKind;

    fn resolver() -> SchemaResolver {
        SchemaResolver::new(Arc::new(FormSchema::new(
            "test",
            vec![SchemaNode::list(
                "phone",
                vec![SchemaNode::field(
                    FieldDef::new("number", FieldType::Text)
                        .required_message("Phone number is required"),
                )],
            )],
        )))
    }

    #[tokio::test]
    async fn test_resolves_list_item_field_by_pattern() {
        let path = FieldPath::parse("phone.4.number").unwrap();
        let err = resolver()
            .resolve(&path, &Value::from(""), &Record::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Required);
        assert_eq!(err.message, "Phone number is required");
    }

    #[tokio::test]
    async fn test_undeclared_path_passes_through() {
        let path = FieldPath::parse("nickname").unwrap();
        let value = resolver()
            .resolve(&path, &Value::from("x"), &Record::default())
            .await
            .unwrap();
        assert_eq!(value, Value::from("x"));
    }
}
