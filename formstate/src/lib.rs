//! # formstate
//!
//! Form state controller with pluggable, asynchronous field validation.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `formstate` to get everything, or on the individual
//! crates for finer-grained control.
//!
//! ```
//! use formstate::prelude::*;
//!
//! let schema = FormSchema::new(
//!     "profile",
//!     vec![SchemaNode::field(FieldDef::new("name", FieldType::Text))],
//! );
//! let form = FormController::new(schema, Settings::default())
//!     .with_defaults(formstate::serde_json::json!({"name": "Bruce"}));
//! assert_eq!(form.get_value("name").unwrap(), Value::from("Bruce"));
//! ```

/// Settings, error types, and logging setup.
pub use formstate_core as core;

/// The form controller, schemas, rules, and resolvers.
#[cfg(feature = "forms")]
pub use formstate_forms as forms;

/// Observer lists with detachable subscriptions.
#[cfg(feature = "signals")]
pub use formstate_signals as signals;

pub use async_trait::async_trait;
pub use serde_json;
pub use tracing;

/// The types most programs need.
pub mod prelude {
    pub use formstate_core::{
        ErrorKind, FieldError, FormError, FormResult, Settings, ValidationMode,
    };

    #[cfg(feature = "forms")]
    pub use formstate_forms::{
        ChangeKind, FieldBinding, FieldDef, FieldMeta, FieldPath, FieldType, FormController,
        FormSchema, FormState, ItemId, Record, Resolver, SchemaNode, SetValueOptions, Value,
        WatchEvent,
    };

    #[cfg(feature = "signals")]
    pub use formstate_signals::Subscription;
}
