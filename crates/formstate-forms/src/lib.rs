//! # formstate-forms
//!
//! Form controller for the formstate workspace. Holds the value and
//! validation state of a structured record, runs possibly asynchronous
//! field validation with last-initiated-wins ordering, and notifies
//! observers of every change.
//!
//! ## Architecture
//!
//! A [`FormSchema`](fields::FormSchema) declares the record's shape and each
//! field's rule chain. A [`FormController`](controller::FormController) holds
//! the live record and delegates every validation to a
//! [`Resolver`](resolver::Resolver); the standard
//! [`SchemaResolver`](resolver::SchemaResolver) runs the schema's rules, and
//! any other validation engine can be plugged in instead.
//!
//! ## Module Overview
//!
//! - [`value`] - The [`Value`](value::Value) leaf type
//! - [`path`] - Dotted field paths (`address.line1`, `phone.0.number`)
//! - [`record`] - The record tree and stable list item identities
//! - [`rules`] - The [`Rule`](rules::Rule) trait and built-in rules
//! - [`fields`] - Field definitions, type coercion, and schemas
//! - [`validation`] - The per-field validation pipeline
//! - [`resolver`] - Pluggable validation resolvers
//! - [`oracle`] - Remote uniqueness checks
//! - [`defaults`] - Asynchronous default-value providers
//! - [`state`] - Field metadata, form state, and change events
//! - [`controller`] - The form controller
//! - [`bound_field`] - Per-input bindings
//! - [`field_array`] - List handles
//! - [`channel_form`] - The channel sign-up form

// These clippy lints are intentionally allowed for the forms crate:
// - struct_excessive_bools: FormState and FieldMeta are flag snapshots
// - module_name_repetitions: FieldDef, FormSchema, etc. read better fully named
// - missing_errors_doc: every fallible method returns the same FormError contract
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod bound_field;
pub mod channel_form;
pub mod controller;
pub mod defaults;
pub mod field_array;
pub mod fields;
pub mod oracle;
pub mod path;
pub mod record;
pub mod resolver;
pub mod rules;
pub mod state;
pub mod validation;
pub mod value;

pub use bound_field::FieldBinding;
pub use controller::{FormController, SetValueOptions};
pub use field_array::{ArrayField, FieldArray};
pub use fields::{FieldDef, FieldType, FormSchema, SchemaNode};
pub use path::FieldPath;
pub use record::{ItemId, Record};
pub use resolver::{Resolver, SchemaResolver};
pub use state::{ChangeKind, FieldMeta, FormState, WatchEvent};
pub use value::Value;
