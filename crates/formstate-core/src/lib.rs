//! # formstate-core
//!
//! Core types, settings, and error types for the formstate workspace.
//! This crate has no workspace dependencies and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Field-level validation outcomes and controller faults
//! - [`settings`] - Controller settings (validation modes, endpoints, logging)
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorKind, FieldError, FormError, FormResult};
pub use settings::{Settings, ValidationMode};
