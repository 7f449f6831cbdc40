//! The channel sign-up form.
//!
//! A complete form built on the controller: username, email (checked
//! against a uniqueness oracle), channel, a nested address, age, date of
//! birth, and a dynamic list of phone numbers. The rules come in two
//! flavors that differ in ordering and strictness; both run through the
//! same controller and resolver.

use std::sync::Arc;

use chrono::NaiveDate;

use formstate_core::{FormResult, Settings};

use crate::controller::FormController;
use crate::defaults::RemoteDefaults;
use crate::fields::{FieldDef, FieldType, FormSchema, SchemaNode};
use crate::oracle::{RemoteUnique, UniquenessOracle};
use crate::rules::{EmailFormat, Integer, MinValue, NotEndsWith, NotOneOf, Positive};

/// Schema name, used as the controller's span name.
pub const FORM_NAME: &str = "channel_form";

/// Email address reserved for staff.
pub const RESERVED_EMAIL: &str = "admin@example.com";

/// Email domain that is not accepted.
pub const BLOCKED_DOMAIN: &str = "baddomain.com";

/// Which rule set to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Every field typed and required; phone numbers required; age must be a
    /// positive integer. The uniqueness check runs last.
    Strict,
    /// Format first, then the uniqueness check; age only bounded; phone
    /// numbers optional.
    Lenient,
}

/// Builds the form schema for `flavor`.
pub fn schema(flavor: Flavor, oracle: Arc<dyn UniquenessOracle>) -> FormSchema {
    FormSchema::new(
        FORM_NAME,
        vec![
            SchemaNode::field(
                FieldDef::new("username", FieldType::Text)
                    .required_message("Username is required"),
            ),
            SchemaNode::field(email(flavor, oracle)),
            SchemaNode::field(
                FieldDef::new("channel", FieldType::Text).required_message("Channel is required"),
            ),
            SchemaNode::group(
                "address",
                vec![
                    SchemaNode::field(
                        FieldDef::new("line1", FieldType::Text)
                            .required_message("Address is required")
                            .label("Address line 1"),
                    ),
                    SchemaNode::field(
                        FieldDef::new("line2", FieldType::Text)
                            .label("Address line 2")
                            .disabled_when_empty("address.line1"),
                    ),
                ],
            ),
            SchemaNode::field(age(flavor)),
            SchemaNode::field(
                FieldDef::new("dob", FieldType::Date)
                    .label("Date of birth")
                    .required_message("Date of Birth is required")
                    .type_error("Date of Birth is required"),
            ),
            SchemaNode::list("phone", vec![SchemaNode::field(phone_number(flavor))]),
        ],
    )
}

fn email(flavor: Flavor, oracle: Arc<dyn UniquenessOracle>) -> FieldDef {
    let unique = RemoteUnique::new(oracle, "email", "Email already exists");
    let reserved = NotOneOf::new([RESERVED_EMAIL], "Enter a different email address");
    let blocked = NotEndsWith::new(BLOCKED_DOMAIN, "This domain is not supported");
    let field = FieldDef::new("email", FieldType::Text);

    match flavor {
        Flavor::Strict => field
            .required_message("Email is required")
            .rule(EmailFormat::new("Invalid email format"))
            .rule(reserved)
            .rule(blocked)
            .rule(unique),
        // An empty address fails the format check, not a presence check.
        Flavor::Lenient => field
            .required_message("Invalid email format")
            .rule(EmailFormat::new("Invalid email format"))
            .rule(unique)
            .rule(reserved)
            .rule(blocked),
    }
}

fn age(flavor: Flavor) -> FieldDef {
    let field = FieldDef::new("age", FieldType::Number).required_message("Age is required");
    match flavor {
        Flavor::Strict => field
            .type_error("Age must be a number")
            .rule(Positive::new("Age must be a positive number"))
            .rule(Integer::new("Age must be an integer")),
        Flavor::Lenient => field
            .type_error("Expected number, received string")
            .rule(MinValue::new(1.0, "Age is required"))
            .rule(MinValue::new(0.0, "Age must be a positive number")),
    }
}

fn phone_number(flavor: Flavor) -> FieldDef {
    let field = FieldDef::new("number", FieldType::Text).label("Phone number");
    match flavor {
        Flavor::Strict => field.required_message("Phone number is required"),
        Flavor::Lenient => field,
    }
}

/// Returns the form's default values.
pub fn default_values(email: &str, today: NaiveDate) -> serde_json::Value {
    serde_json::json!({
        "username": "Batman",
        "email": email,
        "channel": "",
        "address": {"line1": "", "line2": ""},
        "age": 0,
        "dob": today.format("%Y-%m-%d").to_string(),
        "phone": [{"number": ""}],
    })
}

/// Returns a provider that fills the default email from the configured
/// user resource (`{defaults_url}/users/1`).
pub fn remote_defaults(settings: &Settings, today: NaiveDate) -> FormResult<RemoteDefaults> {
    Ok(
        RemoteDefaults::from_settings(settings, "users/1", default_values("", today))?
            .copy_field("email"),
    )
}

/// Builds a controller for the form. Defaults still need to be loaded.
pub fn controller(
    flavor: Flavor,
    oracle: Arc<dyn UniquenessOracle>,
    settings: Settings,
) -> FormController {
    FormController::new(schema(flavor, oracle), settings)
}
