//! Integration tests for the form controller.
//!
//! These tests drive the channel sign-up form end to end, covering:
//! 1. Field validation and the error taxonomy
//! 2. Asynchronous validation ordering
//! 3. Lists and item identity
//! 4. Submit and reset
//! 5. Defaults loading and registration
//! 6. Subscriptions
//! 7. Dependent fields and custom resolvers

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use formstate_core::{ErrorKind, FieldError, FormError, FormResult, Settings};
use formstate_forms::channel_form::{self, Flavor};
use formstate_forms::defaults::{DefaultsProvider, RemoteDefaults, StaticDefaults};
use formstate_forms::oracle::{InMemoryOracle, OracleError, UniquenessOracle, UNAVAILABLE_MESSAGE};
use formstate_forms::rules::Predicate;
use formstate_forms::{
    ChangeKind, FieldDef, FieldPath, FieldType, FormController, FormSchema, Record, Resolver,
    SchemaNode, SetValueOptions, Value,
};

// ============================================================================
// Shared helpers
// ============================================================================

const TAKEN: &str = "Sincere@april.biz";

fn dob() -> NaiveDate {
    NaiveDate::from_ymd_opt(1939, 5, 1).unwrap()
}

/// Defaults that pass every strict rule.
fn valid_defaults() -> serde_json::Value {
    serde_json::json!({
        "username": "Batman",
        "email": "bruce@wayne.com",
        "channel": "Gotham Nights",
        "address": {"line1": "1007 Mountain Drive", "line2": ""},
        "age": 30,
        "dob": "1939-05-01",
        "phone": [{"number": "555-0100"}]
    })
}

fn settings_without_auto_reset() -> Settings {
    Settings {
        reset_on_successful_submit: false,
        ..Settings::default()
    }
}

fn in_memory_oracle() -> Arc<dyn UniquenessOracle> {
    Arc::new(InMemoryOracle::new().with("email", TAKEN))
}

fn strict_form(settings: Settings) -> FormController {
    channel_form::controller(Flavor::Strict, in_memory_oracle(), settings)
        .with_defaults(valid_defaults())
}

fn validate_only() -> SetValueOptions {
    SetValueOptions {
        validate: true,
        ..SetValueOptions::default()
    }
}

/// An oracle that holds lookups of one value until released.
struct GatedOracle {
    taken: HashSet<String>,
    gated: String,
    started: Notify,
    release: Notify,
}

impl GatedOracle {
    fn new(gated: &str, taken: &[&str]) -> Self {
        Self {
            taken: taken.iter().map(|s| (*s).to_string()).collect(),
            gated: gated.to_string(),
            started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl UniquenessOracle for GatedOracle {
    async fn exists(&self, _field: &str, value: &str) -> Result<bool, OracleError> {
        if value == self.gated {
            self.started.notify_one();
            self.release.notified().await;
        }
        Ok(self.taken.contains(value))
    }
}

/// An oracle whose endpoint is always down.
struct DownOracle;

#[async_trait]
impl UniquenessOracle for DownOracle {
    async fn exists(&self, _field: &str, _value: &str) -> Result<bool, OracleError> {
        Err(OracleError::Status(503))
    }
}

struct FailingDefaults;

#[async_trait]
impl DefaultsProvider for FailingDefaults {
    async fn load(&self) -> FormResult<serde_json::Value> {
        Err(FormError::Defaults("connection refused".to_string()))
    }
}

/// Serves a remote provider's merge of a canned response body, or a failed
/// fetch when there is none.
struct CannedRemote {
    provider: RemoteDefaults,
    body: Option<serde_json::Value>,
}

impl CannedRemote {
    fn new(body: Option<serde_json::Value>) -> Self {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        Self {
            provider: channel_form::remote_defaults(&Settings::default(), today).unwrap(),
            body,
        }
    }
}

#[async_trait]
impl DefaultsProvider for CannedRemote {
    async fn load(&self) -> FormResult<serde_json::Value> {
        match &self.body {
            Some(body) => self.provider.merge(body),
            None => Err(FormError::Defaults("connection refused".to_string())),
        }
    }

    fn fallback(&self) -> Option<serde_json::Value> {
        self.provider.fallback()
    }
}

// ============================================================================
// 1. Field validation and the error taxonomy
// ============================================================================

#[tokio::test]
async fn test_age_not_a_number() {
    let form = strict_form(Settings::default());
    form.set_value("age", "abc", validate_only()).await.unwrap();

    let err = form.field_meta("age").unwrap().error.unwrap();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
    assert_eq!(err.message, "Age must be a number");
    assert!(!form.form_state().is_valid);
}

#[tokio::test]
async fn test_reserved_email_conflicts() {
    let form = strict_form(Settings::default());
    form.set_value("email", "admin@example.com", validate_only())
        .await
        .unwrap();

    let err = &form.errors()["email"];
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "Enter a different email address");
}

#[tokio::test]
async fn test_empty_required_fields_yield_required() {
    let required = [
        ("username", "Username is required"),
        ("email", "Email is required"),
        ("channel", "Channel is required"),
        ("address.line1", "Address is required"),
        ("age", "Age is required"),
        ("dob", "Date of Birth is required"),
        ("phone.0.number", "Phone number is required"),
    ];
    for (path, message) in required {
        let form = strict_form(Settings::default());
        assert!(form.form_state().is_valid, "{path} starts valid");
        form.set_value(path, "", SetValueOptions::default())
            .await
            .unwrap();
        assert!(!form.form_state().is_valid, "{path} empty is not valid");

        assert!(!form.validate_field(path).await.unwrap());
        let err = form.field_meta(path).unwrap().error.unwrap();
        assert_eq!(err.kind, ErrorKind::Required, "{path}");
        assert_eq!(err.message, message);
        assert!(!form.form_state().is_valid);
    }
}

#[tokio::test]
async fn test_optional_line2_never_errors() {
    let form = strict_form(Settings::default());
    assert!(form.validate_field("address.line2").await.unwrap());
}

#[tokio::test]
async fn test_taken_email_conflicts() {
    let form = strict_form(Settings::default());
    form.set_value("email", TAKEN, validate_only()).await.unwrap();
    let err = &form.errors()["email"];
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "Email already exists");
}

#[tokio::test]
async fn test_oracle_failure_is_remote_unavailable() {
    let form = channel_form::controller(Flavor::Strict, Arc::new(DownOracle), Settings::default())
        .with_defaults(valid_defaults());
    form.set_value("age", "abc", SetValueOptions::default())
        .await
        .unwrap();

    let mut errors = BTreeMap::new();
    let ok = form
        .submit(|_| panic!("must not submit"), |e| errors = e)
        .await
        .unwrap();

    assert!(!ok);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors["email"].kind, ErrorKind::RemoteUnavailable);
    assert_eq!(errors["email"].message, UNAVAILABLE_MESSAGE);
    assert_eq!(errors["age"].kind, ErrorKind::TypeMismatch);
}

// ============================================================================
// 2. Asynchronous validation ordering
// ============================================================================

#[tokio::test]
async fn test_last_initiated_validation_wins() {
    let oracle = Arc::new(GatedOracle::new("joker@gotham.com", &["joker@gotham.com"]));
    let form = channel_form::controller(Flavor::Strict, oracle.clone(), Settings::default())
        .with_defaults(valid_defaults());

    let first = {
        let form = form.clone();
        tokio::spawn(async move {
            form.set_value("email", "joker@gotham.com", validate_only())
                .await
        })
    };
    oracle.started.notified().await;

    let state = form.form_state();
    assert!(state.is_validating);
    assert!(!state.is_valid);
    assert!(state.errors.is_empty());

    form.set_value("email", "alfred@wayne.com", validate_only())
        .await
        .unwrap();
    assert!(form.errors().is_empty());

    // The taken result arrives last and must be discarded.
    oracle.release.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(form.get_value("email").unwrap(), Value::from("alfred@wayne.com"));
    let meta = form.field_meta("email").unwrap();
    assert!(meta.error.is_none());
    assert!(!meta.validating);
    assert!(form.form_state().is_valid);
}

#[tokio::test]
async fn test_stale_success_does_not_clear_newer_error() {
    let oracle = Arc::new(GatedOracle::new("alfred@wayne.com", &["joker@gotham.com"]));
    let form = channel_form::controller(Flavor::Strict, oracle.clone(), Settings::default())
        .with_defaults(valid_defaults());

    let first = {
        let form = form.clone();
        tokio::spawn(type_then_validate(form, "alfred@wayne.com"))
    };
    oracle.started.notified().await;

    form.set_value("email", "joker@gotham.com", validate_only())
        .await
        .unwrap();
    oracle.release.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(form.errors()["email"].message, "Email already exists");
}

/// Sets the email, then validates it, like a user typing then blurring.
async fn type_then_validate(form: FormController, email: &str) -> FormResult<bool> {
    form.set_value("email", email, SetValueOptions::default())
        .await?;
    form.validate_field("email").await
}

#[tokio::test]
async fn test_edit_discards_in_flight_validation() {
    let oracle = Arc::new(GatedOracle::new("joker@gotham.com", &["joker@gotham.com"]));
    let form = channel_form::controller(Flavor::Strict, oracle.clone(), Settings::default())
        .with_defaults(valid_defaults());

    let first = {
        let form = form.clone();
        tokio::spawn(async move {
            form.set_value("email", "joker@gotham.com", validate_only())
                .await
        })
    };
    oracle.started.notified().await;

    // A plain edit, with no validation of its own.
    form.set_value("email", "joker@gotham.org", SetValueOptions::default())
        .await
        .unwrap();
    assert!(!form.field_meta("email").unwrap().validating);

    oracle.release.notify_one();
    first.await.unwrap().unwrap();
    assert!(form.field_meta("email").unwrap().error.is_none());
}

#[tokio::test]
async fn test_slow_field_does_not_block_others() {
    let oracle = Arc::new(GatedOracle::new("joker@gotham.com", &[]));
    let form = channel_form::controller(Flavor::Strict, oracle.clone(), Settings::default())
        .with_defaults(valid_defaults());

    let slow = {
        let form = form.clone();
        tokio::spawn(async move {
            form.set_value("email", "joker@gotham.com", validate_only())
                .await
        })
    };
    oracle.started.notified().await;

    form.set_value("age", "abc", validate_only()).await.unwrap();
    assert_eq!(form.errors()["age"].kind, ErrorKind::TypeMismatch);
    assert!(form.field_meta("email").unwrap().validating);

    oracle.release.notify_one();
    slow.await.unwrap().unwrap();
    assert!(!form.field_meta("email").unwrap().validating);
}

// ============================================================================
// 3. Lists and item identity
// ============================================================================

#[tokio::test]
async fn test_append_then_remove_first_keeps_second_identity() {
    let form = strict_form(Settings::default());
    let original = form.list_ids("phone").unwrap();
    assert_eq!(original.len(), 1);

    let appended = form
        .append_list_item("phone", serde_json::json!({"number": ""}))
        .unwrap();
    let before = form.list_ids("phone").unwrap();
    assert_eq!(before, vec![original[0], appended]);

    let removed = form.remove_list_item("phone", 0).unwrap();
    assert_eq!(removed, original[0]);
    assert_eq!(form.list_ids("phone").unwrap(), vec![appended]);
    assert_eq!(form.get_value("phone.0.number").unwrap(), Value::from(""));
}

#[tokio::test]
async fn test_identity_is_a_function_of_insertion() {
    let form = strict_form(Settings::default());
    let mut model = form.list_ids("phone").unwrap();

    for step in 0..12 {
        if step % 3 == 2 {
            let index = step % model.len();
            let removed = form.remove_list_item("phone", index).unwrap();
            assert_eq!(removed, model.remove(index));
        } else {
            let id = form
                .append_list_item("phone", serde_json::json!({"number": format!("555-01{step:02}")}))
                .unwrap();
            assert!(!model.contains(&id));
            model.push(id);
        }
        assert_eq!(form.list_ids("phone").unwrap(), model);
    }
}

#[tokio::test]
async fn test_removed_item_validation_is_discarded() {
    let form = strict_form(Settings::default());
    form.append_list_item("phone", serde_json::json!({"number": ""}))
        .unwrap();
    assert!(!form.validate_field("phone.1.number").await.unwrap());
    assert!(form.errors().contains_key("phone.1.number"));

    form.remove_list_item("phone", 1).unwrap();
    assert!(form.errors().is_empty());
}

#[tokio::test]
async fn test_field_array_handle() {
    let form = strict_form(Settings::default());
    let phones = form.field_array("phone").unwrap();
    phones.append(serde_json::json!({"number": "555-0199"})).unwrap();
    let fields = phones.fields().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(
        form.get_json("phone.1").unwrap(),
        serde_json::json!({"number": "555-0199"})
    );
    assert!(matches!(
        form.field_array("email"),
        Err(FormError::NotAList(_))
    ));
}

// ============================================================================
// 4. Submit and reset
// ============================================================================

#[tokio::test]
async fn test_valid_submit_calls_handler_once_per_call() {
    let form = strict_form(settings_without_auto_reset());
    let valid_calls = Arc::new(AtomicUsize::new(0));

    for expected in 1..=3 {
        let calls = valid_calls.clone();
        let ok = form
            .submit(
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                |errors| panic!("unexpected errors: {errors:?}"),
            )
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(valid_calls.load(Ordering::SeqCst), expected);
        let state = form.form_state();
        assert_eq!(state.submit_count, u32::try_from(expected).unwrap());
        assert!(state.is_submit_successful);
        assert!(state.is_submitted);
        assert!(!state.is_submitting);
    }
}

#[tokio::test]
async fn test_submit_hands_over_coerced_record() {
    let form = strict_form(Settings::default());
    form.set_value("age", "42", SetValueOptions::default())
        .await
        .unwrap();

    let record: Arc<Mutex<Option<Record>>> = Arc::default();
    let slot = record.clone();
    form.submit(move |r| *slot.lock().unwrap() = Some(r), |_| {})
        .await
        .unwrap();

    let record = record.lock().unwrap().take().unwrap();
    let path = |p: &str| FieldPath::parse(p).unwrap();
    assert_eq!(record.value(&path("age")), Some(&Value::Int(42)));
    assert_eq!(record.value(&path("dob")), Some(&Value::Date(dob())));
    assert_eq!(record.to_json()["phone"][0]["number"], "555-0100");
}

#[tokio::test]
async fn test_invalid_submit_never_calls_valid_handler() {
    let form = strict_form(Settings::default());
    form.set_value("channel", "", SetValueOptions::default())
        .await
        .unwrap();

    let invalid_calls = AtomicUsize::new(0);
    let ok = form
        .submit(
            |_| panic!("valid handler called"),
            |errors| {
                assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["channel"]);
                invalid_calls.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    assert!(!ok);
    assert_eq!(invalid_calls.load(Ordering::SeqCst), 1);
    let state = form.form_state();
    assert!(!state.is_submit_successful);
    assert_eq!(state.submit_count, 1);
}

#[tokio::test]
async fn test_reset_after_successful_submit() {
    let form = strict_form(settings_without_auto_reset());
    let username = form.register("username").unwrap();
    username.on_change("Robin").await.unwrap();
    username.on_blur().await.unwrap();
    form.append_list_item("phone", serde_json::json!({"number": "555-0101"}))
        .unwrap();
    assert!(form.form_state().is_dirty);

    assert!(form.submit(|_| {}, |_| {}).await.unwrap());
    assert_eq!(form.get_value("username").unwrap(), Value::from("Robin"));

    form.reset(None).unwrap();
    let state = form.form_state();
    assert_eq!(form.get_value("username").unwrap(), Value::from("Batman"));
    assert_eq!(form.list_ids("phone").unwrap().len(), 1);
    assert!(!state.is_dirty);
    assert!(state.touched_fields.is_empty());
    assert!(state.errors.is_empty());
    assert_eq!(state.submit_count, 0);
    assert!(!state.is_submitted);
}

#[tokio::test]
async fn test_auto_reset_after_successful_submit() {
    let form = strict_form(Settings::default());
    form.set_value("channel", "Batcave", SetValueOptions::all())
        .await
        .unwrap();
    assert!(form.submit(|_| {}, |_| {}).await.unwrap());

    let state = form.form_state();
    assert_eq!(form.get_value("channel").unwrap(), Value::from("Gotham Nights"));
    assert!(!state.is_dirty);
    assert!(state.touched_fields.is_empty());
    assert_eq!(state.submit_count, 1);
    assert!(state.is_submit_successful);
}

#[tokio::test]
async fn test_revalidate_mode_after_submit() {
    let form = strict_form(settings_without_auto_reset());
    form.set_value("channel", "", SetValueOptions::default())
        .await
        .unwrap();
    assert!(!form.submit(|_| {}, |_| {}).await.unwrap());

    // After a submit, changes validate even on untouched fields.
    let channel = form.register("channel").unwrap();
    channel.on_change("Batcave").await.unwrap();
    assert!(channel.meta().error.is_none());
    channel.on_change("").await.unwrap();
    assert_eq!(channel.meta().error.unwrap().kind, ErrorKind::Required);
}

#[tokio::test]
async fn test_submit_revalidates_field_edited_mid_flight() {
    let oracle = Arc::new(GatedOracle::new("bruce@wayne.com", &[]));
    let form = channel_form::controller(Flavor::Strict, oracle.clone(), settings_without_auto_reset())
        .with_defaults(valid_defaults());
    let submitted: Arc<Mutex<Option<Record>>> = Arc::default();

    let submit = {
        let form = form.clone();
        let slot = submitted.clone();
        tokio::spawn(async move {
            form.submit(
                move |record| *slot.lock().unwrap() = Some(record),
                |errors| panic!("unexpected errors: {errors:?}"),
            )
            .await
        })
    };
    oracle.started.notified().await;
    form.set_value("email", "alfred@wayne.com", SetValueOptions::default())
        .await
        .unwrap();
    oracle.release.notify_one();

    assert!(submit.await.unwrap().unwrap());
    let record = submitted.lock().unwrap().take().unwrap();
    assert_eq!(record.to_json()["email"], "alfred@wayne.com");
    let state = form.form_state();
    assert!(state.is_submit_successful);
    assert!(state.is_valid);
    assert!(state.errors.is_empty());
    assert_eq!(state.submit_count, 1);
}

#[tokio::test]
async fn test_submit_reports_error_for_field_edited_mid_flight() {
    let oracle = Arc::new(GatedOracle::new("bruce@wayne.com", &["joker@gotham.com"]));
    let form = channel_form::controller(Flavor::Strict, oracle.clone(), settings_without_auto_reset())
        .with_defaults(valid_defaults());
    let reported: Arc<Mutex<Option<BTreeMap<String, FieldError>>>> = Arc::default();

    let submit = {
        let form = form.clone();
        let slot = reported.clone();
        tokio::spawn(async move {
            form.submit(
                |_| panic!("valid handler called"),
                move |errors| *slot.lock().unwrap() = Some(errors),
            )
            .await
        })
    };
    oracle.started.notified().await;
    form.set_value("email", "joker@gotham.com", SetValueOptions::default())
        .await
        .unwrap();
    oracle.release.notify_one();

    assert!(!submit.await.unwrap().unwrap());
    let errors = reported.lock().unwrap().take().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors["email"].kind, ErrorKind::Conflict);
    assert_eq!(form.errors(), errors);
}

// ============================================================================
// 5. Defaults loading and registration
// ============================================================================

#[tokio::test]
async fn test_registration_before_defaults_load() {
    let form = channel_form::controller(Flavor::Strict, in_memory_oracle(), Settings::default());
    let username = form.register("username").unwrap();
    let line2 = form.register("address.line2").unwrap();
    assert!(!form.is_ready());
    assert!(matches!(
        username.on_change("Robin").await,
        Err(FormError::NotReady)
    ));
    assert!(matches!(form.submit(|_| {}, |_| {}).await, Err(FormError::NotReady)));

    form.load_defaults(&StaticDefaults(valid_defaults()))
        .await
        .unwrap();

    assert!(form.is_ready());
    assert_eq!(username.value(), Value::from("Batman"));
    assert!(!line2.is_disabled());
    username.on_change("Robin").await.unwrap();
    assert_eq!(form.get_value("username").unwrap(), Value::from("Robin"));
}

#[tokio::test]
async fn test_failing_defaults_provider_starts_blank() {
    let form = channel_form::controller(Flavor::Strict, in_memory_oracle(), Settings::default());
    let result = form.load_defaults(&FailingDefaults).await;

    assert!(matches!(result, Err(FormError::Defaults(_))));
    assert!(form.is_ready());
    assert_eq!(form.get_value("username").unwrap(), Value::from(""));
    assert_eq!(form.get_value("age").unwrap(), Value::Null);
    assert!(form.list_ids("phone").unwrap().is_empty());
    assert!(form.errors().is_empty());
}

#[tokio::test]
async fn test_remote_defaults_missing_copied_field() {
    let form = channel_form::controller(Flavor::Strict, in_memory_oracle(), Settings::default());
    form.load_defaults(&CannedRemote::new(Some(
        serde_json::json!({"id": 1, "name": "Leanne Graham"}),
    )))
    .await
    .unwrap();

    assert_eq!(form.get_value("email").unwrap(), Value::from(""));
    assert_eq!(form.get_value("username").unwrap(), Value::from("Batman"));
    assert_eq!(form.get_value("age").unwrap(), Value::Int(0));
    assert_eq!(form.list_ids("phone").unwrap().len(), 1);
    let state = form.form_state();
    assert!(state.errors.is_empty());
    assert!(state.touched_fields.is_empty());
    assert!(!state.is_dirty);
}

#[tokio::test]
async fn test_remote_defaults_copy_email() {
    let form = channel_form::controller(Flavor::Strict, in_memory_oracle(), Settings::default());
    form.load_defaults(&CannedRemote::new(Some(
        serde_json::json!({"id": 1, "email": TAKEN}),
    )))
    .await
    .unwrap();
    assert_eq!(form.get_value("email").unwrap(), Value::from(TAKEN));
    assert_eq!(form.get_value("username").unwrap(), Value::from("Batman"));
}

#[tokio::test]
async fn test_failed_remote_fetch_uses_template() {
    let form = channel_form::controller(Flavor::Strict, in_memory_oracle(), Settings::default());
    let result = form.load_defaults(&CannedRemote::new(None)).await;

    assert!(matches!(result, Err(FormError::Defaults(_))));
    assert!(form.is_ready());
    assert_eq!(form.get_value("username").unwrap(), Value::from("Batman"));
    assert_eq!(form.get_value("age").unwrap(), Value::Int(0));
    assert_eq!(form.list_ids("phone").unwrap().len(), 1);
    assert!(form.errors().is_empty());
}

#[tokio::test]
async fn test_malformed_defaults_start_blank_without_errors() {
    let form = channel_form::controller(Flavor::Strict, in_memory_oracle(), Settings::default());
    form.load_defaults(&StaticDefaults(serde_json::json!({
        "username": ["not", "a", "string"],
        "age": "forty",
        "dob": "yesterday",
        "phone": {"number": "555"}
    })))
    .await
    .unwrap();

    assert_eq!(form.get_value("username").unwrap(), Value::from(""));
    assert_eq!(form.get_value("age").unwrap(), Value::Null);
    assert_eq!(form.get_value("dob").unwrap(), Value::Null);
    assert!(form.list_ids("phone").unwrap().is_empty());
    let state = form.form_state();
    assert!(state.errors.is_empty());
    assert!(state.touched_fields.is_empty());
}

#[tokio::test]
async fn test_undeclared_paths_are_contract_violations() {
    let form = strict_form(Settings::default());
    let err = form.register("nickname").unwrap_err();
    assert!(err.is_contract_violation());
    assert!(matches!(
        form.set_value("address.line3", "x", SetValueOptions::default()).await,
        Err(FormError::UnknownField(_))
    ));
    assert!(matches!(
        form.validate_field("phone.4.number").await,
        Err(FormError::IndexOutOfRange { .. })
    ));
}

// ============================================================================
// 6. Subscriptions
// ============================================================================

#[tokio::test]
async fn test_subscribe_receives_changes_until_unsubscribed() {
    let form = strict_form(Settings::default());
    let events = Arc::new(Mutex::new(Vec::new()));
    let other_count = Arc::new(AtomicUsize::new(0));

    let sink = events.clone();
    let subscription = form.subscribe(move |event| {
        sink.lock()
            .unwrap()
            .push((event.name.clone(), event.kind, event.values["username"].clone()));
    });
    let counter = other_count.clone();
    let _other = form.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    form.set_value("username", "Robin", SetValueOptions::default())
        .await
        .unwrap();
    form.append_list_item("phone", serde_json::json!({})).unwrap();
    form.reset(None).unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            (Some("username".to_string()), ChangeKind::SetValue, serde_json::json!("Robin")),
            (Some("phone".to_string()), ChangeKind::Append, serde_json::json!("Robin")),
            (None, ChangeKind::Reset, serde_json::json!("Batman")),
        ]
    );

    subscription.unsubscribe();
    form.set_value("username", "Alfred", SetValueOptions::default())
        .await
        .unwrap();
    assert_eq!(events.lock().unwrap().len(), 3);
    assert_eq!(other_count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_validation_does_not_emit_value_changes() {
    let form = strict_form(Settings::default());
    let changes = Arc::new(AtomicUsize::new(0));
    let states = Arc::new(AtomicUsize::new(0));

    let c = changes.clone();
    let _changes = form.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let s = states.clone();
    let _states = form.subscribe_form_state(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    form.validate_field("username").await.unwrap();
    assert_eq!(changes.load(Ordering::SeqCst), 0);
    // Once when validation starts, once when it resolves.
    assert_eq!(states.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_subscriber_may_read_the_controller() {
    let form = strict_form(Settings::default());
    let seen = Arc::new(Mutex::new(None));

    let reader = form.clone();
    let slot = seen.clone();
    let _sub = form.subscribe(move |_| {
        *slot.lock().unwrap() = Some(reader.get_value("channel").unwrap());
    });
    form.set_value("channel", "Batcave", SetValueOptions::default())
        .await
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(Value::from("Batcave")));

    let _trace = form.trace_changes();
    form.set_value("channel", "Arkham", SetValueOptions::default())
        .await
        .unwrap();
}

// ============================================================================
// 7. Dependent fields and custom resolvers
// ============================================================================

fn password_schema() -> FormSchema {
    FormSchema::new(
        "password",
        vec![
            SchemaNode::field(FieldDef::new("password", FieldType::Text).required(true)),
            SchemaNode::field(
                FieldDef::new("confirm", FieldType::Text)
                    .depends_on("password")
                    .rule(Predicate::new(
                        "matches_password",
                        |value, record| {
                            record.value(&FieldPath::parse("password").unwrap()) == Some(value)
                        },
                        FieldError::conflict("Passwords do not match"),
                    )),
            ),
        ],
    )
}

#[tokio::test]
async fn test_dependent_field_revalidates() {
    let form = FormController::new(password_schema(), Settings::default())
        .with_defaults(serde_json::json!({"password": "", "confirm": ""}));

    form.set_value("password", "hunter2", validate_only())
        .await
        .unwrap();
    form.set_value("confirm", "hunter2", validate_only())
        .await
        .unwrap();
    assert!(form.errors().is_empty());

    form.set_value("password", "hunter3", validate_only())
        .await
        .unwrap();
    assert_eq!(form.errors()["confirm"].message, "Passwords do not match");
}

struct Uppercase;

#[async_trait]
impl Resolver for Uppercase {
    async fn resolve(
        &self,
        _path: &FieldPath,
        value: &Value,
        _record: &Record,
    ) -> Result<Value, FieldError> {
        match value.as_str() {
            Some(s) if s.chars().all(char::is_uppercase) => Ok(value.clone()),
            _ => Err(FieldError::format_invalid("Shout it")),
        }
    }
}

#[tokio::test]
async fn test_custom_resolver() {
    let schema = Arc::new(FormSchema::new(
        "shout",
        vec![SchemaNode::field(FieldDef::new("word", FieldType::Text))],
    ));
    let form = FormController::with_resolver(schema, Arc::new(Uppercase), Settings::default())
        .with_defaults(serde_json::json!({"word": "HELLO"}));

    assert!(form.validate_field("word").await.unwrap());
    form.set_value("word", "hello", validate_only()).await.unwrap();
    assert_eq!(form.errors()["word"].kind, ErrorKind::FormatInvalid);
}

#[tokio::test]
async fn test_lenient_flavor_submits_with_blank_phone() {
    let form = channel_form::controller(Flavor::Lenient, in_memory_oracle(), Settings::default())
        .with_defaults(valid_defaults());
    form.set_value("phone.0.number", "", SetValueOptions::default())
        .await
        .unwrap();
    assert!(form.submit(|_| {}, |_| {}).await.unwrap());
}
