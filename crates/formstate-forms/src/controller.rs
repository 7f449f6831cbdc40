//! The form controller.
//!
//! [`FormController`] owns the authoritative record, per-field metadata, and
//! submit counters of one form. It is a cheap, clonable handle (`Arc` around
//! its state) so bindings, list handles, and spawned tasks can all hold it.
//!
//! # Validation ordering
//!
//! Every edit and every validation pass stamps the field with a fresh epoch
//! from a counter. A validation pass remembers the epoch it started with and
//! its result is applied only if the field still carries that epoch when
//! the resolver returns. Later passes and later edits therefore always win
//! over earlier ones, regardless of the order in which results arrive.
//!
//! The store lock is never held across an `.await`, and subscribers are
//! called after it is released, so a subscriber may read the controller.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use tracing::Instrument;

use formstate_core::logging::form_span;
use formstate_core::{FieldError, FormError, FormResult, Settings, ValidationMode};
use formstate_signals::{Signal, Subscription};

use crate::bound_field::FieldBinding;
use crate::defaults::DefaultsProvider;
use crate::field_array::FieldArray;
use crate::fields::{FieldDef, FormSchema, SchemaNode, SchemaRef};
use crate::path::{FieldPath, Segment};
use crate::record::{node_to_json, ItemId, Record, Tree};
use crate::resolver::{Resolver, SchemaResolver};
use crate::state::{ChangeKind, FieldMeta, FormState, WatchEvent};
use crate::value::Value;

/// Options for [`FormController::set_value`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetValueOptions {
    /// Validate the field (and its dependents) after setting it.
    pub validate: bool,
    /// Recompute the field's dirty flag against its default.
    pub mark_dirty: bool,
    /// Mark the field as touched.
    pub mark_touched: bool,
}

impl SetValueOptions {
    /// Validate, mark dirty, and mark touched.
    pub const fn all() -> Self {
        Self {
            validate: true,
            mark_dirty: true,
            mark_touched: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Cell {
    value: Value,
    meta: FieldMeta,
    epoch: u64,
}

impl Cell {
    fn new(value: Value, epoch: u64) -> Self {
        Self {
            value,
            meta: FieldMeta::default(),
            epoch,
        }
    }
}

enum Outcome {
    Current(Result<Value, FieldError>),
    Stale,
}

#[derive(Debug)]
struct Store {
    ready: bool,
    defaults_json: serde_json::Value,
    defaults: Record,
    cells: Tree<Cell>,
    next_epoch: u64,
    submitting: bool,
    submitted: bool,
    submit_successful: bool,
    submit_count: u32,
}

impl Store {
    fn new(schema: &FormSchema) -> Self {
        let defaults = schema.blank_record();
        let cells = defaults.map(&mut |_, value| Cell::new(value.clone(), 0));
        Self {
            ready: false,
            defaults_json: serde_json::Value::Null,
            defaults,
            cells,
            next_epoch: 0,
            submitting: false,
            submitted: false,
            submit_successful: false,
            submit_count: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    fn seed(&mut self, schema: &FormSchema, json: serde_json::Value) {
        let defaults = schema.record_from_json(&json);
        let epoch = self.bump();
        self.cells = defaults.map(&mut |_, value| Cell::new(value.clone(), epoch));
        self.defaults = defaults;
        self.defaults_json = json;
        self.ready = true;
    }

    fn clear_submit(&mut self) {
        self.submitting = false;
        self.submitted = false;
        self.submit_successful = false;
        self.submit_count = 0;
    }

    fn record(&self) -> Record {
        self.cells.map(&mut |_, cell| cell.value.clone())
    }

    fn event(&self, name: Option<&FieldPath>, kind: ChangeKind) -> WatchEvent {
        WatchEvent {
            values: self.record().to_json(),
            name: name.map(ToString::to_string),
            kind,
        }
    }

    fn refresh_dirty(&mut self, schema: &FormSchema, under: &FieldPath) {
        let paths: Vec<FieldPath> = self
            .cells
            .leaves()
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| under.is_prefix_of(path))
            .collect();
        for path in paths {
            let default = self.defaults.value(&path).cloned();
            if let Some(cell) = self.cells.leaf_mut(&path) {
                cell.meta.dirty = !same_value(schema.field(&path), default.as_ref(), &cell.value);
            }
        }
    }

    fn form_state(&self, schema: &FormSchema) -> FormState {
        let mut errors = BTreeMap::new();
        let mut dirty_fields = BTreeSet::new();
        let mut touched_fields = BTreeSet::new();
        let mut is_validating = false;
        let mut populated = true;

        for (path, cell) in self.cells.leaves() {
            let key = path.to_string();
            if cell.meta.dirty {
                dirty_fields.insert(key.clone());
            }
            if cell.meta.touched {
                touched_fields.insert(key.clone());
            }
            is_validating |= cell.meta.validating;
            if let Some(err) = &cell.meta.error {
                errors.insert(key, err.clone());
            }
            if cell.value.is_empty() && schema.field(&path).is_some_and(|def| def.required) {
                populated = false;
            }
        }
        for (path, len) in self.cells.lists() {
            let default_len = self.defaults.list(&path).map_or(0, <[_]>::len);
            if len != default_len {
                dirty_fields.insert(path.to_string());
            }
        }

        FormState {
            is_ready: self.ready,
            is_dirty: !dirty_fields.is_empty(),
            is_valid: self.ready && errors.is_empty() && populated && !is_validating,
            is_validating,
            is_submitting: self.submitting,
            is_submitted: self.submitted,
            is_submit_successful: self.submit_successful,
            submit_count: self.submit_count,
            errors,
            dirty_fields,
            touched_fields,
        }
    }
}

/// Returns `true` if `value` equals `default`, comparing coerced values when
/// both coerce to the field type.
fn same_value(def: Option<&FieldDef>, default: Option<&Value>, value: &Value) -> bool {
    let Some(default) = default else {
        return false;
    };
    if default == value || (default.is_empty() && value.is_empty()) {
        return true;
    }
    def.and_then(|def| {
        let a = def.field_type.coerce(default)?;
        let b = def.field_type.coerce(value)?;
        Some(a == b)
    })
    .unwrap_or(false)
}

struct Inner {
    schema: Arc<FormSchema>,
    resolver: Arc<dyn Resolver>,
    settings: Settings,
    store: RwLock<Store>,
    changes: Signal<WatchEvent>,
    states: Signal<FormState>,
    span: tracing::Span,
}

/// Holds the value and validation state of one form.
///
/// # Examples
///
/// ```
/// use formstate_core::Settings;
/// use formstate_forms::controller::{FormController, SetValueOptions};
/// use formstate_forms::fields::{FieldDef, FieldType, FormSchema, SchemaNode};
///
/// # futures::executor::block_on(async {
/// let schema = FormSchema::new(
///     "profile",
///     vec![SchemaNode::field(
///         FieldDef::new("username", FieldType::Text).required_message("Username is required"),
///     )],
/// );
/// let form = FormController::new(schema, Settings::default())
///     .with_defaults(serde_json::json!({"username": "Batman"}));
///
/// form.set_value("username", "", SetValueOptions::all()).await.unwrap();
/// let state = form.form_state();
/// assert!(!state.is_valid);
/// assert_eq!(state.errors["username"].message, "Username is required");
/// # });
/// ```
#[derive(Clone)]
pub struct FormController {
    inner: Arc<Inner>,
}

impl fmt::Debug for FormController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormController")
            .field("name", &self.inner.schema.name())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl FormController {
    /// Creates a controller validating with the schema's own rules.
    ///
    /// The controller is not ready until defaults are applied or loaded.
    pub fn new(schema: FormSchema, settings: Settings) -> Self {
        let schema = Arc::new(schema);
        let resolver = Arc::new(SchemaResolver::new(Arc::clone(&schema)));
        Self::with_resolver(schema, resolver, settings)
    }

    /// Creates a controller with a custom resolver.
    pub fn with_resolver(
        schema: Arc<FormSchema>,
        resolver: Arc<dyn Resolver>,
        settings: Settings,
    ) -> Self {
        let span = form_span(schema.name());
        let store = Store::new(&schema);
        Self {
            inner: Arc::new(Inner {
                schema,
                resolver,
                settings,
                store: RwLock::new(store),
                changes: Signal::new(),
                states: Signal::new(),
                span,
            }),
        }
    }

    /// Applies `defaults` and returns the ready controller.
    #[must_use]
    pub fn with_defaults(self, defaults: serde_json::Value) -> Self {
        self.apply_defaults(defaults);
        self
    }

    // ── Readiness ────────────────────────────────────────────────────

    /// Seeds the record with `defaults` and marks the form ready.
    ///
    /// Malformed entries start blank. Submit counters are cleared.
    pub fn apply_defaults(&self, defaults: serde_json::Value) {
        let (event, state) = {
            let mut store = self.write();
            store.seed(&self.inner.schema, defaults);
            store.clear_submit();
            (
                store.event(None, ChangeKind::DefaultsLoaded),
                store.form_state(&self.inner.schema),
            )
        };
        self.inner.span.in_scope(|| tracing::debug!("default values applied"));
        self.publish(Some(event), state);
    }

    /// Loads defaults from an asynchronous provider.
    ///
    /// The form becomes ready either way. When the provider fails, the
    /// failure is logged, the provider's fallback (or blank values) is
    /// applied, and the error is returned.
    pub async fn load_defaults(&self, provider: &dyn DefaultsProvider) -> FormResult<()> {
        let loaded = provider
            .load()
            .instrument(self.inner.span.clone())
            .await;
        match loaded {
            Ok(defaults) => {
                self.apply_defaults(defaults);
                Ok(())
            }
            Err(err) => {
                self.inner.span.in_scope(|| {
                    tracing::warn!(error = %err, "default values unavailable, using fallback");
                });
                self.apply_defaults(provider.fallback().unwrap_or(serde_json::Value::Null));
                Err(err)
            }
        }
    }

    /// Returns `true` once defaults have been applied.
    pub fn is_ready(&self) -> bool {
        self.read().ready
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Returns the form schema.
    pub fn schema(&self) -> &FormSchema {
        &self.inner.schema
    }

    /// Returns the controller settings.
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Binds an input to a declared leaf path.
    ///
    /// Registering works before defaults load; the binding always reads the
    /// live record.
    pub fn register(&self, path: &str) -> FormResult<FieldBinding> {
        let path = self.leaf_path(path)?;
        Ok(FieldBinding::new(self.clone(), path))
    }

    /// Returns the current value of a leaf.
    pub fn get_value(&self, path: &str) -> FormResult<Value> {
        let path = self.leaf_path(path)?;
        let store = self.read();
        self.locate(&store, &path)?;
        Ok(store
            .cells
            .leaf(&path)
            .map(|cell| cell.value.clone())
            .unwrap_or_default())
    }

    /// Returns the current value of any declared node (leaf, group, list,
    /// or list item) as JSON.
    pub fn get_json(&self, path: &str) -> FormResult<serde_json::Value> {
        let parsed = self.parse(path)?;
        if self.inner.schema.lookup(&parsed).is_none() {
            return Err(self.fault(FormError::UnknownField(path.to_string())));
        }
        let store = self.read();
        self.locate(&store, &parsed)?;
        Ok(store
            .record()
            .get(&parsed)
            .map_or(serde_json::Value::Null, node_to_json))
    }

    /// Returns the whole record as JSON.
    pub fn get_values(&self) -> serde_json::Value {
        self.read().record().to_json()
    }

    /// Returns a snapshot of the whole record.
    pub fn values(&self) -> Record {
        self.read().record()
    }

    /// Returns the metadata of a leaf.
    pub fn field_meta(&self, path: &str) -> FormResult<FieldMeta> {
        let path = self.leaf_path(path)?;
        let store = self.read();
        self.locate(&store, &path)?;
        Ok(store
            .cells
            .leaf(&path)
            .map(|cell| cell.meta.clone())
            .unwrap_or_default())
    }

    /// Returns a snapshot of the derived form state.
    pub fn form_state(&self) -> FormState {
        self.read().form_state(&self.inner.schema)
    }

    /// Returns the current errors by path.
    pub fn errors(&self) -> BTreeMap<String, FieldError> {
        self.form_state().errors
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Sets a leaf value.
    pub async fn set_value(
        &self,
        path: &str,
        value: impl Into<Value>,
        options: SetValueOptions,
    ) -> FormResult<()> {
        let path = self.leaf_path(path)?;
        self.write_value(&path, value.into(), options, ChangeKind::SetValue)?;
        if options.validate {
            self.validate_path(&path).await?;
        }
        Ok(())
    }

    /// Appends an item to a list and returns its new identity.
    ///
    /// `item` is a JSON object holding the item's fields; missing or
    /// malformed entries start blank.
    pub fn append_list_item(&self, list: &str, item: serde_json::Value) -> FormResult<ItemId> {
        let (path, item_schema) = self.list_path(list)?;
        let (id, event, state) = {
            let mut store = self.write();
            self.ensure_ready(&store)?;
            self.locate(&store, &path)?;
            let index = store.cells.list(&path).map_or(0, <[_]>::len);
            let epoch = store.bump();
            let created = FormSchema::item_from_json(item_schema, &item)
                .map(&path.index(index), &mut |_, value| Cell::new(value.clone(), epoch));
            let id = created.id;
            store
                .cells
                .list_mut(&path)
                .ok_or_else(|| self.fault(FormError::NotAList(list.to_string())))?
                .push(created);
            store.refresh_dirty(&self.inner.schema, &path);
            (
                id,
                store.event(Some(&path), ChangeKind::Append),
                store.form_state(&self.inner.schema),
            )
        };
        self.inner
            .span
            .in_scope(|| tracing::debug!(list = %path, item = %id, "list item appended"));
        self.publish(Some(event), state);
        Ok(id)
    }

    /// Removes the item at `index` and returns its identity.
    ///
    /// Surviving items keep their identities.
    pub fn remove_list_item(&self, list: &str, index: usize) -> FormResult<ItemId> {
        let (path, _) = self.list_path(list)?;
        let (id, event, state) = {
            let mut store = self.write();
            self.ensure_ready(&store)?;
            self.locate(&store, &path)?;
            let items = store
                .cells
                .list_mut(&path)
                .ok_or_else(|| self.fault(FormError::NotAList(list.to_string())))?;
            let len = items.len();
            if index >= len {
                return Err(self.fault(FormError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                    len,
                }));
            }
            let id = items.remove(index).id;
            store.refresh_dirty(&self.inner.schema, &path);
            (
                id,
                store.event(Some(&path), ChangeKind::Remove),
                store.form_state(&self.inner.schema),
            )
        };
        self.inner
            .span
            .in_scope(|| tracing::debug!(list = %path, item = %id, index, "list item removed"));
        self.publish(Some(event), state);
        Ok(id)
    }

    /// Returns the identities of a list's items, in order.
    pub fn list_ids(&self, list: &str) -> FormResult<Vec<ItemId>> {
        let (path, _) = self.list_path(list)?;
        let store = self.read();
        self.locate(&store, &path)?;
        Ok(store.cells.item_ids(&path).unwrap_or_default())
    }

    /// Returns a handle for a list.
    pub fn field_array(&self, list: &str) -> FormResult<FieldArray> {
        let (path, _) = self.list_path(list)?;
        Ok(FieldArray::new(self.clone(), path))
    }

    /// Restores the record to `values`, or to the current defaults.
    ///
    /// Explicit values become the new defaults. Metadata, errors, and
    /// submit counters are cleared, list items get fresh identities, and
    /// in-flight validations are discarded.
    pub fn reset(&self, values: Option<serde_json::Value>) -> FormResult<()> {
        self.reset_to(values, true)
    }

    fn reset_to(&self, values: Option<serde_json::Value>, clear_submit: bool) -> FormResult<()> {
        let (event, state) = {
            let mut store = self.write();
            let values = match values {
                Some(values) => values,
                None => {
                    self.ensure_ready(&store)?;
                    store.defaults_json.clone()
                }
            };
            store.seed(&self.inner.schema, values);
            if clear_submit {
                store.clear_submit();
            }
            (
                store.event(None, ChangeKind::Reset),
                store.form_state(&self.inner.schema),
            )
        };
        self.inner.span.in_scope(|| tracing::debug!("form reset"));
        self.publish(Some(event), state);
        Ok(())
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Validates one leaf and every field that depends on it.
    ///
    /// Returns whether the leaf is currently error-free.
    pub async fn validate_field(&self, path: &str) -> FormResult<bool> {
        let path = self.leaf_path(path)?;
        self.validate_path(&path).await
    }

    /// Validates every leaf at or under each path concurrently.
    ///
    /// Returns whether all of them are error-free.
    pub async fn trigger(&self, paths: &[&str]) -> FormResult<bool> {
        let mut prefixes = Vec::with_capacity(paths.len());
        for raw in paths {
            let path = self.parse(raw)?;
            if self.inner.schema.lookup(&path).is_none() {
                return Err(self.fault(FormError::UnknownField((*raw).to_string())));
            }
            prefixes.push(path);
        }
        let targets = {
            let store = self.read();
            self.ensure_ready(&store)?;
            for prefix in &prefixes {
                self.locate(&store, prefix)?;
            }
            store
                .cells
                .leaves()
                .into_iter()
                .map(|(path, _)| path)
                .filter(|path| prefixes.iter().any(|prefix| prefix.is_prefix_of(path)))
                .collect::<Vec<_>>()
        };
        self.validate_all(&targets).await
    }

    /// Validates every leaf concurrently.
    pub async fn trigger_all(&self) -> FormResult<bool> {
        let targets = {
            let store = self.read();
            self.ensure_ready(&store)?;
            store
                .cells
                .leaves()
                .into_iter()
                .map(|(path, _)| path)
                .collect::<Vec<_>>()
        };
        self.validate_all(&targets).await
    }

    async fn validate_all(&self, targets: &[FieldPath]) -> FormResult<bool> {
        let results = join_all(targets.iter().map(|path| self.run_validation(path)))
            .instrument(self.inner.span.clone())
            .await;
        let mut valid = true;
        for (path, result) in targets.iter().zip(results) {
            valid &= match result? {
                Outcome::Current(outcome) => outcome.is_ok(),
                Outcome::Stale => self.is_error_free(path),
            };
        }
        Ok(valid)
    }

    pub(crate) async fn validate_path(&self, path: &FieldPath) -> FormResult<bool> {
        let dependents = self.dependents_of(path);
        let (own, others) = async {
            futures::join!(
                self.run_validation(path),
                join_all(dependents.iter().map(|dep| self.run_validation(dep)))
            )
        }
        .instrument(self.inner.span.clone())
        .await;
        for other in others {
            other?;
        }
        Ok(match own? {
            Outcome::Current(outcome) => outcome.is_ok(),
            Outcome::Stale => self.is_error_free(path),
        })
    }

    fn dependents_of(&self, path: &FieldPath) -> Vec<FieldPath> {
        let patterns = self.inner.schema.dependents_of(&path.pattern());
        if patterns.is_empty() {
            return Vec::new();
        }
        self.read()
            .cells
            .leaves()
            .into_iter()
            .map(|(leaf, _)| leaf)
            .filter(|leaf| leaf != path && patterns.contains(&leaf.pattern()))
            .collect()
    }

    async fn run_validation(&self, path: &FieldPath) -> FormResult<Outcome> {
        let (key, epoch, value, record, state) = {
            let mut store = self.write();
            self.ensure_ready(&store)?;
            self.locate(&store, path)?;
            let record = store.record();
            let key = store
                .cells
                .stable_key(path)
                .ok_or_else(|| self.fault(FormError::UnknownField(path.to_string())))?;
            let epoch = store.bump();
            let cell = store
                .cells
                .leaf_mut(path)
                .ok_or_else(|| self.fault(FormError::UnknownField(path.to_string())))?;
            cell.epoch = epoch;
            cell.meta.validating = true;
            cell.meta.error = None;
            let value = cell.value.clone();
            (key, epoch, value, record, store.form_state(&self.inner.schema))
        };
        self.publish(None, state);
        tracing::trace!(field = %path, epoch, "validation started");

        let outcome = self.inner.resolver.resolve(path, &value, &record).await;

        let state = {
            let mut store = self.write();
            let cell = match store.cells.resolve(&key) {
                Some(current) => store.cells.leaf_mut(&current),
                None => None,
            };
            match cell {
                Some(cell) if cell.epoch == epoch => {
                    cell.meta.validating = false;
                    cell.meta.error = outcome.as_ref().err().cloned();
                }
                _ => {
                    tracing::debug!(field = %path, epoch, "discarding stale validation result");
                    return Ok(Outcome::Stale);
                }
            }
            store.form_state(&self.inner.schema)
        };
        if let Err(err) = &outcome {
            tracing::debug!(field = %path, code = err.kind.code(), "field invalid");
        }
        self.publish(None, state);
        Ok(Outcome::Current(outcome))
    }

    fn is_error_free(&self, path: &FieldPath) -> bool {
        self.read()
            .cells
            .leaf(path)
            .map_or(true, |cell| cell.meta.error.is_none())
    }

    // ── Submit ───────────────────────────────────────────────────────

    /// Validates every field, then calls `on_valid` with the coerced record
    /// or `on_invalid` with the errors by path.
    ///
    /// `submit_count` is incremented on every call. Returns whether the
    /// submit succeeded.
    pub async fn submit<V, I>(&self, on_valid: V, on_invalid: I) -> FormResult<bool>
    where
        V: FnOnce(Record),
        I: FnOnce(BTreeMap<String, FieldError>),
    {
        let (targets, state) = {
            let mut store = self.write();
            self.ensure_ready(&store)?;
            store.submitting = true;
            let targets: Vec<FieldPath> = store
                .cells
                .leaves()
                .into_iter()
                .map(|(path, _)| path)
                .collect();
            (targets, store.form_state(&self.inner.schema))
        };
        self.publish(None, state);

        let outcomes = self.validate_until_current(targets).await;

        let (success, errors, record, state) = {
            let mut store = self.write();
            store.submitting = false;
            store.submitted = true;
            store.submit_count += 1;
            let mut errors = store.form_state(&self.inner.schema).errors;
            for (path, outcome) in &outcomes {
                if let Err(err) = outcome {
                    errors
                        .entry(path.to_string())
                        .or_insert_with(|| err.clone());
                }
            }
            let success = errors.is_empty();
            store.submit_successful = success;
            let mut coerced = outcomes;
            let record = store.cells.map(&mut |path, cell| match coerced.remove(path) {
                Some(Ok(value)) => value,
                _ => cell.value.clone(),
            });
            (success, errors, record, store.form_state(&self.inner.schema))
        };
        self.inner.span.in_scope(|| {
            tracing::info!(
                submit_count = state.submit_count,
                success,
                errors = errors.len(),
                "form submitted"
            );
        });
        self.publish(None, state);

        if success {
            on_valid(record);
            if self.inner.settings.reset_on_successful_submit {
                self.reset_to(None, false)?;
            }
        } else {
            on_invalid(errors);
        }
        Ok(success)
    }

    /// Validates `targets` concurrently, re-validating any field whose
    /// result was superseded by an edit until every outcome is current.
    ///
    /// Fields removed in the meantime are dropped.
    async fn validate_until_current(
        &self,
        targets: Vec<FieldPath>,
    ) -> HashMap<FieldPath, Result<Value, FieldError>> {
        let mut outcomes = HashMap::with_capacity(targets.len());
        let mut pending = targets;
        while !pending.is_empty() {
            let results = join_all(pending.iter().map(|path| self.run_validation(path)))
                .instrument(self.inner.span.clone())
                .await;
            let mut stale = Vec::new();
            for (path, result) in pending.into_iter().zip(results) {
                match result {
                    Ok(Outcome::Current(outcome)) => {
                        outcomes.insert(path, outcome);
                    }
                    Ok(Outcome::Stale) if self.is_live(&path) => stale.push(path),
                    Ok(Outcome::Stale) | Err(_) => {
                        outcomes.remove(&path);
                    }
                }
            }
            if !stale.is_empty() {
                self.inner.span.in_scope(|| {
                    tracing::debug!(
                        fields = stale.len(),
                        "re-validating fields edited during submit"
                    );
                });
            }
            pending = stale;
        }
        outcomes
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Calls `callback` after every value change.
    #[must_use = "dropping the subscription stops notifications"]
    pub fn subscribe(&self, callback: impl Fn(&WatchEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.changes.subscribe(callback)
    }

    /// Calls `callback` with a fresh snapshot after every state change,
    /// including validation results and submit progress.
    #[must_use = "dropping the subscription stops notifications"]
    pub fn subscribe_form_state(
        &self,
        callback: impl Fn(&FormState) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.states.subscribe(callback)
    }

    /// Forwards every value change to `tracing` at debug level.
    #[must_use = "dropping the subscription stops tracing"]
    pub fn trace_changes(&self) -> Subscription {
        let form = self.inner.schema.name().to_string();
        self.subscribe(move |event| {
            tracing::debug!(
                form = %form,
                field = event.name.as_deref().unwrap_or("*"),
                kind = ?event.kind,
                values = %event.values,
                "form changed"
            );
        })
    }

    // ── Crate-internal access for bindings ───────────────────────────

    pub(crate) fn write_value(
        &self,
        path: &FieldPath,
        value: Value,
        options: SetValueOptions,
        kind: ChangeKind,
    ) -> FormResult<()> {
        let def = self.inner.schema.field(path);
        let (event, state) = {
            let mut store = self.write();
            self.ensure_ready(&store)?;
            self.locate(&store, path)?;
            let dirty = !same_value(def, store.defaults.value(path), &value);
            let epoch = store.bump();
            let cell = store
                .cells
                .leaf_mut(path)
                .ok_or_else(|| self.fault(FormError::UnknownField(path.to_string())))?;
            cell.value = value;
            cell.epoch = epoch;
            cell.meta.validating = false;
            if options.mark_dirty {
                cell.meta.dirty = dirty;
            }
            if options.mark_touched {
                cell.meta.touched = true;
            }
            (
                store.event(Some(path), kind),
                store.form_state(&self.inner.schema),
            )
        };
        self.publish(Some(event), state);
        Ok(())
    }

    pub(crate) fn touch(&self, path: &FieldPath) -> FormResult<()> {
        let state = {
            let mut store = self.write();
            self.ensure_ready(&store)?;
            self.locate(&store, path)?;
            if let Some(cell) = store.cells.leaf_mut(path) {
                cell.meta.touched = true;
            }
            store.form_state(&self.inner.schema)
        };
        self.publish(None, state);
        Ok(())
    }

    pub(crate) fn value_at(&self, path: &FieldPath) -> Value {
        self.read()
            .cells
            .leaf(path)
            .map(|cell| cell.value.clone())
            .unwrap_or_default()
    }

    pub(crate) fn meta_at(&self, path: &FieldPath) -> FieldMeta {
        self.read()
            .cells
            .leaf(path)
            .map(|cell| cell.meta.clone())
            .unwrap_or_default()
    }

    pub(crate) fn mode(&self) -> ValidationMode {
        let submitted = self.read().submitted;
        self.inner.settings.effective_mode(submitted)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.store.read().expect("form store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.inner.store.write().expect("form store lock poisoned")
    }

    fn publish(&self, event: Option<WatchEvent>, state: FormState) {
        if let Some(event) = event {
            self.inner.changes.send(&event);
        }
        self.inner.states.send(&state);
    }

    fn fault(&self, err: FormError) -> FormError {
        self.inner.span.in_scope(|| {
            tracing::error!(error = %err, "form contract violation");
        });
        err
    }

    fn parse(&self, raw: &str) -> FormResult<FieldPath> {
        FieldPath::parse(raw).map_err(|err| self.fault(err))
    }

    fn leaf_path(&self, raw: &str) -> FormResult<FieldPath> {
        let path = self.parse(raw)?;
        if self.inner.schema.field(&path).is_none() {
            return Err(self.fault(FormError::UnknownField(raw.to_string())));
        }
        Ok(path)
    }

    fn list_path(&self, raw: &str) -> FormResult<(FieldPath, &[SchemaNode])> {
        let path = self.parse(raw)?;
        match self.inner.schema.lookup(&path) {
            Some(SchemaRef::List(item)) => Ok((path, item)),
            Some(_) => Err(self.fault(FormError::NotAList(raw.to_string()))),
            None => Err(self.fault(FormError::UnknownField(raw.to_string()))),
        }
    }

    fn ensure_ready(&self, store: &Store) -> FormResult<()> {
        if store.ready {
            Ok(())
        } else {
            Err(self.fault(FormError::NotReady))
        }
    }

    /// Checks that every list index along `path` exists.
    fn locate(&self, store: &Store, path: &FieldPath) -> FormResult<()> {
        match missing_index(store, path) {
            Some(err) => Err(self.fault(err)),
            None => Ok(()),
        }
    }

    /// Returns `true` if `path` still exists in the ready record.
    fn is_live(&self, path: &FieldPath) -> bool {
        let store = self.read();
        store.ready && missing_index(&store, path).is_none()
    }
}

/// Returns the first list index along `path` that is out of range.
fn missing_index(store: &Store, path: &FieldPath) -> Option<FormError> {
    let mut prefix = FieldPath::root();
    for segment in path.segments() {
        match segment {
            Segment::Key(key) => prefix = prefix.key(key.clone()),
            Segment::Index(index) => {
                let len = store.cells.list(&prefix).map_or(0, <[_]>::len);
                if *index >= len {
                    return Some(FormError::IndexOutOfRange {
                        path: prefix.to_string(),
                        index: *index,
                        len,
                    });
                }
                prefix = prefix.index(*index);
            }
        }
    }
    None
}
