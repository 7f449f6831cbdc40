//! Field definitions and form schemas.
//!
//! A [`FieldDef`] describes a single leaf: its type, whether it is required,
//! its rule chain, and presentation hints. A [`FormSchema`] arranges field
//! definitions into the same tree shape as the record, with groups
//! (`address`) and lists (`phone`) whose items share one item schema.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};

use formstate_core::{FormError, FormResult};

use crate::path::{FieldPath, Segment};
use crate::record::{Item, Node, Record};
use crate::rules::Rule;
use crate::value::Value;

/// Defines the type of a field and how raw input is coerced into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Free text.
    Text,
    /// A number. Numeric strings are parsed; integers stay integers.
    Number,
    /// A calendar date. Accepts `YYYY-MM-DD` and RFC 3339 timestamps.
    Date,
    /// A boolean toggle.
    Boolean,
}

impl FieldType {
    /// Coerces a raw value into this type.
    ///
    /// Returns `None` when the value cannot represent this type.
    pub fn coerce(self, raw: &Value) -> Option<Value> {
        match (self, raw) {
            (Self::Text, Value::String(_)) => Some(raw.clone()),
            (Self::Text, Value::Null) => Some(Value::String(String::new())),
            (Self::Text, other) => Some(Value::String(other.to_string())),

            (Self::Number, Value::Int(_) | Value::Float(_)) => Some(raw.clone()),
            (Self::Number, Value::String(s)) => parse_number(s.trim()),
            (Self::Number, _) => None,

            (Self::Date, Value::Date(_)) => Some(raw.clone()),
            (Self::Date, Value::String(s)) => parse_date(s.trim()).map(Value::Date),
            (Self::Date, _) => None,

            (Self::Boolean, Value::Bool(_)) => Some(raw.clone()),
            (Self::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::Boolean, _) => None,
        }
    }

    /// Returns the value an untouched field of this type starts with.
    pub const fn blank(self) -> Value {
        match self {
            Self::Text => Value::String(String::new()),
            Self::Number | Self::Date => Value::Null,
            Self::Boolean => Value::Bool(false),
        }
    }

    /// Returns the fallback message used when coercion fails.
    pub const fn default_type_error(self) -> &'static str {
        match self {
            Self::Text => "Enter a valid value.",
            Self::Number => "Enter a number.",
            Self::Date => "Enter a valid date (YYYY-MM-DD).",
            Self::Boolean => "Enter true or false.",
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Value::Float(f)),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Complete definition of a form field.
#[derive(Debug)]
pub struct FieldDef {
    /// The field name (the last path segment).
    pub name: String,
    /// The field type, controlling coercion.
    pub field_type: FieldType,
    /// Whether this field is required.
    pub required: bool,
    /// Value used when no default is supplied.
    pub initial: Option<Value>,
    /// Human-readable label.
    pub label: String,
    /// Rules applied after coercion, in order.
    pub rules: Vec<Box<dyn Rule>>,
    /// Custom error messages keyed by error code.
    pub error_messages: HashMap<String, String>,
    /// Path patterns whose changes re-validate this field.
    pub depends_on: Vec<String>,
    /// Path whose emptiness disables this field in the UI.
    pub disabled_when_empty: Option<FieldPath>,
}

impl FieldDef {
    /// Creates a new `FieldDef`. The field is optional and has no rules.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let label = name.replace('_', " ");
        Self {
            name,
            field_type,
            required: false,
            initial: None,
            label,
            rules: Vec::new(),
            error_messages: HashMap::new(),
            depends_on: Vec::new(),
            disabled_when_empty: None,
        }
    }

    /// Sets whether this field is required.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Marks the field required with a custom message.
    #[must_use]
    pub fn required_message(self, msg: impl Into<String>) -> Self {
        self.required(true).error_message("required", msg)
    }

    /// Sets the message used when coercion fails.
    #[must_use]
    pub fn type_error(self, msg: impl Into<String>) -> Self {
        self.error_message("type_mismatch", msg)
    }

    /// Sets the initial value.
    #[must_use]
    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Appends a rule to the chain.
    #[must_use]
    pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Sets a custom error message for a given code.
    #[must_use]
    pub fn error_message(mut self, code: impl Into<String>, msg: impl Into<String>) -> Self {
        self.error_messages.insert(code.into(), msg.into());
        self
    }

    /// Declares that changes to `pattern` re-validate this field.
    #[must_use]
    pub fn depends_on(mut self, pattern: impl Into<String>) -> Self {
        self.depends_on.push(pattern.into());
        self
    }

    /// Declares that the field is disabled while `path` is empty.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid field path.
    #[must_use]
    pub fn disabled_when_empty(mut self, path: &str) -> Self {
        self.disabled_when_empty =
            Some(FieldPath::parse(path).unwrap_or_else(|e| panic!("{e}")));
        self
    }

    /// Returns the value an untouched field starts with.
    pub fn blank(&self) -> Value {
        self.initial
            .clone()
            .unwrap_or_else(|| self.field_type.blank())
    }

    /// Returns the message for `code`, or `fallback`.
    pub fn message_for(&self, code: &str, fallback: &str) -> String {
        self.error_messages
            .get(code)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// A node of a [`FormSchema`].
#[derive(Debug)]
pub enum SchemaNode {
    /// A leaf field.
    Field(FieldDef),
    /// A named group of nodes.
    Group {
        /// The group name.
        name: String,
        /// The group's children.
        children: Vec<SchemaNode>,
    },
    /// A named list whose items all share one schema.
    List {
        /// The list name.
        name: String,
        /// The schema of each item.
        item: Vec<SchemaNode>,
    },
}

impl SchemaNode {
    /// Creates a field node.
    pub const fn field(def: FieldDef) -> Self {
        Self::Field(def)
    }

    /// Creates a group node.
    pub fn group(name: impl Into<String>, children: Vec<Self>) -> Self {
        Self::Group {
            name: name.into(),
            children,
        }
    }

    /// Creates a list node.
    pub fn list(name: impl Into<String>, item: Vec<Self>) -> Self {
        Self::List {
            name: name.into(),
            item,
        }
    }

    /// Returns the node name.
    pub fn name(&self) -> &str {
        match self {
            Self::Field(def) => &def.name,
            Self::Group { name, .. } | Self::List { name, .. } => name,
        }
    }
}

/// The result of looking up a path in a [`FormSchema`].
#[derive(Debug, Clone, Copy)]
pub enum SchemaRef<'a> {
    /// A leaf field.
    Field(&'a FieldDef),
    /// A group (or the root), with its children.
    Group(&'a [SchemaNode]),
    /// A list, with its item schema.
    List(&'a [SchemaNode]),
    /// One item of a list, with the item schema.
    Item(&'a [SchemaNode]),
}

/// The declared shape and rules of a form.
#[derive(Debug)]
pub struct FormSchema {
    name: String,
    nodes: Vec<SchemaNode>,
}

impl FormSchema {
    /// Creates a schema from its top-level nodes.
    ///
    /// # Panics
    ///
    /// Panics if a field's `depends_on` pattern or `disabled_when_empty`
    /// path names no declared field. See [`try_new`](Self::try_new).
    pub fn new(name: impl Into<String>, nodes: Vec<SchemaNode>) -> Self {
        match Self::try_new(name, nodes) {
            Ok(schema) => schema,
            Err(err) => panic!("invalid form schema: {err}"),
        }
    }

    /// Creates a schema, checking that every cross-field reference names a
    /// declared field.
    pub fn try_new(name: impl Into<String>, nodes: Vec<SchemaNode>) -> FormResult<Self> {
        let schema = Self {
            name: name.into(),
            nodes,
        };
        schema.check_references()?;
        Ok(schema)
    }

    fn check_references(&self) -> FormResult<()> {
        let patterns = self.field_patterns();
        for (pattern, def) in &patterns {
            if let Some(missing) = def
                .depends_on
                .iter()
                .find(|dep| !patterns.iter().any(|(p, _)| p == *dep))
            {
                return Err(FormError::UnknownField(format!(
                    "{missing} (depended on by {pattern})"
                )));
            }
            if let Some(gate) = &def.disabled_when_empty {
                if self.field(gate).is_none() {
                    return Err(FormError::UnknownField(format!(
                        "{gate} (gates {pattern})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns the schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the top-level nodes.
    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    /// Looks up the declaration for a concrete path.
    pub fn lookup(&self, path: &FieldPath) -> Option<SchemaRef<'_>> {
        let mut current = SchemaRef::Group(&self.nodes);
        for segment in path.segments() {
            current = match (current, segment) {
                (SchemaRef::Group(children) | SchemaRef::Item(children), Segment::Key(k)) => {
                    match children.iter().find(|n| n.name() == k)? {
                        SchemaNode::Field(def) => SchemaRef::Field(def),
                        SchemaNode::Group { children, .. } => SchemaRef::Group(children),
                        SchemaNode::List { item, .. } => SchemaRef::List(item),
                    }
                }
                (SchemaRef::List(item), Segment::Index(_)) => SchemaRef::Item(item),
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns the field definition for a concrete leaf path.
    pub fn field(&self, path: &FieldPath) -> Option<&FieldDef> {
        match self.lookup(path)? {
            SchemaRef::Field(def) => Some(def),
            _ => None,
        }
    }

    /// Returns every field definition with its path pattern.
    pub fn field_patterns(&self) -> Vec<(String, &FieldDef)> {
        let mut out = Vec::new();
        collect_patterns(&self.nodes, "", &mut out);
        out
    }

    /// Returns the patterns of fields that declared a dependency on `pattern`.
    pub fn dependents_of(&self, pattern: &str) -> Vec<String> {
        self.field_patterns()
            .into_iter()
            .filter(|(_, def)| def.depends_on.iter().any(|d| d == pattern))
            .map(|(p, _)| p)
            .collect()
    }

    /// Builds a record holding every field's blank value and empty lists.
    pub fn blank_record(&self) -> Record {
        self.record_from_json(&serde_json::Value::Null)
    }

    /// Builds a record from a JSON object of default values.
    ///
    /// Missing or malformed entries fall back to the field's blank value, so
    /// bad defaults never produce an error.
    pub fn record_from_json(&self, json: &serde_json::Value) -> Record {
        Record::new(build_children(&self.nodes, json, ""))
    }

    /// Builds a single list item from JSON using an item schema.
    pub fn item_from_json(item: &[SchemaNode], json: &serde_json::Value) -> Item<Value> {
        Item::new(Node::Group(build_children(item, json, "")))
    }
}

fn collect_patterns<'a>(nodes: &'a [SchemaNode], prefix: &str, out: &mut Vec<(String, &'a FieldDef)>) {
    for node in nodes {
        let pattern = join_pattern(prefix, node.name());
        match node {
            SchemaNode::Field(def) => out.push((pattern, def)),
            SchemaNode::Group { children, .. } => collect_patterns(children, &pattern, out),
            SchemaNode::List { item, .. } => {
                collect_patterns(item, &join_pattern(&pattern, "*"), out);
            }
        }
    }
}

fn join_pattern(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn build_children(
    nodes: &[SchemaNode],
    json: &serde_json::Value,
    prefix: &str,
) -> std::collections::BTreeMap<String, Node<Value>> {
    nodes
        .iter()
        .map(|node| {
            let entry = json.get(node.name()).unwrap_or(&serde_json::Value::Null);
            let pattern = join_pattern(prefix, node.name());
            (node.name().to_string(), build_node(node, entry, &pattern))
        })
        .collect()
}

fn build_node(node: &SchemaNode, json: &serde_json::Value, pattern: &str) -> Node<Value> {
    match node {
        SchemaNode::Field(def) => Node::Leaf(default_for_field(def, json, pattern)),
        SchemaNode::Group { children, .. } => {
            if !json.is_null() && !json.is_object() {
                tracing::warn!(field = pattern, "ignoring malformed group default");
            }
            Node::Group(build_children(children, json, pattern))
        }
        SchemaNode::List { item, .. } => match json {
            serde_json::Value::Array(entries) => {
                let item_pattern = join_pattern(pattern, "*");
                Node::List(
                    entries
                        .iter()
                        .map(|entry| Item::new(Node::Group(build_children(item, entry, &item_pattern))))
                        .collect(),
                )
            }
            serde_json::Value::Null => Node::List(Vec::new()),
            _ => {
                tracing::warn!(field = pattern, "ignoring malformed list default");
                Node::List(Vec::new())
            }
        },
    }
}

fn default_for_field(def: &FieldDef, json: &serde_json::Value, pattern: &str) -> Value {
    if json.is_null() {
        return def.blank();
    }
    let coerced = Value::from_json(json).and_then(|raw| {
        if raw.is_empty() {
            Some(raw)
        } else {
            def.field_type.coerce(&raw)
        }
    });
    coerced.unwrap_or_else(|| {
        tracing::warn!(field = pattern, "ignoring malformed field default");
        def.blank()
    })
}
