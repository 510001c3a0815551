//! Dynamic form schema for a tax definition.
//!
//! A schema is an ordered tree of typed fields. Submitted values never follow the tree
//! shape directly; they are flattened into a [`ValueSet`] keyed by the dot-joined path of
//! field keys (`vehicle.plate_number`), so validation and persistence only ever deal with
//! canonical paths rather than display labels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Typed discriminator for a form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    ShortText,
    Number,
    SingleSelect { options: Vec<String> },
    FileReference,
    Email,
    Phone,
}

impl FieldKind {
    pub const fn label(&self) -> &'static str {
        match self {
            FieldKind::ShortText => "short_text",
            FieldKind::Number => "number",
            FieldKind::SingleSelect { .. } => "single_select",
            FieldKind::FileReference => "file_reference",
            FieldKind::Email => "email",
            FieldKind::Phone => "phone",
        }
    }
}

/// One node of the schema tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Never enforced as required, whatever `required` says.
    #[serde(default)]
    pub always_optional: bool,
    /// Parent value that makes `sub_fields` relevant to a front-end. Validation ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shown_when: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<FieldDefinition>,
}

impl FieldDefinition {
    pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            kind,
            required: false,
            always_optional: false,
            shown_when: None,
            sub_fields: Vec::new(),
        }
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn always_optional(mut self) -> Self {
        self.always_optional = true;
        self
    }

    pub fn with_sub_fields(
        mut self,
        shown_when: Option<&str>,
        sub_fields: Vec<FieldDefinition>,
    ) -> Self {
        self.shown_when = shown_when.map(str::to_string);
        self.sub_fields = sub_fields;
        self
    }

    /// Whether an empty value should be reported.
    pub fn is_enforced(&self) -> bool {
        self.required && !self.always_optional
    }
}

/// Ordered top-level fields of a tax definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSchema {
    pub fields: Vec<FieldDefinition>,
}

impl FormSchema {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    /// Depth-first walk yielding every field with its canonical path.
    pub fn walk(&self) -> Vec<(String, &FieldDefinition)> {
        let mut out = Vec::new();
        for field in &self.fields {
            collect(None, field, &mut out);
        }
        out
    }

    pub fn paths(&self) -> Vec<String> {
        self.walk().into_iter().map(|(path, _)| path).collect()
    }

    pub fn field(&self, path: &str) -> Option<&FieldDefinition> {
        self.walk()
            .into_iter()
            .find(|(candidate, _)| candidate == path)
            .map(|(_, field)| field)
    }

    /// Flag legacy contact fields as always optional.
    ///
    /// Imported schemas identify those fields only by their label ("Email", "E-mail",
    /// "Second phone number"). This runs once when a schema is authored or imported so the
    /// validator can rely on the explicit flag instead of matching text.
    pub fn mark_legacy_optional_fields(&mut self) -> usize {
        let mut marked = 0;
        for field in &mut self.fields {
            marked += mark_legacy(field);
        }
        marked
    }
}

fn collect<'a>(
    parent: Option<&str>,
    field: &'a FieldDefinition,
    out: &mut Vec<(String, &'a FieldDefinition)>,
) {
    let path = join_path(parent, &field.key);
    out.push((path.clone(), field));
    for child in &field.sub_fields {
        collect(Some(&path), child, out);
    }
}

fn mark_legacy(field: &mut FieldDefinition) -> usize {
    let mut marked = 0;
    if !field.always_optional && is_legacy_optional_label(&field.label) {
        field.always_optional = true;
        marked += 1;
    }
    for child in &mut field.sub_fields {
        marked += mark_legacy(child);
    }
    marked
}

fn is_legacy_optional_label(label: &str) -> bool {
    let lowered = label.to_lowercase();
    lowered.contains("email") || lowered.contains("e-mail") || lowered.contains("second phone number")
}

pub fn join_path(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}.{key}"),
        _ => key.to_string(),
    }
}

/// Submitted values for one declaration, keyed by canonical field path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSet(BTreeMap<String, String>);

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(path, value);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<String>) {
        self.0.insert(path.into(), value.into());
    }

    /// Trimmed value at `path`; blank strings read as absent.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.0
            .get(path)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ValueSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
