//! Attribute edit pipeline
//!
//! An [`EditOperation`] starts `Pending`, is validated against the schema
//! catalog into a [`ValidatedEdit`] (or rejected), and is finally applied to
//! a value list or turned into a protocol [`Modification`]. An
//! [`EditBatch`] validates every operation before producing anything, so a
//! batch never partially applies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::convert::ConverterRegistry;
use crate::error::{DirectoryError, DirectoryResult, RangeBound};
use crate::schema::{AttributeSchema, SchemaCatalog};
use crate::transport::Modification;
use crate::value::AttributeValue;

/// The current values of one attribute.
pub type AttributeValues = Vec<AttributeValue>;

/// What an edit does to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    /// Replace all values.
    Set,
    /// Add values not already present.
    Add,
    /// Remove matching values.
    Remove,
    /// Remove all values.
    Clear,
}

impl EditKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::Set => "set",
            EditKind::Add => "add",
            EditKind::Remove => "remove",
            EditKind::Clear => "clear",
        }
    }
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditState {
    Pending,
    Validated,
    Applied,
    Rejected,
}

impl EditState {
    /// The state a validation outcome lands in.
    #[must_use]
    pub fn of(outcome: &DirectoryResult<ValidatedEdit>) -> Self {
        match outcome {
            Ok(_) => EditState::Validated,
            Err(_) => EditState::Rejected,
        }
    }
}

/// A single requested change to one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOperation {
    /// Attribute name as given by the caller.
    pub property: String,
    /// What to do.
    pub kind: EditKind,
    /// Protocol-ready values (ignored for `Clear`).
    #[serde(default)]
    pub values: Vec<AttributeValue>,
}

impl EditOperation {
    /// Create a pending edit.
    pub fn new(property: impl Into<String>, kind: EditKind, values: Vec<AttributeValue>) -> Self {
        Self {
            property: property.into(),
            kind,
            values,
        }
    }

    /// Replace the attribute's values.
    pub fn set(property: impl Into<String>, values: impl IntoIterator<Item = impl Into<AttributeValue>>) -> Self {
        Self::new(property, EditKind::Set, values.into_iter().map(Into::into).collect())
    }

    /// Add values.
    pub fn add(property: impl Into<String>, values: impl IntoIterator<Item = impl Into<AttributeValue>>) -> Self {
        Self::new(property, EditKind::Add, values.into_iter().map(Into::into).collect())
    }

    /// Remove values.
    pub fn remove(
        property: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<AttributeValue>>,
    ) -> Self {
        Self::new(property, EditKind::Remove, values.into_iter().map(Into::into).collect())
    }

    /// Remove all values.
    pub fn clear(property: impl Into<String>) -> Self {
        Self::new(property, EditKind::Clear, Vec::new())
    }

    /// An operation that has not been validated is pending.
    #[must_use]
    pub fn state(&self) -> EditState {
        EditState::Pending
    }

    /// Validate against the catalog.
    ///
    /// Fails with `UnknownAttribute` for attributes the catalog does not
    /// define, and with `ValueOutOfRange` when a value violates the declared
    /// range or a single-valued attribute is given several values. `Clear`
    /// carries no values and only needs a known attribute.
    pub fn validate(self, catalog: &SchemaCatalog) -> DirectoryResult<ValidatedEdit> {
        let schema = catalog
            .get(&self.property)
            .ok_or_else(|| DirectoryError::UnknownAttribute {
                attribute: self.property.clone(),
            })?;

        if self.kind != EditKind::Clear {
            check_values(schema, &distinct(&self.values))?;
        }

        Ok(ValidatedEdit {
            attribute: schema.name.clone(),
            operation: self,
        })
    }
}

fn check_values(schema: &AttributeSchema, values: &[AttributeValue]) -> DirectoryResult<()> {
    if !schema.multi_valued && values.len() > 1 {
        return Err(DirectoryError::ValueOutOfRange {
            attribute: schema.name.clone(),
            bound: RangeBound::SingleValued,
            actual: values.len() as i64,
        });
    }
    values.iter().try_for_each(|value| schema.check(value))
}

/// An edit that passed schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEdit {
    // Canonical name from the schema.
    attribute: String,
    operation: EditOperation,
}

impl ValidatedEdit {
    #[must_use]
    pub fn state(&self) -> EditState {
        EditState::Validated
    }

    /// Attribute name as declared in the schema.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    #[must_use]
    pub fn kind(&self) -> EditKind {
        self.operation.kind
    }

    #[must_use]
    pub fn values(&self) -> &[AttributeValue] {
        &self.operation.values
    }

    /// Apply the edit to an attribute's current values.
    pub fn apply(&self, current: &mut AttributeValues) -> EditState {
        match self.operation.kind {
            EditKind::Clear => current.clear(),
            EditKind::Set => {
                current.clear();
                push_distinct(current, &self.operation.values);
            }
            EditKind::Add => push_distinct(current, &self.operation.values),
            EditKind::Remove => {
                current.retain(|existing| !self.operation.values.iter().any(|v| v.matches(existing)));
            }
        }
        EditState::Applied
    }

    /// The protocol modification carrying this edit. Values are
    /// de-duplicated with the same rule [`ValidatedEdit::apply`] uses.
    #[must_use]
    pub fn to_modification(&self) -> Modification {
        let attribute = self.attribute.clone();
        let values = distinct(&self.operation.values)
            .iter()
            .map(AttributeValue::to_raw)
            .collect();
        match self.operation.kind {
            EditKind::Set => Modification::Replace { attribute, values },
            EditKind::Add => Modification::Add { attribute, values },
            EditKind::Remove => Modification::Delete { attribute, values },
            EditKind::Clear => Modification::Delete {
                attribute,
                values: Vec::new(),
            },
        }
    }
}

fn push_distinct(current: &mut AttributeValues, values: &[AttributeValue]) {
    for value in values {
        if !current.iter().any(|existing| existing.matches(value)) {
            current.push(value.clone());
        }
    }
}

fn distinct(values: &[AttributeValue]) -> AttributeValues {
    let mut unique = Vec::with_capacity(values.len());
    push_distinct(&mut unique, values);
    unique
}

/// An edit as it arrives in a request body, with JSON values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRequest {
    pub property: String,
    #[serde(alias = "op")]
    pub kind: EditKind,
    /// A scalar or an array; absent for `clear`. `null` is handed to the
    /// converter (file times read it as "never").
    #[serde(default)]
    pub value: Value,
}

impl EditRequest {
    /// Convert the JSON payload into protocol-ready values.
    pub fn into_operation(
        self,
        registry: &ConverterRegistry,
        catalog: &SchemaCatalog,
    ) -> DirectoryResult<EditOperation> {
        let values = match self.kind {
            EditKind::Clear => Vec::new(),
            _ => registry.to_protocol(
                &self.property,
                catalog.value_kind(&self.property),
                &self.value,
            )?,
        };
        Ok(EditOperation::new(self.property, self.kind, values))
    }
}

/// A set of edits applied to one object, all or nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditBatch {
    operations: Vec<EditOperation>,
}

impl EditBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from request bodies, converting their values.
    pub fn from_requests(
        requests: impl IntoIterator<Item = EditRequest>,
        registry: &ConverterRegistry,
        catalog: &SchemaCatalog,
    ) -> DirectoryResult<Self> {
        let operations = requests
            .into_iter()
            .map(|request| request.into_operation(registry, catalog))
            .collect::<DirectoryResult<Vec<_>>>()?;
        Ok(Self { operations })
    }

    /// Add an operation using builder pattern.
    #[must_use]
    pub fn with(mut self, operation: EditOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn push(&mut self, operation: EditOperation) {
        self.operations.push(operation);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Validate every operation. The first failure rejects the whole batch.
    pub fn validate(self, catalog: &SchemaCatalog) -> DirectoryResult<Vec<ValidatedEdit>> {
        let validated = self
            .operations
            .into_iter()
            .map(|operation| operation.validate(catalog))
            .collect::<DirectoryResult<Vec<_>>>()?;
        debug!(operations = validated.len(), "Edit batch validated");
        Ok(validated)
    }

    /// Validate and produce the protocol modifications.
    pub fn into_modifications(self, catalog: &SchemaCatalog) -> DirectoryResult<Vec<Modification>> {
        Ok(self
            .validate(catalog)?
            .iter()
            .map(ValidatedEdit::to_modification)
            .collect())
    }
}

impl FromIterator<EditOperation> for EditBatch {
    fn from_iter<T: IntoIterator<Item = EditOperation>>(iter: T) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}
