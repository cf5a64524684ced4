//! Predicates and updates over JSON documents.
//!
//! The store layer speaks in terms of these values. Each store adapter
//! translates them into its own query language; the pure evaluators here
//! (`Filter::matches`, `Query::apply`, `Update::apply`) define the meaning
//! every adapter has to reproduce.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// A predicate over a document's top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals value.
    Eq(String, Value),
    /// Array field contains value.
    Contains(String, Value),
    /// String field contains the text, ignoring case.
    Like(String, String),
    /// Every sub-filter matches.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
}

impl Filter {
    /// `field == value`.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::Eq(field.into(), to_value(value))
    }

    /// `value ∈ field`.
    #[must_use]
    pub fn contains(field: impl Into<String>, value: impl Serialize) -> Self {
        Self::Contains(field.into(), to_value(value))
    }

    /// Case-insensitive substring match.
    #[must_use]
    pub fn like(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Like(field.into(), text.into())
    }

    /// Evaluate the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => doc.get(field) == Some(value),
            Self::Contains(field, value) => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::Like(field, text) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&text.to_lowercase())),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }

    /// Every field name the filter refers to.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::All => Vec::new(),
            Self::Eq(field, _) | Self::Contains(field, _) | Self::Like(field, _) => {
                vec![field.as_str()]
            }
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().flat_map(Self::fields).collect()
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Top-level field to sort by.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

/// Filter plus optional ordering and limit.
///
/// Without a sort, documents come back in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Which documents.
    pub filter: Filter,
    /// In which order.
    pub sort: Option<Sort>,
    /// How many at most.
    pub limit: Option<usize>,
}

impl Query {
    /// Every document, in insertion order.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            filter: Filter::All,
            sort: None,
            limit: None,
        }
    }

    /// Documents matching `filter`.
    #[must_use]
    pub const fn filter(filter: Filter) -> Self {
        Self {
            filter,
            sort: None,
            limit: None,
        }
    }

    /// Sort by `field`.
    #[must_use]
    pub fn sorted_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    /// Keep at most `limit` documents.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Run the query over documents given in insertion order.
    #[must_use]
    pub fn apply(&self, docs: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut matched: Vec<Value> = docs
            .into_iter()
            .filter(|doc| self.filter.matches(doc))
            .collect();
        if let Some(sort) = &self.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(&sort.field).unwrap_or(&Value::Null),
                    b.get(&sort.field).unwrap_or(&Value::Null),
                );
                match sort.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// One step of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Overwrite a field.
    Set(String, Value),
    /// Append to an array field, creating it if absent.
    Push(String, Value),
    /// Remove every equal element from an array field.
    Pull(String, Value),
}

impl UpdateOp {
    /// The field this step writes.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Set(field, _) | Self::Push(field, _) | Self::Pull(field, _) => field,
        }
    }
}

/// An ordered list of field updates applied atomically by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// An empty update.
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Overwrite `field` with `value`.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.ops.push(UpdateOp::Set(field.into(), to_value(value)));
        self
    }

    /// Append `value` to the array in `field`.
    #[must_use]
    pub fn push(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.ops.push(UpdateOp::Push(field.into(), to_value(value)));
        self
    }

    /// Remove every occurrence of `value` from the array in `field`.
    #[must_use]
    pub fn pull(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.ops.push(UpdateOp::Pull(field.into(), to_value(value)));
        self
    }

    /// Steps in application order.
    #[must_use]
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// True when the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply the update to a document in place.
    ///
    /// Non-object documents are left untouched.
    pub fn apply(&self, doc: &mut Value) {
        let Some(object) = doc.as_object_mut() else {
            return;
        };
        for op in &self.ops {
            match op {
                UpdateOp::Set(field, value) => {
                    object.insert(field.clone(), value.clone());
                }
                UpdateOp::Push(field, value) => {
                    let slot = object
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot {
                        items.push(value.clone());
                    }
                }
                UpdateOp::Pull(field, value) => {
                    if let Some(Value::Array(items)) = object.get_mut(field) {
                        items.retain(|item| item != value);
                    }
                }
            }
        }
    }
}

/// True for names the store adapters accept as field or collection names.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Total order used for sorting: null < bool < number < string < others.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
