//! Query types for resource collection reads.
//!
//! A [`Query`] is produced per request by the parsing layer and consumed once
//! by the engine. It carries target and relation filters, sorting, sparse
//! fieldsets, inclusion and pagination.

use crate::error::Error;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Filter operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Member of a set.
    In,
    /// Not a member of a set.
    Nin,
    /// Case-insensitive substring match.
    Like,
    /// Native regular expression match.
    Regexp,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal to.
    Gte,
    /// Less than or equal to.
    Lte,
    /// Array column overlaps a literal set.
    Some,
}

impl Operand {
    /// The operand's query-string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operand::Eq => "eq",
            Operand::Ne => "ne",
            Operand::In => "in",
            Operand::Nin => "nin",
            Operand::Like => "like",
            Operand::Regexp => "regexp",
            Operand::Gt => "gt",
            Operand::Lt => "lt",
            Operand::Gte => "gte",
            Operand::Lte => "lte",
            Operand::Some => "some",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conditions on a single field, keyed by operand.
pub type FieldConditions = BTreeMap<Operand, Value>;

/// A filter tree: field name to operand conditions. All entries are combined
/// with AND.
pub type FilterTree = BTreeMap<String, FieldConditions>;

/// Filters split by where they apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Conditions on the target type's own fields (and relation presence).
    #[serde(default)]
    pub target: Option<FilterTree>,
    /// Conditions on attributes of related rows, keyed by relation name.
    #[serde(default)]
    pub relation: Option<BTreeMap<String, FilterTree>>,
}

impl QueryFilter {
    /// Check whether no condition is present.
    pub fn is_empty(&self) -> bool {
        self.target.as_ref().map_or(true, |t| t.is_empty())
            && self
                .relation
                .as_ref()
                .map_or(true, |r| r.values().all(|tree| tree.is_empty()))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Field name.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

impl SortField {
    /// Create an ascending sort key.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Create a descending sort key.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Sort keys for one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSort {
    /// Relation name.
    pub relation: String,
    /// Keys on the related type's fields.
    pub fields: Vec<SortField>,
}

/// Sort specification: target keys first, then relation blocks in the order
/// the relations were first named.
///
/// Serialized in the JSON:API string form, e.g. `"-createdAt,roles.name"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortSpec {
    /// Keys on the target type.
    pub target: Vec<SortField>,
    /// Relation blocks in declaration order.
    pub relations: Vec<RelationSort>,
}

impl SortSpec {
    /// Create an empty sort specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key on the target type.
    pub fn by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.target.push(SortField {
            field: field.into(),
            direction,
        });
        self
    }

    /// Add a key on a related type.
    pub fn by_relation(
        mut self,
        relation: impl Into<String>,
        field: impl Into<String>,
        direction: SortDirection,
    ) -> Self {
        let relation = relation.into();
        let key = SortField {
            field: field.into(),
            direction,
        };
        match self.relations.iter_mut().find(|r| r.relation == relation) {
            Some(block) => block.fields.push(key),
            None => self.relations.push(RelationSort {
                relation,
                fields: vec![key],
            }),
        }
        self
    }

    /// Check whether no key is present.
    pub fn is_empty(&self) -> bool {
        self.target.is_empty() && self.relations.iter().all(|r| r.fields.is_empty())
    }
}

impl FromStr for SortSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = SortSpec::new();
        for raw in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (direction, path) = match raw.strip_prefix('-') {
                Some(rest) => (SortDirection::Desc, rest),
                None => (SortDirection::Asc, raw.strip_prefix('+').unwrap_or(raw)),
            };
            match path.split_once('.') {
                Some((relation, field)) if !relation.is_empty() && !field.is_empty() => {
                    if field.contains('.') {
                        return Err(Error::InvalidQuery(format!(
                            "sort path '{}' is nested deeper than one relation",
                            path
                        )));
                    }
                    spec = spec.by_relation(relation, field, direction);
                }
                Some(_) => {
                    return Err(Error::InvalidQuery(format!("malformed sort path '{}'", path)))
                }
                None => spec = spec.by(path, direction),
            }
        }
        Ok(spec)
    }
}

impl TryFrom<String> for SortSpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let sign = |d: SortDirection| if d == SortDirection::Desc { "-" } else { "" };
        for key in &self.target {
            parts.push(format!("{}{}", sign(key.direction), key.field));
        }
        for block in &self.relations {
            for key in &block.fields {
                parts.push(format!("{}{}.{}", sign(key.direction), block.relation, key.field));
            }
        }
        f.write_str(&parts.join(","))
    }
}

impl From<SortSpec> for String {
    fn from(spec: SortSpec) -> Self {
        spec.to_string()
    }
}

/// Sparse fieldsets: which scalar properties to return per type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    /// Properties of the target type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec<String>>,
    /// Properties of related types, keyed by relation name.
    #[serde(flatten)]
    pub relations: BTreeMap<String, Vec<String>>,
}

/// Page selection (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page number, starting at 1.
    pub number: u64,
    /// Page size.
    pub size: u64,
}

/// Default page size when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

impl Page {
    /// Create a page selection.
    pub fn new(number: u64, size: u64) -> Self {
        Self { number, size }
    }

    /// Row offset of this page.
    pub fn offset(&self) -> u64 {
        self.number.saturating_sub(1).saturating_mul(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// A read query against one resource type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Filter conditions.
    #[serde(default)]
    pub filter: QueryFilter,
    /// Sort specification.
    #[serde(default)]
    pub sort: Option<SortSpec>,
    /// Sparse fieldsets.
    #[serde(default)]
    pub fields: Option<Fields>,
    /// Relations to include in the result.
    #[serde(default)]
    pub include: Option<Vec<String>>,
    /// Page selection.
    #[serde(default)]
    pub page: Page,
}

impl Query {
    /// Create an empty query (first page, default size).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition on a target field.
    pub fn filter(mut self, field: impl Into<String>, operand: Operand, value: impl Into<Value>) -> Self {
        self.filter
            .target
            .get_or_insert_with(BTreeMap::new)
            .entry(field.into())
            .or_default()
            .insert(operand, value.into());
        self
    }

    /// Add a condition on an attribute of a related row.
    pub fn filter_relation(
        mut self,
        relation: impl Into<String>,
        field: impl Into<String>,
        operand: Operand,
        value: impl Into<Value>,
    ) -> Self {
        self.filter
            .relation
            .get_or_insert_with(BTreeMap::new)
            .entry(relation.into())
            .or_default()
            .entry(field.into())
            .or_default()
            .insert(operand, value.into());
        self
    }

    /// Set the sort specification.
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Include a relation.
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        let relation = relation.into();
        let include = self.include.get_or_insert_with(Vec::new);
        if !include.contains(&relation) {
            include.push(relation);
        }
        self
    }

    /// Restrict the target type's returned properties.
    pub fn with_target_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.get_or_insert_with(Fields::default).target =
            Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict a related type's returned properties.
    pub fn with_relation_fields<I, S>(mut self, relation: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .get_or_insert_with(Fields::default)
            .relations
            .insert(relation.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Select a page.
    pub fn with_page(mut self, number: u64, size: u64) -> Self {
        self.page = Page::new(number, size);
        self
    }

    /// Included relation names (empty when none).
    pub fn included(&self) -> &[String] {
        self.include.as_deref().unwrap_or(&[])
    }

    /// Check whether a relation is included.
    pub fn includes(&self, relation: &str) -> bool {
        self.included().iter().any(|r| r == relation)
    }
}
