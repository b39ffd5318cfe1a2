//! Query value objects.
//!
//! A [`Query`] is the single request shape accepted by the data layer and by
//! both backends. Filters are equality-only today; [`Filter`] keeps them as an
//! ordered list of predicates so richer operators can be added without
//! changing call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::{Record, loose_eq};

/// Default number of rows returned when an offset is given without a limit.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// CRUD verb of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Read rows.
    Select,
    /// Create rows.
    Insert,
    /// Merge a payload into matching rows.
    Update,
    /// Remove matching rows.
    Delete,
}

impl Method {
    /// Lowercase name, as used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns true for methods that carry a data payload.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(Error::unsupported_method(s)),
        }
    }
}

/// One equality predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Column name.
    pub column: String,
    /// Value the column must (loosely) equal.
    pub value: Value,
}

/// AND-ed list of equality conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Vec<Condition>);

impl Filter {
    /// Creates an empty filter that matches every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Adds an equality condition in place.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.push(Condition {
            column: column.into(),
            value: value.into(),
        });
    }

    /// Returns true if every condition holds for `record`.
    ///
    /// A missing column reads as `null`.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|cond| {
            let stored = record.get(&cond.column).unwrap_or(&Value::Null);
            loose_eq(&cond.value, stored)
        })
    }

    /// Iterates over the conditions.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Returns true if the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value a column is constrained to, if any.
    #[must_use]
    pub fn value_of(&self, column: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|cond| cond.column == column)
            .map(|cond| &cond.value)
    }
}

impl From<Record> for Filter {
    fn from(record: Record) -> Self {
        let mut filter = Self::new();
        for (column, value) in record.iter() {
            filter.push(column, value.clone());
        }
        filter
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(Error::InvalidInput(format!(
                "invalid sort direction '{other}' (expected asc or desc)"
            ))),
        }
    }
}

/// Single-column ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column to sort on.
    pub column: String,
    /// Sort direction.
    pub direction: Direction,
}

/// Data carried by inserts and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A single record.
    One(Record),
    /// Several records (bulk insert).
    Many(Vec<Record>),
}

impl Payload {
    /// Returns the records of the payload.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        match self {
            Self::One(record) => std::slice::from_ref(record),
            Self::Many(records) => records,
        }
    }

    /// Returns the records mutably.
    pub fn records_mut(&mut self) -> &mut [Record] {
        match self {
            Self::One(record) => std::slice::from_mut(record),
            Self::Many(records) => records,
        }
    }

    /// Returns the single merge record of an update payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the payload holds more than one record.
    pub fn single(&self) -> Result<&Record> {
        match self.records() {
            [record] => Ok(record),
            records => Err(Error::InvalidInput(format!(
                "update expects exactly one record, got {}",
                records.len()
            ))),
        }
    }
}

/// A transient description of one CRUD operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// CRUD verb.
    pub method: Method,
    /// Equality conditions (`where`).
    #[serde(default, rename = "where")]
    pub filter: Filter,
    /// Insert/update payload.
    #[serde(default)]
    pub data: Option<Payload>,
    /// Optional ordering.
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    /// Maximum number of rows.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: Option<usize>,
}

impl Query {
    /// Creates an empty query for the given method.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            filter: Filter::new(),
            data: None,
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    /// Starts a select.
    #[must_use]
    pub fn select() -> Self {
        Self::new(Method::Select)
    }

    /// Starts an insert of one record.
    #[must_use]
    pub fn insert(record: Record) -> Self {
        Self::new(Method::Insert).data(record)
    }

    /// Starts a bulk insert.
    #[must_use]
    pub fn insert_many(records: Vec<Record>) -> Self {
        let mut query = Self::new(Method::Insert);
        query.data = Some(Payload::Many(records));
        query
    }

    /// Starts an update merging `patch` into matching rows.
    #[must_use]
    pub fn update(patch: Record) -> Self {
        Self::new(Method::Update).data(patch)
    }

    /// Starts a delete.
    #[must_use]
    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.push(column, value);
        self
    }

    /// Replaces the whole filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets a single-record payload.
    #[must_use]
    pub fn data(mut self, record: Record) -> Self {
        self.data = Some(Payload::One(record));
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the row offset.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns the `[start, start + len)` window to apply after ordering.
    ///
    /// `None` means "all rows". An offset without a limit pages by
    /// `default_page_size`.
    #[must_use]
    pub fn window(&self, default_page_size: usize) -> Option<(usize, usize)> {
        match (self.offset, self.limit) {
            (None, None) => None,
            (None, Some(limit)) => Some((0, limit)),
            (Some(offset), limit) => Some((offset, limit.unwrap_or(default_page_size))),
        }
    }

    /// Returns the payload, failing for writes that have none.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the query carries no data.
    pub fn payload(&self) -> Result<&Payload> {
        self.data
            .as_ref()
            .ok_or_else(|| Error::InvalidInput(format!("{} requires a data payload", self.method)))
    }

    /// Parses the loose options object used by generated route handlers:
    /// `{method, where, data, orderBy, limit, offset}`.
    ///
    /// - `method` defaults to `select`; any other verb than
    ///   select/insert/update/delete is `Error::UnsupportedMethod`.
    /// - `where` is an object of column to value.
    /// - `data` is an object or an array of objects.
    /// - `orderBy` is `{"column": "asc"|"desc"}`,
    ///   `{"column": .., "direction": ..}` or a bare column name.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedMethod` for unknown verbs and
    /// `Error::InvalidInput` for malformed fields.
    pub fn from_options(options: &Value) -> Result<Self> {
        let Value::Object(options) = options else {
            return Err(Error::InvalidInput("query options must be an object".into()));
        };

        let method = match options.get("method") {
            None | Some(Value::Null) => Method::Select,
            Some(Value::String(s)) => s.parse()?,
            Some(other) => return Err(Error::unsupported_method(other)),
        };
        let mut query = Self::new(method);

        match options.get("where") {
            None | Some(Value::Null) => {}
            Some(Value::Object(conditions)) => {
                for (column, value) in conditions {
                    query.filter.push(column.clone(), value.clone());
                }
            }
            Some(_) => return Err(Error::InvalidInput("'where' must be an object".into())),
        }

        query.data = match options.get("data") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(Payload::Many(
                items
                    .iter()
                    .cloned()
                    .map(Record::from_json)
                    .collect::<Result<_>>()?,
            )),
            Some(value) => Some(Payload::One(Record::from_json(value.clone())?)),
        };

        query.order_by = match options.get("orderBy").or_else(|| options.get("order_by")) {
            None | Some(Value::Null) => None,
            Some(Value::String(column)) => Some(OrderBy {
                column: column.clone(),
                direction: Direction::Asc,
            }),
            Some(Value::Object(spec)) => Some(parse_order_spec(spec)?),
            Some(_) => return Err(Error::InvalidInput("'orderBy' must be an object".into())),
        };

        query.limit = parse_count(options.get("limit"), "limit")?;
        query.offset = parse_count(options.get("offset"), "offset")?;
        Ok(query)
    }

    /// Column names referenced by the query (filter, payload, ordering).
    #[must_use]
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.filter.iter().map(|c| c.column.as_str()).collect();
        if let Some(payload) = &self.data {
            for record in payload.records() {
                columns.extend(record.columns());
            }
        }
        if let Some(order) = &self.order_by {
            columns.push(order.column.as_str());
        }
        columns.sort_unstable();
        columns.dedup();
        columns
    }
}

fn parse_order_spec(spec: &serde_json::Map<String, Value>) -> Result<OrderBy> {
    if let Some(Value::String(column)) = spec.get("column") {
        let direction = match spec.get("direction").or_else(|| spec.get("ascending")) {
            None | Some(Value::Null) => Direction::Asc,
            Some(Value::String(dir)) => dir.parse()?,
            Some(Value::Bool(true)) => Direction::Asc,
            Some(Value::Bool(false)) => Direction::Desc,
            Some(_) => return Err(Error::InvalidInput("invalid sort direction".into())),
        };
        return Ok(OrderBy {
            column: column.clone(),
            direction,
        });
    }

    let mut entries = spec.iter();
    match (entries.next(), entries.next()) {
        (Some((column, Value::String(dir))), None) => Ok(OrderBy {
            column: column.clone(),
            direction: dir.parse()?,
        }),
        _ => Err(Error::InvalidInput(
            "'orderBy' must name exactly one column".into(),
        )),
    }
}

fn parse_count(value: Option<&Value>, field: &str) -> Result<Option<usize>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| Error::InvalidInput(format!("'{field}' must be a non-negative integer"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidInput(format!("'{field}' must be a non-negative integer"))),
        Some(_) => Err(Error::InvalidInput(format!(
            "'{field}' must be a non-negative integer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_json(value).unwrap()
    }

    #[test]
    fn method_parsing_rejects_unknown_verbs() {
        assert_eq!("SELECT".parse::<Method>().unwrap(), Method::Select);
        assert_eq!(" delete ".parse::<Method>().unwrap(), Method::Delete);
        let err = "upsert".parse::<Method>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { ref method } if method == "upsert"));
    }

    #[test]
    fn filter_ands_conditions_and_ignores_other_columns() {
        let filter = Filter::new().eq("status", "open").eq("owner", 7);
        assert!(filter.matches(&record(json!({"status": "open", "owner": "7", "x": 1}))));
        assert!(!filter.matches(&record(json!({"status": "open", "owner": 8}))));
        assert!(!filter.matches(&record(json!({"status": "open"}))));
        assert!(Filter::new().matches(&record(json!({"anything": true}))));
    }

    #[test]
    fn missing_column_matches_null_condition() {
        let filter = Filter::new().eq("deleted_at", Value::Null);
        assert!(filter.matches(&record(json!({"id": 1}))));
        assert!(!filter.matches(&record(json!({"deleted_at": "2024-01-01"}))));
    }

    #[test]
    fn window_defaults_page_size_for_bare_offset() {
        assert_eq!(Query::select().window(10), None);
        assert_eq!(Query::select().limit(5).window(10), Some((0, 5)));
        assert_eq!(Query::select().offset(20).window(10), Some((20, 10)));
        assert_eq!(Query::select().offset(3).limit(2).window(10), Some((3, 2)));
    }

    #[test]
    fn update_payload_must_be_single() {
        let query = Query::insert_many(vec![record(json!({"a": 1})), record(json!({"a": 2}))]);
        assert!(query.payload().unwrap().single().is_err());
        assert!(Query::delete().payload().is_err());
    }

    #[test]
    fn query_deserializes_from_where_shape() {
        let query: Query = serde_json::from_value(json!({
            "method": "update",
            "where": [{"column": "id", "value": 1}],
            "data": {"name": "b"},
            "limit": 1
        }))
        .unwrap();
        assert_eq!(query.method, Method::Update);
        assert_eq!(query.filter.value_of("id"), Some(&json!(1)));
        assert_eq!(query.payload().unwrap().single().unwrap().get("name"), Some(&json!("b")));
    }

    #[test]
    fn referenced_columns_are_deduplicated() {
        let query = Query::update(record(json!({"name": "x", "id": 1})))
            .filter("id", 1)
            .order_by("name", Direction::Desc);
        assert_eq!(query.referenced_columns(), vec!["id", "name"]);
    }

    #[test]
    fn options_object_parses_generated_handler_shape() {
        let query = Query::from_options(&json!({
            "method": "select",
            "where": {"project_id": "42", "status": "live"},
            "orderBy": {"created_at": "desc"},
            "limit": 5,
            "offset": "10"
        }))
        .unwrap();
        assert_eq!(query.method, Method::Select);
        assert_eq!(query.filter.value_of("project_id"), Some(&json!("42")));
        assert_eq!(
            query.order_by,
            Some(OrderBy {
                column: "created_at".into(),
                direction: Direction::Desc
            })
        );
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(10));
    }

    #[test]
    fn options_default_to_select_and_accept_bulk_data() {
        let query = Query::from_options(&json!({})).unwrap();
        assert_eq!(query.method, Method::Select);

        let query = Query::from_options(&json!({
            "method": "insert",
            "data": [{"a": 1}, {"a": 2}]
        }))
        .unwrap();
        assert_eq!(query.payload().unwrap().records().len(), 2);
    }

    #[test]
    fn options_reject_unknown_methods_and_bad_fields() {
        assert!(matches!(
            Query::from_options(&json!({"method": "truncate"})),
            Err(Error::UnsupportedMethod { .. })
        ));
        assert!(matches!(
            Query::from_options(&json!({"method": 3})),
            Err(Error::UnsupportedMethod { .. })
        ));
        assert!(Query::from_options(&json!({"where": [1]})).is_err());
        assert!(Query::from_options(&json!({"limit": -1})).is_err());
        assert!(Query::from_options(&json!({"orderBy": {"a": "asc", "b": "desc"}})).is_err());
        assert!(Query::from_options(&json!({"data": "nope", "method": "insert"})).is_err());
    }
}
