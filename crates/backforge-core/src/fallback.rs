//! In-process fallback store.
//!
//! Mirrors the remote backend's query semantics (equality `where`, single
//! column ordering, limit/offset windows, merge updates, filtered deletes) so
//! the data layer can substitute it transparently when the remote path is
//! unusable.
//!
//! Layout is namespace → table → [`Partition`]. All partitions sit behind a
//! single `RwLock`; every operation holds the lock for its whole duration, so
//! each operation is atomic with respect to its partition.
//!
//! Nothing is persisted: the store lives as long as the process.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::query::{DEFAULT_PAGE_SIZE, Direction, Method, Query};
use crate::record::{CREATED_AT_COLUMN, ID_COLUMN, Record, compare_values, loose_eq};
use crate::schema::{ColumnDef, TableDef};
use crate::tenant::{Namespace, is_global_table};

/// How a partition assigns ids to records inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPolicy {
    /// `1 + max(existing numeric ids)`, or `1` when empty.
    MaxPlusOne,
    /// A counter that only moves forward, so ids are never reused after a
    /// delete. Used by the bookkeeping tables.
    Counter,
}

impl IdPolicy {
    /// Policy for a table name.
    #[must_use]
    pub fn for_table(table: &str) -> Self {
        if is_global_table(table) {
            Self::Counter
        } else {
            Self::MaxPlusOne
        }
    }
}

/// Rows of one (namespace, table).
#[derive(Debug, Clone)]
struct Partition {
    rows: Vec<Record>,
    high_water: i64,
    policy: IdPolicy,
    definition: Option<TableDef>,
}

impl Partition {
    fn new(table: &str) -> Self {
        Self {
            rows: Vec::new(),
            high_water: 0,
            policy: IdPolicy::for_table(table),
            definition: None,
        }
    }

    fn next_id(&self) -> i64 {
        match self.policy {
            IdPolicy::MaxPlusOne => {
                self.rows
                    .iter()
                    .filter_map(Record::numeric_id)
                    .max()
                    .unwrap_or(0)
                    + 1
            }
            IdPolicy::Counter => self.high_water + 1,
        }
    }

    /// Columns that must be unique together: the declared primary key, or
    /// `id` when none is declared.
    fn key_columns(&self) -> Vec<String> {
        self.definition
            .as_ref()
            .map(|def| def.primary_key().into_iter().map(str::to_string).collect::<Vec<_>>())
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| vec![ID_COLUMN.to_string()])
    }

    fn uses_id_key(&self) -> bool {
        self.key_columns() == [ID_COLUMN]
    }

    fn holds_key(&self, key: &[String], record: &Record, skip: &[usize]) -> bool {
        let Some(wanted) = key_of(record, key) else {
            return false;
        };
        self.rows.iter().enumerate().any(|(index, row)| {
            !skip.contains(&index) && key_of(row, key).is_some_and(|have| same_key(&have, &wanted))
        })
    }

    fn insert(&mut self, mut record: Record) -> Result<Record> {
        let key = self.key_columns();
        let has_id = record.id().is_some_and(|id| !id.is_null());
        if !has_id && self.uses_id_key() {
            let mut id = self.next_id();
            while self
                .rows
                .iter()
                .any(|row| row.id().is_some_and(|v| loose_eq(v, &Value::from(id))))
            {
                id += 1;
            }
            record.insert(ID_COLUMN, id);
        }
        if self.holds_key(&key, &record, &[]) {
            return Err(duplicate_key(&key, &record));
        }
        // Explicit non-numeric ids are kept as given.
        if let Some(id) = record.numeric_id() {
            self.high_water = self.high_water.max(id);
        }
        if !record.contains(CREATED_AT_COLUMN) {
            record.insert(
                CREATED_AT_COLUMN,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            );
        }
        self.rows.push(record.clone());
        Ok(record)
    }

    /// Inserts every record or none of them.
    fn insert_all(&mut self, records: &[Record]) -> Result<Vec<Record>> {
        let (len, high_water) = (self.rows.len(), self.high_water);
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            match self.insert(record.clone()) {
                Ok(row) => inserted.push(row),
                Err(err) => {
                    self.rows.truncate(len);
                    self.high_water = high_water;
                    return Err(err);
                }
            }
        }
        Ok(inserted)
    }

    /// Rejects a patch that would leave two rows sharing a key.
    fn check_update(&self, patch: &Record, matched: &[usize]) -> Result<()> {
        let key = self.key_columns();
        if !key.iter().any(|column| patch.contains(column)) {
            return Ok(());
        }

        let mut patched: Vec<Record> = Vec::with_capacity(matched.len());
        for &index in matched {
            let mut row = self.rows[index].clone();
            row.merge(patch);
            let clash = self.holds_key(&key, &row, matched)
                || key_of(&row, &key).is_some_and(|wanted| {
                    patched
                        .iter()
                        .filter_map(|other| key_of(other, &key))
                        .any(|have| same_key(&have, &wanted))
                });
            if clash {
                return Err(duplicate_key(&key, &row));
            }
            patched.push(row);
        }
        Ok(())
    }
}

/// Values of the key columns; `None` if any is missing or null, since such
/// rows never conflict.
fn key_of(row: &Record, key: &[String]) -> Option<Vec<Value>> {
    key.iter()
        .map(|column| row.get(column).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn same_key(left: &[Value], right: &[Value]) -> bool {
    left.iter().zip(right).all(|(a, b)| loose_eq(a, b))
}

fn duplicate_key(key: &[String], record: &Record) -> Error {
    let values: Vec<String> = key
        .iter()
        .map(|column| record.get(column).map_or_else(|| "null".to_string(), Value::to_string))
        .collect();
    Error::InvalidInput(format!(
        "duplicate key ({})=({}): a row with this key already exists",
        key.join(", "),
        values.join(", ")
    ))
}

type Tables = BTreeMap<String, Partition>;

/// Process-local record store used when the remote backend is unusable.
///
/// Construct one per process and share it by `Arc`.
#[derive(Debug, Default)]
pub struct FallbackStore {
    partitions: RwLock<BTreeMap<String, Tables>>,
    page_size: Option<usize>,
}

impl FallbackStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with a custom default page size.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            partitions: RwLock::default(),
            page_size: Some(page_size),
        }
    }

    /// Runs a query against the (namespace, table) partition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for writes without a usable payload.
    pub fn execute(&self, namespace: &Namespace, table: &str, query: &Query) -> Result<Vec<Record>> {
        match query.method {
            Method::Select => self.select(namespace, table, query),
            Method::Insert => self.insert(namespace, table, query),
            Method::Update => self.update(namespace, table, query),
            Method::Delete => self.delete(namespace, table, query),
        }
    }

    /// Selects matching rows; a missing partition yields no rows.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn select(&self, namespace: &Namespace, table: &str, query: &Query) -> Result<Vec<Record>> {
        let partitions = self.partitions.read().map_err(|_| Error::lock_poisoned())?;
        let Some(partition) = partitions
            .get(&namespace.schema_name())
            .and_then(|tables| tables.get(table))
        else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Record> = partition
            .rows
            .iter()
            .filter(|row| query.filter.matches(row))
            .cloned()
            .collect();
        drop(partitions);

        if let Some(order) = &query.order_by {
            // Stable sort: ties keep insertion order.
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).unwrap_or(&Value::Null);
                let right = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = compare_values(left, right);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some((offset, len)) = query.window(self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)) {
            rows = rows.into_iter().skip(offset).take(len).collect();
        }
        Ok(rows)
    }

    /// Inserts the payload, creating the partition on first use.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the query has no payload or a record's
    /// `id` (or declared primary key) is already taken; nothing is inserted
    /// in that case.
    pub fn insert(&self, namespace: &Namespace, table: &str, query: &Query) -> Result<Vec<Record>> {
        let payload = query.payload()?;
        let mut partitions = self.partitions.write().map_err(|_| Error::lock_poisoned())?;
        let partition = partitions
            .entry(namespace.schema_name())
            .or_default()
            .entry(table.to_string())
            .or_insert_with(|| Partition::new(table));

        partition.insert_all(payload.records())
    }

    /// Merges the payload into matching rows and returns them.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` unless the payload is a single record,
    /// or if the patch would leave two rows sharing an `id` (or declared
    /// primary key); nothing is updated in that case.
    pub fn update(&self, namespace: &Namespace, table: &str, query: &Query) -> Result<Vec<Record>> {
        let patch = query.payload()?.single()?;
        let mut partitions = self.partitions.write().map_err(|_| Error::lock_poisoned())?;
        let Some(partition) = partitions
            .get_mut(&namespace.schema_name())
            .and_then(|tables| tables.get_mut(table))
        else {
            return Ok(Vec::new());
        };

        let matched: Vec<usize> = partition
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| query.filter.matches(row))
            .map(|(index, _)| index)
            .collect();
        partition.check_update(patch, &matched)?;

        let mut updated = Vec::with_capacity(matched.len());
        for index in matched {
            let row = &mut partition.rows[index];
            row.merge(patch);
            updated.push(row.clone());
        }
        if let Some(id) = patch.numeric_id() {
            partition.high_water = partition.high_water.max(id);
        }
        Ok(updated)
    }

    /// Deletes matching rows and returns them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn delete(&self, namespace: &Namespace, table: &str, query: &Query) -> Result<Vec<Record>> {
        let mut partitions = self.partitions.write().map_err(|_| Error::lock_poisoned())?;
        let Some(partition) = partitions
            .get_mut(&namespace.schema_name())
            .and_then(|tables| tables.get_mut(table))
        else {
            return Ok(Vec::new());
        };

        let (deleted, kept): (Vec<Record>, Vec<Record>) = partition
            .rows
            .drain(..)
            .partition(|row| query.filter.matches(row));
        partition.rows = kept;
        Ok(deleted)
    }

    /// Records a table definition, creating the partition if needed.
    ///
    /// Re-defining a table keeps its rows and replaces the definition.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn define_table(&self, namespace: &Namespace, definition: TableDef) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(|_| Error::lock_poisoned())?;
        let partition = partitions
            .entry(namespace.schema_name())
            .or_default()
            .entry(definition.name.clone())
            .or_insert_with(|| Partition::new(&definition.name));
        partition.definition = Some(definition);
        Ok(())
    }

    /// Adds a column to a recorded definition.
    ///
    /// Existing rows are left alone: a missing column reads as `null`.
    /// Returns `false` if the column already existed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the table has no recorded definition.
    pub fn add_column(&self, namespace: &Namespace, table: &str, column: ColumnDef) -> Result<bool> {
        let mut partitions = self.partitions.write().map_err(|_| Error::lock_poisoned())?;
        let definition = partitions
            .get_mut(&namespace.schema_name())
            .and_then(|tables| tables.get_mut(table))
            .and_then(|partition| partition.definition.as_mut())
            .ok_or_else(|| {
                Error::InvalidInput(format!("table '{table}' is not defined in {namespace}"))
            })?;

        if definition.column(&column.name).is_some() {
            return Ok(false);
        }
        definition.columns.push(column);
        Ok(true)
    }

    /// Attaches a relationship to the source table's recorded definition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the source table is not defined.
    pub fn add_relationship(
        &self,
        namespace: &Namespace,
        relationship: crate::schema::Relationship,
    ) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(|_| Error::lock_poisoned())?;
        let table = relationship.source_table.clone();
        let definition = partitions
            .get_mut(&namespace.schema_name())
            .and_then(|tables| tables.get_mut(&table))
            .and_then(|partition| partition.definition.as_mut())
            .ok_or_else(|| {
                Error::InvalidInput(format!("table '{table}' is not defined in {namespace}"))
            })?;
        if !definition.relationships.contains(&relationship) {
            definition.relationships.push(relationship);
        }
        Ok(())
    }

    /// Returns the recorded definition of a table.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn table(&self, namespace: &Namespace, table: &str) -> Result<Option<TableDef>> {
        let partitions = self.partitions.read().map_err(|_| Error::lock_poisoned())?;
        Ok(partitions
            .get(&namespace.schema_name())
            .and_then(|tables| tables.get(table))
            .and_then(|partition| partition.definition.clone()))
    }

    /// Names of the tables known in a namespace, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn tables(&self, namespace: &Namespace) -> Result<Vec<String>> {
        let partitions = self.partitions.read().map_err(|_| Error::lock_poisoned())?;
        Ok(partitions
            .get(&namespace.schema_name())
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Number of rows in a partition.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn len(&self, namespace: &Namespace, table: &str) -> Result<usize> {
        let partitions = self.partitions.read().map_err(|_| Error::lock_poisoned())?;
        Ok(partitions
            .get(&namespace.schema_name())
            .and_then(|tables| tables.get(table))
            .map_or(0, |partition| partition.rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use crate::tenant::TenantId;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_json(value).unwrap()
    }

    fn ns(tenant: &str) -> Namespace {
        Namespace::Tenant(TenantId::new(tenant).unwrap())
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter().filter_map(Record::numeric_id).collect()
    }

    #[test]
    fn auto_ids_start_at_one_and_increase() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        for name in ["a", "b", "c"] {
            store
                .insert(&ns, "todos", &Query::insert(record(json!({"name": name}))))
                .unwrap();
        }
        let rows = store.select(&ns, "todos", &Query::select()).unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 3]);
    }

    #[test]
    fn explicit_ids_are_kept_and_raise_the_next_id() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        store
            .insert(&ns, "todos", &Query::insert(record(json!({"id": 10}))))
            .unwrap();
        let rows = store
            .insert(&ns, "todos", &Query::insert(record(json!({"name": "x"}))))
            .unwrap();
        assert_eq!(rows[0].numeric_id(), Some(11));
    }

    #[test]
    fn duplicate_explicit_ids_are_rejected() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        store
            .insert(&ns, "todos", &Query::insert(record(json!({"id": 1, "title": "a"}))))
            .unwrap();

        let err = store
            .insert(&ns, "todos", &Query::insert(record(json!({"id": 1, "title": "b"}))))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        // Loose equality: "1" names the same row.
        assert!(
            store
                .insert(&ns, "todos", &Query::insert(record(json!({"id": "1"}))))
                .is_err()
        );

        let rows = store
            .select(&ns, "todos", &Query::select().filter("id", 1))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title"), Some(&json!("a")));
    }

    #[test]
    fn batch_insert_with_a_duplicate_inserts_nothing() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        let batch = Query::insert_many(vec![
            record(json!({"id": 5, "title": "a"})),
            record(json!({"title": "b"})),
            record(json!({"id": 5, "title": "c"})),
        ]);
        assert!(store.insert(&ns, "todos", &batch).is_err());
        assert_eq!(store.len(&ns, "todos").unwrap(), 0);

        let rows = store
            .insert(&ns, "todos", &Query::insert(record(json!({}))))
            .unwrap();
        assert_eq!(rows[0].numeric_id(), Some(1));
    }

    #[test]
    fn update_cannot_rekey_onto_an_existing_id() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        for name in ["a", "b", "c"] {
            store
                .insert(&ns, "todos", &Query::insert(record(json!({"name": name}))))
                .unwrap();
        }

        let onto_existing = Query::update(record(json!({"id": 1}))).filter("id", 2);
        assert!(store.update(&ns, "todos", &onto_existing).is_err());

        let onto_many = Query::update(record(json!({"id": 9})));
        assert!(store.update(&ns, "todos", &onto_many).is_err());

        let rows = store.select(&ns, "todos", &Query::select()).unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 3]);

        // Re-keying one row to a free id, or to its own id, is fine.
        let rows = store
            .update(&ns, "todos", &Query::update(record(json!({"id": 7}))).filter("id", 3))
            .unwrap();
        assert_eq!(ids(&rows), vec![7]);
        let rows = store
            .update(
                &ns,
                "todos",
                &Query::update(record(json!({"id": 7, "name": "z"}))).filter("id", 7),
            )
            .unwrap();
        assert_eq!(rows[0].get("name"), Some(&json!("z")));
    }

    #[test]
    fn composite_keys_are_enforced_without_assigning_ids() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        let rel = crate::schema::Relationship::new(
            "posts",
            "tags",
            crate::schema::RelationshipKind::ManyToMany,
            None,
            None,
        )
        .unwrap();
        store.define_table(&ns, rel.junction_definition().unwrap()).unwrap();

        let rows = store
            .insert(
                &ns,
                "posts_tags",
                &Query::insert(record(json!({"posts_id": 1, "tags_id": 2}))),
            )
            .unwrap();
        assert!(rows[0].id().is_none());
        store
            .insert(
                &ns,
                "posts_tags",
                &Query::insert(record(json!({"posts_id": 1, "tags_id": 3}))),
            )
            .unwrap();

        assert!(
            store
                .insert(
                    &ns,
                    "posts_tags",
                    &Query::insert(record(json!({"posts_id": 1, "tags_id": "2"}))),
                )
                .is_err()
        );
        let retag = Query::update(record(json!({"tags_id": 2}))).filter("tags_id", 3);
        assert!(store.update(&ns, "posts_tags", &retag).is_err());
        assert_eq!(store.len(&ns, "posts_tags").unwrap(), 2);
    }

    #[test]
    fn max_plus_one_reuses_ids_after_deleting_the_tail() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        for _ in 0..3 {
            store
                .insert(&ns, "todos", &Query::insert(record(json!({}))))
                .unwrap();
        }
        store
            .delete(&ns, "todos", &Query::delete().filter("id", 3))
            .unwrap();
        let rows = store
            .insert(&ns, "todos", &Query::insert(record(json!({}))))
            .unwrap();
        assert_eq!(rows[0].numeric_id(), Some(3));
    }

    #[test]
    fn bookkeeping_tables_never_reuse_ids() {
        let store = FallbackStore::new();
        for _ in 0..3 {
            store
                .insert(
                    &Namespace::Global,
                    "deployments",
                    &Query::insert(record(json!({}))),
                )
                .unwrap();
        }
        store
            .delete(&Namespace::Global, "deployments", &Query::delete().filter("id", 3))
            .unwrap();
        let rows = store
            .insert(
                &Namespace::Global,
                "deployments",
                &Query::insert(record(json!({}))),
            )
            .unwrap();
        assert_eq!(rows[0].numeric_id(), Some(4));
    }

    #[test]
    fn missing_partitions_are_empty_not_errors() {
        let store = FallbackStore::new();
        let ns = ns("nobody");
        assert!(store.select(&ns, "ghost", &Query::select()).unwrap().is_empty());
        assert!(
            store
                .update(&ns, "ghost", &Query::update(record(json!({"a": 1}))))
                .unwrap()
                .is_empty()
        );
        assert!(store.delete(&ns, "ghost", &Query::delete()).unwrap().is_empty());
    }

    #[test]
    fn update_merges_and_returns_matches() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        store
            .insert(
                &ns,
                "todos",
                &Query::insert(record(json!({"name": "a", "done": false}))),
            )
            .unwrap();

        let rows = store
            .update(
                &ns,
                "todos",
                &Query::update(record(json!({"name": "b"}))).filter("id", "1"),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&json!("b")));
        assert_eq!(rows[0].get("done"), Some(&json!(false)));
        assert!(rows[0].contains(CREATED_AT_COLUMN));
    }

    #[test]
    fn order_by_desc_keeps_ties_in_insertion_order() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        let seed = [
            ("first", "2024-01-01T00:00:00Z"),
            ("second", "2024-01-02T00:00:00Z"),
            ("tie-a", "2024-01-03T00:00:00Z"),
            ("tie-b", "2024-01-03T00:00:00Z"),
        ];
        for (name, at) in seed {
            store
                .insert(
                    &ns,
                    "events",
                    &Query::insert(record(json!({"name": name, "created_at": at}))),
                )
                .unwrap();
        }

        let rows = store
            .select(
                &ns,
                "events",
                &Query::select().order_by("created_at", Direction::Desc),
            )
            .unwrap();
        let names: Vec<&str> = rows
            .iter()
            .map(|r| r.get("name").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(names, vec!["tie-a", "tie-b", "second", "first"]);
    }

    #[test]
    fn window_applies_after_ordering() {
        let store = FallbackStore::with_page_size(2);
        let ns = ns("acme");
        for n in 1..=5 {
            store
                .insert(&ns, "nums", &Query::insert(record(json!({"n": n}))))
                .unwrap();
        }
        let rows = store
            .select(
                &ns,
                "nums",
                &Query::select().order_by("n", Direction::Desc).offset(1),
            )
            .unwrap();
        assert_eq!(ids(&rows), vec![4, 3]);

        let rows = store
            .select(&ns, "nums", &Query::select().limit(2))
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 2]);
    }

    #[test]
    fn tenants_are_isolated() {
        let store = FallbackStore::new();
        store
            .insert(&ns("tenant-a"), "todos", &Query::insert(record(json!({"n": 1}))))
            .unwrap();
        assert!(
            store
                .select(&ns("tenant-b"), "todos", &Query::select())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn definitions_support_additive_columns() {
        let store = FallbackStore::new();
        let ns = ns("acme");
        let def = TableDef::new("todos", vec![ColumnDef::new("title", ColumnType::Text)]).unwrap();
        store.define_table(&ns, def).unwrap();

        assert!(
            store
                .add_column(&ns, "todos", ColumnDef::new("done", ColumnType::Boolean))
                .unwrap()
        );
        assert!(
            !store
                .add_column(&ns, "todos", ColumnDef::new("done", ColumnType::Boolean))
                .unwrap()
        );
        assert!(
            store
                .add_column(&ns, "ghost", ColumnDef::new("x", ColumnType::Text))
                .is_err()
        );

        let def = store.table(&ns, "todos").unwrap().unwrap();
        assert!(def.column("done").is_some());
        assert_eq!(store.tables(&ns).unwrap(), vec!["todos".to_string()]);
    }
}
