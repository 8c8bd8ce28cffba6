//! Typed-record persistence engine
//!
//! The write path decides insert vs. update vs. skip per record from the
//! type's registered insert policy, persisting nested records depth-first so
//! a foreign-key column is never written before the row it references. The
//! read path materializes a row back into a typed record, recursively
//! resolving foreign-key columns.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use tracing::debug;

use crate::convert;
use crate::record::{Record, Value};
use crate::registry::{InsertPolicy, Registry, TypeMeta};
use crate::{Error, Result};

/// Upper bound on nested-record recursion. The record model is a DAG by
/// construction, so hitting this means a malformed object graph; fail fast
/// with a structured error instead of overflowing the stack.
const MAX_NESTING_DEPTH: usize = 32;

/// Capacity of the existence memo; past this, lookups still work but stop
/// being memoized.
const EXISTS_CACHE_CAPACITY: usize = 1_000_000;

/// Memoized "does a row with key K exist in table T" predicate.
///
/// Sound only under the single-writer, no-delete model: within one process a
/// key's existence, once observed or recorded true, never becomes false.
/// One mutex guards population against interleaved callers.
#[derive(Debug, Default)]
struct ExistsCache {
    entries: Mutex<HashMap<(String, String, i64), bool>>,
}

impl ExistsCache {
    fn check(&self, conn: &Connection, table: &str, column: &str, key: i64) -> Result<bool> {
        let memo_key = (table.to_string(), column.to_string(), key);
        {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = entries.get(&memo_key) {
                return Ok(*hit);
            }
        }

        let sql = format!("SELECT 1 FROM {table} WHERE {column} = ?");
        let present = conn
            .query_row(&sql, [key], |_| Ok(()))
            .optional()?
            .is_some();

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() < EXISTS_CACHE_CAPACITY || entries.contains_key(&memo_key) {
            entries.insert(memo_key, present);
        }
        Ok(present)
    }

    /// Record that a key now exists (called after a successful insert)
    fn record_present(&self, table: &str, column: &str, key: i64) {
        let memo_key = (table.to_string(), column.to_string(), key);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() < EXISTS_CACHE_CAPACITY || entries.contains_key(&memo_key) {
            entries.insert(memo_key, true);
        }
    }
}

/// One non-key field bound to its destination column and SQL value
struct BoundColumn {
    field: &'static str,
    column: String,
    value: SqlValue,
}

/// SQLite-backed persistence engine for typed records.
///
/// Constructed with the metadata registry it consults; the registry is built
/// once at startup and owned by the engine for its lifetime.
pub struct Db {
    conn: Connection,
    registry: Registry,
    readonly: bool,
    exists: ExistsCache,
}

impl Db {
    /// Open a database file (creates if it doesn't exist)
    pub fn open(path: &Path, registry: Registry) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            registry,
            readonly: false,
            exists: ExistsCache::default(),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(registry: Registry) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            registry,
            readonly: false,
            exists: ExistsCache::default(),
        })
    }

    /// Mark this engine instance read-only; any persist call will be rejected
    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Apply a DDL statement list before first use
    pub fn init_schema(&self, statements: &[&str]) -> Result<()> {
        for stmt in statements {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Write path ==========

    /// Persist a record (and, depth-first, every nested record it references),
    /// returning the row's primary key.
    ///
    /// Which statement is issued - insert, update, or none - is governed by
    /// the type's insert policy. Alternate-key rules are evaluated before
    /// primary-key rules; unconditional insert is the terminal fallback.
    pub fn persist(&self, record: &Record) -> Result<i64> {
        if self.readonly {
            return Err(Error::Config(format!(
                "engine is read-only; refusing to persist {}",
                record.type_name()
            )));
        }
        self.persist_at(record, 0)
    }

    fn persist_at(&self, record: &Record, depth: usize) -> Result<i64> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(Error::DepthExceeded(MAX_NESTING_DEPTH));
        }
        let meta = self.registry.meta(record.type_name())?;

        // Dependencies first: resolve every reference field to an integer key
        // before any decision about this row. This is what keeps foreign-key
        // columns pointing at rows that already exist.
        let bound = self.bind_columns(record, meta, depth)?;
        let pk_value = primary_key_value(record, meta)?;

        let policy = meta.policy;

        // Alternate-key rules carry natural identity; they win over a
        // speculatively pre-populated primary key.
        if !meta.alternate_key.is_empty()
            && (policy.contains(InsertPolicy::IF_NEW_ALT_KEY_ELSE_UPDATE)
                || policy.contains(InsertPolicy::IF_NEW_ALT_KEY_ELSE_IGNORE))
        {
            if let Some(existing) = self.find_by_alternate_key(meta, &bound)? {
                if policy.contains(InsertPolicy::IF_NEW_ALT_KEY_ELSE_UPDATE) {
                    let non_key: Vec<&BoundColumn> = bound
                        .iter()
                        .filter(|b| !meta.alternate_key.contains(&b.field))
                        .collect();
                    self.update_row(meta, &non_key, existing)?;
                } else {
                    debug!(table = %meta.table_name, key = existing, "alternate key present, skipping");
                }
                return Ok(existing);
            }
            // No match: insert, letting the store assign identity
            return self.insert_row(meta, &bound, None);
        }

        if let Some(pk_field) = meta.primary_key {
            if let Some(pk) = pk_value {
                if policy.contains(InsertPolicy::IF_NEW_PK_ELSE_UPDATE)
                    || policy.contains(InsertPolicy::IF_NEW_PK_ELSE_IGNORE)
                {
                    if self.exists.check(&self.conn, &meta.table_name, pk_field, pk)? {
                        if policy.contains(InsertPolicy::IF_NEW_PK_ELSE_UPDATE) {
                            let all: Vec<&BoundColumn> = bound.iter().collect();
                            self.update_row(meta, &all, pk)?;
                        } else {
                            debug!(table = %meta.table_name, key = pk, "primary key present, skipping");
                        }
                        return Ok(pk);
                    }
                    // Absent: the caller asserts it knows the destination
                    // identity, so insert with the explicit key.
                    return self.insert_row(meta, &bound, Some(pk));
                }
            }
        }

        // Terminal fallback: unconditional insert, keeping an explicit
        // primary key when the caller supplied one.
        self.insert_row(meta, &bound, pk_value)
    }

    /// Split a record's non-key fields into destination columns, recursively
    /// persisting nested records into foreign-key values.
    fn bind_columns(&self, record: &Record, meta: &TypeMeta, depth: usize) -> Result<Vec<BoundColumn>> {
        let mut bound = Vec::with_capacity(meta.record_type.fields.len());
        for fdef in &meta.record_type.fields {
            if Some(fdef.name) == meta.primary_key {
                continue;
            }
            let value = record.get(fdef.name);
            if meta.foreign_keys.contains(&fdef.name) {
                let resolved = match value {
                    Value::Record(nested) => SqlValue::Integer(self.persist_at(nested, depth + 1)?),
                    Value::Null => SqlValue::Null,
                    // Already-resolved key, e.g. an edge between rows
                    // persisted earlier in the same pass
                    Value::Integer(key) => SqlValue::Integer(*key),
                    other => {
                        return Err(Error::Conversion(format!(
                            "reference field {}.{} holds a non-record value {other:?}",
                            record.type_name(),
                            fdef.name
                        )));
                    }
                };
                bound.push(BoundColumn {
                    field: fdef.name,
                    column: meta.column_for(fdef.name),
                    value: resolved,
                });
            } else {
                bound.push(BoundColumn {
                    field: fdef.name,
                    column: fdef.name.to_string(),
                    value: convert::to_sql(value)?,
                });
            }
        }
        Ok(bound)
    }

    /// Look up the row matching the record's alternate-key field set,
    /// returning its primary key (rowid for types without one)
    fn find_by_alternate_key(&self, meta: &TypeMeta, bound: &[BoundColumn]) -> Result<Option<i64>> {
        let key_expr = meta.primary_key.unwrap_or("rowid");
        let alt: Vec<&BoundColumn> = bound
            .iter()
            .filter(|b| meta.alternate_key.contains(&b.field))
            .collect();

        // `IS` rather than `=` so a NULL alternate-key component still matches
        let predicate = alt
            .iter()
            .map(|b| format!("{} IS ?", b.column))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT {key_expr} FROM {} WHERE {predicate}",
            meta.table_name
        );

        let existing = self
            .conn
            .query_row(&sql, params_from_iter(alt.iter().map(|b| &b.value)), |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(existing)
    }

    fn insert_row(&self, meta: &TypeMeta, bound: &[BoundColumn], explicit_pk: Option<i64>) -> Result<i64> {
        let mut columns: Vec<&str> = bound.iter().map(|b| b.column.as_str()).collect();
        let mut values: Vec<&SqlValue> = bound.iter().map(|b| &b.value).collect();

        let pk_sql;
        if let (Some(pk_field), Some(pk)) = (meta.primary_key, explicit_pk) {
            pk_sql = SqlValue::Integer(pk);
            columns.push(pk_field);
            values.push(&pk_sql);
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", meta.table_name)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                meta.table_name,
                columns.join(", "),
                vec!["?"; columns.len()].join(", "),
            )
        };
        self.conn.execute(&sql, params_from_iter(values))?;

        let key = explicit_pk.unwrap_or_else(|| self.conn.last_insert_rowid());
        if let Some(pk_field) = meta.primary_key {
            self.exists.record_present(&meta.table_name, pk_field, key);
        }
        debug!(table = %meta.table_name, key, "inserted row");
        Ok(key)
    }

    fn update_row(&self, meta: &TypeMeta, bound: &[&BoundColumn], key: i64) -> Result<()> {
        if bound.is_empty() {
            return Ok(());
        }
        let key_expr = meta.primary_key.unwrap_or("rowid");
        let assignments = bound
            .iter()
            .map(|b| format!("{} = ?", b.column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {key_expr} = ?",
            meta.table_name
        );

        let key_sql = SqlValue::Integer(key);
        let params = bound
            .iter()
            .map(|b| &b.value)
            .chain(std::iter::once(&key_sql));
        self.conn.execute(&sql, params_from_iter(params))?;
        debug!(table = %meta.table_name, key, "updated row");
        Ok(())
    }

    // ========== Read path ==========

    /// Load a record by primary key, recursively materializing foreign-key
    /// columns into nested records. `Ok(None)` when no row matches.
    pub fn get(&self, type_name: &str, key: i64) -> Result<Option<Record>> {
        let meta = self.registry.meta(type_name)?;
        let pk_field = meta.primary_key.ok_or_else(|| {
            Error::Config(format!("type {type_name} has no primary key; cannot get by key"))
        })?;

        let columns: Vec<String> = meta
            .record_type
            .fields
            .iter()
            .map(|f| meta.column_for(f.name))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {pk_field} = ?",
            columns.join(", "),
            meta.table_name
        );

        let row: Option<Vec<SqlValue>> = self
            .conn
            .query_row(&sql, [key], |row| {
                (0..columns.len()).map(|i| row.get(i)).collect()
            })
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = Record::new(meta.record_type.name);
        for (fdef, value) in meta.record_type.fields.iter().zip(row) {
            if meta.foreign_keys.contains(&fdef.name) {
                let nested = match value {
                    SqlValue::Null => Value::Null,
                    SqlValue::Integer(fk) => {
                        let ref_type = meta.referenced_type(fdef.name).ok_or_else(|| {
                            Error::Config(format!(
                                "foreign-key field {}.{} references no record type",
                                type_name, fdef.name
                            ))
                        })?;
                        match self.get(ref_type, fk)? {
                            Some(inner) => Value::from(inner),
                            None => Value::Null,
                        }
                    }
                    other => {
                        return Err(Error::Conversion(format!(
                            "foreign-key column {}.{} holds non-integer {other:?}",
                            meta.table_name,
                            meta.column_for(fdef.name)
                        )));
                    }
                };
                record = record.with(fdef.name, nested);
            } else {
                record = record.with(fdef.name, convert::from_sql(value, &fdef.kind)?);
            }
        }
        Ok(Some(record))
    }

    /// Row counts for every registered table
    pub fn stats(&self) -> Result<DbStats> {
        let mut tables: Vec<(String, i64)> = Vec::new();
        for meta in self.registry.types() {
            let count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", meta.table_name),
                [],
                |row| row.get(0),
            )?;
            tables.push((meta.table_name.clone(), count));
        }
        tables.sort();
        Ok(DbStats { tables })
    }
}

fn primary_key_value(record: &Record, meta: &TypeMeta) -> Result<Option<i64>> {
    let Some(pk_field) = meta.primary_key else {
        return Ok(None);
    };
    match record.get(pk_field) {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(*n)),
        other => Err(Error::Conversion(format!(
            "primary key {}.{pk_field} must be an integer, got {other:?}",
            record.type_name()
        ))),
    }
}

/// Row counts per table
#[derive(Debug, Clone)]
pub struct DbStats {
    pub tables: Vec<(String, i64)>,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (table, count) in &self.tables {
            writeln!(f, "  {table}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::model;
    use crate::record::{FieldKind, RecordType};
    use crate::registry::RegisterOptions;
    use chrono::NaiveDate;

    fn genealogy_db() -> Db {
        let db = Db::open_in_memory(model::genealogy_registry().unwrap()).unwrap();
        db.init_schema(&schema::all_schema_statements()).unwrap();
        db
    }

    fn person_db() -> Db {
        let mut registry = Registry::new();
        registry
            .register(
                RecordType::new("Person")
                    .field("person_id", FieldKind::Integer)
                    .field("person_name", FieldKind::Text),
                RegisterOptions::default(),
            )
            .unwrap();
        let db = Db::open_in_memory(registry).unwrap();
        db.init_schema(&["CREATE TABLE person (person_id INTEGER PRIMARY KEY, person_name TEXT)"])
            .unwrap();
        db
    }

    fn person(id: Option<i64>, name: &str) -> Record {
        Record::new("Person")
            .with("person_id", id)
            .with("person_name", name)
    }

    #[test]
    fn test_persist_is_idempotent_with_update_semantics() {
        let db = person_db();

        let first = db.persist(&person(Some(5), "Emmy")).unwrap();
        let second = db.persist(&person(Some(5), "Emmy Noether")).unwrap();
        assert_eq!(first, 5);
        assert_eq!(second, 5);

        let row = db.get("Person", 5).unwrap().unwrap();
        assert_eq!(row.get("person_name").as_text(), Some("Emmy Noether"));
        assert_eq!(db.stats().unwrap().tables, vec![("person".to_string(), 1)]);
    }

    #[test]
    fn test_store_assigns_identity_when_pk_unset() {
        let db = person_db();
        let key = db.persist(&person(None, "Hilbert")).unwrap();
        assert!(key > 0);
        let row = db.get("Person", key).unwrap().unwrap();
        assert_eq!(row.get("person_id").as_integer(), Some(key));
    }

    #[test]
    fn test_dependency_ordering_and_round_trip() {
        let db = genealogy_db();

        let record = model::university("Universität Göttingen", Some(model::country("Germany")));
        let key = db.persist(&record).unwrap();

        let loaded = db.get("University", key).unwrap().unwrap();
        assert_eq!(
            loaded.get("university_name").as_text(),
            Some("Universität Göttingen")
        );

        // The nested country exists as its own row and the foreign key
        // points at it
        let country = loaded.get("country").as_record().unwrap();
        let country_key = country.get("country_id").as_integer().unwrap();
        let direct = db.get("Country", country_key).unwrap().unwrap();
        assert_eq!(direct.get("country_name").as_text(), Some("Germany"));
    }

    #[test]
    fn test_alternate_key_ignore_deduplicates() {
        let db = genealogy_db();

        let first = db.persist(&model::country("France")).unwrap();
        let second = db.persist(&model::country("France")).unwrap();
        assert_eq!(first, second);

        let stats = db.stats().unwrap();
        let countries = stats.tables.iter().find(|(t, _)| t == "country").unwrap();
        assert_eq!(countries.1, 1);
    }

    #[test]
    fn test_no_pk_policy_always_inserts() {
        let db = genealogy_db();

        let diss = model::dissertation(Some("Disquisitiones"), Some(1799), None, None);
        let first = db.persist(&diss).unwrap();
        let second = db.persist(&diss).unwrap();
        assert_ne!(first, second);

        let stats = db.stats().unwrap();
        let rows = stats.tables.iter().find(|(t, _)| t == "dissertation").unwrap();
        assert_eq!(rows.1, 2);
    }

    #[test]
    fn test_pk_ignore_leaves_original_row() {
        let db = genealogy_db();

        db.persist(&model::mathematician(1, Some("Gauss"), None)).unwrap();
        let key = db.persist(&model::mathematician(1, Some("Changed"), None)).unwrap();
        assert_eq!(key, 1);

        let row = db.get("Mathematician", 1).unwrap().unwrap();
        assert_eq!(row.get("mathematician_name").as_text(), Some("Gauss"));
    }

    #[test]
    fn test_alternate_key_update_rewrites_non_key_columns() {
        let db = genealogy_db();

        let ts1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let ts2 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();

        let first = db
            .persist(&model::webpage("genealogy.math.ndsu.nodak.edu", "/id.php", "id=18231", Some(ts1)))
            .unwrap();
        let second = db
            .persist(&model::webpage("genealogy.math.ndsu.nodak.edu", "/id.php", "id=18231", Some(ts2)))
            .unwrap();
        assert_eq!(first, second);

        let row = db.get("Webpage", first).unwrap().unwrap();
        assert_eq!(row.get("timestamp"), &Value::Timestamp(ts2));

        let stats = db.stats().unwrap();
        let pages = stats.tables.iter().find(|(t, _)| t == "webpage").unwrap();
        assert_eq!(pages.1, 1);
    }

    #[test]
    fn test_pre_resolved_reference_keys() {
        let db = genealogy_db();

        db.persist(&model::mathematician(10, Some("Advisor"), None)).unwrap();
        db.persist(&model::mathematician(11, Some("Student"), None)).unwrap();

        let edge = model::advisor_relationship(10, 11, None);
        let first = db.persist(&edge).unwrap();
        let second = db.persist(&edge).unwrap();
        assert_eq!(first, second);

        let stats = db.stats().unwrap();
        let edges = stats
            .tables
            .iter()
            .find(|(t, _)| t == "advisor_relationship")
            .unwrap();
        assert_eq!(edges.1, 1);
    }

    #[test]
    fn test_get_missing_row_is_not_found() {
        let db = genealogy_db();
        assert!(db.get("Mathematician", 999).unwrap().is_none());
    }

    #[test]
    fn test_readonly_rejects_persist() {
        let db = genealogy_db().read_only();
        let err = db.persist(&model::country("France")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unregistered_type_is_an_error() {
        let db = genealogy_db();
        let err = db.persist(&Record::new("Ghost")).unwrap_err();
        assert!(matches!(err, Error::Unregistered(_)));
    }

    #[test]
    fn test_depth_guard_rejects_runaway_nesting() {
        let mut registry = Registry::new();
        registry
            .register(
                RecordType::new("Node")
                    .field("node_id", FieldKind::Integer)
                    .field("parent", FieldKind::Reference("Node")),
                RegisterOptions::default(),
            )
            .unwrap();
        let db = Db::open_in_memory(registry).unwrap();
        db.init_schema(&["CREATE TABLE node (node_id INTEGER PRIMARY KEY, parent_id INTEGER)"])
            .unwrap();

        let mut chain = Record::new("Node").with("node_id", Value::Null);
        for _ in 0..40 {
            chain = Record::new("Node")
                .with("node_id", Value::Null)
                .with("parent", chain);
        }
        let err = db.persist(&chain).unwrap_err();
        assert!(matches!(err, Error::DepthExceeded(_)));
    }

    #[test]
    fn test_exists_cache_is_monotonic() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (k INTEGER PRIMARY KEY)", []).unwrap();
        conn.execute("INSERT INTO t (k) VALUES (1)", []).unwrap();

        let cache = ExistsCache::default();
        assert!(cache.check(&conn, "t", "k", 1).unwrap());

        // An out-of-band delete must not flip the answer within this process
        conn.execute("DELETE FROM t WHERE k = 1", []).unwrap();
        assert!(cache.check(&conn, "t", "k", 1).unwrap());
    }

    #[test]
    fn test_exists_cache_population_on_insert() {
        let db = person_db();
        db.persist(&person(Some(7), "Kovalevskaya")).unwrap();

        // The insert populated the cache, so a second persist of the same key
        // takes the update path without duplicating the row
        db.persist(&person(Some(7), "Sofia Kovalevskaya")).unwrap();
        assert_eq!(db.stats().unwrap().tables, vec![("person".to_string(), 1)]);
    }
}
