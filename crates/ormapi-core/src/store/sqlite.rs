//! SQLite store backed by rusqlite.

use super::{ResourceStore, Row, StoreConfig};
use crate::catalog::SchemaRegistry;
use crate::error::Error;
use crate::sql::{ddl, CompiledSql, Dialect};
use ormapi_proto::Value;
use parking_lot::ReentrantMutex;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::cell::RefCell;
use tracing::{debug, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single SQLite connection behind a reentrant lock.
///
/// A transaction keeps the lock from `BEGIN` to `COMMIT`, so statements of the
/// transaction body run on the same thread while every other caller waits.
/// Array and object values are stored as JSON text, booleans as integers.
pub struct SqliteStore {
    session: ReentrantMutex<RefCell<Session>>,
}

struct Session {
    conn: Connection,
    // open transaction levels; anything above one is a savepoint
    depth: u32,
}

impl Session {
    fn open_level(&mut self) -> Result<u32, Error> {
        let level = self.depth;
        if level == 0 {
            self.conn.execute_batch("BEGIN")?;
        } else {
            self.conn.execute_batch(&format!("SAVEPOINT level_{}", level))?;
        }
        self.depth += 1;
        Ok(level)
    }

    fn close_level(&mut self, level: u32, commit: bool) -> Result<(), Error> {
        self.depth = level;
        let sql = match (level, commit) {
            (0, true) => "COMMIT".to_string(),
            (0, false) => "ROLLBACK".to_string(),
            (_, true) => format!("RELEASE level_{}", level),
            (_, false) => format!("ROLLBACK TO level_{0}; RELEASE level_{0}", level),
        };
        self.conn.execute_batch(&sql)?;
        Ok(())
    }
}

impl SqliteStore {
    /// Open a store from configuration.
    pub fn open(config: &StoreConfig) -> Result<Self, Error> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout)?;
        register_functions(&conn)?;
        info!(path = ?config.path, "sqlite store opened");
        Ok(Self {
            session: ReentrantMutex::new(RefCell::new(Session { conn, depth: 0 })),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Run raw SQL, possibly several statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        let guard = self.session.lock();
        let session = guard.borrow();
        session.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Create the tables of every registered type.
    pub fn create_schema(&self, registry: &SchemaRegistry) -> Result<(), Error> {
        for statement in ddl::create_tables(registry, Dialect::Sqlite)? {
            self.execute(&statement)?;
        }
        Ok(())
    }
}

fn register_functions(conn: &Connection) -> Result<(), Error> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex = ctx.get_or_create_aux(0, |raw| -> Result<Regex, BoxError> {
                Ok(Regex::new(raw.as_str()?)?)
            })?;
            let matched = match ctx.get_raw(1) {
                ValueRef::Null => false,
                ValueRef::Text(text) => regex.is_match(&String::from_utf8_lossy(text)),
                ValueRef::Integer(i) => regex.is_match(&i.to_string()),
                ValueRef::Real(f) => regex.is_match(&f.to_string()),
                ValueRef::Blob(_) => false,
            };
            Ok(matched)
        },
    )?;
    Ok(())
}

struct SqlParam<'a>(&'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Array(_) | Value::Object(_) => {
                ToSqlOutput::Owned(SqlValue::Text(self.0.to_json_string()))
            }
        })
    }
}

fn read_value(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

impl ResourceStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, statement: &CompiledSql) -> Result<Vec<Row>, Error> {
        debug!(sql = %statement.sql, params = statement.params.len(), "query");
        let guard = self.session.lock();
        let session = guard.borrow();
        let mut stmt = session.conn.prepare(&statement.sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(statement.params.iter().map(SqlParam)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), read_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn execute(&self, statement: &CompiledSql) -> Result<u64, Error> {
        debug!(sql = %statement.sql, params = statement.params.len(), "execute");
        let guard = self.session.lock();
        let session = guard.borrow();
        let affected = session.conn.execute(
            &statement.sql,
            params_from_iter(statement.params.iter().map(SqlParam)),
        )?;
        Ok(affected as u64)
    }

    fn transaction(&self, body: &mut dyn FnMut() -> Result<(), Error>) -> Result<(), Error> {
        let guard = self.session.lock();
        let level = guard.borrow_mut().open_level()?;
        let outcome = body();
        let mut session = guard.borrow_mut();
        match outcome {
            Ok(()) => {
                if let Err(err) = session.close_level(level, true) {
                    if let Err(rollback) = session.close_level(level, false) {
                        warn!(level, error = %rollback, "rollback after failed commit failed");
                    }
                    return Err(err);
                }
                debug!(level, "transaction committed");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = session.close_level(level, false) {
                    warn!(level, error = %rollback, "rollback failed");
                }
                debug!(level, error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}
