//! An in-memory instantiation of the abstract [`db`](super) interface.
//!
//! Tables live in process memory and vanish with the [`Connection`]. It is useful for testing in
//! isolation from an actual database. The database can also be made to fail every operation (see
//! [`Connection::set_unavailable`]) to simulate a lost connection.

use super::{Clause, SchemaColumn, Type, Value};
use async_std::sync::{Arc, RwLock};
use async_trait::async_trait;
use derive_more::From;
use futures::{
    stream::{self, BoxStream},
    StreamExt, TryFutureExt,
};
use snafu::Snafu;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt::Display;

/// Errors returned by the in-memory database.
#[derive(Debug, Snafu, From)]
#[snafu(display("mock DB error: {}", message))]
pub struct Error {
    message: String,
}

impl super::Error for Error {
    fn custom(msg: impl Display) -> Self {
        Self {
            message: msg.to_string(),
        }
    }
}

/// The in-memory database.
#[derive(Debug, Default)]
struct Db {
    tables: HashMap<String, Table>,
    unavailable: bool,
}

impl Db {
    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable {
            Err(Error::from("database unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// An in-memory table.
#[derive(Debug)]
struct Table {
    schema: Vec<String>,
    /// The serial column, if there is one, and the next value in its sequence.
    serial: Option<(String, i32)>,
    rows: Vec<Row>,
}

impl Table {
    fn new(schema: &[SchemaColumn<'_>]) -> Self {
        Self {
            schema: schema.iter().map(|col| col.name().to_string()).collect(),
            serial: schema
                .iter()
                .find(|col| col.ty() == Type::Serial)
                .map(|col| (col.name().to_string(), 1)),
            rows: vec![],
        }
    }

    /// Append rows whose values are given in the order of `columns`.
    ///
    /// The rows are checked in full before any of them is appended, so a failed insert leaves the
    /// table unchanged.
    fn append(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> Result<Vec<Row>, Error> {
        for name in columns {
            if !self.schema.contains(name) {
                return Err(Error::from(format!("table {table} has no column {name}")));
            }
        }
        for name in &self.schema {
            let defaulted = matches!(&self.serial, Some((serial, _)) if serial == name);
            if !defaulted && !columns.contains(name) {
                return Err(Error::from(format!(
                    "no value for column {name} in table {table}"
                )));
            }
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(Error::from(format!(
                    "incorrect width for table {table} (found {}, expected {})",
                    row.len(),
                    columns.len()
                )));
            }
        }

        let mut inserted = Vec::with_capacity(rows.len());
        for values in rows {
            let mut row = Row::new(columns.iter().cloned().zip(values));
            if let Some((serial, next)) = &mut self.serial {
                if let Entry::Vacant(e) = row.columns.entry(serial.clone()) {
                    e.insert(Value::Int4(*next));
                    *next += 1;
                }
            }
            self.rows.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }
}

/// A connection to the in-memory database.
#[derive(Clone, Debug)]
pub struct Connection(Arc<RwLock<Db>>);

impl Connection {
    /// Create a new database and connect to it.
    ///
    /// This will create a connection to a fresh, empty database. It will not be connected or
    /// related to any previous connection or database. Once the database is created, this
    /// connection can be [cloned](Clone) in order to create multiple simultaneous connections to
    /// the same database.
    pub fn create() -> Self {
        Self(Default::default())
    }

    /// Make every subsequent operation on this database fail, or succeed again.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.0.write().await.unavailable = unavailable;
    }

    /// The number of rows in `table`.
    pub async fn count(&self, table: &str) -> Result<usize, Error> {
        let db = self.0.read().await;
        db.tables
            .get(table)
            .map(|table| table.rows.len())
            .ok_or_else(|| Error::from(format!("no such table {table}")))
    }
}

#[async_trait]
impl super::Connection for Connection {
    type Error = Error;
    type Select<'a> = Select<'a>;
    type Insert<'a> = Insert<'a>;

    async fn create_table(
        &self,
        table: &str,
        columns: &[SchemaColumn<'_>],
    ) -> Result<(), Self::Error> {
        let mut db = self.0.write().await;
        db.check_available()?;
        if let Entry::Vacant(e) = db.tables.entry(table.to_string()) {
            e.insert(Table::new(columns));
        }
        Ok(())
    }

    fn select<'a>(&'a self, table: &'a str) -> Self::Select<'a> {
        Select {
            db: &self.0,
            table,
            clauses: vec![],
        }
    }

    fn insert<'a>(&'a self, table: &'a str, columns: &[&str]) -> Self::Insert<'a> {
        Insert {
            db: &self.0,
            table,
            columns: columns.iter().map(|col| col.to_string()).collect(),
            rows: vec![],
        }
    }
}

/// A query against an in-memory database.
pub struct Select<'a> {
    db: &'a RwLock<Db>,
    table: &'a str,
    clauses: Vec<Clause>,
}

impl<'a> super::Select for Select<'a> {
    type Error = Error;
    type Row = Row;
    type Stream = BoxStream<'a, Result<Self::Row, Self::Error>>;

    fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    fn stream(self) -> Self::Stream {
        async move {
            let db = self.db.read().await;
            db.check_available()?;
            let table = db
                .tables
                .get(self.table)
                .ok_or_else(|| Error::from(format!("no such table {}", self.table)))?;
            let rows = table
                .rows
                .clone()
                .into_iter()
                .filter(move |row| self.clauses.iter().all(|clause| row.test(clause)))
                .map(Ok);
            Ok(stream::iter(rows))
        }
        .try_flatten_stream()
        .boxed()
    }
}

/// An insert statement for an in-memory database.
pub struct Insert<'a> {
    db: &'a RwLock<Db>,
    table: &'a str,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl<'a> super::Insert for Insert<'a> {
    type Error = Error;
    type Row = Row;

    fn rows<R>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        self.rows.extend(rows);
        self
    }

    async fn execute(self) -> Result<Vec<Row>, Error> {
        let mut db = self.db.write().await;
        db.check_available()?;
        let table = db
            .tables
            .get_mut(self.table)
            .ok_or_else(|| Error::from(format!("no such table {}", self.table)))?;
        table.append(self.table, &self.columns, self.rows)
    }
}

/// A row in an in-memory table.
#[derive(Clone, Debug, Default)]
pub struct Row {
    columns: HashMap<String, Value>,
}

fn compare_ints(l: &Value, op: &str, r: &Value) -> bool {
    let (Value::Int4(l), Value::Int4(r)) = (l, r) else {
        panic!("type mismatch for op {op}: {l:?}, {r:?}");
    };
    match op {
        ">" => l > r,
        ">=" => l >= r,
        "<" => l < r,
        "<=" => l <= r,
        op => panic!("unsupported int op {op}"),
    }
}

impl Row {
    /// Create a row with the given entries.
    fn new(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            columns: entries.into_iter().collect(),
        }
    }

    /// Test if this row should be included based on the given [`Clause`].
    fn test(&self, clause: &Clause) -> bool {
        match clause {
            Clause::Where { column, op, param } => {
                if let Some(col) = self.columns.get(column) {
                    match op.as_str() {
                        "=" => col == param,
                        "!=" => col != param,
                        int_op => compare_ints(col, int_op, param),
                    }
                } else {
                    true
                }
            }
        }
    }
}

impl super::Row for Row {
    type Error = Error;

    fn column(&self, column: &str) -> Result<Value, Self::Error> {
        self.columns
            .get(column)
            .cloned()
            .ok_or_else(|| format!("no such column {column}").into())
    }
}
