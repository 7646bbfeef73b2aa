//! Abstract interface to a SQL database.

use async_trait::async_trait;
use derive_more::From;
use futures::{Stream, StreamExt, TryStreamExt};
use std::fmt::Display;

#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod postgres;

/// Errors returned by the database.
pub trait Error: Sized + Send + Sync + std::error::Error + 'static {
    /// Wrap a custom message into this error type.
    fn custom(msg: impl Display) -> Self;

    /// An error indicating that a query returned more than the `expected` number of rows.
    fn too_many_rows(expected: usize) -> Self {
        Self::custom(format!(
            "query result has more rows than the expected {expected}"
        ))
    }

    /// An error indicating that a query which was expected to return some rows did not.
    fn empty_rows() -> Self {
        Self::custom("query result is empty")
    }
}

/// The type of a column in a table schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    /// A 4-byte signed integer assigned by the database from an increasing sequence.
    ///
    /// A serial column is the primary key of its table. It is filled in automatically when a row
    /// is inserted without a value for it.
    Serial,
    /// A text string.
    Text,
}

/// A column in a table schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaColumn<'a> {
    name: &'a str,
    ty: Type,
}

impl<'a> SchemaColumn<'a> {
    /// A column called `name` holding values of type `ty`.
    pub const fn new(name: &'a str, ty: Type) -> Self {
        Self { name, ty }
    }

    /// The name of this column.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The type of values in this column.
    pub fn ty(&self) -> Type {
        self.ty
    }
}

/// A connection to the database.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Errors returned from queries.
    type Error: Error;

    /// A `SELECT` query which can be executed against the database.
    type Select<'a>: Select<Error = Self::Error>
    where
        Self: 'a;

    /// An `INSERT` statement which can be executed against the database.
    type Insert<'a>: Insert<Error = Self::Error>
    where
        Self: 'a;

    /// Create a table with the given columns, if it does not already exist.
    async fn create_table(
        &self,
        table: &str,
        columns: &[SchemaColumn<'_>],
    ) -> Result<(), Self::Error>;

    /// Start a query of the form `SELECT * FROM table`.
    ///
    /// The query can be narrowed with a `WHERE` clause (see [`SelectExt::filter`]) before it is
    /// run.
    fn select<'a>(&'a self, table: &'a str) -> Self::Select<'a>;

    /// Start an `INSERT` query.
    ///
    /// `table` indicates the table to insert into and `columns` the names of the columns in that
    /// table into which values should be inserted. Columns which are not listed take their default
    /// values (for a [`Serial`](Type::Serial) column, the next value in its sequence).
    fn insert<'a>(&'a self, table: &'a str, columns: &[&str]) -> Self::Insert<'a>;
}

/// A primitive value supported by a SQL database.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub enum Value {
    /// A text string.
    Text(String),
    /// A 4-byte signed integer.
    Int4(i32),
}

impl Value {
    /// The SQL type of this value.
    pub fn ty(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Int4(_) => "int4",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

/// A clause modifying a SQL statement.
#[derive(Clone, Debug)]
pub enum Clause {
    /// A `WHERE` clause.
    Where {
        /// The column to filter.
        column: String,
        /// The operation used to filter values of `column`.
        op: String,
        /// Parameter to `op`.
        param: Value,
    },
}

/// A `SELECT` query which can be executed against the database.
pub trait Select: Send {
    /// Errors returned by this query.
    type Error: Error;
    /// Rows returned by this query.
    type Row: Row<Error = Self::Error>;
    /// An asynchronous stream of rows.
    type Stream: Stream<Item = Result<Self::Row, Self::Error>> + Unpin + Send;

    /// Add a clause to the query.
    fn clause(self, clause: Clause) -> Self;

    /// Run the query and get a stream of results.
    fn stream(self) -> Self::Stream;
}

/// An extension trait for [`Select`] that provides some higher-level functions.
#[async_trait]
pub trait SelectExt: Select {
    /// Add a `WHERE` clause to the query.
    fn filter(self, column: impl Into<String>, op: impl Into<String>, param: Value) -> Self;

    /// Run a query which is expected to return a single row.
    ///
    /// # Errors
    ///
    /// This method will fail if the query does not return exactly one row.
    async fn one(self) -> Result<Self::Row, Self::Error>;

    /// Run a query and collect the results.
    async fn many(self) -> Result<Vec<Self::Row>, Self::Error>;

    /// Run a query which is expected to return either 0 or 1 rows.
    ///
    /// # Errors
    ///
    /// This method will fail if the query does not return exactly 0 or 1 rows.
    async fn opt(self) -> Result<Option<Self::Row>, Self::Error>;
}

#[async_trait]
impl<T: Select> SelectExt for T {
    fn filter(self, column: impl Into<String>, op: impl Into<String>, param: Value) -> Self {
        self.clause(Clause::Where {
            column: column.into(),
            op: op.into(),
            param,
        })
    }

    async fn opt(self) -> Result<Option<Self::Row>, Self::Error> {
        let mut rows = self.stream();
        let Some(row) = rows.next().await else { return Ok(None); };
        if rows.next().await.is_some() {
            return Err(Self::Error::too_many_rows(1));
        }
        row.map(Some)
    }

    async fn one(self) -> Result<Self::Row, Self::Error> {
        self.opt().await?.ok_or_else(Self::Error::empty_rows)
    }

    async fn many(self) -> Result<Vec<Self::Row>, Self::Error> {
        self.stream().try_collect().await
    }
}

/// An `INSERT` statement which can be executed against the database.
#[async_trait]
pub trait Insert: Send {
    /// Errors returned by this statement.
    type Error: Error;
    /// Rows returned by this statement.
    type Row: Row<Error = Self::Error>;

    /// Add rows to insert.
    ///
    /// Each row must have one value for each of the columns named when the statement was created,
    /// in the same order.
    fn rows<R>(self, rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<Value>>;

    /// Do the insertion.
    ///
    /// This will execute a statement of the form
    /// `INSERT INTO table (columns) VALUES (rows) RETURNING *` and return the inserted rows,
    /// including any values filled in by the database.
    ///
    /// # Errors
    ///
    /// This method will fail if any of the rows has the wrong number of values, or if any of the
    /// items in `rows` conflict with an existing row in `table` at a column which is defined as a
    /// unique or primary key.
    async fn execute(self) -> Result<Vec<Self::Row>, Self::Error>;
}

/// A row in a database table.
pub trait Row: Sized + Send {
    /// Errors returned by row operations.
    type Error: Error;

    /// Get the value of `column` in this row.
    ///
    /// # Errors
    ///
    /// This method will fail if the specified column does not exist.
    fn column(&self, column: &str) -> Result<Value, Self::Error>;
}
