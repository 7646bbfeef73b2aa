//! The [`db`](super) interface on top of a PostgreSQL server, via [`async-postgres`].

use super::{Clause, SchemaColumn, Value};
use async_std::task::spawn;
use async_trait::async_trait;
use bytes::BytesMut;
use derive_more::From;
use futures::{stream::BoxStream, StreamExt, TryFutureExt, TryStreamExt};
use itertools::Itertools;
use snafu::Snafu;
use std::fmt::Display;
use tokio_postgres::types::{accepts, to_sql_checked, FromSql, IsNull, ToSql, Type};

pub use async_postgres::{Config, Row};

/// Errors returned by a PostgreSQL database.
#[derive(Debug, Snafu, From)]
pub enum Error {
    #[from]
    #[snafu(display("{source}"))]
    Sql { source: async_postgres::Error },
    #[snafu(display("cannot connect to database: {source}"))]
    Connect { source: std::io::Error },
    #[snafu(display("unsupported column type {ty}"))]
    UnsupportedType { ty: Type },
    #[snafu(display("{message}"))]
    Custom { message: String },
}

impl super::Error for Error {
    fn custom(msg: impl Display) -> Self {
        Self::Custom {
            message: msg.to_string(),
        }
    }
}

/// A connection to a PostgreSQL database.
pub struct Connection(tokio_postgres::Client);

impl Connection {
    /// Connect to the server described by `config`.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let (client, conn) = async_postgres::connect(config)
            .await
            .map_err(|source| Error::Connect { source })?;
        spawn(conn);
        Ok(Self(client))
    }

    async fn query(
        &self,
        statement: String,
        params: &[Value],
    ) -> Result<BoxStream<'static, Result<Row, Error>>, Error> {
        tracing::info!(?params, "{statement}");
        let rows = self
            .0
            .query_raw(
                statement.as_str(),
                params.iter().map(|param| param as &dyn ToSql),
            )
            .await?;
        Ok(rows.map_err(Error::from).boxed())
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
        let columns = columns
            .iter()
            .map(|col| match col.ty() {
                super::Type::Serial => format!("{} serial PRIMARY KEY", col.name()),
                super::Type::Text => format!("{} text NOT NULL", col.name()),
            })
            .join(", ");
        self.query(format!("CREATE TABLE IF NOT EXISTS {table} ({columns})"), &[])
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    fn select<'a>(&'a self, table: &'a str) -> Self::Select<'a> {
        Select {
            conn: self,
            table,
            conditions: vec![],
            params: vec![],
        }
    }

    fn insert<'a>(&'a self, table: &'a str, columns: &[&str]) -> Self::Insert<'a> {
        Insert {
            conn: self,
            table,
            columns: columns.iter().map(|col| col.to_string()).collect(),
            rows: vec![],
        }
    }
}

/// A `SELECT * FROM table` query, with optional `WHERE` conditions.
pub struct Select<'a> {
    conn: &'a Connection,
    table: &'a str,
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl<'a> super::Select for Select<'a> {
    type Error = Error;
    type Row = Row;
    type Stream = BoxStream<'a, Result<Self::Row, Self::Error>>;

    fn clause(mut self, clause: Clause) -> Self {
        match clause {
            Clause::Where { column, op, param } => {
                self.params.push(param);
                self.conditions
                    .push(format!("{column} {op} ${}", self.params.len()));
            }
        }
        self
    }

    fn stream(self) -> Self::Stream {
        let mut statement = format!("SELECT * FROM {}", self.table);
        if !self.conditions.is_empty() {
            statement = format!("{statement} WHERE {}", self.conditions.iter().join(" AND "));
        }
        async move { self.conn.query(statement, &self.params).await }
            .try_flatten_stream()
            .boxed()
    }
}

/// An `INSERT ... RETURNING *` statement.
pub struct Insert<'a> {
    conn: &'a Connection,
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
        let width = self.columns.len();
        if let Some(row) = self.rows.iter().find(|row| row.len() != width) {
            return Err(super::Error::custom(format!(
                "incorrect width for table {} (found {}, expected {width})",
                self.table,
                row.len()
            )));
        }
        if self.rows.is_empty() {
            return Ok(vec![]);
        }

        // Values are always bound as parameters, numbered from 1 in row-major order.
        let values = (0..self.rows.len())
            .map(|i| format!("({})", (1..=width).map(|j| format!("${}", i * width + j)).join(", ")))
            .join(", ");
        let statement = format!(
            "INSERT INTO {} ({}) VALUES {values} RETURNING *",
            self.table,
            self.columns.join(", ")
        );
        let params = self.rows.into_iter().flatten().collect::<Vec<_>>();
        self.conn.query(statement, &params).await?.try_collect().await
    }
}

impl super::Row for Row {
    type Error = Error;

    fn column(&self, column: &str) -> Result<Value, Self::Error> {
        Ok(self.try_get(column)?)
    }
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync + 'static>> {
        match self {
            Self::Text(x) => x.to_sql(ty, out),
            Self::Int4(x) => x.to_sql(ty, out),
        }
    }

    accepts!(INT4, TEXT);
    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync + 'static>> {
        match *ty {
            Type::INT4 => Ok(Self::Int4(i32::from_sql(ty, raw)?)),
            Type::TEXT => Ok(Self::Text(String::from_sql(ty, raw)?)),
            _ => Err(Box::new(Error::UnsupportedType { ty: ty.clone() })),
        }
    }

    accepts!(INT4, TEXT);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        backend::DataSource,
        init_logging,
        schema::{User, UserCreateInput},
        sql::SqlDataSource,
    };
    use rand::RngCore;
    use std::env;
    use std::process::Command;
    use std::str;

    struct Db {
        name: String,
        port: u16,
    }

    impl Db {
        fn create() -> Option<Self> {
            if env::var("POSTGRES_TESTS").is_err() {
                tracing::warn!("skipping postgres test since POSTGRES_TESTS are not enabled");
                return None;
            }

            let name = format!("db{}", rand::thread_rng().next_u64());
            let port = env::var("POSTGRES_TESTS_PORT")
                .map(|port| port.parse().unwrap())
                .unwrap_or(5432);

            tracing::info!("Creating test DB {name} on port {port}");
            let output = Command::new("createdb")
                .arg("-p")
                .arg(&port.to_string())
                .arg(&name)
                .output()
                .unwrap();
            if !output.status.success() {
                panic!(
                    "createdb failed: {}",
                    str::from_utf8(&output.stderr).unwrap()
                );
            }

            Some(Self { name, port })
        }

        async fn connect(&self) -> Connection {
            let mut config = Config::default();
            config
                .dbname(&self.name)
                .user("test")
                .host("localhost")
                .port(self.port);
            Connection::new(config).await.unwrap()
        }
    }

    impl Drop for Db {
        fn drop(&mut self) {
            tracing::info!("Dropping test DB {}", self.name);
            let output = Command::new("dropdb")
                .arg("-p")
                .arg(&self.port.to_string())
                .arg(&self.name)
                .output()
                .unwrap();
            if !output.status.success() {
                tracing::error!("dropdb failed: {}", str::from_utf8(&output.stderr).unwrap());
            }
        }
    }

    macro_rules! postgres_test {
        () => {
            match Db::create() {
                Some(db) => db,
                None => return,
            }
        };
    }

    #[async_std::test]
    async fn test_postgres_data_source() {
        init_logging();
        let db = postgres_test!();
        let users = SqlDataSource::from(db.connect().await);
        users.register().await.unwrap();
        // Registering again is a no-op.
        users.register().await.unwrap();

        assert_eq!(users.find_many().await.unwrap(), vec![]);

        let alice = users
            .create(UserCreateInput {
                email: "alice@example.com".into(),
            })
            .await
            .unwrap();
        let bob = users
            .create(UserCreateInput {
                email: "alice@example.com".into(),
            })
            .await
            .unwrap();
        assert_ne!(alice.id, bob.id);

        let mut all = users.find_many().await.unwrap();
        all.sort();
        let mut expected = vec![alice.clone(), bob];
        expected.sort();
        assert_eq!(all, expected);

        assert_eq!(users.find_unique(alice.id).await.unwrap(), Some(alice));
        assert_eq!(users.find_unique(-1).await.unwrap(), None::<User>);
    }
}
