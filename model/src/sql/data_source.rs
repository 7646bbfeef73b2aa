//! Instantiation of a [`DataSource`] for a SQL database.

use super::db::{self, Insert, Row, SchemaColumn, SelectExt, Type, Value};
use crate::{
    backend::{DataSource, Error},
    schema::{User, UserCreateInput},
};
use async_trait::async_trait;
use derive_more::From;

/// The table holding [`User`] records.
const USERS: &str = "users";

const USER_COLUMNS: [SchemaColumn<'static>; 2] = [
    SchemaColumn::new("id", Type::Serial),
    SchemaColumn::new("email", Type::Text),
];

/// A data source for the user API implemented using a PostgreSQL database.
pub type PostgresDataSource = SqlDataSource<db::postgres::Connection>;

/// A data source for the user API implemented using an in-memory database.
#[cfg(any(test, feature = "testing"))]
pub type MockDataSource = SqlDataSource<db::mock::Connection>;

/// A data source for the user API implemented using a SQL database.
#[derive(Clone, Debug, From)]
pub struct SqlDataSource<Db>(Db);

impl<Db: db::Connection> SqlDataSource<Db> {
    /// The underlying database connection.
    pub fn connection(&self) -> &Db {
        &self.0
    }

    /// Create the tables backing this data source, if they do not already exist.
    pub async fn register(&self) -> Result<(), Error> {
        self.0
            .create_table(USERS, &USER_COLUMNS)
            .await
            .map_err(Error::sql)
    }
}

#[cfg(any(test, feature = "testing"))]
impl MockDataSource {
    /// A data source backed by a fresh, empty in-memory database.
    pub async fn in_memory() -> Result<Self, Error> {
        let users = Self::from(db::mock::Connection::create());
        users.register().await?;
        Ok(users)
    }
}

#[async_trait]
impl<Db: 'static + db::Connection> DataSource for SqlDataSource<Db> {
    async fn find_many(&self) -> Result<Vec<User>, Error> {
        let rows = self.0.select(USERS).many().await.map_err(Error::sql)?;
        rows.iter().map(parse_row).collect()
    }

    async fn find_unique(&self, id: i32) -> Result<Option<User>, Error> {
        let row = self
            .0
            .select(USERS)
            .filter("id", "=", Value::Int4(id))
            .opt()
            .await
            .map_err(Error::sql)?;
        row.as_ref().map(parse_row).transpose()
    }

    async fn create(&self, data: UserCreateInput) -> Result<User, Error> {
        let mut rows = self
            .0
            .insert(USERS, &["email"])
            .rows([vec![Value::Text(data.email)]])
            .execute()
            .await
            .map_err(Error::sql)?;
        let row = rows
            .pop()
            .ok_or_else(|| Error::sql("insert did not return the new row"))?;
        parse_row(&row)
    }
}

fn parse_row<R: Row>(row: &R) -> Result<User, Error> {
    Ok(User {
        id: int_column(row, "id")?,
        email: text_column(row, "email")?,
    })
}

fn int_column<R: Row>(row: &R, column: &str) -> Result<i32, Error> {
    match row.column(column).map_err(Error::sql)? {
        Value::Int4(x) => Ok(x),
        value => Err(Error::decode(
            column,
            format!("expected an integer, got {}", value.ty()),
        )),
    }
}

fn text_column<R: Row>(row: &R, column: &str) -> Result<String, Error> {
    match row.column(column).map_err(Error::sql)? {
        Value::Text(x) => Ok(x),
        value => Err(Error::decode(
            column,
            format!("expected text, got {}", value.ty()),
        )),
    }
}
