//! Interface provided by a backend data source consumed by the GraphQL schema.
//!
//! The entrypoint is [`DataSource`], which describes the interface by which the GraphQL API
//! interacts with the backend data provider. This is the glue between the GraphQL and SQL models:
//! the SQL model implements [`DataSource`] (see [`SqlDataSource`](crate::sql::SqlDataSource)) and
//! the GraphQL layer interacts with the SQL layer exclusively through this trait.

use crate::schema::{User, UserCreateInput};
use async_trait::async_trait;
use snafu::Snafu;
use std::fmt::Display;
use std::sync::Arc;

/// Errors reported while attempting to load or store data.
#[derive(Clone, Debug, Snafu)]
pub enum Error {
    /// The underlying database reported an error.
    #[snafu(display("{message}"))]
    Sql { message: String },
    /// A row could not be converted into a GraphQL object.
    #[snafu(display("cannot decode column {column}: {message}"))]
    Decode { column: String, message: String },
}

impl Error {
    /// Wrap an error from the underlying database.
    pub fn sql(err: impl Display) -> Self {
        Self::Sql {
            message: err.to_string(),
        }
    }

    /// A value in `column` could not be decoded.
    pub fn decode(column: impl Into<String>, err: impl Display) -> Self {
        Self::Decode {
            column: column.into(),
            message: err.to_string(),
        }
    }
}

/// A source of [`User`] records which can be served by the GraphQL API.
///
/// No ordering is imposed on listings, and no constraint beyond the types is imposed on created
/// records: duplicate emails produce distinct users.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Every persisted user, in the data source's default order.
    async fn find_many(&self) -> Result<Vec<User>, Error>;

    /// The user with the given `id`, if there is one.
    async fn find_unique(&self, id: i32) -> Result<Option<User>, Error>;

    /// Persist a new user and return it, including its newly assigned `id`.
    async fn create(&self, data: UserCreateInput) -> Result<User, Error>;
}

/// A shared handle to the data source used by the GraphQL API.
pub type D = Arc<dyn DataSource>;
