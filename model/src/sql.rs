//! Instantiation of the data model for a relational database (specifically PostgreSQL).

mod data_source;
pub mod db;

#[cfg(any(test, feature = "testing"))]
pub use data_source::MockDataSource;
pub use data_source::{PostgresDataSource, SqlDataSource};
