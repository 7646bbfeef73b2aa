//! The Postgres database used by the user API.

use crate::sql::{db::postgres, PostgresDataSource};
use anyhow::Error;
use clap::Args;
use url::Url;

/// Database connection options.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// URL for connecting to the Postgres database.
    #[clap(long, env = "USER_API_DB_URL", default_value = "http://localhost:5432")]
    pub db_url: Url,

    /// User as which to connect to the database.
    #[clap(long, env = "USER_API_DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// Password for connecting to the Postgres database.
    #[clap(long, env = "USER_API_DB_PASSWORD", default_value = "password")]
    pub db_password: String,

    /// Name of the database to use.
    #[clap(long, env = "USER_API_DB_NAME", default_value = "postgres")]
    pub db_name: String,
}

impl Options {
    /// Connect to the databse.
    pub async fn connect(&self) -> Result<Connection, Error> {
        let mut config = postgres::Config::default();
        let host = self
            .db_url
            .host()
            .ok_or_else(|| Error::msg(format!("URL {} has no hostname", self.db_url)))?
            .to_string();
        config
            .user(&self.db_user)
            .password(&self.db_password)
            .dbname(&self.db_name)
            .host(&host);
        if let Some(port) = self.db_url.port() {
            config.port(port);
        }
        tracing::info!(%host, db = %self.db_name, "connecting to database");
        Ok(postgres::Connection::new(config).await?.into())
    }
}

/// A connection to the database.
pub type Connection = PostgresDataSource;

/// Perform one-time setup of the database.
///
/// This creates the `users` table if it does not exist yet. It is safe to run against a database
/// which has already been set up.
pub async fn setup(conn: &Connection) -> Result<(), Error> {
    conn.register().await?;
    tracing::info!("database is set up");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        db: Options,
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["test"]);
        assert_eq!(cli.db.db_url.host_str(), Some("localhost"));
        assert_eq!(cli.db.db_url.port(), Some(5432));
        assert_eq!(cli.db.db_user, "postgres");
        assert_eq!(cli.db.db_name, "postgres");
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "test",
            "--db-url",
            "postgres://db.internal:6543",
            "--db-name",
            "users",
        ]);
        assert_eq!(cli.db.db_url.host_str(), Some("db.internal"));
        assert_eq!(cli.db.db_url.port(), Some(6543));
        assert_eq!(cli.db.db_name, "users");
    }
}
