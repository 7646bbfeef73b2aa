use clap::Parser;
use model::{backend::DataSource, db, init_logging};

/// Manage the user API database.
#[derive(Parser)]
enum Command {
    /// Perform one-time setup of the database.
    Init {
        #[clap(flatten)]
        db: db::Options,
    },
    /// List the users in the database.
    Users {
        #[clap(flatten)]
        db: db::Options,
    },
}

#[async_std::main]
async fn main() -> Result<(), anyhow::Error> {
    init_logging();

    match Command::parse() {
        Command::Init { db } => {
            let conn = db.connect().await?;
            db::setup(&conn).await?;
        }
        Command::Users { db } => {
            let conn = db.connect().await?;
            let users = conn.find_many().await?;
            tracing::info!("{} users", users.len());
            for user in users {
                println!("{}\t{}", user.id, user.email);
            }
        }
    }

    Ok(())
}
