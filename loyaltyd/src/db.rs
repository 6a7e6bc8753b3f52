//! Database CLI subcommands for loyaltyd.
//!
//! Provides `db migrate` and `db status` commands.

use anyhow::{anyhow, Result};
use std::env;

use loyalty_db::{migrate, status};

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `loyaltyd db migrate` - Run pending migrations
/// - `loyaltyd db status` - Check connectivity and migration status
pub async fn run_db_command(args: &[String]) -> Result<()> {
    if args.len() < 3 {
        return Err(anyhow!("Usage: loyaltyd db <migrate|status>"));
    }

    let database_url = env::var("DATABASE_URI")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow!("DATABASE_URI environment variable is required for db commands"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;

    match args[2].as_str() {
        "migrate" => {
            migrate(&pool).await?;
        },
        "status" => {
            status(&pool).await?;
        },
        other => {
            return Err(anyhow!("Unknown db command: {}. Use migrate or status", other));
        },
    }

    Ok(())
}
