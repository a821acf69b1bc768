use sea_orm::Database;
use sea_orm_migration::prelude::*;

const DEFAULT_DATABASE_URL: &str = "sqlite:./quickledger.db?mode=rwc";

/// `migration [up|down|fresh|status] [database url]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "up".to_string());
    let database_url = args
        .next()
        .or_else(|| std::env::var("QUICKLEDGER_DATABASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    let db = Database::connect(&database_url).await?;

    match command.as_str() {
        "up" => migration::Migrator::up(&db, None).await?,
        "down" => migration::Migrator::down(&db, Some(1)).await?,
        "fresh" => migration::Migrator::fresh(&db).await?,
        "status" => migration::Migrator::status(&db).await?,
        other => {
            eprintln!("unknown command '{other}'");
            eprintln!("Usage: migration [up|down|fresh|status] [database url]");
            std::process::exit(2);
        }
    }

    Ok(())
}
