use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use engine::{Engine, EngineSettings, LedgerId, MemoryStore, SqlStore};
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod console;
mod settings;

type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "quickledger")]
#[command(about = "Quick-entry bookkeeping for chat: 午餐120現金 and done")]
struct Cli {
    /// Settings file (also read from `QUICKLEDGER_CONFIG`).
    #[arg(
        long,
        short,
        env = "QUICKLEDGER_CONFIG",
        default_value = "config/settings.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Telegram bot (default).
    Run,
    /// Read entries from stdin and print the replies.
    Console(ConsoleArgs),
}

#[derive(Args, Debug)]
struct ConsoleArgs {
    /// Ledger to write into.
    #[arg(long, default_value = "console")]
    ledger: String,
    /// Keep everything in memory and ignore the configured database.
    #[arg(long)]
    scratch: bool,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(&cli.config)?;

    // stdout belongs to the console replies.
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "quickledger={level},telegram_bot={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let Some(telegram) = settings.telegram else {
                return Err("missing [telegram] settings".into());
            };
            tracing::info!("Found telegram settings...");
            let engine = sql_engine(&settings.database, settings.engine).await?;
            let bot = telegram_bot::Bot::builder()
                .token(&telegram.token)
                .allowed_users(&telegram.allowed_users)
                .engine(Arc::new(engine))
                .build()?;
            bot.run().await;
        }
        Command::Console(args) => {
            let ledger = LedgerId::new(args.ledger);
            if args.scratch {
                let engine = Engine::builder(MemoryStore::new())
                    .settings(settings.engine)
                    .build()?;
                console::run(engine, ledger).await?;
            } else {
                let engine = sql_engine(&settings.database, settings.engine).await?;
                console::run(engine, ledger).await?;
            }
        }
    }

    Ok(())
}

async fn sql_engine(database: &Database, settings: EngineSettings) -> AppResult<Engine<SqlStore>> {
    let db = parse_database(database).await?;
    Ok(Engine::builder(SqlStore::new(db)).settings(settings).build()?)
}

async fn parse_database(config: &Database) -> AppResult<sea_orm::DatabaseConnection> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
