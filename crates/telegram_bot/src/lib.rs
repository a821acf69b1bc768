//! Telegram bot.
//!
//! The bot is a thin dispatcher: every text message and button press goes
//! through the engine and the engine's reply is sent back as is, with its
//! choices rendered as an inline keyboard.

use std::sync::Arc;

use engine::{Engine, SqlStore};
use teloxide::{dispatching::HandlerExt, prelude::*, utils::command::BotCommands};

mod commands;
mod handlers;
mod ui;

pub use commands::Command;

#[derive(Clone)]
pub struct ConfigParameters {
    allowed_users: Option<Vec<UserId>>,
    engine: Arc<Engine<SqlStore>>,
}

pub struct Bot {
    token: String,
    allowed_users: Option<Vec<UserId>>,
    engine: Arc<Engine<SqlStore>>,
}

impl Bot {
    pub fn new(
        token: &str,
        allowed_users: Option<Vec<UserId>>,
        engine: Arc<Engine<SqlStore>>,
    ) -> Result<Self, String> {
        if token.trim().is_empty() {
            return Err("telegram token is empty".to_string());
        }
        Ok(Self {
            token: token.to_string(),
            allowed_users,
            engine,
        })
    }

    pub fn builder() -> BotBuilder {
        BotBuilder::default()
    }

    pub async fn run(&self) {
        tracing::info!("Starting telegram bot...");

        let bot = teloxide::Bot::new(&self.token);
        if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
            tracing::warn!("failed to register bot commands: {err}");
        }

        let parameters = ConfigParameters {
            allowed_users: self.allowed_users.clone(),
            engine: Arc::clone(&self.engine),
        };

        let handler = dptree::entry()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(handlers::handle_command),
            )
            .branch(Update::filter_message().endpoint(handlers::handle_message))
            .branch(Update::filter_callback_query().endpoint(handlers::handle_callback));

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![parameters])
            .default_handler(|upd| async move {
                tracing::warn!("Unhandled update: {:?}", upd);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

#[derive(Default)]
pub struct BotBuilder {
    token: String,
    allowed_users: Option<Vec<UserId>>,
    engine: Option<Arc<Engine<SqlStore>>>,
}

impl BotBuilder {
    pub fn token(mut self, token: &str) -> BotBuilder {
        self.token = token.to_string();
        self
    }

    /// Telegram user ids allowed to use the bot; empty allows everyone.
    pub fn allowed_users(mut self, allowed_users: &[u64]) -> BotBuilder {
        if !allowed_users.is_empty() {
            self.allowed_users = Some(allowed_users.iter().copied().map(UserId).collect());
        }
        self
    }

    pub fn engine(mut self, engine: Arc<Engine<SqlStore>>) -> BotBuilder {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<Bot, String> {
        tracing::info!("Initializing telegram bot...");
        let engine = self
            .engine
            .ok_or_else(|| "telegram bot needs an engine".to_string())?;
        Bot::new(&self.token, self.allowed_users, engine)
    }
}
