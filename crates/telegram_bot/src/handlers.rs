use engine::{LedgerId, Reply};
use teloxide::{
    prelude::*,
    types::{CallbackQuery, ChatId, MessageId, User},
};

use crate::{Command, ConfigParameters, ui};

pub(crate) async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    cfg: ConfigParameters,
) -> ResponseResult<()> {
    if !is_allowed(&cfg, msg.from.as_ref()) {
        return Ok(());
    }
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    match cmd {
        Command::Start => {
            let ledger = ledger_for(from);
            match cfg.engine.bootstrap_ledger(&ledger).await {
                Ok(seeded) => {
                    tracing::info!(%ledger, seeded, "ledger ready");
                    bot.send_message(chat_id, ui::welcome_text()).await?;
                }
                Err(err) => {
                    tracing::warn!(%ledger, error = %err, "ledger bootstrap failed");
                    bot.send_message(chat_id, err.kind().user_message()).await?;
                }
            }
        }
        Command::Help => {
            bot.send_message(chat_id, ui::help_text()).await?;
        }
    }

    Ok(())
}

pub(crate) async fn handle_message(
    bot: Bot,
    msg: Message,
    cfg: ConfigParameters,
) -> ResponseResult<()> {
    if !is_allowed(&cfg, msg.from.as_ref()) {
        return Ok(());
    }
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    // Unknown command.
    if text.trim_start().starts_with('/') {
        bot.send_message(chat_id, ui::help_text()).await?;
        return Ok(());
    }

    let ledger = ledger_for(from);
    let source_key = source_key(chat_id, msg.id);
    let reply = cfg.engine.handle_text(&ledger, text, Some(&source_key)).await;
    send_reply(&bot, chat_id, reply).await
}

pub(crate) async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    cfg: ConfigParameters,
) -> ResponseResult<()> {
    if !is_allowed(&cfg, Some(&q.from)) {
        return Ok(());
    }

    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        tracing::debug!("callback without a message, ignored");
        return Ok(());
    };

    let ledger = ledger_for(&q.from);
    let reply = cfg.engine.handle_callback(&ledger, data).await;
    edit_or_send(&bot, message.chat().id, message.id(), reply).await
}

/// Replace the menu message with the reply; send a new message if the menu
/// can no longer be edited.
async fn edit_or_send(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    reply: Reply,
) -> ResponseResult<()> {
    if bot
        .edit_message_text(chat_id, message_id, reply.text.clone())
        .reply_markup(ui::keyboard(&reply.choices))
        .await
        .is_ok()
    {
        return Ok(());
    }
    send_reply(bot, chat_id, reply).await
}

async fn send_reply(bot: &Bot, chat_id: ChatId, reply: Reply) -> ResponseResult<()> {
    let request = bot.send_message(chat_id, reply.text);
    if reply.choices.is_empty() {
        request.await?;
    } else {
        request.reply_markup(ui::keyboard(&reply.choices)).await?;
    }
    Ok(())
}

fn is_allowed(cfg: &ConfigParameters, from: Option<&User>) -> bool {
    let Some(from) = from else {
        return false;
    };
    match &cfg.allowed_users {
        None => true,
        Some(ids) => ids.contains(&from.id),
    }
}

fn ledger_for(user: &User) -> LedgerId {
    ledger_id(user.id)
}

fn ledger_id(user_id: UserId) -> LedgerId {
    LedgerId::new(format!("tg:{}", user_id.0))
}

/// One key per delivered message, so a redelivery is recognised.
fn source_key(chat_id: ChatId, message_id: MessageId) -> String {
    format!("tg:{}:{}", chat_id.0, message_id.0)
}
