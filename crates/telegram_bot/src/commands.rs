//! Command structs

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "可用指令：")]
pub enum Command {
    #[command(description = "建立預設科目與支付方式，開始記帳。")]
    Start,
    #[command(description = "顯示使用說明。")]
    Help,
}
