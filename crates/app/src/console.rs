//! Line-oriented dispatcher over stdin/stdout.
//!
//! Plain lines are entries, `/cb <payload>` presses a button by payload and
//! a bare number presses that button of the last menu.

use engine::{Choice, Engine, LedgerId, RecordStore, Reply};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::AppResult;

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Text(&'a str),
    Callback(String),
    Invalid(String),
}

pub async fn run<S: RecordStore>(engine: Engine<S>, ledger: LedgerId) -> AppResult<()> {
    if engine.bootstrap_ledger(&ledger).await? {
        tracing::info!(%ledger, "default categories and wallets created");
    }

    // Source keys must not repeat across sessions on a persistent ledger.
    let session = Uuid::new_v4().simple().to_string();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut choices: Vec<Choice> = Vec::new();
    let mut sequence = 0u64;

    println!("輸入「品項金額付款方式」記帳，例如：午餐120現金（/quit 離開）");
    while let Some(line) = lines.next_line().await? {
        let reply = match parse_input(&line, &choices) {
            Input::Quit => break,
            Input::Text("") => continue,
            Input::Text(text) => {
                sequence += 1;
                let source_key = format!("console:{}:{sequence}", &session[..8]);
                engine.handle_text(&ledger, text, Some(&source_key)).await
            }
            Input::Callback(payload) => engine.handle_callback(&ledger, &payload).await,
            Input::Invalid(message) => {
                println!("{message}");
                continue;
            }
        };
        println!("{}\n", render(&reply));
        choices = reply.choices;
    }

    Ok(())
}

fn parse_input<'a>(line: &'a str, choices: &[Choice]) -> Input<'a> {
    let line = line.trim();
    if matches!(line, "/quit" | "/exit") {
        return Input::Quit;
    }
    if let Some(payload) = line.strip_prefix("/cb ") {
        return Input::Callback(payload.trim().to_string());
    }
    if !choices.is_empty()
        && let Ok(number) = line.parse::<usize>()
    {
        return match number.checked_sub(1).and_then(|i| choices.get(i)) {
            Some(choice) => Input::Callback(choice.payload.clone()),
            None => Input::Invalid(format!("沒有第 {number} 個選項")),
        };
    }
    Input::Text(line)
}

fn render(reply: &Reply) -> String {
    let mut out = reply.text.clone();
    for (i, choice) in reply.choices.iter().enumerate() {
        out.push_str(&format!("\n  [{}] {}", i + 1, choice.label));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> Vec<Choice> {
        vec![
            Choice::new("早餐", "classify:c1:k"),
            Choice::new("取消", "cancel:k"),
        ]
    }

    #[test]
    fn numbers_press_buttons_of_the_last_menu() {
        assert_eq!(
            parse_input(" 2 ", &menu()),
            Input::Callback("cancel:k".to_string())
        );
        assert!(matches!(parse_input("3", &menu()), Input::Invalid(_)));
        assert!(matches!(parse_input("0", &menu()), Input::Invalid(_)));
    }

    #[test]
    fn numbers_without_a_menu_are_entries() {
        assert_eq!(parse_input("120", &[]), Input::Text("120"));
    }

    #[test]
    fn explicit_callbacks_and_quit() {
        assert_eq!(
            parse_input("/cb wallet_type:cash:k", &[]),
            Input::Callback("wallet_type:cash:k".to_string())
        );
        assert_eq!(parse_input("/quit", &menu()), Input::Quit);
        assert_eq!(parse_input("午餐120現金", &menu()), Input::Text("午餐120現金"));
    }

    #[test]
    fn buttons_are_numbered() {
        let reply = Reply {
            text: "請選擇分類：".to_string(),
            choices: menu(),
        };
        assert_eq!(render(&reply), "請選擇分類：\n  [1] 早餐\n  [2] 取消");
    }
}
