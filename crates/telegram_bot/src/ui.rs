use engine::Choice;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub(crate) const BUTTONS_PER_ROW: usize = 3;

/// Lay the engine's choices out as an inline keyboard, three per row.
pub(crate) fn keyboard(choices: &[Choice]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = choices
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            row.iter()
                .map(|choice| {
                    InlineKeyboardButton::callback(choice.label.clone(), choice.payload.clone())
                })
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

pub(crate) fn welcome_text() -> &'static str {
    "歡迎使用快速記帳！\n\n直接輸入「品項金額付款方式」即可記帳，例如：\n\n午餐120現金\n咖啡65信用卡\n薪水50000轉帳\n\n找不到科目或付款方式時，會列出選項讓你挑選，之後就會自動記住。"
}

pub(crate) fn help_text() -> &'static str {
    "格式：品項金額付款方式\n\n午餐120現金\n捷運30悠遊卡\n飯糰28星展\n\n金額只接受整數（新台幣），不填付款方式時預設為信用卡。\n/start 建立預設科目與支付方式"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(n: usize) -> Vec<Choice> {
        (0..n)
            .map(|i| Choice::new(format!("科目{i}"), format!("classify:c{i}:key")))
            .collect()
    }

    #[test]
    fn buttons_are_three_per_row() {
        let markup = keyboard(&choices(13));
        let sizes: Vec<usize> = markup.inline_keyboard.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 3, 1]);
    }

    #[test]
    fn no_choices_means_no_rows() {
        assert!(keyboard(&[]).inline_keyboard.is_empty());
    }
}
