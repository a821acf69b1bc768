//! Reply rendering.
//!
//! Success and failure share one eight-line layout so a reader (or a
//! downstream parser) always finds the same field on the same line.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    EngineError, WriteResult,
    util::{single_line, truncate_chars},
};

/// Longest button label, in characters.
pub const MAX_LABEL_CHARS: usize = 20;
const PLACEHOLDER: &str = "-";

/// A button: what the user sees and what comes back when it is pressed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub payload: String,
}

impl Choice {
    pub fn new(label: impl AsRef<str>, payload: impl Into<String>) -> Self {
        Self {
            label: truncate_chars(label.as_ref(), MAX_LABEL_CHARS),
            payload: payload.into(),
        }
    }
}

/// A bounded list of choices waiting for a callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChoiceMenu {
    pub prompt: String,
    pub choices: Vec<Choice>,
}

/// What a dispatcher sends back to the chat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub choices: Vec<Choice>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
        }
    }
}

impl From<ChoiceMenu> for Reply {
    fn from(menu: ChoiceMenu) -> Self {
        Self {
            text: menu.prompt,
            choices: menu.choices,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReplyFormatter {
    tz: Tz,
    remark_max_chars: usize,
}

impl ReplyFormatter {
    pub fn new(tz: Tz, remark_max_chars: usize) -> Self {
        Self {
            tz,
            remark_max_chars: remark_max_chars.max(1),
        }
    }

    pub fn success(&self, result: &WriteResult) -> String {
        let record = result.record();
        let header = if result.is_duplicate() {
            "✅ 已記錄過（重複請求）"
        } else {
            "✅ 記帳成功"
        };
        self.render(Fields {
            header,
            amount: Some(record.amount),
            direction: record.direction.label(),
            wallet: &record.wallet_name,
            at: record.created_at,
            category: &record.category_name,
            remark: &record.description,
            last: ("編號", &record.id),
        })
    }

    /// `original` is the text the user sent, if there was one.
    pub fn failure(&self, error: &EngineError, original: Option<&str>, at: DateTime<Utc>) -> String {
        let reason = error.user_reason();
        self.render(Fields {
            header: "❌ 記帳失敗",
            amount: None,
            direction: PLACEHOLDER,
            wallet: PLACEHOLDER,
            at,
            category: PLACEHOLDER,
            remark: original.unwrap_or(PLACEHOLDER),
            last: ("原因", &reason),
        })
    }

    pub fn cancelled(&self) -> String {
        "已取消，未記錄任何資料。".to_string()
    }

    fn render(&self, fields: Fields<'_>) -> String {
        let amount = fields
            .amount
            .map_or_else(|| PLACEHOLDER.to_string(), format_amount);
        let at = fields.at.with_timezone(&self.tz).format("%Y-%m-%d %H:%M");
        let remark = match single_line(fields.remark).as_str() {
            "" => PLACEHOLDER.to_string(),
            remark => truncate_chars(remark, self.remark_max_chars),
        };
        let (last_label, last_value) = fields.last;
        let last_value = single_line(last_value);
        [
            fields.header.to_string(),
            format!("金額：{amount}"),
            format!("收支：{}", or_placeholder(fields.direction)),
            format!("支付方式：{}", or_placeholder(fields.wallet)),
            format!("時間：{at}"),
            format!("科目：{}", or_placeholder(fields.category)),
            format!("備註：{remark}"),
            format!("{last_label}：{}", or_placeholder(&last_value)),
        ]
        .join("\n")
    }
}

struct Fields<'a> {
    header: &'a str,
    amount: Option<i64>,
    direction: &'a str,
    wallet: &'a str,
    at: DateTime<Utc>,
    category: &'a str,
    remark: &'a str,
    last: (&'a str, &'a str),
}

fn or_placeholder(value: &str) -> &str {
    if value.trim().is_empty() {
        PLACEHOLDER
    } else {
        value
    }
}

/// `NT$1,200`.
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}NT${grouped}")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::{Direction, LedgerId, ParseError, RecordStatus, StoreError, TransactionRecord};

    fn formatter() -> ReplyFormatter {
        ReplyFormatter::new(chrono_tz::Asia::Taipei, 10)
    }

    fn record() -> TransactionRecord {
        TransactionRecord {
            id: "20260301040000000abcdef".to_string(),
            ledger: LedgerId::new("alice"),
            amount: 1200,
            direction: Direction::Expense,
            category_id: "c1".to_string(),
            category_name: "午餐".to_string(),
            wallet_id: "w1".to_string(),
            wallet_name: "現金".to_string(),
            description: "午餐1200現金".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap(),
            status: RecordStatus::Confirmed,
            source_key: None,
        }
    }

    #[test]
    fn success_uses_fixed_layout() {
        let text = formatter().success(&WriteResult::Written(record()));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "✅ 記帳成功",
                "金額：NT$1,200",
                "收支：支出",
                "支付方式：現金",
                "時間：2026-03-01 12:00",
                "科目：午餐",
                "備註：午餐1200現金",
                "編號：20260301040000000abcdef",
            ]
        );
    }

    #[test]
    fn duplicate_has_its_own_header() {
        let text = formatter().success(&WriteResult::AlreadyWritten(record()));
        assert!(text.starts_with("✅ 已記錄過"));
    }

    #[test]
    fn failure_keeps_the_same_line_count() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap();
        let err = EngineError::from(ParseError::MissingAmount);
        let text = formatter().failure(&err, Some("午餐現金"), at);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "❌ 記帳失敗");
        assert_eq!(lines[1], "金額：-");
        assert_eq!(lines[6], "備註：午餐現金");
        assert!(lines[7].starts_with("原因：格式錯誤"));
    }

    #[test]
    fn multi_line_remark_stays_on_one_line() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap();
        let err = EngineError::from(ParseError::MissingAmount);
        let text = formatter().failure(&err, Some("午餐\n現金"), at);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[6], "備註：午餐 現金");
        assert!(lines[7].starts_with("原因："));
    }

    #[test]
    fn storage_failure_never_shows_raw_error() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap();
        let err = EngineError::Storage {
            attempts: 3,
            source: StoreError::Unavailable("pool timed out".into()),
        };
        let text = formatter().failure(&err, None, at);
        assert!(!text.contains("pool"));
        assert!(text.contains("備註：-"));
    }

    #[test]
    fn long_remarks_are_truncated() {
        let mut long = record();
        long.description = "一二三四五六七八九十十一".to_string();
        let text = formatter().success(&WriteResult::Written(long));
        assert!(text.contains("備註：一二三四五六七八九…"));
    }

    #[test]
    fn amounts_are_grouped_by_thousands() {
        assert_eq!(format_amount(7), "NT$7");
        assert_eq!(format_amount(1000), "NT$1,000");
        assert_eq!(format_amount(1234567), "NT$1,234,567");
    }

    #[test]
    fn button_labels_are_bounded() {
        let choice = Choice::new(format!("{}長的科目名稱", "非常".repeat(10)), "cancel:k");
        assert_eq!(choice.label.chars().count(), MAX_LABEL_CHARS);
    }
}
