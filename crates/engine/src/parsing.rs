//! Quick-entry parser and amount extractor.
//!
//! A quick entry is `<subject><amount><suffix>`, e.g. `午餐120現金`: the
//! leading non-digit run is the subject, the first digit run is the amount
//! and whatever follows is the payment suffix.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CurrencyTable, LookupTables,
    util::{normalize_input, strip_prefix_ci, strip_suffix_ci},
};

/// One parsed quick entry. `amount` is always > 0 and `raw_amount` never
/// carries a leading zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEntry {
    pub subject: String,
    pub raw_amount: String,
    pub amount: i64,
    pub suffix: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("內容為空")]
    Empty,
    #[error("找不到金額")]
    MissingAmount,
    #[error("缺少品項名稱")]
    MissingSubject,
    #[error("金額格式錯誤：{0}")]
    LeadingZero(String),
    #[error("金額格式錯誤：{0}")]
    Malformed(String),
    #[error("金額只接受整數：{0}")]
    Fractional(String),
    #[error("金額過大：{0}")]
    Overflow(String),
    #[error("金額必須大於 0")]
    NonPositive,
    #[error("不支援的幣別：{0}")]
    UnsupportedCurrency(String),
}

impl ParseError {
    /// `true` when the text was well-formed but a value is out of range or
    /// a required field is missing.
    pub fn is_validation(&self) -> bool {
        matches!(self, ParseError::NonPositive | ParseError::MissingSubject)
    }
}

/// Parses a quick entry.
///
/// Rules:
/// - the input is NFKC-normalised first, so full-width digits are accepted;
/// - the first ASCII digit run is the amount; a multi-digit run starting
///   with `0` is rejected, as is a value of 0;
/// - `12.5` and `1,200` are rejected rather than silently truncated;
/// - local units right after the amount (`元`, `塊`, ...) and local symbols
///   right before it (`$`, `NT$`) are stripped, unless the unit is the start
///   of a bank or payment phrase (`元大`);
/// - a foreign currency token next to the amount rejects the whole entry.
pub fn parse_entry(input: &str, tables: &LookupTables) -> Result<ParsedEntry, ParseError> {
    let currency = &tables.currency;
    let text = normalize_input(input);
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let start = text
        .find(|c: char| c.is_ascii_digit())
        .ok_or(ParseError::MissingAmount)?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let raw_amount = &rest[..end];
    let after = &rest[end..];

    check_number_tail(raw_amount, after)?;

    if raw_amount.len() > 1 && raw_amount.starts_with('0') {
        return Err(ParseError::LeadingZero(raw_amount.to_string()));
    }
    let amount: i64 = raw_amount
        .parse()
        .map_err(|_| ParseError::Overflow(raw_amount.to_string()))?;
    if amount <= 0 {
        return Err(ParseError::NonPositive);
    }

    let subject = strip_currency_symbol(text[..start].trim_end(), currency)?;
    let suffix = strip_currency_unit(after.trim_start(), tables)?;

    let subject = subject.trim();
    if subject.is_empty() {
        return Err(ParseError::MissingSubject);
    }

    Ok(ParsedEntry {
        subject: subject.to_string(),
        raw_amount: raw_amount.to_string(),
        amount,
        suffix: suffix.trim().to_string(),
    })
}

fn check_number_tail(raw_amount: &str, after: &str) -> Result<(), ParseError> {
    let mut chars = after.chars();
    let (Some(sep), Some(next)) = (chars.next(), chars.next()) else {
        return Ok(());
    };
    if !next.is_ascii_digit() {
        return Ok(());
    }
    let digits: String = after[sep.len_utf8()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    match sep {
        '.' => Err(ParseError::Fractional(format!("{raw_amount}.{digits}"))),
        ',' => Err(ParseError::Malformed(format!("{raw_amount},{digits}"))),
        _ => Ok(()),
    }
}

fn strip_currency_symbol<'a>(subject: &'a str, currency: &CurrencyTable) -> Result<&'a str, ParseError> {
    if let Some(token) = longest_first(&currency.rejected)
        .find(|token| strip_suffix_ci(subject, token).is_some())
    {
        return Err(ParseError::UnsupportedCurrency(token.to_string()));
    }
    Ok(longest_first(&currency.symbols)
        .find_map(|token| strip_suffix_ci(subject, token))
        .unwrap_or(subject))
}

fn strip_currency_unit<'a>(suffix: &'a str, tables: &LookupTables) -> Result<&'a str, ParseError> {
    let currency = &tables.currency;
    if let Some(token) = longest_first(&currency.rejected)
        .find(|token| strip_prefix_ci(suffix, token).is_some())
    {
        return Err(ParseError::UnsupportedCurrency(token.to_string()));
    }
    if tables.starts_with_payment_phrase(suffix) {
        return Ok(suffix);
    }
    Ok(longest_first(&currency.units)
        .find_map(|token| strip_prefix_ci(suffix, token))
        .unwrap_or(suffix))
}

fn longest_first(tokens: &[String]) -> impl Iterator<Item = &str> {
    let mut sorted: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .collect();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    sorted.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<ParsedEntry, ParseError> {
        parse_entry(input, &LookupTables::embedded().unwrap())
    }

    #[test]
    fn splits_subject_amount_and_suffix() {
        let parsed = parse("午餐120現金").unwrap();
        assert_eq!(parsed.subject, "午餐");
        assert_eq!(parsed.raw_amount, "120");
        assert_eq!(parsed.amount, 120);
        assert_eq!(parsed.suffix, "現金");
    }

    #[test]
    fn trailing_bank_token_does_not_disturb_amount() {
        let parsed = parse("飯糰28星展").unwrap();
        assert_eq!(parsed.subject, "飯糰");
        assert_eq!(parsed.amount, 28);
        assert_eq!(parsed.suffix, "星展");
    }

    #[test]
    fn amount_is_the_base_ten_digit_run() {
        for (input, expected) in [("咖啡7", 7), ("房租15000轉帳", 15000), ("茶 45 元", 45)] {
            assert_eq!(parse(input).unwrap().amount, expected, "{input}");
        }
    }

    #[test]
    fn full_width_digits_are_accepted() {
        let parsed = parse("午餐１２０現金").unwrap();
        assert_eq!(parsed.amount, 120);
    }

    #[test]
    fn rejects_leading_zero() {
        assert_eq!(
            parse("午餐0120現金").unwrap_err(),
            ParseError::LeadingZero("0120".to_string())
        );
    }

    #[test]
    fn rejects_zero_as_validation_error() {
        let err = parse("午餐0").unwrap_err();
        assert_eq!(err, ParseError::NonPositive);
        assert!(err.is_validation());
    }

    #[test]
    fn rejects_missing_amount_and_empty_input() {
        assert_eq!(parse("午餐現金").unwrap_err(), ParseError::MissingAmount);
        assert_eq!(parse("   ").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn rejects_missing_subject() {
        let err = parse("120現金").unwrap_err();
        assert_eq!(err, ParseError::MissingSubject);
        assert!(err.is_validation());
    }

    #[test]
    fn rejects_decimals_and_grouping() {
        assert!(matches!(parse("咖啡12.5"), Err(ParseError::Fractional(_))));
        assert!(matches!(parse("電視1,200"), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn strips_local_units_and_symbols() {
        let parsed = parse("午餐120元現金").unwrap();
        assert_eq!(parsed.suffix, "現金");
        let parsed = parse("午餐120塊錢").unwrap();
        assert_eq!(parsed.suffix, "");
        let parsed = parse("午餐NT$120").unwrap();
        assert_eq!(parsed.subject, "午餐");
    }

    #[test]
    fn unit_that_opens_a_bank_name_is_kept() {
        assert_eq!(parse("午餐120元大").unwrap().suffix, "元大");
        assert_eq!(parse("午餐120元大銀行").unwrap().suffix, "元大銀行");
        assert_eq!(parse("午餐120元元大").unwrap().suffix, "元大");
        assert_eq!(parse("午餐120 元大").unwrap().suffix, "元大");
    }

    #[test]
    fn foreign_currency_is_rejected_not_stripped() {
        assert_eq!(
            parse("午餐120美金").unwrap_err(),
            ParseError::UnsupportedCurrency("美金".to_string())
        );
        assert_eq!(
            parse("拉麵1000日圓").unwrap_err(),
            ParseError::UnsupportedCurrency("日圓".to_string())
        );
        assert!(matches!(
            parse("午餐US$12"),
            Err(ParseError::UnsupportedCurrency(_))
        ));
    }

    #[test]
    fn rejects_overflowing_amount() {
        assert!(matches!(
            parse("房子99999999999999999999"),
            Err(ParseError::Overflow(_))
        ));
    }
}
