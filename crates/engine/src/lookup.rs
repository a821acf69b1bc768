//! Versioned lookup tables that drive payment detection and currency units.
//!
//! The tables are a single JSON document. A copy ships inside the crate
//! (`data/lookup_tables.json`); deployments can point
//! [`EngineSettings::lookup_tables`](crate::EngineSettings) at their own file.

use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::{WalletType, util::normalize_key};

const EMBEDDED_TABLES: &str = include_str!("../data/lookup_tables.json");

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("cannot read lookup tables from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed lookup tables: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid lookup tables: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BankEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl BankEntry {
    /// Canonical name followed by every alias.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
}

/// Currency tokens the amount extractor understands.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CurrencyTable {
    /// Local units allowed right after the amount (`元`, `塊`, ...).
    #[serde(default)]
    pub units: Vec<String>,
    /// Local symbols allowed right before the amount (`$`, `NT$`).
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Foreign currency tokens; their presence rejects the input.
    #[serde(default)]
    pub rejected: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DefaultCategory {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub is_income: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DefaultWallet {
    pub name: String,
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Registry seeded into a ledger the first time it is used.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RegistryDefaults {
    #[serde(default)]
    pub categories: Vec<DefaultCategory>,
    #[serde(default)]
    pub wallets: Vec<DefaultWallet>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LookupTables {
    pub version: u32,
    pub banks: Vec<BankEntry>,
    pub keywords: Vec<KeywordEntry>,
    pub currency: CurrencyTable,
    #[serde(default)]
    pub defaults: RegistryDefaults,
}

impl LookupTables {
    /// The tables compiled into the crate.
    pub fn embedded() -> Result<Self, LookupError> {
        Self::from_json(EMBEDDED_TABLES)
    }

    pub fn from_path(path: &Path) -> Result<Self, LookupError> {
        let raw = fs::read_to_string(path).map_err(|source| LookupError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, LookupError> {
        let tables: LookupTables = serde_json::from_str(raw)?;
        tables.validate()?;
        tracing::debug!(
            version = tables.version,
            banks = tables.banks.len(),
            keywords = tables.keywords.len(),
            "lookup tables loaded"
        );
        Ok(tables)
    }

    fn validate(&self) -> Result<(), LookupError> {
        if self.version == 0 {
            return Err(LookupError::Invalid("version must be >= 1".to_string()));
        }
        if self.keywords.is_empty() {
            return Err(LookupError::Invalid(
                "keyword table must not be empty".to_string(),
            ));
        }
        if let Some(bank) = self
            .banks
            .iter()
            .find(|bank| bank.phrases().any(|p| normalize_key(p).is_empty()))
        {
            return Err(LookupError::Invalid(format!(
                "bank '{}' has an empty alias",
                bank.name
            )));
        }
        if let Some(keyword) = self
            .keywords
            .iter()
            .find(|k| normalize_key(&k.keyword).is_empty())
        {
            return Err(LookupError::Invalid(format!(
                "empty keyword for type '{}'",
                keyword.wallet_type
            )));
        }
        Ok(())
    }

    /// Bank whose name or alias occurs in `text`; the longest phrase wins.
    pub fn detect_bank(&self, text: &str) -> Option<&BankEntry> {
        let key = normalize_key(text);
        longest_hit(
            self.banks
                .iter()
                .flat_map(|bank| bank.phrases().map(move |phrase| (bank, phrase))),
            &key,
        )
    }

    /// `true` when `text` opens with a bank name, bank alias or payment
    /// keyword, e.g. `元大` even though `元` is also a currency unit.
    pub fn starts_with_payment_phrase(&self, text: &str) -> bool {
        let key = normalize_key(text);
        if key.is_empty() {
            return false;
        }
        self.banks
            .iter()
            .flat_map(BankEntry::phrases)
            .chain(self.keywords.iter().map(|k| k.keyword.as_str()))
            .map(normalize_key)
            .any(|phrase| !phrase.is_empty() && key.starts_with(phrase.as_str()))
    }

    /// Generic payment keyword occurring in `text`; the longest keyword wins.
    pub fn detect_keyword(&self, text: &str) -> Option<&KeywordEntry> {
        let key = normalize_key(text);
        longest_hit(
            self.keywords.iter().map(|k| (k, k.keyword.as_str())),
            &key,
        )
    }
}

fn longest_hit<'a, T>(
    candidates: impl Iterator<Item = (&'a T, &'a str)>,
    key: &str,
) -> Option<&'a T> {
    if key.is_empty() {
        return None;
    }
    let mut best: Option<(usize, &'a T)> = None;
    for (item, phrase) in candidates {
        let phrase = normalize_key(phrase);
        if phrase.is_empty() || !key.contains(phrase.as_str()) {
            continue;
        }
        let len = phrase.chars().count();
        if best.is_none_or(|(best_len, _)| len > best_len) {
            best = Some((len, item));
        }
    }
    best.map(|(_, item)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tables_are_valid() {
        let tables = LookupTables::embedded().unwrap();
        assert!(tables.version >= 1);
        assert!(!tables.banks.is_empty());
        assert!(!tables.defaults.categories.is_empty());
    }

    #[test]
    fn bank_alias_is_detected_inside_suffix() {
        let tables = LookupTables::embedded().unwrap();
        let bank = tables.detect_bank("星展").unwrap();
        assert_eq!(bank.name, "星展銀行");
        let bank = tables.detect_bank("用DBS轉").unwrap();
        assert_eq!(bank.name, "星展銀行");
    }

    #[test]
    fn longest_keyword_wins() {
        let tables = LookupTables::embedded().unwrap();
        let hit = tables.detect_keyword("Line Pay").unwrap();
        assert_eq!(hit.wallet_type, WalletType::Mobile);
        let hit = tables.detect_keyword("信用卡").unwrap();
        assert_eq!(hit.keyword, "信用卡");
    }

    #[test]
    fn unknown_text_detects_nothing() {
        let tables = LookupTables::embedded().unwrap();
        assert!(tables.detect_bank("同事請客").is_none());
        assert!(tables.detect_keyword("同事請客").is_none());
        assert!(tables.detect_keyword("").is_none());
    }

    #[test]
    fn payment_phrase_must_open_the_text() {
        let tables = LookupTables::embedded().unwrap();
        assert!(tables.starts_with_payment_phrase("元大"));
        assert!(tables.starts_with_payment_phrase("元大銀行"));
        assert!(tables.starts_with_payment_phrase("line pay"));
        assert!(!tables.starts_with_payment_phrase("元現金"));
        assert!(!tables.starts_with_payment_phrase("元元大"));
        assert!(!tables.starts_with_payment_phrase(""));
    }

    #[test]
    fn rejects_unknown_wallet_type() {
        let raw = r#"{"version":1,"banks":[],"keywords":[{"keyword":"x","type":"gold"}],"currency":{}}"#;
        assert!(matches!(
            LookupTables::from_json(raw),
            Err(LookupError::Json(_))
        ));
    }

    #[test]
    fn rejects_version_zero() {
        let raw = r#"{"version":0,"banks":[],"keywords":[{"keyword":"現金","type":"cash"}],"currency":{}}"#;
        assert!(matches!(
            LookupTables::from_json(raw),
            Err(LookupError::Invalid(_))
        ));
    }
}
