//! Wallet registry per ledger and the payment method resolver.

use std::{collections::BTreeSet, fmt, str::FromStr};

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{LookupTables, util::normalize_key};

/// Kind of payment instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Cash,
    Bank,
    Credit,
    Mobile,
}

impl WalletType {
    /// The types offered in the wallet-type menu.
    pub const MENU: [WalletType; 3] = [WalletType::Cash, WalletType::Bank, WalletType::Credit];

    pub const fn as_str(self) -> &'static str {
        match self {
            WalletType::Cash => "cash",
            WalletType::Bank => "bank",
            WalletType::Credit => "credit",
            WalletType::Mobile => "mobile",
        }
    }

    /// Display label, also the name of a wallet created for this type.
    pub const fn label(self) -> &'static str {
        match self {
            WalletType::Cash => "現金",
            WalletType::Bank => "銀行轉帳",
            WalletType::Credit => "信用卡",
            WalletType::Mobile => "行動支付",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(WalletType::Cash),
            "bank" => Ok(WalletType::Bank),
            "credit" => Ok(WalletType::Credit),
            "mobile" => Ok(WalletType::Mobile),
            other => Err(format!("unknown wallet type: {other}")),
        }
    }
}

/// A payment instrument registered by the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: String,
    pub name: String,
    pub wallet_type: WalletType,
    pub synonyms: BTreeSet<String>,
    pub is_default: bool,
    pub active: bool,
}

impl WalletEntry {
    /// `true` when `phrase` already names this wallet.
    pub fn knows(&self, phrase: &str) -> bool {
        let key = normalize_key(phrase);
        normalize_key(&self.name) == key || self.synonyms.iter().any(|s| normalize_key(s) == key)
    }

    fn phrase_keys(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.name.as_str())
            .chain(self.synonyms.iter().map(String::as_str))
            .map(normalize_key)
            .filter(|k| !k.is_empty())
    }
}

/// Where a payment signal came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    /// A bank name from the curated bank table.
    Bank,
    /// A generic payment keyword (`現金`, `刷卡`, ...).
    Keyword,
    /// Nothing in the suffix; the credit fallback was assumed.
    Fallback,
}

/// The instrument implied by the suffix before the registry is consulted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub wallet_type: WalletType,
    /// Bank name for bank hits, the type label otherwise.
    pub label: String,
    pub source: DetectionSource,
    /// Phrases that identify the detected wallet (bank aliases).
    pub phrases: Vec<String>,
}

/// How a wallet was matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletMatch {
    ExactName,
    ExactSynonym,
    Substring,
    BankName,
    DetectedType,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WalletResolution<'a> {
    Matched {
        wallet: &'a WalletEntry,
        via: WalletMatch,
    },
    /// No registry counterpart. `detection` is set when the suffix named a
    /// concrete instrument that could be added to the registry.
    RequiresWalletConfirmation {
        suffix: String,
        detection: Option<Detection>,
    },
}

/// Resolve the payment `suffix` against the active wallets of `registry`.
///
/// The user's own wallet names and synonyms are tried first (exact, then
/// substring). Otherwise the suffix is run through the bank table and the
/// keyword table, and the detected instrument must have a counterpart in
/// the registry. An empty suffix assumes credit, but only commits if the
/// registry has a credit wallet.
pub fn resolve_payment<'a>(
    suffix: &str,
    registry: &'a [WalletEntry],
    tables: &LookupTables,
) -> WalletResolution<'a> {
    let key = normalize_key(suffix);
    let active: Vec<&WalletEntry> = registry.iter().filter(|w| w.active).collect();

    if !key.is_empty() {
        if let Some(wallet) = active.iter().find(|w| normalize_key(&w.name) == key) {
            return WalletResolution::Matched {
                wallet,
                via: WalletMatch::ExactName,
            };
        }
        if let Some(wallet) = active
            .iter()
            .find(|w| w.synonyms.iter().any(|s| normalize_key(s) == key))
        {
            return WalletResolution::Matched {
                wallet,
                via: WalletMatch::ExactSynonym,
            };
        }
        if let Some(wallet) = best_substring(&key, &active) {
            return WalletResolution::Matched {
                wallet,
                via: WalletMatch::Substring,
            };
        }
    }

    let Some(detection) = detect(&key, tables) else {
        return WalletResolution::RequiresWalletConfirmation {
            suffix: suffix.trim().to_string(),
            detection: None,
        };
    };
    tracing::debug!(
        wallet_type = %detection.wallet_type,
        label = %detection.label,
        source = ?detection.source,
        "payment detected"
    );

    let counterpart = match detection.source {
        DetectionSource::Bank => find_bank_wallet(&detection, &active)
            .map(|wallet| (wallet, WalletMatch::BankName)),
        DetectionSource::Keyword | DetectionSource::Fallback => {
            find_typed_wallet(detection.wallet_type, &active)
                .map(|wallet| (wallet, WalletMatch::DetectedType))
        }
    };

    match counterpart {
        Some((wallet, via)) => WalletResolution::Matched { wallet, via },
        None => WalletResolution::RequiresWalletConfirmation {
            suffix: suffix.trim().to_string(),
            detection: (detection.source != DetectionSource::Fallback).then_some(detection),
        },
    }
}

fn detect(key: &str, tables: &LookupTables) -> Option<Detection> {
    if key.is_empty() {
        return Some(Detection {
            wallet_type: WalletType::Credit,
            label: WalletType::Credit.label().to_string(),
            source: DetectionSource::Fallback,
            phrases: Vec::new(),
        });
    }
    if let Some(bank) = tables.detect_bank(key) {
        return Some(Detection {
            wallet_type: WalletType::Bank,
            label: bank.name.clone(),
            source: DetectionSource::Bank,
            phrases: bank.phrases().map(str::to_string).collect(),
        });
    }
    tables.detect_keyword(key).map(|hit| Detection {
        wallet_type: hit.wallet_type,
        label: hit.wallet_type.label().to_string(),
        source: DetectionSource::Keyword,
        phrases: vec![hit.keyword.clone()],
    })
}

/// Wallet whose name or synonym contains, or is contained in, the suffix.
/// The longest matched phrase wins; registry order breaks ties.
fn best_substring<'a>(key: &str, active: &[&'a WalletEntry]) -> Option<&'a WalletEntry> {
    let mut best: Option<(usize, &'a WalletEntry)> = None;
    for wallet in active {
        for phrase in wallet.phrase_keys() {
            let matched_len = if key.contains(phrase.as_str()) {
                phrase.chars().count()
            } else if phrase.contains(key) {
                key.chars().count()
            } else {
                continue;
            };
            if matched_len < 2 {
                continue;
            }
            if best.is_none_or(|(len, _)| matched_len > len) {
                best = Some((matched_len, wallet));
            }
        }
    }
    best.map(|(_, wallet)| wallet)
}

fn find_bank_wallet<'a>(detection: &Detection, active: &[&'a WalletEntry]) -> Option<&'a WalletEntry> {
    let bank_keys: Vec<String> = detection
        .phrases
        .iter()
        .map(|p| normalize_key(p))
        .filter(|k| k.chars().count() >= 2)
        .collect();
    active.iter().copied().find(|wallet| {
        wallet.phrase_keys().any(|phrase| {
            bank_keys
                .iter()
                .any(|bank| phrase.contains(bank.as_str()) || bank.contains(phrase.as_str()))
        })
    })
}

/// Default wallet of the type first, then registry order.
pub(crate) fn find_typed_wallet<'a>(
    wallet_type: WalletType,
    active: &[&'a WalletEntry],
) -> Option<&'a WalletEntry> {
    let mut typed = active.iter().copied().filter(|w| w.wallet_type == wallet_type);
    let first = typed.next()?;
    if first.is_default {
        return Some(first);
    }
    Some(typed.find(|w| w.is_default).unwrap_or(first))
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub ledger_id: String,
    pub name: String,
    pub wallet_type: String,
    /// Comma-delimited synonym list.
    pub synonyms: String,
    pub is_default: bool,
    /// `active` or `archived`.
    pub status: String,
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub(crate) const STATUS_ACTIVE: &str = "active";

impl TryFrom<Model> for WalletEntry {
    type Error = crate::StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let wallet_type = model
            .wallet_type
            .parse()
            .map_err(crate::StoreError::Backend)?;
        Ok(Self {
            id: model.id,
            name: model.name,
            wallet_type,
            synonyms: crate::store::split_synonyms(&model.synonyms),
            is_default: model.is_default,
            active: model.status == STATUS_ACTIVE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(id: &str, name: &str, wallet_type: WalletType, synonyms: &[&str]) -> WalletEntry {
        WalletEntry {
            id: id.to_string(),
            name: name.to_string(),
            wallet_type,
            synonyms: synonyms.iter().map(|s| ToString::to_string(s)).collect(),
            is_default: false,
            active: true,
        }
    }

    fn tables() -> LookupTables {
        LookupTables::embedded().unwrap()
    }

    fn matched_id(resolution: WalletResolution<'_>) -> (String, WalletMatch) {
        match resolution {
            WalletResolution::Matched { wallet, via } => (wallet.id.clone(), via),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn exact_registry_name_matches() {
        let registry = vec![wallet("w1", "現金", WalletType::Cash, &[])];
        assert_eq!(
            matched_id(resolve_payment("現金", &registry, &tables())),
            ("w1".to_string(), WalletMatch::ExactName)
        );
    }

    #[test]
    fn learned_synonym_matches_before_dictionaries() {
        let registry = vec![
            wallet("w1", "信用卡", WalletType::Credit, &["星展"]),
            wallet("w2", "星展帳戶", WalletType::Bank, &[]),
        ];
        assert_eq!(
            matched_id(resolve_payment("星展", &registry, &tables())),
            ("w1".to_string(), WalletMatch::ExactSynonym)
        );
    }

    #[test]
    fn keyword_resolves_to_wallet_of_detected_type() {
        let registry = vec![
            wallet("w1", "玉山卡", WalletType::Credit, &[]),
            wallet("w2", "零錢包", WalletType::Cash, &[]),
        ];
        assert_eq!(
            matched_id(resolve_payment("付現", &registry, &tables())),
            ("w2".to_string(), WalletMatch::DetectedType)
        );
    }

    #[test]
    fn default_wallet_of_type_is_preferred() {
        let mut preferred = wallet("w2", "國泰卡", WalletType::Credit, &[]);
        preferred.is_default = true;
        let registry = vec![wallet("w1", "玉山卡", WalletType::Credit, &[]), preferred];
        assert_eq!(
            matched_id(resolve_payment("刷卡", &registry, &tables())).0,
            "w2"
        );
    }

    #[test]
    fn bank_detection_needs_same_bank_in_registry() {
        let registry = vec![wallet("w1", "台新帳戶", WalletType::Bank, &[])];
        match resolve_payment("星展", &registry, &tables()) {
            WalletResolution::RequiresWalletConfirmation { detection, .. } => {
                let detection = detection.unwrap();
                assert_eq!(detection.source, DetectionSource::Bank);
                assert_eq!(detection.label, "星展銀行");
                assert_eq!(detection.wallet_type, WalletType::Bank);
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn bank_detection_matches_registry_bank() {
        let registry = vec![wallet("w1", "星展銀行", WalletType::Bank, &[])];
        assert_eq!(
            matched_id(resolve_payment("DBS", &registry, &tables())),
            ("w1".to_string(), WalletMatch::BankName)
        );
    }

    #[test]
    fn unknown_suffix_requires_confirmation_without_detection() {
        let registry = vec![wallet("w1", "現金", WalletType::Cash, &[])];
        assert_eq!(
            resolve_payment("同事請客", &registry, &tables()),
            WalletResolution::RequiresWalletConfirmation {
                suffix: "同事請客".to_string(),
                detection: None,
            }
        );
    }

    #[test]
    fn empty_suffix_uses_registry_credit_wallet() {
        let registry = vec![
            wallet("w1", "現金", WalletType::Cash, &[]),
            wallet("w2", "信用卡", WalletType::Credit, &[]),
        ];
        assert_eq!(
            matched_id(resolve_payment("", &registry, &tables())),
            ("w2".to_string(), WalletMatch::DetectedType)
        );
    }

    #[test]
    fn empty_suffix_without_credit_wallet_is_not_defaulted() {
        let registry = vec![wallet("w1", "現金", WalletType::Cash, &[])];
        assert_eq!(
            resolve_payment("", &registry, &tables()),
            WalletResolution::RequiresWalletConfirmation {
                suffix: String::new(),
                detection: None,
            }
        );
    }

    #[test]
    fn keyword_without_counterpart_carries_detection() {
        let registry = vec![wallet("w1", "現金", WalletType::Cash, &[])];
        match resolve_payment("刷卡", &registry, &tables()) {
            WalletResolution::RequiresWalletConfirmation {
                detection: Some(detection),
                ..
            } => {
                assert_eq!(detection.wallet_type, WalletType::Credit);
                assert_eq!(detection.source, DetectionSource::Keyword);
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn archived_wallets_are_ignored() {
        let mut archived = wallet("w1", "現金", WalletType::Cash, &[]);
        archived.active = false;
        assert!(matches!(
            resolve_payment("現金", &[archived], &tables()),
            WalletResolution::RequiresWalletConfirmation { .. }
        ));
    }

    #[test]
    fn substring_match_uses_registry_names() {
        let registry = vec![wallet("w1", "悠遊卡", WalletType::Mobile, &[])];
        assert_eq!(
            matched_id(resolve_payment("用悠遊卡", &registry, &tables())),
            ("w1".to_string(), WalletMatch::Substring)
        );
    }
}
