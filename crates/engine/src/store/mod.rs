//! Record store seam.
//!
//! The pipeline only talks to storage through [`RecordStore`]. Two
//! implementations ship with the crate: [`SqlStore`] over sea-orm and
//! [`MemoryStore`] for tests and the console.

use std::{collections::BTreeSet, fmt, future::Future};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CategoryEntry, TransactionRecord, WalletEntry, WalletType};

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Namespace holding one user's registries and transactions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(String);

impl LedgerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LedgerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LedgerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique constraint hit: duplicate id or duplicate source key.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Transient failure; the operation may succeed if retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("\"{0}\" not found")]
    NotFound(String),
    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<String>,
    pub synonyms: BTreeSet<String>,
    pub is_income: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewWallet {
    pub name: String,
    pub wallet_type: WalletType,
    pub synonyms: BTreeSet<String>,
    pub is_default: bool,
}

/// Storage collaborator used by the engine.
///
/// Registry reads return entries in a stable order (creation order), which
/// the resolvers rely on for tie-breaking. Synonym writes are idempotent and
/// report whether anything changed.
pub trait RecordStore: Send + Sync {
    fn categories(
        &self,
        ledger: &LedgerId,
    ) -> impl Future<Output = Result<Vec<CategoryEntry>, StoreError>> + Send;

    fn wallets(
        &self,
        ledger: &LedgerId,
    ) -> impl Future<Output = Result<Vec<WalletEntry>, StoreError>> + Send;

    fn create_category(
        &self,
        ledger: &LedgerId,
        category: NewCategory,
    ) -> impl Future<Output = Result<CategoryEntry, StoreError>> + Send;

    fn create_wallet(
        &self,
        ledger: &LedgerId,
        wallet: NewWallet,
    ) -> impl Future<Output = Result<WalletEntry, StoreError>> + Send;

    fn add_category_synonym(
        &self,
        ledger: &LedgerId,
        category_id: &str,
        synonym: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn add_wallet_synonym(
        &self,
        ledger: &LedgerId,
        wallet_id: &str,
        synonym: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Every record of the ledger, oldest first.
    fn transactions(
        &self,
        ledger: &LedgerId,
    ) -> impl Future<Output = Result<Vec<TransactionRecord>, StoreError>> + Send;

    fn transaction(
        &self,
        ledger: &LedgerId,
        id: &str,
    ) -> impl Future<Output = Result<Option<TransactionRecord>, StoreError>> + Send;

    fn transaction_by_source(
        &self,
        ledger: &LedgerId,
        source_key: &str,
    ) -> impl Future<Output = Result<Option<TransactionRecord>, StoreError>> + Send;

    /// Fails with [`StoreError::Conflict`] when the id or the source key is
    /// already taken in the ledger.
    fn insert_transaction(
        &self,
        record: &TransactionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

const SYNONYM_SEPARATORS: [char; 3] = [',', '，', '、'];

/// Parse a delimited synonym column.
pub(crate) fn split_synonyms(raw: &str) -> BTreeSet<String> {
    raw.split(SYNONYM_SEPARATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn join_synonyms(synonyms: &BTreeSet<String>) -> String {
    synonyms
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !s.contains(SYNONYM_SEPARATORS))
        .collect::<Vec<_>>()
        .join(",")
}

/// A synonym worth storing: non-empty and free of list separators.
pub(crate) fn clean_synonym(synonym: &str) -> Option<String> {
    let trimmed = synonym.trim();
    (!trimmed.is_empty() && !trimmed.contains(SYNONYM_SEPARATORS)).then(|| trimmed.to_string())
}
