use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::{LedgerId, NewCategory, NewWallet, RecordStore, StoreError, clean_synonym};
use crate::{CategoryEntry, TransactionRecord, WalletEntry};

#[derive(Debug, Default)]
struct LedgerData {
    categories: Vec<CategoryEntry>,
    wallets: Vec<WalletEntry>,
    transactions: Vec<TransactionRecord>,
}

/// In-process store. Clones share the same data.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<LedgerId, LedgerData>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    async fn categories(&self, ledger: &LedgerId) -> Result<Vec<CategoryEntry>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .get(ledger)
            .map(|data| data.categories.clone())
            .unwrap_or_default())
    }

    async fn wallets(&self, ledger: &LedgerId) -> Result<Vec<WalletEntry>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .get(ledger)
            .map(|data| data.wallets.clone())
            .unwrap_or_default())
    }

    async fn create_category(
        &self,
        ledger: &LedgerId,
        category: NewCategory,
    ) -> Result<CategoryEntry, StoreError> {
        let mut guard = self.inner.lock().await;
        let data = guard.entry(ledger.clone()).or_default();
        if data.categories.iter().any(|c| c.name == category.name) {
            return Err(StoreError::Conflict(format!("category {}", category.name)));
        }
        let entry = CategoryEntry {
            id: Uuid::new_v4().to_string(),
            name: category.name,
            parent_id: category.parent_id,
            synonyms: category
                .synonyms
                .iter()
                .filter_map(|s| clean_synonym(s))
                .collect(),
            is_income: category.is_income,
            active: true,
        };
        data.categories.push(entry.clone());
        Ok(entry)
    }

    async fn create_wallet(
        &self,
        ledger: &LedgerId,
        wallet: NewWallet,
    ) -> Result<WalletEntry, StoreError> {
        let mut guard = self.inner.lock().await;
        let data = guard.entry(ledger.clone()).or_default();
        if data.wallets.iter().any(|w| w.name == wallet.name) {
            return Err(StoreError::Conflict(format!("wallet {}", wallet.name)));
        }
        let entry = WalletEntry {
            id: Uuid::new_v4().to_string(),
            name: wallet.name,
            wallet_type: wallet.wallet_type,
            synonyms: wallet
                .synonyms
                .iter()
                .filter_map(|s| clean_synonym(s))
                .collect(),
            is_default: wallet.is_default,
            active: true,
        };
        data.wallets.push(entry.clone());
        Ok(entry)
    }

    async fn add_category_synonym(
        &self,
        ledger: &LedgerId,
        category_id: &str,
        synonym: &str,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().await;
        let category = guard
            .get_mut(ledger)
            .and_then(|data| data.categories.iter_mut().find(|c| c.id == category_id))
            .ok_or_else(|| StoreError::NotFound(category_id.to_string()))?;
        let Some(synonym) = clean_synonym(synonym) else {
            return Ok(false);
        };
        if category.knows(&synonym) {
            return Ok(false);
        }
        Ok(category.synonyms.insert(synonym))
    }

    async fn add_wallet_synonym(
        &self,
        ledger: &LedgerId,
        wallet_id: &str,
        synonym: &str,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().await;
        let wallet = guard
            .get_mut(ledger)
            .and_then(|data| data.wallets.iter_mut().find(|w| w.id == wallet_id))
            .ok_or_else(|| StoreError::NotFound(wallet_id.to_string()))?;
        let Some(synonym) = clean_synonym(synonym) else {
            return Ok(false);
        };
        if wallet.knows(&synonym) {
            return Ok(false);
        }
        Ok(wallet.synonyms.insert(synonym))
    }

    async fn transactions(&self, ledger: &LedgerId) -> Result<Vec<TransactionRecord>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .get(ledger)
            .map(|data| data.transactions.clone())
            .unwrap_or_default())
    }

    async fn transaction(
        &self,
        ledger: &LedgerId,
        id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .get(ledger)
            .and_then(|data| data.transactions.iter().find(|t| t.id == id).cloned()))
    }

    async fn transaction_by_source(
        &self,
        ledger: &LedgerId,
        source_key: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard.get(ledger).and_then(|data| {
            data.transactions
                .iter()
                .find(|t| t.source_key.as_deref() == Some(source_key))
                .cloned()
        }))
    }

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        let data = guard.entry(record.ledger.clone()).or_default();
        if data.transactions.iter().any(|t| t.id == record.id) {
            return Err(StoreError::Conflict(format!("transaction id {}", record.id)));
        }
        if let Some(source_key) = record.source_key.as_deref()
            && data
                .transactions
                .iter()
                .any(|t| t.source_key.as_deref() == Some(source_key))
        {
            return Err(StoreError::Conflict(format!("source key {source_key}")));
        }
        data.transactions.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::{Direction, RecordStatus, WalletType};

    fn record(id: &str, source_key: Option<&str>) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            ledger: LedgerId::new("alice"),
            amount: 120,
            direction: Direction::Expense,
            category_id: "c1".to_string(),
            category_name: "午餐".to_string(),
            wallet_id: "w1".to_string(),
            wallet_name: "現金".to_string(),
            description: "午餐120現金".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap(),
            status: RecordStatus::Confirmed,
            source_key: source_key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_transaction(&record("t1", None)).await.unwrap();
        let err = store.insert_transaction(&record("t1", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_source_key_is_a_conflict() {
        let store = MemoryStore::new();
        store
            .insert_transaction(&record("t1", Some("tg:1:1")))
            .await
            .unwrap();
        let err = store
            .insert_transaction(&record("t2", Some("tg:1:1")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let found = store
            .transaction_by_source(&LedgerId::new("alice"), "tg:1:1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "t1");
    }

    #[tokio::test]
    async fn ledgers_are_isolated() {
        let store = MemoryStore::new();
        store.insert_transaction(&record("t1", None)).await.unwrap();
        assert!(
            store
                .transaction(&LedgerId::new("bob"), "t1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn synonym_learning_is_idempotent() {
        let store = MemoryStore::new();
        let ledger = LedgerId::new("alice");
        let wallet = store
            .create_wallet(
                &ledger,
                NewWallet {
                    name: "星展銀行".to_string(),
                    wallet_type: WalletType::Bank,
                    synonyms: BTreeSet::new(),
                    is_default: false,
                },
            )
            .await
            .unwrap();
        assert!(store.add_wallet_synonym(&ledger, &wallet.id, "星展").await.unwrap());
        assert!(!store.add_wallet_synonym(&ledger, &wallet.id, "星展").await.unwrap());
        assert!(!store.add_wallet_synonym(&ledger, &wallet.id, "星展銀行").await.unwrap());
        let wallets = store.wallets(&ledger).await.unwrap();
        assert_eq!(wallets[0].synonyms.len(), 1);
    }

    #[tokio::test]
    async fn registry_keeps_creation_order() {
        let store = MemoryStore::new();
        let ledger = LedgerId::new("alice");
        for name in ["早餐", "午餐", "晚餐"] {
            store
                .create_category(
                    &ledger,
                    NewCategory {
                        name: name.to_string(),
                        parent_id: None,
                        synonyms: BTreeSet::new(),
                        is_income: false,
                    },
                )
                .await
                .unwrap();
        }
        let names: Vec<String> = store
            .categories(&ledger)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["早餐", "午餐", "晚餐"]);
    }
}
