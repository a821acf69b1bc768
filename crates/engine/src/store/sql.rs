use std::collections::BTreeSet;

use sea_orm::{
    ActiveValue, DatabaseConnection, DbErr, QueryFilter, QueryOrder, SqlErr, prelude::*,
};
use uuid::Uuid;

use super::{
    LedgerId, NewCategory, NewWallet, RecordStore, StoreError, clean_synonym, join_synonyms,
    split_synonyms,
};
use crate::{
    CategoryEntry, TransactionRecord, WalletEntry, categories, transactions, wallets,
    wallets::STATUS_ACTIVE,
};

/// [`RecordStore`] backed by a sea-orm connection.
///
/// Expects the schema created by the `migration` crate.
#[derive(Clone, Debug)]
pub struct SqlStore {
    database: DatabaseConnection,
}

impl SqlStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.database
    }

    async fn category_model(
        &self,
        ledger: &LedgerId,
        category_id: &str,
    ) -> Result<categories::Model, StoreError> {
        categories::Entity::find_by_id(category_id.to_string())
            .filter(categories::Column::LedgerId.eq(ledger.as_str()))
            .one(&self.database)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::NotFound(category_id.to_string()))
    }

    async fn wallet_model(
        &self,
        ledger: &LedgerId,
        wallet_id: &str,
    ) -> Result<wallets::Model, StoreError> {
        wallets::Entity::find_by_id(wallet_id.to_string())
            .filter(wallets::Column::LedgerId.eq(ledger.as_str()))
            .one(&self.database)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::NotFound(wallet_id.to_string()))
    }

    async fn next_category_position(&self, ledger: &LedgerId) -> Result<i32, StoreError> {
        let last = categories::Entity::find()
            .filter(categories::Column::LedgerId.eq(ledger.as_str()))
            .order_by_desc(categories::Column::Position)
            .one(&self.database)
            .await
            .map_err(map_db_err)?;
        Ok(last.map_or(0, |model| model.position + 1))
    }

    async fn next_wallet_position(&self, ledger: &LedgerId) -> Result<i32, StoreError> {
        let last = wallets::Entity::find()
            .filter(wallets::Column::LedgerId.eq(ledger.as_str()))
            .order_by_desc(wallets::Column::Position)
            .one(&self.database)
            .await
            .map_err(map_db_err)?;
        Ok(last.map_or(0, |model| model.position + 1))
    }
}

impl RecordStore for SqlStore {
    async fn categories(&self, ledger: &LedgerId) -> Result<Vec<CategoryEntry>, StoreError> {
        let models = categories::Entity::find()
            .filter(categories::Column::LedgerId.eq(ledger.as_str()))
            .order_by_asc(categories::Column::Position)
            .order_by_asc(categories::Column::Id)
            .all(&self.database)
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(CategoryEntry::from).collect())
    }

    async fn wallets(&self, ledger: &LedgerId) -> Result<Vec<WalletEntry>, StoreError> {
        let models = wallets::Entity::find()
            .filter(wallets::Column::LedgerId.eq(ledger.as_str()))
            .order_by_asc(wallets::Column::Position)
            .order_by_asc(wallets::Column::Id)
            .all(&self.database)
            .await
            .map_err(map_db_err)?;
        models.into_iter().map(WalletEntry::try_from).collect()
    }

    async fn create_category(
        &self,
        ledger: &LedgerId,
        category: NewCategory,
    ) -> Result<CategoryEntry, StoreError> {
        let position = self.next_category_position(ledger).await?;
        let synonyms: BTreeSet<String> = category
            .synonyms
            .iter()
            .filter_map(|s| clean_synonym(s))
            .collect();
        let model = categories::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            ledger_id: ActiveValue::Set(ledger.to_string()),
            name: ActiveValue::Set(category.name),
            parent_id: ActiveValue::Set(category.parent_id),
            synonyms: ActiveValue::Set(join_synonyms(&synonyms)),
            is_income: ActiveValue::Set(category.is_income),
            active: ActiveValue::Set(true),
            position: ActiveValue::Set(position),
        }
        .insert(&self.database)
        .await
        .map_err(map_db_err)?;
        Ok(model.into())
    }

    async fn create_wallet(
        &self,
        ledger: &LedgerId,
        wallet: NewWallet,
    ) -> Result<WalletEntry, StoreError> {
        let position = self.next_wallet_position(ledger).await?;
        let synonyms: BTreeSet<String> = wallet
            .synonyms
            .iter()
            .filter_map(|s| clean_synonym(s))
            .collect();
        let model = wallets::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            ledger_id: ActiveValue::Set(ledger.to_string()),
            name: ActiveValue::Set(wallet.name),
            wallet_type: ActiveValue::Set(wallet.wallet_type.as_str().to_string()),
            synonyms: ActiveValue::Set(join_synonyms(&synonyms)),
            is_default: ActiveValue::Set(wallet.is_default),
            status: ActiveValue::Set(STATUS_ACTIVE.to_string()),
            position: ActiveValue::Set(position),
        }
        .insert(&self.database)
        .await
        .map_err(map_db_err)?;
        model.try_into()
    }

    async fn add_category_synonym(
        &self,
        ledger: &LedgerId,
        category_id: &str,
        synonym: &str,
    ) -> Result<bool, StoreError> {
        let model = self.category_model(ledger, category_id).await?;
        let Some(synonym) = clean_synonym(synonym) else {
            return Ok(false);
        };
        let entry = CategoryEntry::from(model.clone());
        if entry.knows(&synonym) {
            return Ok(false);
        }
        let mut synonyms = split_synonyms(&model.synonyms);
        synonyms.insert(synonym);
        let mut active: categories::ActiveModel = model.into();
        active.synonyms = ActiveValue::Set(join_synonyms(&synonyms));
        active.update(&self.database).await.map_err(map_db_err)?;
        Ok(true)
    }

    async fn add_wallet_synonym(
        &self,
        ledger: &LedgerId,
        wallet_id: &str,
        synonym: &str,
    ) -> Result<bool, StoreError> {
        let model = self.wallet_model(ledger, wallet_id).await?;
        let Some(synonym) = clean_synonym(synonym) else {
            return Ok(false);
        };
        let entry = WalletEntry::try_from(model.clone())?;
        if entry.knows(&synonym) {
            return Ok(false);
        }
        let mut synonyms = split_synonyms(&model.synonyms);
        synonyms.insert(synonym);
        let mut active: wallets::ActiveModel = model.into();
        active.synonyms = ActiveValue::Set(join_synonyms(&synonyms));
        active.update(&self.database).await.map_err(map_db_err)?;
        Ok(true)
    }

    async fn transactions(&self, ledger: &LedgerId) -> Result<Vec<TransactionRecord>, StoreError> {
        let models = transactions::Entity::find()
            .filter(transactions::Column::LedgerId.eq(ledger.as_str()))
            .order_by_asc(transactions::Column::CreatedAt)
            .order_by_asc(transactions::Column::Id)
            .all(&self.database)
            .await
            .map_err(map_db_err)?;
        models.into_iter().map(TransactionRecord::try_from).collect()
    }

    async fn transaction(
        &self,
        ledger: &LedgerId,
        id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        transactions::Entity::find_by_id((ledger.to_string(), id.to_string()))
            .one(&self.database)
            .await
            .map_err(map_db_err)?
            .map(TransactionRecord::try_from)
            .transpose()
    }

    async fn transaction_by_source(
        &self,
        ledger: &LedgerId,
        source_key: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        transactions::Entity::find()
            .filter(transactions::Column::LedgerId.eq(ledger.as_str()))
            .filter(transactions::Column::SourceKey.eq(source_key))
            .one(&self.database)
            .await
            .map_err(map_db_err)?
            .map(TransactionRecord::try_from)
            .transpose()
    }

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        transactions::Entity::insert(transactions::ActiveModel::from(record))
            .exec_without_returning(&self.database)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}

/// Unique violations become conflicts; connection and lock failures are
/// transient.
fn map_db_err(err: DbErr) -> StoreError {
    if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
        return StoreError::Conflict(detail);
    }
    let message = err.to_string();
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => StoreError::Unavailable(message),
        _ if message.contains("database is locked") || message.contains("database is busy") => {
            StoreError::Unavailable(message)
        }
        DbErr::RecordNotFound(_) => StoreError::NotFound(message),
        _ => StoreError::Backend(message),
    }
}
