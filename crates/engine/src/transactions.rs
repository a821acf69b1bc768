//! Transaction records written by the pipeline.
//!
//! A record is created once by the writer and never mutated by the engine
//! afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{LedgerId, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Income => "收入",
            Self::Expense => "支出",
        }
    }
}

impl TryFrom<&str> for Direction {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(StoreError::Backend(format!("invalid direction: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Confirmed,
    Voided,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Voided => "voided",
        }
    }
}

impl TryFrom<&str> for RecordStatus {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "confirmed" => Ok(Self::Confirmed),
            "voided" => Ok(Self::Voided),
            other => Err(StoreError::Backend(format!("invalid status: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique within `ledger`.
    pub id: String,
    pub ledger: LedgerId,
    pub amount: i64,
    pub direction: Direction,
    pub category_id: String,
    pub category_name: String,
    pub wallet_id: String,
    pub wallet_name: String,
    pub description: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: RecordStatus,
    /// Identifier of the chat event that produced the record.
    pub source_key: Option<String>,
}

/// A fully resolved record that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    pub ledger: LedgerId,
    pub amount: i64,
    pub direction: Direction,
    pub category_id: String,
    pub category_name: String,
    pub wallet_id: String,
    pub wallet_name: String,
    pub description: String,
    pub date: NaiveDate,
    pub source_key: Option<String>,
}

impl NewTransaction {
    pub fn into_record(self, id: String, created_at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            id,
            ledger: self.ledger,
            amount: self.amount,
            direction: self.direction,
            category_id: self.category_id,
            category_name: self.category_name,
            wallet_id: self.wallet_id,
            wallet_name: self.wallet_name,
            description: self.description,
            date: self.date,
            created_at,
            status: RecordStatus::Confirmed,
            source_key: self.source_key,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub ledger_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub amount: i64,
    pub direction: String,
    pub category_id: String,
    pub category_name: String,
    pub wallet_id: String,
    pub wallet_name: String,
    pub description: String,
    pub occurred_on: Date,
    pub created_at: DateTimeUtc,
    pub status: String,
    pub source_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&TransactionRecord> for ActiveModel {
    fn from(record: &TransactionRecord) -> Self {
        use sea_orm::ActiveValue::Set;

        Self {
            ledger_id: Set(record.ledger.to_string()),
            id: Set(record.id.clone()),
            amount: Set(record.amount),
            direction: Set(record.direction.as_str().to_string()),
            category_id: Set(record.category_id.clone()),
            category_name: Set(record.category_name.clone()),
            wallet_id: Set(record.wallet_id.clone()),
            wallet_name: Set(record.wallet_name.clone()),
            description: Set(record.description.clone()),
            occurred_on: Set(record.date),
            created_at: Set(record.created_at),
            status: Set(record.status.as_str().to_string()),
            source_key: Set(record.source_key.clone()),
        }
    }
}

impl TryFrom<Model> for TransactionRecord {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            direction: Direction::try_from(model.direction.as_str())?,
            status: RecordStatus::try_from(model.status.as_str())?,
            id: model.id,
            ledger: LedgerId::new(model.ledger_id),
            amount: model.amount,
            category_id: model.category_id,
            category_name: model.category_name,
            wallet_id: model.wallet_id,
            wallet_name: model.wallet_name,
            description: model.description,
            date: model.occurred_on,
            created_at: model.created_at,
            source_key: model.source_key,
        })
    }
}
