//! Idempotent transaction writer.
//!
//! Every record is written at most once per user action:
//! - a record already committed under the same source key is returned as is;
//! - ids are checked before insert and regenerated on collision;
//! - transient failures are retried with the configured backoff, and a
//!   conflict after such a retry is matched against what actually landed.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    EngineError, LedgerId, NewTransaction, RecordStore, StoreError, TransactionRecord,
    retry::RetryPolicy,
};

/// Upper bound on id regenerations for one write.
const MAX_ID_ATTEMPTS: u32 = 5;

/// Produces record ids. Implementations should make collisions rare; the
/// writer handles the rest.
pub trait IdSource: Send + Sync {
    fn next_id(&self, now: DateTime<Utc>) -> String;
}

/// `YYYYMMDDhhmmssSSS` followed by six random hex digits.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeBasedIds;

impl IdSource for TimeBasedIds {
    fn next_id(&self, now: DateTime<Utc>) -> String {
        let random = Uuid::new_v4().simple().to_string();
        format!("{}{}", now.format("%Y%m%d%H%M%S%3f"), &random[..6])
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteResult {
    Written(TransactionRecord),
    /// The same action had already been committed; nothing new was stored.
    AlreadyWritten(TransactionRecord),
}

impl WriteResult {
    pub fn record(&self) -> &TransactionRecord {
        match self {
            WriteResult::Written(record) | WriteResult::AlreadyWritten(record) => record,
        }
    }

    pub fn into_record(self) -> TransactionRecord {
        match self {
            WriteResult::Written(record) | WriteResult::AlreadyWritten(record) => record,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, WriteResult::AlreadyWritten(_))
    }
}

pub struct IdempotentWriter<'a, S> {
    store: &'a S,
    ids: &'a dyn IdSource,
    policy: &'a RetryPolicy,
}

impl<'a, S: RecordStore> IdempotentWriter<'a, S> {
    pub fn new(store: &'a S, ids: &'a dyn IdSource, policy: &'a RetryPolicy) -> Self {
        Self { store, ids, policy }
    }

    pub async fn write(
        &self,
        draft: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<WriteResult, EngineError> {
        let ledger = draft.ledger.clone();
        if let Some(source_key) = draft.source_key.as_deref()
            && let Some(existing) = self.find_by_source(&ledger, source_key).await?
        {
            info!(%ledger, record_id = %existing.id, source_key, "source already committed");
            return Ok(WriteResult::AlreadyWritten(existing));
        }

        let id = self.allocate_id(&ledger, now).await?;
        let mut record = draft.into_record(id, now);
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;
        let mut regenerations = 0;

        loop {
            match self.store.insert_transaction(&record).await {
                Ok(()) => {
                    info!(
                        %ledger,
                        record_id = %record.id,
                        amount = record.amount,
                        attempt,
                        "transaction written"
                    );
                    return Ok(WriteResult::Written(record));
                }
                Err(StoreError::Conflict(detail)) => {
                    if let Some(existing) = self.find_landed(&record).await? {
                        info!(%ledger, record_id = %existing.id, attempt, "write already landed");
                        // Our own earlier attempt went through despite the error.
                        if attempt > 1 && existing.id == record.id {
                            return Ok(WriteResult::Written(existing));
                        }
                        return Ok(WriteResult::AlreadyWritten(existing));
                    }
                    regenerations += 1;
                    if regenerations >= MAX_ID_ATTEMPTS {
                        error!(%ledger, record_id = %record.id, %detail, "id collisions exhausted");
                        return Err(EngineError::Storage {
                            attempts: attempt,
                            source: StoreError::Conflict(detail),
                        });
                    }
                    warn!(%ledger, record_id = %record.id, %detail, "id collision on insert");
                    record.id = self.allocate_id(&ledger, now).await?;
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        %ledger,
                        record_id = %record.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "insert failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        %ledger,
                        record_id = %record.id,
                        attempt,
                        error = %err,
                        "insert failed, giving up"
                    );
                    return Err(EngineError::Storage {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Pick an id that is not taken in `ledger` yet.
    async fn allocate_id(&self, ledger: &LedgerId, now: DateTime<Utc>) -> Result<String, EngineError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id(now);
            let taken = self
                .policy
                .run("check id", || self.store.transaction(ledger, &id))
                .await?;
            if taken.is_none() {
                return Ok(id);
            }
            warn!(%ledger, record_id = %id, "id already taken, regenerating");
        }
        error!(%ledger, "could not allocate a free id");
        Err(EngineError::Storage {
            attempts: MAX_ID_ATTEMPTS,
            source: StoreError::Conflict("no free record id".to_string()),
        })
    }

    async fn find_by_source(
        &self,
        ledger: &LedgerId,
        source_key: &str,
    ) -> Result<Option<TransactionRecord>, EngineError> {
        Ok(self
            .policy
            .run("find source key", || {
                self.store.transaction_by_source(ledger, source_key)
            })
            .await?)
    }

    /// The stored copy of `record` if an earlier attempt already committed it.
    async fn find_landed(
        &self,
        record: &TransactionRecord,
    ) -> Result<Option<TransactionRecord>, EngineError> {
        if let Some(source_key) = record.source_key.as_deref()
            && let Some(existing) = self.find_by_source(&record.ledger, source_key).await?
        {
            return Ok(Some(existing));
        }
        let existing = self
            .policy
            .run("check id", || self.store.transaction(&record.ledger, &record.id))
            .await?;
        Ok(existing.filter(|existing| same_action(existing, record)))
    }
}

fn same_action(stored: &TransactionRecord, ours: &TransactionRecord) -> bool {
    match (&stored.source_key, &ours.source_key) {
        (Some(a), Some(b)) => a == b,
        _ => {
            stored.amount == ours.amount
                && stored.direction == ours.direction
                && stored.category_id == ours.category_id
                && stored.wallet_id == ours.wallet_id
                && stored.description == ours.description
                && stored.created_at == ours.created_at
        }
    }
}
