//! Short-lived, single-use disambiguation state.
//!
//! A pending entry is parked when a resolver cannot decide and is consumed
//! by exactly one callback. Reads after `created_at + ttl` are reported as
//! expired even if the entry has not been purged yet.

use std::{collections::HashMap, sync::Arc};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{CategoryEntry, Detection, LedgerId, ParsedEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingKind {
    /// Waiting for the user to pick a category.
    Category,
    /// Waiting for the user to pick or confirm a payment method.
    Wallet,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingDisambiguation {
    /// Assigned by [`PendingCache::store`].
    pub key: String,
    pub kind: PendingKind,
    pub ledger: LedgerId,
    pub original_text: String,
    pub parsed: ParsedEntry,
    /// Category already settled before the wallet step.
    pub category: Option<CategoryEntry>,
    /// Instrument detected from the suffix, offered for confirmation.
    pub detection: Option<Detection>,
    pub source_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl PendingDisambiguation {
    /// `None` when the deadline lies beyond the representable range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.checked_add_signed(self.ttl)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now > deadline)
    }
}

#[derive(Debug, PartialEq)]
pub enum PendingLookup {
    Found(Box<PendingDisambiguation>),
    /// Missing, consumed, past its TTL or owned by another ledger.
    Expired,
}

/// Shared pending-entry cache. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct PendingCache {
    inner: Arc<Mutex<HashMap<String, PendingDisambiguation>>>,
}

impl PendingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `entry` under a fresh opaque key and return the key.
    pub async fn store(&self, mut entry: PendingDisambiguation) -> String {
        let mut guard = self.inner.lock().await;
        let key = loop {
            let candidate = new_key();
            if !guard.contains_key(&candidate) {
                break candidate;
            }
        };
        entry.key = key.clone();
        guard.insert(key.clone(), entry);
        key
    }

    /// Remove and return the entry for `key`.
    ///
    /// An entry owned by another ledger is left in place and reported as
    /// expired; an entry past its TTL is dropped.
    pub async fn take(&self, key: &str, ledger: &LedgerId, now: DateTime<Utc>) -> PendingLookup {
        let mut guard = self.inner.lock().await;
        let state = guard
            .get(key)
            .map(|entry| (&entry.ledger == ledger, entry.is_expired(now)));
        match state {
            None | Some((false, _)) => PendingLookup::Expired,
            Some((true, true)) => {
                guard.remove(key);
                PendingLookup::Expired
            }
            Some((true, false)) => guard
                .remove(key)
                .map_or(PendingLookup::Expired, |entry| PendingLookup::Found(Box::new(entry))),
        }
    }

    /// Copy of the live entry for `key`, left in the cache.
    pub async fn peek(&self, key: &str, ledger: &LedgerId, now: DateTime<Utc>) -> PendingLookup {
        let guard = self.inner.lock().await;
        match guard.get(key) {
            Some(entry) if &entry.ledger == ledger && !entry.is_expired(now) => {
                PendingLookup::Found(Box::new(entry.clone()))
            }
            _ => PendingLookup::Expired,
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.inner.lock().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now));
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

fn new_key() -> String {
    let uuid = Uuid::new_v4();
    URL_SAFE_NO_PAD.encode(&uuid.as_bytes()[..8])
}
