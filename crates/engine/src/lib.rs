//! Quick-entry bookkeeping engine.
//!
//! Turns short chat messages such as `午餐120現金` into transaction records:
//! parse, resolve category and payment method against the ledger's
//! registries, ask the user when either is ambiguous, then write the record
//! exactly once and render a reply.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{debug, info, warn};

pub use callback::{CallbackError, CallbackPayload};
pub use categories::{
    CategoryEntry, CategoryMatch, CategoryResolution, MatchTier, rank_categories, resolve_category,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, ErrorKind};
pub use lookup::{
    BankEntry, CurrencyTable, DefaultCategory, DefaultWallet, KeywordEntry, LookupError,
    LookupTables, RegistryDefaults,
};
pub use parsing::{ParseError, ParsedEntry, parse_entry};
pub use pending::{PendingCache, PendingDisambiguation, PendingKind, PendingLookup};
pub use reply::{Choice, ChoiceMenu, MAX_LABEL_CHARS, Reply, ReplyFormatter, format_amount};
pub use retry::{Exhausted, RetryPolicy, Transient};
pub use settings::{EngineSettings, MAX_CATEGORY_MENU, MAX_PENDING_TTL_SECS};
pub use store::{
    LedgerId, MemoryStore, NewCategory, NewWallet, RecordStore, SqlStore, StoreError,
};
pub use transactions::{Direction, NewTransaction, RecordStatus, TransactionRecord};
pub use wallets::{
    Detection, DetectionSource, WalletEntry, WalletMatch, WalletResolution, WalletType,
    resolve_payment,
};
pub use writer::{IdSource, IdempotentWriter, TimeBasedIds, WriteResult};

mod callback;
mod categories;
mod clock;
mod disambiguation;
mod error;
mod lookup;
mod matching;
mod parsing;
mod pending;
mod reply;
mod retry;
mod settings;
mod store;
mod transactions;
mod util;
mod wallets;
mod writer;

type ResultEngine<T> = Result<T, EngineError>;

/// Result of one pipeline pass.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// A record was written, or had already been written.
    Committed(WriteResult),
    /// The pipeline is parked until the user picks one of the choices.
    NeedsChoice(ChoiceMenu),
    /// The user cancelled; nothing was written.
    Cancelled,
}

/// The pipeline. Cheap to share behind an `Arc`; every call carries its own
/// state and the pending cache is the only shared mutable part.
pub struct Engine<S> {
    store: S,
    pending: PendingCache,
    tables: Arc<LookupTables>,
    settings: EngineSettings,
    tz: Tz,
    formatter: ReplyFormatter,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

impl<S: RecordStore> Engine<S> {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder::new(store)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pending(&self) -> &PendingCache {
        &self.pending
    }

    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run a text message through the pipeline.
    ///
    /// `source_key` identifies the chat event; a second delivery of the same
    /// event returns the record written by the first one.
    pub async fn process_text(
        &self,
        ledger: &LedgerId,
        text: &str,
        source_key: Option<&str>,
    ) -> ResultEngine<Outcome> {
        let parsed = parse_entry(text, &self.tables)?;
        debug!(
            %ledger,
            subject = %parsed.subject,
            amount = parsed.amount,
            suffix = %parsed.suffix,
            "entry parsed"
        );

        let entry = disambiguation::EntryContext {
            ledger: ledger.clone(),
            original_text: util::single_line(text),
            parsed,
            source_key: source_key.map(str::to_string),
        };

        let categories = self.store.categories(ledger).await?;
        let category = match resolve_category(
            &entry.parsed.subject,
            &categories,
            self.settings.fuzzy_threshold,
        ) {
            CategoryResolution::Matched(hit) => {
                debug!(
                    %ledger,
                    category = %hit.entry.name,
                    tier = ?hit.tier,
                    score = hit.score,
                    "category resolved"
                );
                hit.entry.clone()
            }
            CategoryResolution::RequiresClassification { subject } => {
                info!(%ledger, %subject, kind = %ErrorKind::CategoryUnresolved, "asking for category");
                let menu = self.park_category(entry, &categories).await?;
                return Ok(Outcome::NeedsChoice(menu));
            }
        };

        self.resolve_payment_and_commit(entry, category).await
    }

    /// Resume a parked entry from a button press.
    pub async fn process_callback(
        &self,
        ledger: &LedgerId,
        payload: &CallbackPayload,
    ) -> ResultEngine<Outcome> {
        self.resume(ledger, payload).await
    }

    /// [`process_text`](Self::process_text) rendered as a reply.
    pub async fn handle_text(&self, ledger: &LedgerId, text: &str, source_key: Option<&str>) -> Reply {
        match self.process_text(ledger, text, source_key).await {
            Ok(outcome) => self.render(outcome),
            Err(err) => self.render_error(ledger, &err, Some(text)),
        }
    }

    /// Parse a raw callback payload and resume, rendered as a reply.
    pub async fn handle_callback(&self, ledger: &LedgerId, raw_payload: &str) -> Reply {
        let payload = match raw_payload.parse::<CallbackPayload>() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%ledger, payload = raw_payload, error = %err, "unreadable callback");
                return self.render_error(ledger, &EngineError::Validation(err.to_string()), None);
            }
        };
        match self.process_callback(ledger, &payload).await {
            Ok(outcome) => self.render(outcome),
            Err(err) => self.render_error(ledger, &err, None),
        }
    }

    pub fn render(&self, outcome: Outcome) -> Reply {
        match outcome {
            Outcome::Committed(result) => Reply::text(self.formatter.success(&result)),
            Outcome::NeedsChoice(menu) => menu.into(),
            Outcome::Cancelled => Reply::text(self.formatter.cancelled()),
        }
    }

    fn render_error(&self, ledger: &LedgerId, err: &EngineError, original: Option<&str>) -> Reply {
        match err.kind() {
            ErrorKind::Storage => warn!(%ledger, kind = %err.kind(), error = %err, "entry not recorded"),
            _ => debug!(%ledger, kind = %err.kind(), error = %err, "entry rejected"),
        }
        Reply::text(self.formatter.failure(err, original, self.clock.now()))
    }

    /// Seed the default registry into a ledger that has no categories or no
    /// wallets. Returns `true` when anything was created.
    pub async fn bootstrap_ledger(&self, ledger: &LedgerId) -> ResultEngine<bool> {
        let mut seeded = false;
        let defaults = &self.tables.defaults;

        if self.store.categories(ledger).await?.is_empty() {
            for category in &defaults.categories {
                self.store
                    .create_category(
                        ledger,
                        NewCategory {
                            name: category.name.clone(),
                            parent_id: None,
                            synonyms: category.synonyms.iter().cloned().collect(),
                            is_income: category.is_income,
                        },
                    )
                    .await?;
            }
            seeded |= !defaults.categories.is_empty();
        }

        if self.store.wallets(ledger).await?.is_empty() {
            for wallet in &defaults.wallets {
                self.store
                    .create_wallet(
                        ledger,
                        NewWallet {
                            name: wallet.name.clone(),
                            wallet_type: wallet.wallet_type,
                            synonyms: wallet.synonyms.iter().cloned().collect(),
                            is_default: wallet.is_default,
                        },
                    )
                    .await?;
            }
            seeded |= !defaults.wallets.is_empty();
        }

        if seeded {
            info!(%ledger, "ledger bootstrapped with default registry");
        }
        Ok(seeded)
    }
}

pub struct EngineBuilder<S> {
    store: S,
    settings: EngineSettings,
    tables: Option<LookupTables>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdSource>>,
    pending: Option<PendingCache>,
}

impl<S: RecordStore> EngineBuilder<S> {
    fn new(store: S) -> Self {
        Self {
            store,
            settings: EngineSettings::default(),
            tables: None,
            clock: None,
            ids: None,
            pending: None,
        }
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use these tables instead of loading them from the settings.
    pub fn lookup_tables(mut self, tables: LookupTables) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Share a pending cache with another engine instance.
    pub fn pending_cache(mut self, pending: PendingCache) -> Self {
        self.pending = Some(pending);
        self
    }

    /// Construct `Engine`
    pub fn build(self) -> ResultEngine<Engine<S>> {
        self.settings.validate()?;
        let tables = match (self.tables, &self.settings.lookup_tables) {
            (Some(tables), _) => tables,
            (None, Some(path)) => LookupTables::from_path(path)?,
            (None, None) => LookupTables::embedded()?,
        };
        let tz = self.settings.time_zone()?;
        let formatter = ReplyFormatter::new(tz, self.settings.remark_max_chars);
        Ok(Engine {
            store: self.store,
            pending: self.pending.unwrap_or_default(),
            tables: Arc::new(tables),
            tz,
            formatter,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            ids: self.ids.unwrap_or_else(|| Arc::new(TimeBasedIds)),
            settings: self.settings,
        })
    }
}
