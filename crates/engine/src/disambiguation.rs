//! Disambiguation coordinator.
//!
//! When a resolver cannot decide, the entry is parked in the pending cache
//! and a bounded menu goes back to the user. A callback takes the entry out
//! again (single use), merges the choice, learns the user's phrase as a
//! synonym and re-enters the pipeline at the next unresolved step.

use std::collections::BTreeSet;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::{
    CallbackPayload, CategoryEntry, Choice, ChoiceMenu, Detection, Direction, Engine, EngineError,
    LedgerId, MAX_PENDING_TTL_SECS, NewTransaction, NewWallet, Outcome, ParsedEntry,
    PendingDisambiguation, PendingKind, PendingLookup, RecordStore, ResultEngine, StoreError,
    WalletEntry, WalletResolution, WalletType, WriteResult, format_amount, rank_categories,
    resolve_payment, wallets::find_typed_wallet, writer::IdempotentWriter,
};

const CANCEL_LABEL: &str = "取消";

/// One entry on its way through the pipeline.
#[derive(Clone, Debug)]
pub(crate) struct EntryContext {
    pub(crate) ledger: LedgerId,
    pub(crate) original_text: String,
    pub(crate) parsed: ParsedEntry,
    pub(crate) source_key: Option<String>,
}

impl From<&PendingDisambiguation> for EntryContext {
    fn from(pending: &PendingDisambiguation) -> Self {
        Self {
            ledger: pending.ledger.clone(),
            original_text: pending.original_text.clone(),
            parsed: pending.parsed.clone(),
            source_key: pending.source_key.clone(),
        }
    }
}

/// What a callback asks for, checked against the pending entry.
enum Step {
    Cancel,
    Category(CategoryEntry),
    WalletType(WalletType),
    WalletConfirm(bool),
}

impl<S: RecordStore> Engine<S> {
    /// Payment step followed by the write.
    pub(crate) async fn resolve_payment_and_commit(
        &self,
        entry: EntryContext,
        category: CategoryEntry,
    ) -> ResultEngine<Outcome> {
        let wallets = self.store.wallets(&entry.ledger).await?;
        match resolve_payment(&entry.parsed.suffix, &wallets, &self.tables) {
            WalletResolution::Matched { wallet, via } => {
                debug!(
                    ledger = %entry.ledger,
                    wallet = %wallet.name,
                    via = ?via,
                    "payment resolved"
                );
                let wallet = wallet.clone();
                self.commit(entry, &category, &wallet)
                    .await
                    .map(Outcome::Committed)
            }
            WalletResolution::RequiresWalletConfirmation { suffix, detection } => {
                info!(
                    ledger = %entry.ledger,
                    %suffix,
                    detected = detection.as_ref().map(|d| d.label.as_str()),
                    kind = %crate::ErrorKind::WalletUnresolved,
                    "asking for payment method"
                );
                let menu = self.park_wallet(entry, category, detection).await?;
                Ok(Outcome::NeedsChoice(menu))
            }
        }
    }

    async fn commit(
        &self,
        entry: EntryContext,
        category: &CategoryEntry,
        wallet: &WalletEntry,
    ) -> ResultEngine<WriteResult> {
        let now = self.clock.now();
        let draft = NewTransaction {
            ledger: entry.ledger,
            amount: entry.parsed.amount,
            direction: if category.is_income {
                Direction::Income
            } else {
                Direction::Expense
            },
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            wallet_id: wallet.id.clone(),
            wallet_name: wallet.name.clone(),
            description: entry.original_text,
            date: now.with_timezone(&self.tz).date_naive(),
            source_key: entry.source_key,
        };
        IdempotentWriter::new(&self.store, self.ids.as_ref(), &self.settings.retry)
            .write(draft, now)
            .await
    }

    async fn park(
        &self,
        entry: EntryContext,
        kind: PendingKind,
        category: Option<CategoryEntry>,
        detection: Option<Detection>,
    ) -> String {
        let now = self.clock.now();
        let purged = self.pending.purge_expired(now).await;
        if purged > 0 {
            debug!(purged, "expired pending entries dropped");
        }
        let ledger = entry.ledger.clone();
        let key = self
            .pending
            .store(PendingDisambiguation {
                key: String::new(),
                kind,
                ledger: entry.ledger,
                original_text: entry.original_text,
                parsed: entry.parsed,
                category,
                detection,
                source_key: entry.source_key,
                created_at: now,
                ttl: self.pending_ttl(),
            })
            .await;
        info!(%ledger, %key, ?kind, "disambiguation started");
        key
    }

    fn pending_ttl(&self) -> Duration {
        let secs = self.settings.pending_ttl_secs.min(MAX_PENDING_TTL_SECS);
        Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    /// Park the entry and build the classification menu.
    pub(crate) async fn park_category(
        &self,
        entry: EntryContext,
        registry: &[CategoryEntry],
    ) -> ResultEngine<ChoiceMenu> {
        let ranked = rank_categories(&entry.parsed.subject, registry);
        if ranked.is_empty() {
            return Err(EngineError::Registry(
                "尚未建立任何科目，請先輸入 /start".to_string(),
            ));
        }
        let prompt = format!(
            "找不到「{}」對應的科目，請選擇分類：\n金額：{}",
            entry.parsed.subject,
            format_amount(entry.parsed.amount)
        );
        let key = self.park(entry, PendingKind::Category, None, None).await;

        let mut choices: Vec<Choice> = ranked
            .into_iter()
            .take(self.settings.menu_limit() - 1)
            .map(|category| {
                let payload = CallbackPayload::Classify {
                    category_id: category.id.clone(),
                    key: key.clone(),
                };
                Choice::new(&category.name, payload.encode())
            })
            .collect();
        choices.push(cancel_choice(&key));
        Ok(ChoiceMenu { prompt, choices })
    }

    /// Park the entry and build the payment menu: a yes/no confirmation when
    /// a concrete instrument was detected, the wallet-type menu otherwise.
    async fn park_wallet(
        &self,
        entry: EntryContext,
        category: CategoryEntry,
        detection: Option<Detection>,
    ) -> ResultEngine<ChoiceMenu> {
        let amount = format_amount(entry.parsed.amount);
        let suffix = entry.parsed.suffix.clone();
        match detection {
            Some(detection) => {
                let prompt = format!(
                    "尚未設定支付方式「{}」，要新增嗎？\n金額：{amount}",
                    detection.label
                );
                let label = detection.label.clone();
                let key = self
                    .park(entry, PendingKind::Wallet, Some(category), Some(detection))
                    .await;
                let choices = vec![
                    Choice::new(
                        format!("✅ 新增「{label}」"),
                        CallbackPayload::WalletConfirm {
                            accept: true,
                            key: key.clone(),
                        }
                        .encode(),
                    ),
                    Choice::new(
                        "❌ 選擇其他方式",
                        CallbackPayload::WalletConfirm {
                            accept: false,
                            key: key.clone(),
                        }
                        .encode(),
                    ),
                    cancel_choice(&key),
                ];
                Ok(ChoiceMenu { prompt, choices })
            }
            None => {
                let prompt = if suffix.is_empty() {
                    format!("請選擇支付方式：\n金額：{amount}")
                } else {
                    format!("無法辨識支付方式「{suffix}」，請選擇：\n金額：{amount}")
                };
                let key = self.park(entry, PendingKind::Wallet, Some(category), None).await;
                Ok(ChoiceMenu {
                    prompt,
                    choices: wallet_type_choices(&key),
                })
            }
        }
    }

    /// Continue the pipeline with the pending entry named by `payload`.
    ///
    /// The entry is consumed only once the payload fits its step; a
    /// mismatched button or a category that is gone leaves it usable.
    pub(crate) async fn resume(
        &self,
        ledger: &LedgerId,
        payload: &CallbackPayload,
    ) -> ResultEngine<Outcome> {
        let key = payload.key();
        let now = self.clock.now();
        let PendingLookup::Found(peeked) = self.pending.peek(key, ledger, now).await else {
            warn!(%ledger, key, "callback for expired or unknown pending entry");
            return Err(EngineError::PendingExpired(key.to_string()));
        };

        let step = match (payload, peeked.kind) {
            (CallbackPayload::Cancel { .. }, _) => Step::Cancel,
            (CallbackPayload::Classify { category_id, .. }, PendingKind::Category) => {
                Step::Category(self.active_category(ledger, category_id).await?)
            }
            (CallbackPayload::WalletType { wallet_type, .. }, PendingKind::Wallet) => {
                Step::WalletType(*wallet_type)
            }
            (CallbackPayload::WalletConfirm { accept, .. }, PendingKind::Wallet) => {
                Step::WalletConfirm(*accept)
            }
            (_, kind) => {
                warn!(%ledger, key, ?kind, "callback does not match the pending step");
                return Err(EngineError::Validation("選項與待確認的項目不符".to_string()));
            }
        };

        let pending = match self.pending.take(key, ledger, now).await {
            PendingLookup::Found(pending) => *pending,
            PendingLookup::Expired => {
                warn!(%ledger, key, "pending entry consumed by another callback");
                return Err(EngineError::PendingExpired(key.to_string()));
            }
        };
        info!(%ledger, key, kind = ?pending.kind, "disambiguation resumed");

        match step {
            Step::Cancel => {
                info!(%ledger, key, "entry cancelled");
                Ok(Outcome::Cancelled)
            }
            Step::Category(category) => self.resume_category(pending, category).await,
            Step::WalletType(wallet_type) => self.resume_wallet_type(pending, wallet_type).await,
            Step::WalletConfirm(accept) => self.resume_wallet_confirm(pending, accept).await,
        }
    }

    async fn active_category(
        &self,
        ledger: &LedgerId,
        category_id: &str,
    ) -> ResultEngine<CategoryEntry> {
        self.store
            .categories(ledger)
            .await?
            .into_iter()
            .find(|c| c.id == category_id && c.active)
            .ok_or_else(|| EngineError::Registry(format!("找不到科目 {category_id}")))
    }

    async fn resume_category(
        &self,
        pending: PendingDisambiguation,
        category: CategoryEntry,
    ) -> ResultEngine<Outcome> {
        self.learn_category_synonym(&pending.ledger, &category, &pending.parsed.subject)
            .await;
        self.resolve_payment_and_commit(EntryContext::from(&pending), category)
            .await
    }

    async fn resume_wallet_type(
        &self,
        pending: PendingDisambiguation,
        wallet_type: WalletType,
    ) -> ResultEngine<Outcome> {
        let category = settled_category(&pending)?;
        let wallets = self.store.wallets(&pending.ledger).await?;
        let active: Vec<&WalletEntry> = wallets.iter().filter(|w| w.active).collect();
        let wallet = match find_typed_wallet(wallet_type, &active) {
            Some(wallet) => wallet.clone(),
            None => {
                self.create_wallet(
                    &pending.ledger,
                    NewWallet {
                        name: wallet_type.label().to_string(),
                        wallet_type,
                        synonyms: BTreeSet::new(),
                        is_default: true,
                    },
                )
                .await?
            }
        };
        self.learn_wallet_synonym(&pending.ledger, &wallet, &pending.parsed.suffix)
            .await;
        self.commit(EntryContext::from(&pending), &category, &wallet)
            .await
            .map(Outcome::Committed)
    }

    async fn resume_wallet_confirm(
        &self,
        pending: PendingDisambiguation,
        accept: bool,
    ) -> ResultEngine<Outcome> {
        let category = settled_category(&pending)?;
        if !accept {
            let menu = self
                .park_wallet(EntryContext::from(&pending), category, None)
                .await?;
            return Ok(Outcome::NeedsChoice(menu));
        }

        let detection = pending
            .detection
            .clone()
            .ok_or_else(|| EngineError::Validation("沒有可新增的支付方式".to_string()))?;
        let wallets = self.store.wallets(&pending.ledger).await?;
        let wallet = match wallets
            .iter()
            .find(|w| w.active && w.knows(&detection.label))
        {
            Some(existing) => {
                let existing = existing.clone();
                self.learn_wallet_synonym(&pending.ledger, &existing, &pending.parsed.suffix)
                    .await;
                existing
            }
            None => {
                let is_default = !wallets
                    .iter()
                    .any(|w| w.active && w.wallet_type == detection.wallet_type);
                self.create_wallet(
                    &pending.ledger,
                    NewWallet {
                        name: detection.label.clone(),
                        wallet_type: detection.wallet_type,
                        synonyms: std::iter::once(pending.parsed.suffix.clone())
                            .filter(|s| !s.trim().is_empty() && s.trim() != detection.label)
                            .collect(),
                        is_default,
                    },
                )
                .await?
            }
        };
        self.commit(EntryContext::from(&pending), &category, &wallet)
            .await
            .map(Outcome::Committed)
    }

    async fn create_wallet(&self, ledger: &LedgerId, wallet: NewWallet) -> ResultEngine<WalletEntry> {
        let name = wallet.name.clone();
        match self.store.create_wallet(ledger, wallet).await {
            Ok(created) => {
                info!(%ledger, wallet = %created.name, wallet_type = %created.wallet_type, "wallet created");
                Ok(created)
            }
            Err(StoreError::Conflict(_)) => Err(EngineError::Registry(format!(
                "支付方式「{name}」已存在但已停用"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Remember `phrase` for the category. Failures are logged, never fatal.
    async fn learn_category_synonym(&self, ledger: &LedgerId, category: &CategoryEntry, phrase: &str) {
        if phrase.trim().is_empty() || category.knows(phrase) {
            return;
        }
        match self
            .store
            .add_category_synonym(ledger, &category.id, phrase)
            .await
        {
            Ok(true) => info!(%ledger, category = %category.name, synonym = phrase, "category synonym learned"),
            Ok(false) => {}
            Err(err) => warn!(%ledger, category = %category.name, error = %err, "could not learn category synonym"),
        }
    }

    /// Remember `phrase` for the wallet. Failures are logged, never fatal.
    async fn learn_wallet_synonym(&self, ledger: &LedgerId, wallet: &WalletEntry, phrase: &str) {
        if phrase.trim().is_empty() || wallet.knows(phrase) {
            return;
        }
        match self.store.add_wallet_synonym(ledger, &wallet.id, phrase).await {
            Ok(true) => info!(%ledger, wallet = %wallet.name, synonym = phrase, "wallet synonym learned"),
            Ok(false) => {}
            Err(err) => warn!(%ledger, wallet = %wallet.name, error = %err, "could not learn wallet synonym"),
        }
    }
}

fn settled_category(pending: &PendingDisambiguation) -> ResultEngine<CategoryEntry> {
    pending
        .category
        .clone()
        .ok_or_else(|| EngineError::Validation("缺少科目".to_string()))
}

fn cancel_choice(key: &str) -> Choice {
    Choice::new(
        CANCEL_LABEL,
        CallbackPayload::Cancel {
            key: key.to_string(),
        }
        .encode(),
    )
}

fn wallet_type_choices(key: &str) -> Vec<Choice> {
    let mut choices: Vec<Choice> = WalletType::MENU
        .iter()
        .map(|wallet_type| {
            let icon = match wallet_type {
                WalletType::Cash => "💵",
                WalletType::Bank => "🏦",
                WalletType::Credit => "💳",
                WalletType::Mobile => "📱",
            };
            Choice::new(
                format!("{icon} {}", wallet_type.label()),
                CallbackPayload::WalletType {
                    wallet_type: *wallet_type,
                    key: key.to_string(),
                }
                .encode(),
            )
        })
        .collect();
    choices.push(cancel_choice(key));
    choices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_menu_has_three_types_and_cancel() {
        let choices = wallet_type_choices("k1");
        let payloads: Vec<&str> = choices.iter().map(|c| c.payload.as_str()).collect();
        assert_eq!(
            payloads,
            vec![
                "wallet_type:cash:k1",
                "wallet_type:bank:k1",
                "wallet_type:credit:k1",
                "cancel:k1"
            ]
        );
        assert_eq!(choices[0].label, "💵 現金");
    }
}
