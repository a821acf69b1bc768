use std::{collections::BTreeSet, sync::Arc};

use chrono::{NaiveDate, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};

use engine::{
    Direction, Engine, EngineSettings, LedgerId, ManualClock, NewCategory, NewWallet, Outcome,
    RecordStatus, RecordStore, RetryPolicy, SqlStore, StoreError, TransactionRecord, WalletType,
};
use migration::MigratorTrait;

async fn store() -> (SqlStore, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    (SqlStore::new(db.clone()), db)
}

async fn engine() -> (Engine<SqlStore>, LedgerId) {
    let (store, _db) = store().await;
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap());
    let engine = Engine::builder(store)
        .settings(EngineSettings {
            retry: RetryPolicy::immediate(3),
            ..EngineSettings::default()
        })
        .clock(Arc::new(clock))
        .build()
        .unwrap();
    let ledger = LedgerId::new("tg:42");
    engine.bootstrap_ledger(&ledger).await.unwrap();
    (engine, ledger)
}

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

fn synonyms(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn records_round_trip() {
    let (store, _db) = store().await;
    let ledger = LedgerId::new("alice");
    let original = record("20260301040000000abcdef", Some("tg:1:1"));

    store.insert_transaction(&original).await.unwrap();

    assert_eq!(
        store.transaction(&ledger, &original.id).await.unwrap(),
        Some(original.clone())
    );
    assert_eq!(
        store.transaction_by_source(&ledger, "tg:1:1").await.unwrap(),
        Some(original.clone())
    );
    assert_eq!(store.transactions(&ledger).await.unwrap(), vec![original]);
}

#[tokio::test]
async fn duplicate_id_or_source_key_is_a_conflict() {
    let (store, _db) = store().await;

    store.insert_transaction(&record("A", Some("k1"))).await.unwrap();

    let same_id = store.insert_transaction(&record("A", Some("k2"))).await;
    assert!(matches!(same_id, Err(StoreError::Conflict(_))));

    let same_key = store.insert_transaction(&record("B", Some("k1"))).await;
    assert!(matches!(same_key, Err(StoreError::Conflict(_))));

    // Records without a source key never collide on it.
    store.insert_transaction(&record("C", None)).await.unwrap();
    store.insert_transaction(&record("D", None)).await.unwrap();

    let ledger = LedgerId::new("alice");
    assert_eq!(store.transactions(&ledger).await.unwrap().len(), 3);
}

#[tokio::test]
async fn ids_are_scoped_to_the_ledger() {
    let (store, _db) = store().await;
    let mut other = record("A", None);
    other.ledger = LedgerId::new("bob");

    store.insert_transaction(&record("A", None)).await.unwrap();
    store.insert_transaction(&other).await.unwrap();

    assert!(
        store
            .transaction(&LedgerId::new("carol"), "A")
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        store.transactions(&LedgerId::new("bob")).await.unwrap(),
        vec![other]
    );
}

#[tokio::test]
async fn registries_keep_creation_order_and_learn_synonyms() {
    let (store, _db) = store().await;
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

    let lunch = store.categories(&ledger).await.unwrap().remove(1);
    assert!(store.add_category_synonym(&ledger, &lunch.id, "便當").await.unwrap());
    assert!(!store.add_category_synonym(&ledger, &lunch.id, "便當").await.unwrap());
    assert!(!store.add_category_synonym(&ledger, &lunch.id, "午餐").await.unwrap());
    let lunch = store.categories(&ledger).await.unwrap().remove(1);
    assert_eq!(lunch.synonyms, synonyms(&["便當"]));
}

#[tokio::test]
async fn wallet_names_are_unique_per_ledger() {
    let (store, _db) = store().await;
    let ledger = LedgerId::new("alice");
    let cash = NewWallet {
        name: "現金".to_string(),
        wallet_type: WalletType::Cash,
        synonyms: synonyms(&["錢包"]),
        is_default: true,
    };

    let created = store.create_wallet(&ledger, cash.clone()).await.unwrap();
    assert!(created.active);
    assert_eq!(created.synonyms, synonyms(&["錢包"]));

    let again = store.create_wallet(&ledger, cash.clone()).await;
    assert!(matches!(again, Err(StoreError::Conflict(_))));

    store
        .create_wallet(&LedgerId::new("bob"), cash)
        .await
        .unwrap();

    assert!(store.add_wallet_synonym(&ledger, &created.id, "零錢").await.unwrap());
    let wallets = store.wallets(&ledger).await.unwrap();
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0].synonyms, synonyms(&["錢包", "零錢"]));
}

#[tokio::test]
async fn unknown_registry_entry_is_not_found() {
    let (store, _db) = store().await;

    let err = store
        .add_wallet_synonym(&LedgerId::new("alice"), "missing", "x")
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn pipeline_commits_through_sqlite() {
    let (engine, ledger) = engine().await;

    let Outcome::Committed(result) = engine
        .process_text(&ledger, "午餐120現金", Some("tg:42:7"))
        .await
        .unwrap()
    else {
        panic!("expected a committed record");
    };

    let stored = engine.store().transactions(&ledger).await.unwrap();
    assert_eq!(stored, vec![result.record().clone()]);

    let Outcome::Committed(again) = engine
        .process_text(&ledger, "午餐120現金", Some("tg:42:7"))
        .await
        .unwrap()
    else {
        panic!("expected a committed record");
    };
    assert!(again.is_duplicate());
    assert_eq!(engine.store().transactions(&ledger).await.unwrap().len(), 1);
}

#[tokio::test]
async fn disambiguation_persists_new_wallet_and_synonym() {
    let (engine, ledger) = engine().await;

    let outcome = engine.process_text(&ledger, "飯糰28星展", None).await.unwrap();
    let Outcome::NeedsChoice(menu) = outcome else {
        panic!("expected a category menu");
    };
    let breakfast = engine
        .store()
        .categories(&ledger)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "早餐")
        .unwrap();
    let key = menu.choices[0].payload.rsplit(':').next().unwrap();
    let raw = format!("classify:{}:{key}", breakfast.id);

    let reply = engine.handle_callback(&ledger, &raw).await;
    let accept = reply
        .choices
        .iter()
        .find(|c| c.payload.starts_with("wallet_confirm:yes:"))
        .unwrap()
        .payload
        .clone();

    let reply = engine.handle_callback(&ledger, &accept).await;
    assert!(reply.text.starts_with("✅ 記帳成功"));
    assert!(reply.text.contains("支付方式：星展銀行"));

    let wallets = engine.store().wallets(&ledger).await.unwrap();
    let bank = wallets.iter().find(|w| w.name == "星展銀行").unwrap();
    assert_eq!(bank.wallet_type, WalletType::Bank);
    assert!(bank.synonyms.contains("星展"));
    let categories = engine.store().categories(&ledger).await.unwrap();
    let breakfast = categories.iter().find(|c| c.name == "早餐").unwrap();
    assert!(breakfast.synonyms.contains("飯糰"));
}
