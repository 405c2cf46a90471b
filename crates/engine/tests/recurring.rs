use chrono::{DateTime, TimeZone, Utc};
use sea_orm::Database;

use engine::{
    CreateRecurringCmd, Currency, DateWindow, DueOutcome, Engine, EngineError, Frequency, Money,
    PostTransactionCmd, RecurringListFilter, RecurringStats, TransactionKind, UpdateRecurringCmd,
};
use migration::MigratorTrait;
use uuid::Uuid;

async fn engine_with_db() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Engine::builder().database(db).build().await.unwrap()
}

fn money(value: &str) -> Money {
    value.parse().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

async fn funded_account(engine: &Engine, name: &str, amount: &str) -> Uuid {
    let account_id = engine
        .new_account(name, Currency::Eur, "alice")
        .await
        .unwrap();
    if amount != "0" {
        engine
            .post_transaction(PostTransactionCmd::income(
                "alice",
                account_id,
                money(amount),
                date(2023, 12, 1),
            ))
            .await
            .unwrap();
    }
    account_id
}

async fn balance(engine: &Engine, account_id: Uuid) -> Money {
    engine.account(account_id, "alice").await.unwrap().balance
}

fn rent(account_id: Uuid, start: DateTime<Utc>) -> CreateRecurringCmd {
    CreateRecurringCmd::new(
        "alice",
        account_id,
        TransactionKind::Expense,
        money("800"),
        Frequency::Monthly,
        start,
    )
    .description("Rent")
}

#[tokio::test]
async fn due_template_is_posted_and_advanced() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "1000").await;
    let template = engine
        .create_recurring(rent(account_id, date(2024, 1, 15)))
        .await
        .unwrap();
    assert_eq!(template.next_due_date, date(2024, 1, 15));

    let outcomes = engine.process_due(date(2024, 1, 20)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    let (recurring_id, outcome) = &outcomes[0];
    assert_eq!(*recurring_id, template.id);
    let DueOutcome::Posted {
        transaction_id,
        next_due_date,
    } = outcome
    else {
        panic!("expected a posted occurrence, got {outcome}");
    };
    assert_eq!(*next_due_date, date(2024, 2, 15));

    let tx = engine.transaction(*transaction_id, "alice").await.unwrap();
    assert_eq!(tx.recurring_id, Some(template.id));
    assert_eq!(tx.occurred_at, date(2024, 1, 15));
    assert_eq!(tx.amount, money("-800"));
    assert_eq!(tx.description.as_deref(), Some("Rent"));
    assert_eq!(balance(&engine, account_id).await, money("200"));

    let stored = engine.recurring(template.id, "alice").await.unwrap();
    assert_eq!(stored.occurrences_count, 1);
    assert_eq!(stored.last_generated_date, Some(date(2024, 1, 15)));
    assert_eq!(stored.next_due_date, date(2024, 2, 15));

    // Running the same pass again posts nothing.
    assert!(engine.process_due(date(2024, 1, 20)).await.unwrap().is_empty());
    assert_eq!(balance(&engine, account_id).await, money("200"));
}

#[tokio::test]
async fn templates_behind_catch_up_one_occurrence_per_pass() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "0").await;
    engine
        .create_recurring(CreateRecurringCmd::new(
            "alice",
            account_id,
            TransactionKind::Income,
            money("25"),
            Frequency::Weekly,
            date(2024, 1, 1),
        ))
        .await
        .unwrap();

    let now = date(2024, 1, 20);
    let mut posted = Vec::new();
    loop {
        let outcomes = engine.process_due(now).await.unwrap();
        if outcomes.is_empty() {
            break;
        }
        for (_, outcome) in outcomes {
            if let DueOutcome::Posted { next_due_date, .. } = outcome {
                posted.push(next_due_date);
            }
        }
    }

    assert_eq!(
        posted,
        vec![date(2024, 1, 8), date(2024, 1, 15), date(2024, 1, 22)]
    );
    assert_eq!(balance(&engine, account_id).await, money("75"));
}

#[tokio::test]
async fn manual_templates_stay_pending() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "1000").await;
    let template = engine
        .create_recurring(rent(account_id, date(2024, 1, 15)).auto_post(false))
        .await
        .unwrap();

    let outcomes = engine.process_due(date(2024, 1, 20)).await.unwrap();
    assert_eq!(outcomes, vec![(template.id, DueOutcome::Pending)]);

    let stored = engine.recurring(template.id, "alice").await.unwrap();
    assert_eq!(stored.next_due_date, date(2024, 1, 15));
    assert_eq!(stored.occurrences_count, 0);
    assert_eq!(balance(&engine, account_id).await, money("1000"));
}

#[tokio::test]
async fn template_is_exhausted_after_its_last_occurrence() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "1000").await;
    let template = engine
        .create_recurring(
            CreateRecurringCmd::new(
                "alice",
                account_id,
                TransactionKind::Expense,
                money("5"),
                Frequency::Daily,
                date(2024, 1, 1),
            )
            .max_occurrences(1),
        )
        .await
        .unwrap();

    let now = date(2024, 1, 5);
    let first = engine.process_due(now).await.unwrap();
    assert!(matches!(first[0].1, DueOutcome::Posted { .. }));

    let second = engine.process_due(now).await.unwrap();
    assert_eq!(second, vec![(template.id, DueOutcome::Exhausted)]);
    assert!(engine.due_recurring(now).await.unwrap().is_empty());
    assert_eq!(balance(&engine, account_id).await, money("995"));

    // Resuming does not bring an exhausted template back.
    let resumed = engine
        .pause_recurring(template.id, "alice", false)
        .await
        .unwrap();
    assert!(resumed.is_exhausted());
}

#[tokio::test]
async fn paused_templates_are_skipped() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "1000").await;
    let template = engine
        .create_recurring(rent(account_id, date(2024, 1, 15)))
        .await
        .unwrap();

    engine
        .pause_recurring(template.id, "alice", true)
        .await
        .unwrap();
    assert!(engine.process_due(date(2024, 1, 20)).await.unwrap().is_empty());

    let paused = engine
        .list_recurring(
            "alice",
            &RecurringListFilter {
                paused: Some(true),
                ..RecurringListFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(paused.len(), 1);

    engine
        .pause_recurring(template.id, "alice", false)
        .await
        .unwrap();
    let outcomes = engine.process_due(date(2024, 1, 20)).await.unwrap();
    assert!(matches!(outcomes[0].1, DueOutcome::Posted { .. }));
}

#[tokio::test]
async fn failed_occurrence_leaves_the_template_due() {
    let engine = engine_with_db().await;
    let checking = funded_account(&engine, "Checking", "0").await;
    let savings = funded_account(&engine, "Savings", "0").await;
    let template = engine
        .create_recurring(
            CreateRecurringCmd::new(
                "alice",
                checking,
                TransactionKind::Transfer,
                money("50"),
                Frequency::Monthly,
                date(2024, 1, 1),
            )
            .destination_account_id(savings),
        )
        .await
        .unwrap();

    let outcomes = engine.process_due(date(2024, 1, 2)).await.unwrap();
    let DueOutcome::Failed { error } = &outcomes[0].1 else {
        panic!("expected a failure, got {}", outcomes[0].1);
    };
    assert!(error.contains("Checking"));

    let stored = engine.recurring(template.id, "alice").await.unwrap();
    assert_eq!(stored.next_due_date, date(2024, 1, 1));
    assert_eq!(stored.occurrences_count, 0);
    assert!(balance(&engine, savings).await.is_zero());
}

#[tokio::test]
async fn invalid_templates_are_rejected() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "0").await;
    let bobs = engine
        .new_account("Checking", Currency::Eur, "bob")
        .await
        .unwrap();

    let err = engine
        .create_recurring(rent(account_id, date(2024, 1, 1)).interval(0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create_recurring(rent(account_id, date(2024, 2, 1)).end_date(date(2024, 1, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create_recurring(CreateRecurringCmd::new(
            "alice",
            account_id,
            TransactionKind::Transfer,
            money("10"),
            Frequency::Monthly,
            date(2024, 1, 1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create_recurring(rent(bobs, date(2024, 1, 1)))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("account not exists".to_string()));

    let err = engine
        .create_recurring(CreateRecurringCmd::new(
            "alice",
            account_id,
            TransactionKind::Expense,
            money("10"),
            Frequency::Custom,
            date(2024, 1, 1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert!(
        engine
            .list_recurring("alice", &RecurringListFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn rescheduling_moves_the_next_due_date() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "5000").await;
    let template = engine
        .create_recurring(rent(account_id, date(2024, 1, 15)))
        .await
        .unwrap();

    let moved = engine
        .update_recurring(UpdateRecurringCmd::new(template.id, "alice").start_date(date(2024, 2, 1)))
        .await
        .unwrap();
    assert_eq!(moved.next_due_date, date(2024, 2, 1));

    engine.process_due(date(2024, 2, 2)).await.unwrap();
    let posted = engine.recurring(template.id, "alice").await.unwrap();
    assert_eq!(posted.next_due_date, date(2024, 3, 1));

    let stretched = engine
        .update_recurring(UpdateRecurringCmd::new(template.id, "alice").interval(2))
        .await
        .unwrap();
    assert_eq!(stretched.next_due_date, date(2024, 4, 1));

    // Non-schedule fields leave the due date alone.
    let repriced = engine
        .update_recurring(UpdateRecurringCmd::new(template.id, "alice").amount(money("850")))
        .await
        .unwrap();
    assert_eq!(repriced.next_due_date, date(2024, 4, 1));
    assert_eq!(repriced.amount, money("850"));
}

#[tokio::test]
async fn upcoming_instances_merge_templates_by_date() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "0").await;
    let monthly = engine
        .create_recurring(
            CreateRecurringCmd::new(
                "alice",
                account_id,
                TransactionKind::Expense,
                money("100"),
                Frequency::Monthly,
                date(2024, 3, 1),
            ),
        )
        .await
        .unwrap();
    let weekly = engine
        .create_recurring(CreateRecurringCmd::new(
            "alice",
            account_id,
            TransactionKind::Expense,
            money("10"),
            Frequency::Weekly,
            date(2024, 3, 2),
        ))
        .await
        .unwrap();

    let window = DateWindow::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap(),
    )
    .unwrap();
    let upcoming = engine.upcoming_instances("alice", &window).await.unwrap();

    assert_eq!(upcoming.total_count, 6);
    assert_eq!(upcoming.total_amount, money("150"));
    assert_eq!(upcoming.occurrences[0].recurring_id, monthly.id);
    assert!(
        upcoming.occurrences[1..]
            .iter()
            .all(|occurrence| occurrence.recurring_id == weekly.id)
    );
    assert!(
        upcoming
            .occurrences
            .windows(2)
            .all(|pair| pair[0].due_date <= pair[1].due_date)
    );
    assert_eq!(upcoming.occurrences[1].running_total, money("110"));
    assert_eq!(
        upcoming.occurrences.last().map(|o| o.running_total),
        Some(money("150"))
    );

    // Nothing is persisted by a projection.
    let filter = engine::TransactionListFilter::default();
    assert_eq!(
        engine
            .list_transactions("alice", 10, &filter)
            .await
            .unwrap()
            .len(),
        0
    );
}

#[tokio::test]
async fn stats_count_templates_by_state() {
    let engine = engine_with_db().await;
    let account_id = funded_account(&engine, "Checking", "1000").await;

    engine
        .create_recurring(rent(account_id, date(2024, 1, 15)))
        .await
        .unwrap();
    let paused = engine
        .create_recurring(rent(account_id, date(2024, 1, 20)))
        .await
        .unwrap();
    engine
        .pause_recurring(paused.id, "alice", true)
        .await
        .unwrap();
    let ended = engine
        .create_recurring(rent(account_id, date(2024, 1, 1)).max_occurrences(1))
        .await
        .unwrap();
    engine.process_due(date(2024, 1, 2)).await.unwrap();
    let ended = engine.recurring(ended.id, "alice").await.unwrap();
    assert!(ended.is_exhausted());

    let stats = engine.recurring_stats("alice").await.unwrap();
    assert_eq!(
        stats,
        RecurringStats {
            total: 3,
            active: 1,
            paused: 1,
            exhausted: 1,
            due: 1,
        }
    );

    engine.delete_recurring(paused.id, "alice").await.unwrap();
    assert_eq!(engine.recurring_stats("alice").await.unwrap().total, 2);
    assert_eq!(engine.recurring_stats("bob").await.unwrap().total, 0);
}
