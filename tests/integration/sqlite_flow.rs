//! Controller end to end against an in-memory SQLite database.

use std::sync::Arc;

use rust_decimal_macros::dec;

use croupier::engine::{RetryPolicy, RoundController, RoundOutcome};
use croupier::projection::LiveTable;
use croupier::rules::RuleTables;
use croupier::storage::{RoundSource, SqliteStore};
use croupier::types::*;

async fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();

    store.insert_round(&Round::new("r1")).await.unwrap();
    store.insert_player(&Player::new("p1", dec!(100))).await.unwrap();
    store.insert_player(&Player::new("p2", dec!(40))).await.unwrap();
    store.insert_player(&Player::new("p3", dec!(12.50))).await.unwrap();
    store.join_round("r1", "p1").await.unwrap();
    store.join_round("r1", "p2").await.unwrap();
    store.join_round("r1", "p3").await.unwrap();

    for bet in [
        Bet::new("a", "p1", "r1", "straight-17", dec!(10)),
        Bet::new("b", "p1", "r1", "red", dec!(20)),
        Bet::new("c", "p3", "r1", "split-14-17", dec!(0.50)),
        Bet::new("d", "p3", "r1", "low", dec!(2.25)),
    ] {
        store.insert_bet(&bet).await.unwrap();
    }
    Arc::new(store)
}

fn controller_for(store: &Arc<SqliteStore>, table: &Arc<LiveTable>) -> RoundController {
    RoundController::new(
        store.clone(),
        store.clone(),
        table.clone(),
        Arc::new(RuleTables::single_zero()),
    )
    .with_retry(RetryPolicy::none())
}

#[tokio::test]
async fn test_sqlite_round_lifecycle() {
    let store = seeded_store().await;
    let table = Arc::new(LiveTable::new());
    let controller = controller_for(&store, &table);

    // Open round: nothing to do.
    assert!(controller.settle_ready().await.unwrap().is_empty());

    store.resolve_round("r1", Outcome(17)).await.unwrap();
    let results = controller.settle_ready().await.unwrap();
    assert_eq!(results.len(), 1);
    let Ok(RoundOutcome::Settled(report)) = &results[0].1 else {
        panic!("expected r1 to settle, got {:?}", results[0].1);
    };
    assert_eq!(report.players, 3);
    assert_eq!(report.bets, 4);

    // p1: +350 -20. p3: split pays 17 x 0.50, low wins 2.25.
    let p1 = store.fetch_player("p1").await.unwrap().unwrap();
    assert_eq!(p1.balance, dec!(430));
    let p2 = store.fetch_player("p2").await.unwrap().unwrap();
    assert_eq!(p2.balance, dec!(40));
    let p3 = store.fetch_player("p3").await.unwrap().unwrap();
    assert_eq!(p3.balance, dec!(23.25));

    let bets = store.fetch_bets("r1").await.unwrap();
    let states: Vec<(&str, BetState)> = bets.iter().map(|b| (b.id.as_str(), b.state)).collect();
    assert_eq!(
        states,
        vec![
            ("a", BetState::Won),
            ("b", BetState::Lost),
            ("c", BetState::Won),
            ("d", BetState::Won),
        ]
    );
    assert!(bets.iter().all(|b| b.result == Some(Outcome(17))));

    let round = store.fetch_round("r1").await.unwrap().unwrap();
    assert!(round.is_settled());
    assert!(store.rounds_awaiting_settlement().await.unwrap().is_empty());

    // Settling again is a no-op and balances stay put.
    assert_eq!(
        controller.settle_round("r1").await.unwrap(),
        RoundOutcome::AlreadySettled
    );
    let p1 = store.fetch_player("p1").await.unwrap().unwrap();
    assert_eq!(p1.balance, dec!(430));
}

#[tokio::test]
async fn test_sqlite_rejects_round_with_unknown_bet() {
    let store = seeded_store().await;
    store
        .insert_bet(&Bet::new("x", "p2", "r1", "orphelins", dec!(5)))
        .await
        .unwrap();
    store.resolve_round("r1", Outcome(0)).await.unwrap();

    let table = Arc::new(LiveTable::new());
    let controller = controller_for(&store, &table);

    let err = controller.settle_round("r1").await.unwrap_err();
    assert!(matches!(
        err,
        RoundError::Settlement(SettlementError::UnknownBetType { .. })
    ));

    let p1 = store.fetch_player("p1").await.unwrap().unwrap();
    assert_eq!(p1.balance, dec!(100));
    assert!(store
        .fetch_bets("r1")
        .await
        .unwrap()
        .iter()
        .all(|b| b.state == BetState::Pending));
    assert_eq!(
        store.rounds_awaiting_settlement().await.unwrap(),
        vec!["r1".to_string()]
    );
}

#[tokio::test]
async fn test_sqlite_missing_round() {
    let store = seeded_store().await;
    let table = Arc::new(LiveTable::new());
    let controller = controller_for(&store, &table);

    let err = controller.settle_round("r404").await.unwrap_err();
    assert!(matches!(err, RoundError::RoundNotFound(id) if id == "r404"));
}
