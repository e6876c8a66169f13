//! End-to-end closure flow against an in-memory database.
//!
//! Exercises the whole pipeline: allocation, selection generation,
//! fingerprinting, and the atomic open→closed persistence step.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use bolao::closure::{self, ClosureInput};
use bolao::storage::Storage;
use bolao::types::{BolaoError, Participant, PoolStatus, TicketSizeLevel, WagerKind};

fn levels() -> Vec<TicketSizeLevel> {
    vec![
        TicketSizeLevel { number_count: 6, cost: dec!(6) },
        TicketSizeLevel { number_count: 7, cost: dec!(42) },
        TicketSizeLevel { number_count: 8, cost: dec!(168) },
    ]
}

fn input(funds: rust_decimal::Decimal) -> ClosureInput {
    ClosureInput {
        pool_id: "pool-1".into(),
        total_funds: funds,
        quota_value: dec!(10),
        levels: levels(),
        participants: vec![
            Participant {
                id: "p1".into(),
                name: "Ana".into(),
                numbers: Some(vec![3, 17, 28, 35, 46, 59]),
            },
            Participant {
                id: "p2".into(),
                name: "Bruno".into(),
                numbers: Some(vec![8, 17, 22, 35, 50, 60]),
            },
            Participant {
                id: "p3".into(),
                name: "Carla".into(),
                numbers: None,
            },
        ],
        scores: (1..=60).map(|n| (n, f64::from(61 - n))).collect::<BTreeMap<_, _>>(),
        closed_by: "admin".into(),
    }
}

async fn storage() -> Storage {
    let s = Storage::connect("sqlite::memory:").await.unwrap();
    s.migrate().await.unwrap();
    s
}

#[tokio::test]
async fn closes_pool_and_persists_everything() {
    let s = storage().await;
    s.create_pool("pool-1", "Office friends").await.unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let outcome = closure::close_pool(&s, &input(dec!(206)), &mut rng)
        .await
        .unwrap();

    // R$206 → 1x8 + 6x6, R$2 remaining.
    assert_eq!(outcome.record.allocation.total_cost, dec!(204));
    assert_eq!(outcome.record.allocation.remaining_funds, dec!(2));
    assert_eq!(outcome.record.wagers.len(), 7);
    assert_eq!(outcome.record.wagers[0].kind, WagerKind::Flagship);

    assert_eq!(s.fetch_status("pool-1").await.unwrap(), PoolStatus::Closed);

    let (fingerprint, stored) = s.fetch_closure("pool-1").await.unwrap().unwrap();
    assert_eq!(fingerprint, outcome.fingerprint);
    assert_eq!(stored.wagers, outcome.record.wagers);

    let rows = s.list_wagers("pool-1").await.unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0].wager_type, "flagship");
    for (row, wager) in rows.iter().zip(&outcome.record.wagers) {
        assert_eq!(row.numbers, wager.numbers);
        assert_eq!(row.cost, wager.cost);
        assert!(row.numbers.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test]
async fn second_closure_attempt_is_rejected() {
    let s = storage().await;
    s.create_pool("pool-1", "Office friends").await.unwrap();

    let first = closure::close_pool(&s, &input(dec!(48)), &mut StdRng::seed_from_u64(21))
        .await
        .unwrap();

    let err = closure::close_pool(&s, &input(dec!(48)), &mut StdRng::seed_from_u64(22))
        .await
        .unwrap_err();
    assert!(matches!(err, BolaoError::PoolNotOpen { .. }));

    // The stored snapshot is exactly the first closure's.
    let (fingerprint, stored) = s.fetch_closure("pool-1").await.unwrap().unwrap();
    assert_eq!(fingerprint, first.fingerprint);
    assert_eq!(stored.wagers, first.record.wagers);
    assert_eq!(s.list_wagers("pool-1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_pool_is_rejected() {
    let s = storage().await;
    let err = closure::close_pool(&s, &input(dec!(48)), &mut StdRng::seed_from_u64(31))
        .await
        .unwrap_err();
    assert!(matches!(err, BolaoError::PoolNotFound(_)));
}

#[tokio::test]
async fn insufficient_funds_leaves_pool_open() {
    let s = storage().await;
    s.create_pool("pool-1", "Office friends").await.unwrap();

    let err = closure::close_pool(&s, &input(dec!(4)), &mut StdRng::seed_from_u64(41))
        .await
        .unwrap_err();
    assert!(matches!(err, BolaoError::InsufficientFunds { .. }));

    assert_eq!(s.fetch_status("pool-1").await.unwrap(), PoolStatus::Open);
    assert!(s.fetch_closure("pool-1").await.unwrap().is_none());
    assert!(s.list_wagers("pool-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn seeded_closures_reproduce_the_fingerprint() {
    let a = {
        let s = storage().await;
        s.create_pool("pool-1", "Office friends").await.unwrap();
        closure::close_pool(&s, &input(dec!(206)), &mut StdRng::seed_from_u64(99))
            .await
            .unwrap()
    };
    let b = {
        let s = storage().await;
        s.create_pool("pool-1", "Office friends").await.unwrap();
        closure::close_pool(&s, &input(dec!(206)), &mut StdRng::seed_from_u64(99))
            .await
            .unwrap()
    };
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.record.wagers, b.record.wagers);

    // Any input perturbation shows up in the digest.
    let c = {
        let s = storage().await;
        s.create_pool("pool-1", "Office friends").await.unwrap();
        let mut perturbed = input(dec!(206));
        perturbed.participants[1].numbers = Some(vec![8, 17, 22, 35, 50, 59]);
        closure::close_pool(&s, &perturbed, &mut StdRng::seed_from_u64(99))
            .await
            .unwrap()
    };
    assert_ne!(a.fingerprint, c.fingerprint);
}
