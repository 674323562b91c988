//! Concurrent conditional writes against the in-memory backend.

use std::sync::Arc;

use rescue_core::{
    Capacity, EmergencyResponder, Hospital, Location, ResponderStatus, StaffRole, VerificationCode,
};
use rescue_db_memory::{CapacityStore, InMemoryStore, VerificationCodeStore, create_store};

async fn seed_hospital(store: &InMemoryStore, id: &str, available: u32) {
    let hospital = Hospital::new(
        "General",
        Location::new(40.0, -74.0),
        Capacity::new(available + 2, available).unwrap(),
    )
    .with_id(id);
    store.insert_hospital(hospital).await.unwrap();
}

/// Each task reads the current count and retries its own CAS until it either
/// wins a bed or sees none left.
async fn claim_bed(store: Arc<InMemoryStore>, id: String) -> bool {
    loop {
        let current = store
            .get_hospital(&id)
            .await
            .unwrap()
            .unwrap()
            .capacity
            .available;
        if current == 0 {
            return false;
        }
        if store.reserve_hospital_bed(&id, current).await.unwrap().is_applied() {
            return true;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bed_reservations_never_oversell() {
    let store = create_store();
    seed_hospital(&store, "h-1", 5).await;

    let mut handles = Vec::new();
    for _ in 0..32 {
        handles.push(tokio::spawn(claim_bed(store.clone(), "h-1".to_string())));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }

    assert_eq!(wins, 5);
    let hospital = store.get_hospital("h-1").await.unwrap().unwrap();
    assert_eq!(hospital.capacity.available, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_responder_reservation_has_one_winner() {
    let store = create_store();
    let responder = EmergencyResponder::new("user-1", "AMB-1", Location::new(40.0, -74.0))
        .with_id("r-1");
    store.insert_responder(responder).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .reserve_responder("r-1", ResponderStatus::Available)
                .await
                .unwrap()
                .is_applied()
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let responder = store.get_responder("r-1").await.unwrap().unwrap();
    assert_eq!(responder.status, ResponderStatus::Assigned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verification_code_consumed_once_under_race() {
    let store = create_store();
    store
        .create_code(VerificationCode::new("RACE-1", StaffRole::Hospital).unwrap())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.consume_code("RACE-1", StaffRole::Hospital).await.unwrap()
        }));
    }

    let mut consumed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            consumed += 1;
        }
    }
    assert_eq!(consumed, 1);
}
