//! Events published by a successful assignment.

use std::sync::Arc;
use std::time::Duration;

use rescue_assignment::{AssignmentConfig, AssignmentEngine};
use rescue_core::{Capacity, EmergencyCase, EmergencyResponder, Hospital, Location, Severity};
use rescue_db_memory::InMemoryStore;
use rescue_notifications::{
    ChannelTransport, DispatcherConfig, Envelope, EventType, NotificationDispatcher,
};
use rescue_storage::{CapacityStore, CaseStore};
use tokio::sync::mpsc;

async fn next(rx: &mut mpsc::Receiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no envelope")
        .expect("socket closed")
}

async fn connect_all(
    dispatcher: &NotificationDispatcher,
    transport: &ChannelTransport,
    user_id: &str,
    events: &[EventType],
) -> mpsc::Receiver<Envelope> {
    let rx = transport.attach(user_id);
    dispatcher.connect(user_id).await.unwrap();
    for event in events {
        dispatcher.subscribe(user_id, *event).unwrap();
    }
    rx
}

#[tokio::test]
async fn test_assignment_notifies_patient_hospital_and_responder() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_hospital(
            Hospital::new("St. Mary", Location::new(0.0, 0.0), Capacity::new(4, 2).unwrap())
                .with_id("h-1"),
        )
        .await
        .unwrap();
    store
        .insert_responder(
            EmergencyResponder::new("medic-7", "AMB-7", Location::new(0.0, 0.0)).with_id("r-1"),
        )
        .await
        .unwrap();
    let case = store
        .create_case(EmergencyCase::new(
            "patient-1",
            "chest pain",
            Severity::High,
            Location::new(0.0, 0.0),
        ))
        .await
        .unwrap();

    let transport = Arc::new(ChannelTransport::new(16));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        DispatcherConfig::default(),
        transport.clone(),
    ));
    dispatcher.start();

    let mut patient = connect_all(
        &dispatcher,
        &transport,
        "patient-1",
        &[EventType::CaseAssigned, EventType::StatusUpdate],
    )
    .await;
    let mut hospital = connect_all(
        &dispatcher,
        &transport,
        "h-1",
        &[EventType::CaseAssigned, EventType::ResourceUpdate],
    )
    .await;
    let mut responder =
        connect_all(&dispatcher, &transport, "medic-7", &[EventType::CaseAssigned]).await;
    let mut bystander =
        connect_all(&dispatcher, &transport, "someone-else", &[EventType::CaseAssigned]).await;

    let engine = AssignmentEngine::new(
        store.clone(),
        Some(dispatcher.clone()),
        AssignmentConfig::default(),
    );
    engine.assign(&case).await.unwrap();

    let assigned = next(&mut patient).await;
    assert_eq!(assigned.event_type, EventType::CaseAssigned);
    assert_eq!(assigned.payload["case"]["id"], case.id.as_str());
    assert_eq!(assigned.payload["hospital"]["id"], "h-1");
    let status = next(&mut patient).await;
    assert_eq!(status.event_type, EventType::StatusUpdate);
    assert_eq!(status.payload["status"], "assigned");

    assert_eq!(next(&mut hospital).await.event_type, EventType::CaseAssigned);
    let resources = next(&mut hospital).await;
    assert_eq!(resources.event_type, EventType::ResourceUpdate);
    assert_eq!(resources.payload["capacity"]["available"], 1);

    let dispatched = next(&mut responder).await;
    assert_eq!(dispatched.payload["responder"]["vehicleId"], "AMB-7");

    assert!(
        tokio::time::timeout(Duration::from_millis(50), bystander.recv())
            .await
            .is_err()
    );

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_stopped_dispatcher_does_not_fail_assignment() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_hospital(
            Hospital::new("St. Mary", Location::new(0.0, 0.0), Capacity::new(1, 1).unwrap())
                .with_id("h-1"),
        )
        .await
        .unwrap();
    store
        .insert_responder(
            EmergencyResponder::new("medic-7", "AMB-7", Location::new(0.0, 0.0)).with_id("r-1"),
        )
        .await
        .unwrap();
    let case = store
        .create_case(EmergencyCase::new(
            "patient-1",
            "fall",
            Severity::Low,
            Location::new(0.0, 0.0),
        ))
        .await
        .unwrap();

    // Never started: every publish fails with NotRunning.
    let dispatcher = Arc::new(NotificationDispatcher::new(
        DispatcherConfig::default(),
        Arc::new(ChannelTransport::default()),
    ));
    let engine = AssignmentEngine::new(store.clone(), Some(dispatcher), AssignmentConfig::default());

    assert!(engine.assign(&case).await.is_ok());
}
