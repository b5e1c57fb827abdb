//! End-to-end lifecycle tests driving the session services against the
//! in-process store with a manually advanced clock.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use range_back::{
    clock::{Clock, ManualClock},
    config::AppConfig,
    dao::{
        models::{BayEntity, BayStatus, CloseReason, SessionKind},
        range_store::{RangeStore, memory::MemoryRangeStore},
    },
    dto::session::{
        DeliveryRequest, OverrideAction, OverrideRequest, StartSessionRequest,
    },
    error::ServiceError,
    services::{overview_service, reconcile_service, session_service, storage_supervisor},
    state::{AppState, SharedState},
};
use uuid::Uuid;

const BAY_POOL: u32 = 9;

async fn test_state() -> (SharedState, ManualClock) {
    let clock = ManualClock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_754_000_000));
    let config = AppConfig {
        bay_count: BAY_POOL,
        reservation_ttl: Some(Duration::from_secs(600)),
        sweep_interval: Duration::from_secs(60),
        sse_capacity: 32,
    };
    let state = AppState::with_clock(config, Arc::new(clock.clone()));
    storage_supervisor::install(&state, Arc::new(MemoryRangeStore::new())).await;
    (state, clock)
}

fn start_request(kind: SessionKind, planned_minutes: Option<u64>) -> StartSessionRequest {
    StartSessionRequest {
        nickname: "Alex".into(),
        receipt_number: Some("100042".into()),
        price_per_hour: Some(25.0),
        dispatcher_id: Uuid::new_v4(),
        kind,
        planned_minutes,
    }
}

fn delivery(buckets: u32) -> DeliveryRequest {
    DeliveryRequest {
        handler_id: Uuid::new_v4(),
        bucket_count: buckets,
    }
}

async fn bay_by_number(state: &SharedState, number: u32) -> BayEntity {
    let store = state.range_store().await.expect("store installed");
    store
        .list_bays()
        .await
        .unwrap()
        .into_iter()
        .find(|bay| bay.bay_number == number)
        .expect("bay exists")
}

#[tokio::test]
async fn open_session_full_lifecycle() {
    let (state, clock) = test_state().await;
    let bay = bay_by_number(&state, 5).await;

    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    )
    .await
    .unwrap();
    assert_eq!(started.bay_number, 5);

    let bay_after = bay_by_number(&state, 5).await;
    assert_eq!(bay_after.status, BayStatus::Occupied);

    clock.advance(Duration::from_secs(120));
    let delivered_at = clock.now();
    let receipt = session_service::record_ball_delivery(
        &state,
        started.assignment_id,
        delivery(2),
    )
    .await
    .unwrap();
    assert!(receipt.session_started_at.is_some());

    let store = state.range_store().await.unwrap();
    let player = store.find_player(started.player_id).await.unwrap().unwrap();
    assert_eq!(
        player.start_time,
        Some(delivered_at + Duration::from_secs(30))
    );

    clock.advance(Duration::from_secs(1_800));
    let ended = session_service::end_session(&state, started.assignment_id, CloseReason::Manual)
        .await
        .unwrap();
    assert!(ended.was_open);

    let bay_final = bay_by_number(&state, 5).await;
    assert_eq!(bay_final.status, BayStatus::Available);

    let assignment = store
        .find_assignment(started.assignment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!assignment.open);
    assert_eq!(assignment.end_time, Some(clock.now()));

    let player = store.find_player(started.player_id).await.unwrap().unwrap();
    assert_eq!(player.end_time, Some(clock.now()));
}

#[tokio::test]
async fn second_start_on_occupied_bay_is_rejected() {
    let (state, _clock) = test_state().await;
    let bay = bay_by_number(&state, 7).await;

    session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Timed, Some(60)),
    )
    .await
    .unwrap();

    let err = session_service::start_session(&state, bay.id, start_request(SessionKind::Open, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::BayNotAvailable(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_admit_exactly_one() {
    let (state, _clock) = test_state().await;
    let bay = bay_by_number(&state, 3).await;

    let first = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    );
    let second = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    );

    let (left, right) = tokio::join!(first, second);
    let successes = [&left, &right].iter().filter(|res| res.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent start may win the bay");

    let loser = if left.is_err() { left } else { right };
    assert!(matches!(
        loser.unwrap_err(),
        ServiceError::BayNotAvailable(_)
    ));

    let store = state.range_store().await.unwrap();
    let open = store.open_assignments().await.unwrap();
    assert_eq!(open.iter().filter(|a| a.bay_id == bay.id).count(), 1);
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let (state, _clock) = test_state().await;
    let bay = bay_by_number(&state, 2).await;
    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    )
    .await
    .unwrap();

    let first = session_service::end_session(&state, started.assignment_id, CloseReason::Manual)
        .await
        .unwrap();
    assert!(first.was_open);

    let store = state.range_store().await.unwrap();
    let after_first = store
        .find_assignment(started.assignment_id)
        .await
        .unwrap()
        .unwrap();

    let second = session_service::end_session(&state, started.assignment_id, CloseReason::Manual)
        .await
        .unwrap();
    assert!(!second.was_open);

    let after_second = store
        .find_assignment(started.assignment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_first, after_second);
    assert_eq!(bay_by_number(&state, 2).await.status, BayStatus::Available);
}

#[tokio::test]
async fn later_deliveries_do_not_move_the_start_time() {
    let (state, clock) = test_state().await;
    let bay = bay_by_number(&state, 1).await;
    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    )
    .await
    .unwrap();

    let first_delivery_at = clock.now();
    session_service::record_ball_delivery(&state, started.assignment_id, delivery(1))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(900));
    let receipt = session_service::record_ball_delivery(&state, started.assignment_id, delivery(3))
        .await
        .unwrap();
    assert!(receipt.session_started_at.is_none());

    let store = state.range_store().await.unwrap();
    let player = store.find_player(started.player_id).await.unwrap().unwrap();
    assert_eq!(
        player.start_time,
        Some(first_delivery_at + Duration::from_secs(30))
    );
}

#[tokio::test]
async fn lock_override_closes_session_and_blocks_deliveries() {
    let (state, _clock) = test_state().await;
    let bay = bay_by_number(&state, 9).await;
    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    )
    .await
    .unwrap();

    let response = session_service::override_bay(
        &state,
        bay.id,
        OverrideRequest {
            action: OverrideAction::Lock,
            label: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(response.bay.status, BayStatus::Maintenance);

    let store = state.range_store().await.unwrap();
    let assignment = store
        .find_assignment(started.assignment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!assignment.open);

    let err = session_service::record_ball_delivery(&state, started.assignment_id, delivery(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AssignmentNotOpen(_)));

    assert_eq!(
        bay_by_number(&state, 9).await.status,
        BayStatus::Maintenance
    );
}

#[tokio::test]
async fn reserve_and_release_overrides() {
    let (state, _clock) = test_state().await;
    let bay = bay_by_number(&state, 4).await;

    let response = session_service::override_bay(
        &state,
        bay.id,
        OverrideRequest {
            action: OverrideAction::Reserve,
            label: Some("league night".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(response.bay.status, BayStatus::Reserved);
    assert_eq!(response.bay.reserved_label.as_deref(), Some("league night"));

    let err = session_service::start_session(&state, bay.id, start_request(SessionKind::Open, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::BayNotAvailable(_)));

    session_service::override_bay(
        &state,
        bay.id,
        OverrideRequest {
            action: OverrideAction::Unreserve,
            label: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(bay_by_number(&state, 4).await.status, BayStatus::Available);
}

#[tokio::test]
async fn timed_session_requires_a_planned_duration() {
    let (state, _clock) = test_state().await;
    let bay = bay_by_number(&state, 6).await;

    let err = session_service::start_session(&state, bay.id, start_request(SessionKind::Timed, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidSessionConfig(_)));

    // An open session tolerates (and ignores) a supplied duration.
    session_service::start_session(&state, bay.id, start_request(SessionKind::Open, Some(45)))
        .await
        .unwrap();
    let store = state.range_store().await.unwrap();
    let open = store.open_assignment_for_bay(bay.id).await.unwrap().unwrap();
    assert_eq!(open.planned_end_time, None);
}

#[tokio::test]
async fn expired_timed_session_is_closed_by_the_next_delivery() {
    let (state, clock) = test_state().await;
    let bay = bay_by_number(&state, 8).await;
    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Timed, Some(60)),
    )
    .await
    .unwrap();

    clock.advance(Duration::from_secs(61 * 60));
    let err = session_service::record_ball_delivery(&state, started.assignment_id, delivery(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AssignmentNotOpen(_)));

    let store = state.range_store().await.unwrap();
    let assignment = store
        .find_assignment(started.assignment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!assignment.open);
    assert_eq!(bay_by_number(&state, 8).await.status, BayStatus::Available);
}

#[tokio::test]
async fn expired_bay_can_be_reassigned_immediately() {
    let (state, clock) = test_state().await;
    let bay = bay_by_number(&state, 8).await;
    session_service::start_session(&state, bay.id, start_request(SessionKind::Timed, Some(30)))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(31 * 60));
    // The fresh start is the mutating touch that closes the expired session.
    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    )
    .await
    .unwrap();
    assert_eq!(started.bay_number, 8);
    assert_eq!(bay_by_number(&state, 8).await.status, BayStatus::Occupied);
}

#[tokio::test]
async fn sweeper_closes_expired_sessions_and_reservations() {
    let (state, clock) = test_state().await;
    let timed_bay = bay_by_number(&state, 1).await;
    let reserved_bay = bay_by_number(&state, 2).await;

    session_service::start_session(
        &state,
        timed_bay.id,
        start_request(SessionKind::Timed, Some(10)),
    )
    .await
    .unwrap();
    session_service::override_bay(
        &state,
        reserved_bay.id,
        OverrideRequest {
            action: OverrideAction::Reserve,
            label: None,
        },
    )
    .await
    .unwrap();

    // Past the 10 minute session and the 10 minute reservation hold.
    clock.advance(Duration::from_secs(11 * 60));
    let stats = reconcile_service::sweep_once(&state).await.unwrap();
    assert_eq!(stats.expired_sessions, 1);
    assert_eq!(stats.expired_reservations, 1);

    assert_eq!(bay_by_number(&state, 1).await.status, BayStatus::Available);
    assert_eq!(bay_by_number(&state, 2).await.status, BayStatus::Available);
}

#[tokio::test]
async fn reconcile_reports_then_closes_dangling_assignments() {
    let (state, clock) = test_state().await;
    for number in [3u32, 4, 5] {
        let bay = bay_by_number(&state, number).await;
        session_service::start_session(&state, bay.id, start_request(SessionKind::Open, None))
            .await
            .unwrap();
    }

    clock.advance(Duration::from_secs(3_600));

    let dry_run = reconcile_service::reconcile(&state, false).await.unwrap();
    assert!(!dry_run.applied);
    assert_eq!(dry_run.total_open, 3);
    assert!(dry_run
        .bays
        .iter()
        .all(|bay| bay.assignments.iter().all(|entry| !entry.closed)));

    let store = state.range_store().await.unwrap();
    assert_eq!(store.open_assignments().await.unwrap().len(), 3);

    let applied = reconcile_service::reconcile(&state, true).await.unwrap();
    assert!(applied.applied);
    assert_eq!(applied.total_open, 3);
    assert!(applied
        .bays
        .iter()
        .all(|bay| bay.assignments.iter().all(|entry| entry.closed)));

    assert!(store.open_assignments().await.unwrap().is_empty());
    for number in [3u32, 4, 5] {
        assert_eq!(
            bay_by_number(&state, number).await.status,
            BayStatus::Available
        );
    }

    // Running the sweep again finds nothing and changes nothing.
    let again = reconcile_service::reconcile(&state, true).await.unwrap();
    assert_eq!(again.total_open, 0);
}

#[tokio::test]
async fn overview_reflects_sessions_and_survives_degraded_mode() {
    let (state, _clock) = test_state().await;
    let bay = bay_by_number(&state, 6).await;
    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    )
    .await
    .unwrap();
    session_service::record_ball_delivery(&state, started.assignment_id, delivery(2))
        .await
        .unwrap();
    session_service::record_ball_delivery(&state, started.assignment_id, delivery(3))
        .await
        .unwrap();

    let snapshot = overview_service::snapshot(&state).await.unwrap();
    assert_eq!(snapshot.summary.total_bays, BAY_POOL as usize);
    assert_eq!(snapshot.summary.occupied_bays, 1);
    assert_eq!(snapshot.summary.next_free.as_deref(), Some("Bay Ready"));

    let row = snapshot
        .bays
        .iter()
        .find(|view| view.bay_number == 6)
        .unwrap();
    assert_eq!(row.status, BayStatus::Occupied);
    assert_eq!(row.total_balls, 5);
    assert_eq!(row.transactions_count, 2);
    assert_eq!(
        row.player.as_ref().map(|player| player.nickname.as_str()),
        Some("Alex")
    );

    // Storage drops away: the snapshot degrades to the last published rows
    // instead of erroring.
    state.clear_range_store().await;
    let stale = overview_service::snapshot(&state).await.unwrap();
    assert_eq!(stale.bays.len(), BAY_POOL as usize);
    let stale_row = stale.bays.iter().find(|view| view.bay_number == 6).unwrap();
    assert_eq!(stale_row.status, BayStatus::Occupied);

    // Mutations fail fast while degraded.
    let err = session_service::end_session(&state, started.assignment_id, CloseReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
}

#[tokio::test]
async fn lifecycle_events_reach_subscribed_observers() {
    let (state, _clock) = test_state().await;
    let mut receiver = state.overview_sse().subscribe();
    let bay = bay_by_number(&state, 7).await;

    let started = session_service::start_session(
        &state,
        bay.id,
        start_request(SessionKind::Open, None),
    )
    .await
    .unwrap();
    session_service::end_session(&state, started.assignment_id, CloseReason::Manual)
        .await
        .unwrap();

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let Some(name) = event.event {
            names.push(name);
        }
    }

    assert!(names.iter().any(|name| name == "session.started"));
    assert!(names.iter().any(|name| name == "bay.changed"));
    assert!(names.iter().any(|name| name == "session.ended"));
}
