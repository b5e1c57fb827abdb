use std::{sync::Arc, time::Duration};

use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            AssignmentEntity, BallTransactionEntity, BayEntity, CloseReason, PlayerEntity,
            SessionKind,
        },
        range_store::{CloseOutcome, RangeStore, ReservationStamp},
        storage::StorageError,
    },
    dto::{
        format_system_time,
        session::{
            DeliveryRequest, DeliveryResponse, EndSessionResponse, OverrideAction,
            OverrideRequest, OverrideResponse, StartSessionRequest, StartSessionResponse,
        },
    },
    error::ServiceError,
    services::{overview_events, overview_service, timing},
    state::{
        SharedState,
        state_machine::{self, BayEvent, Transition},
    },
};

/// Place a player on a bay, creating the player and assignment records and
/// occupying the bay in one guarded store operation.
pub async fn start_session(
    state: &SharedState,
    bay_id: Uuid,
    request: StartSessionRequest,
) -> Result<StartSessionResponse, ServiceError> {
    let store = state.require_range_store().await?;
    let now = state.now();

    let nickname = request.nickname.trim().to_string();
    if nickname.is_empty() {
        return Err(ServiceError::InvalidInput(
            "player nickname must not be empty".into(),
        ));
    }

    let planned_end_time = match request.kind {
        SessionKind::Timed => {
            let minutes = request.planned_minutes.ok_or_else(|| {
                ServiceError::InvalidSessionConfig(
                    "a timed session requires planned_minutes".into(),
                )
            })?;
            if minutes == 0 {
                return Err(ServiceError::InvalidSessionConfig(
                    "planned_minutes must be strictly positive".into(),
                ));
            }
            Some(now + Duration::from_secs(minutes * 60))
        }
        SessionKind::Open => {
            if request.planned_minutes.is_some() {
                warn!(%bay_id, "planned_minutes ignored for an open session");
            }
            None
        }
    };

    let bay = find_bay(&store, bay_id).await?;

    // Lazy expiry: an expired timed session still holding the bay is closed
    // by this touch before availability is judged.
    if let Some(open) = store.open_assignment_for_bay(bay_id).await? {
        if open.is_expired(now) {
            close_assignment(state, &store, &open, CloseReason::TimedExpiry).await?;
        } else {
            return Err(ServiceError::BayNotAvailable(format!(
                "bay {} already has an open session",
                bay.bay_number
            )));
        }
    }

    let bay = find_bay(&store, bay_id).await?;
    if state_machine::compute_transition(bay.status, BayEvent::Assign).is_err() {
        return Err(ServiceError::BayNotAvailable(format!(
            "bay {} is {:?}",
            bay.bay_number, bay.status
        )));
    }

    let player = PlayerEntity {
        id: Uuid::new_v4(),
        nickname,
        receipt_number: request
            .receipt_number
            .unwrap_or_else(generate_receipt_number),
        price_per_hour: request.price_per_hour,
        start_time: None,
        end_time: None,
        created_by: request.dispatcher_id,
    };
    let assignment = AssignmentEntity {
        id: Uuid::new_v4(),
        bay_id,
        player_id: player.id,
        dispatcher_id: request.dispatcher_id,
        assigned_time: now,
        end_time: None,
        planned_end_time,
        kind: request.kind,
        open: true,
    };

    // The store applies the availability check and the inserts atomically; a
    // conflict here means a concurrent call won the bay.
    match store.create_session(player.clone(), assignment.clone()).await {
        Ok(()) => {}
        Err(StorageError::Conflict { message }) => {
            return Err(ServiceError::BayNotAvailable(message));
        }
        Err(err) => return Err(err.into()),
    }

    info!(
        bay = bay.bay_number,
        assignment = %assignment.id,
        player = %player.id,
        kind = ?assignment.kind,
        "session started"
    );

    overview_events::broadcast_session_started(
        state,
        assignment.id,
        bay.bay_number,
        &player.nickname,
    );
    overview_events::publish_bay_refresh(state, &store, bay_id).await;

    Ok(StartSessionResponse {
        assignment_id: assignment.id,
        player_id: player.id,
        bay_number: bay.bay_number,
    })
}

/// Record a bucket handover against an open assignment. The first recorded
/// delivery starts the player's session clock.
pub async fn record_ball_delivery(
    state: &SharedState,
    assignment_id: Uuid,
    request: DeliveryRequest,
) -> Result<DeliveryResponse, ServiceError> {
    let store = state.require_range_store().await?;
    let now = state.now();

    let assignment = find_assignment(&store, assignment_id).await?;
    if !assignment.open {
        return Err(ServiceError::AssignmentNotOpen(format!(
            "assignment `{assignment_id}` is already closed"
        )));
    }
    if assignment.is_expired(now) {
        // The delivery is the mutating touch that enforces expiry.
        close_assignment(state, &store, &assignment, CloseReason::TimedExpiry).await?;
        return Err(ServiceError::AssignmentNotOpen(format!(
            "assignment `{assignment_id}` expired at its planned end"
        )));
    }

    let transaction = BallTransactionEntity {
        id: Uuid::new_v4(),
        assignment_id,
        handler_id: request.handler_id,
        bucket_count: request.bucket_count,
        delivered_time: now,
    };
    match store.append_transaction(transaction.clone()).await {
        Ok(()) => {}
        // A sweep or override closed the assignment between our read and the
        // append; the ledger stays clean and the caller learns why.
        Err(StorageError::Conflict { message }) => {
            return Err(ServiceError::AssignmentNotOpen(message));
        }
        Err(err) => return Err(err.into()),
    }

    // Guarded write: only the first delivery sets the start time, later and
    // concurrent deliveries leave it untouched.
    let start_time = timing::resolve_start_time(now);
    let started_now = store
        .set_player_start_time(assignment.player_id, start_time)
        .await?;
    if started_now {
        info!(
            assignment = %assignment_id,
            start_time = %format_system_time(start_time),
            "session clock started by first delivery"
        );
    }

    let total_balls: u64 = store
        .transactions_for_assignment(assignment_id)
        .await?
        .iter()
        .map(|entry| u64::from(entry.bucket_count))
        .sum();

    let bay_number = find_bay(&store, assignment.bay_id)
        .await
        .map(|bay| bay.bay_number)
        .unwrap_or_default();
    overview_events::broadcast_delivery_recorded(
        state,
        assignment_id,
        bay_number,
        request.bucket_count,
        total_balls,
    );
    overview_events::publish_bay_refresh(state, &store, assignment.bay_id).await;

    Ok(DeliveryResponse {
        transaction_id: transaction.id,
        session_started_at: started_now.then(|| format_system_time(start_time)),
    })
}

/// Close an assignment. Closing one that is already closed is a safe no-op
/// so duplicate clicks and concurrent sweeps stay quiet.
pub async fn end_session(
    state: &SharedState,
    assignment_id: Uuid,
    reason: CloseReason,
) -> Result<EndSessionResponse, ServiceError> {
    let store = state.require_range_store().await?;
    let assignment = find_assignment(&store, assignment_id).await?;
    let outcome = close_assignment(state, &store, &assignment, reason).await?;

    Ok(EndSessionResponse {
        assignment_id,
        was_open: matches!(outcome, CloseOutcome::Closed { .. }),
    })
}

/// Dispatch an administrative override on a bay.
pub async fn override_bay(
    state: &SharedState,
    bay_id: Uuid,
    request: OverrideRequest,
) -> Result<OverrideResponse, ServiceError> {
    let store = state.require_range_store().await?;
    let bay = find_bay(&store, bay_id).await?;

    match request.action {
        OverrideAction::EndSession => {
            // No open assignment is fine: the click still succeeds.
            if let Some(open) = store.open_assignment_for_bay(bay_id).await? {
                close_assignment(state, &store, &open, CloseReason::Override).await?;
            }
        }
        OverrideAction::Lock => {
            // Take the bay out of rotation first so nothing can claim it
            // while the cascade close runs.
            apply_bay_event(state, &store, bay_id, BayEvent::Lock, None).await?;
            cascade_close(state, &store, bay_id).await?;
        }
        OverrideAction::Unlock => {
            apply_bay_event(state, &store, bay_id, BayEvent::Unlock, None).await?;
        }
        OverrideAction::Reserve => {
            let stamp = ReservationStamp {
                reserved_at: state.now(),
                label: request.label.clone(),
            };
            apply_bay_event(state, &store, bay_id, BayEvent::Reserve, Some(stamp)).await?;
            cascade_close(state, &store, bay_id).await?;
        }
        OverrideAction::Unreserve => {
            apply_bay_event(state, &store, bay_id, BayEvent::Unreserve, None).await?;
        }
    }

    info!(bay = bay.bay_number, action = ?request.action, "bay override applied");

    let view = overview_service::bay_view(&store, bay_id, state.now()).await?;
    overview_events::publish_bay_changed(state, view.clone()).await;

    Ok(OverrideResponse { bay: view })
}

/// Shared close path used by manual ends, overrides, lazy expiry, and the
/// reconciliation sweep. The guarded store close keeps it idempotent; the
/// bay is released only when it is occupied with nothing else open.
pub(crate) async fn close_assignment(
    state: &SharedState,
    store: &Arc<dyn RangeStore>,
    assignment: &AssignmentEntity,
    reason: CloseReason,
) -> Result<CloseOutcome, ServiceError> {
    let now = state.now();
    let outcome = store.close_session(assignment.id, now).await?;

    match &outcome {
        CloseOutcome::Closed { bay_id, .. } => {
            let released = store.release_bay_if_idle(*bay_id).await?;
            let bay_number = find_bay(store, *bay_id)
                .await
                .map(|bay| bay.bay_number)
                .unwrap_or_default();
            info!(
                assignment = %assignment.id,
                bay = bay_number,
                reason = ?reason,
                released,
                "session closed"
            );
            overview_events::broadcast_session_ended(state, assignment.id, bay_number, reason);
            overview_events::publish_bay_refresh(state, store, *bay_id).await;
        }
        CloseOutcome::AlreadyClosed => {
            debug!(assignment = %assignment.id, reason = ?reason, "close was a no-op");
        }
    }

    Ok(outcome)
}

/// Close whatever open assignment the bay still holds, through the same
/// idempotent path as a manual end.
async fn cascade_close(
    state: &SharedState,
    store: &Arc<dyn RangeStore>,
    bay_id: Uuid,
) -> Result<(), ServiceError> {
    if let Some(open) = store.open_assignment_for_bay(bay_id).await? {
        close_assignment(state, store, &open, CloseReason::Override).await?;
    }
    Ok(())
}

/// Apply a status event through the pure transition rules and a conditional
/// store update, retrying once when the compare-and-swap loses a race.
async fn apply_bay_event(
    state: &SharedState,
    store: &Arc<dyn RangeStore>,
    bay_id: Uuid,
    event: BayEvent,
    reservation: Option<ReservationStamp>,
) -> Result<(), ServiceError> {
    for _attempt in 0..2 {
        let bay = find_bay(store, bay_id).await?;
        match state_machine::compute_transition(bay.status, event)? {
            Transition::Noop => return Ok(()),
            Transition::Changed(next) => {
                let expected = state_machine::expected_sources(event);
                if store
                    .set_bay_status(bay_id, expected, next, reservation.clone())
                    .await?
                {
                    return Ok(());
                }
                debug!(%bay_id, ?event, "bay status moved under us; retrying once");
            }
        }
    }

    Err(ServiceError::Conflict(format!(
        "bay `{bay_id}` status changed concurrently; retry the override"
    )))
}

async fn find_bay(store: &Arc<dyn RangeStore>, bay_id: Uuid) -> Result<BayEntity, ServiceError> {
    store
        .find_bay(bay_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("bay `{bay_id}` not found")))
}

async fn find_assignment(
    store: &Arc<dyn RangeStore>,
    assignment_id: Uuid,
) -> Result<AssignmentEntity, ServiceError> {
    store
        .find_assignment(assignment_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("assignment `{assignment_id}` not found")))
}

fn generate_receipt_number() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000u32))
}
