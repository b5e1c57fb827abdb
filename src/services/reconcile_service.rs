use std::collections::BTreeMap;

use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{BayStatus, CloseReason},
        range_store::{CloseOutcome, RangeStore},
    },
    dto::{
        format_system_time,
        reconcile::{ReconcileAssignment, ReconcileBayReport, ReconcileReport},
    },
    error::ServiceError,
    services::{overview_events, session_service},
    state::SharedState,
};

/// Scan every open assignment, grouped by bay, and optionally close them.
///
/// Dry-run mode only reports findings, for operator review after an unclean
/// shutdown. Apply mode closes each assignment through the idempotent close
/// path, then re-checks each affected bay so none stays occupied with
/// nothing open. Safe to run repeatedly and concurrently with live traffic.
pub async fn reconcile(state: &SharedState, apply: bool) -> Result<ReconcileReport, ServiceError> {
    let store = state.require_range_store().await?;
    let swept_at = state.now();

    let open = store.open_assignments().await?;
    let bays = store.list_bays().await?;

    let mut by_bay: BTreeMap<u32, ReconcileBayReport> = BTreeMap::new();
    let mut affected: Vec<Uuid> = Vec::new();
    let total_open = open.len();

    for assignment in &open {
        let Some(bay) = bays.iter().find(|bay| bay.id == assignment.bay_id) else {
            warn!(
                assignment = %assignment.id,
                bay = %assignment.bay_id,
                "open assignment references an unknown bay"
            );
            continue;
        };

        let nickname = store
            .find_player(assignment.player_id)
            .await?
            .map(|player| player.nickname);

        let closed = if apply {
            let outcome =
                session_service::close_assignment(state, &store, assignment, CloseReason::Reconciliation)
                    .await?;
            matches!(outcome, CloseOutcome::Closed { .. })
        } else {
            false
        };

        if apply && !affected.contains(&bay.id) {
            affected.push(bay.id);
        }

        by_bay
            .entry(bay.bay_number)
            .or_insert_with(|| ReconcileBayReport {
                bay_id: bay.id,
                bay_number: bay.bay_number,
                assignments: Vec::new(),
            })
            .assignments
            .push(ReconcileAssignment {
                assignment_id: assignment.id,
                player_id: assignment.player_id,
                nickname,
                assigned_time: format_system_time(assignment.assigned_time),
                closed,
            });
    }

    if apply {
        // Defensive second pass: every affected bay with nothing open left
        // must read Available again.
        for bay_id in affected {
            if store.release_bay_if_idle(bay_id).await? {
                overview_events::publish_bay_refresh(state, &store, bay_id).await;
            }
        }
        info!(total_open, "reconciliation sweep applied");
    } else {
        info!(total_open, "reconciliation dry run completed");
    }

    Ok(ReconcileReport {
        swept_at: format_system_time(swept_at),
        applied: apply,
        total_open,
        bays: by_bay.into_values().collect(),
    })
}

/// Counters describing one background sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Timed sessions closed because their planned end had passed.
    pub expired_sessions: usize,
    /// Reservations cleared because their hold time ran out.
    pub expired_reservations: usize,
}

/// One pass of the proactive sweep: close expired timed sessions and clear
/// reservations older than the configured hold time. Skips quietly while no
/// storage backend is installed.
pub async fn sweep_once(state: &SharedState) -> Result<SweepStats, ServiceError> {
    let Some(store) = state.range_store().await else {
        return Ok(SweepStats::default());
    };
    let now = state.now();
    let mut stats = SweepStats::default();

    for assignment in store.open_assignments().await? {
        if assignment.is_expired(now) {
            let outcome =
                session_service::close_assignment(state, &store, &assignment, CloseReason::TimedExpiry)
                    .await?;
            if matches!(outcome, CloseOutcome::Closed { .. }) {
                stats.expired_sessions += 1;
            }
        }
    }

    if let Some(ttl) = state.config().reservation_ttl {
        for bay in store.list_bays().await? {
            if bay.status != BayStatus::Reserved {
                continue;
            }
            let lapsed = bay
                .reserved_at
                .is_some_and(|reserved_at| reserved_at + ttl <= now);
            if !lapsed {
                continue;
            }
            if store
                .set_bay_status(bay.id, vec![BayStatus::Reserved], BayStatus::Available, None)
                .await?
            {
                stats.expired_reservations += 1;
                info!(bay = bay.bay_number, "reservation expired");
                overview_events::publish_bay_refresh(state, &store, bay.id).await;
            }
        }
    }

    Ok(stats)
}

/// Background task running [`sweep_once`] on the configured interval.
pub async fn run_sweeper(state: SharedState) {
    let interval = state.config().sweep_interval;
    loop {
        sleep(interval).await;
        match sweep_once(&state).await {
            Ok(stats) if stats != SweepStats::default() => {
                info!(
                    expired_sessions = stats.expired_sessions,
                    expired_reservations = stats.expired_reservations,
                    "sweep pass closed stale state"
                );
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "sweep pass failed"),
        }
    }
}
