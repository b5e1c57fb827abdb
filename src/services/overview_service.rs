use std::{sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::{
    dao::{
        models::{AssignmentEntity, BayEntity, BayStatus},
        range_store::RangeStore,
    },
    dto::{
        format_system_time,
        overview::{BayView, OverviewResponse, OverviewSummary, PlayerSummary},
    },
    error::ServiceError,
    state::SharedState,
};

/// Assemble the full overview snapshot for polling or reconnecting
/// observers.
///
/// With a storage backend installed the snapshot is derived fresh and the
/// published cache refreshed from it. While storage is down the last
/// published rows are served instead: observers get a stale view rather
/// than an error.
pub async fn snapshot(state: &SharedState) -> Result<OverviewResponse, ServiceError> {
    let now = state.now();
    match state.range_store().await {
        Some(store) => {
            let views = build_bay_views(&store, now).await?;
            state.replace_overview_cache(views.clone()).await;
            let summary = summarize(&views);
            Ok(OverviewResponse::new(now, summary, views))
        }
        None => {
            let views = state.cached_overview().await;
            let summary = summarize(&views);
            Ok(OverviewResponse::new(now, summary, views))
        }
    }
}

/// Build the overview row for every bay, ordered by bay number.
pub async fn build_bay_views(
    store: &Arc<dyn RangeStore>,
    now: SystemTime,
) -> Result<Vec<BayView>, ServiceError> {
    let bays = store.list_bays().await?;
    let mut views = Vec::with_capacity(bays.len());
    for bay in &bays {
        views.push(build_bay_view(store, bay, now).await?);
    }
    Ok(views)
}

/// Build the overview row for a single bay.
pub async fn bay_view(
    store: &Arc<dyn RangeStore>,
    bay_id: Uuid,
    now: SystemTime,
) -> Result<BayView, ServiceError> {
    let bay = store
        .find_bay(bay_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("bay `{bay_id}` not found")))?;
    build_bay_view(store, &bay, now).await
}

async fn build_bay_view(
    store: &Arc<dyn RangeStore>,
    bay: &BayEntity,
    now: SystemTime,
) -> Result<BayView, ServiceError> {
    let assignment = store.open_assignment_for_bay(bay.id).await?;

    let mut view = BayView {
        bay_id: bay.id,
        bay_number: bay.bay_number,
        status: effective_status(bay, assignment.as_ref()),
        stored_status: bay.status,
        assignment_id: None,
        player: None,
        session_kind: None,
        assigned_time: None,
        start_time: None,
        planned_end_time: None,
        reserved_label: bay.reserved_label.clone(),
        total_balls: 0,
        transactions_count: 0,
        expired: false,
    };

    let Some(assignment) = assignment else {
        return Ok(view);
    };

    let transactions = store.transactions_for_assignment(assignment.id).await?;
    view.assignment_id = Some(assignment.id);
    view.session_kind = Some(assignment.kind);
    view.assigned_time = Some(format_system_time(assignment.assigned_time));
    view.planned_end_time = assignment.planned_end_time.map(format_system_time);
    view.total_balls = transactions
        .iter()
        .map(|transaction| u64::from(transaction.bucket_count))
        .sum();
    view.transactions_count = transactions.len();
    view.expired = assignment.is_expired(now);

    if let Some(player) = store.find_player(assignment.player_id).await? {
        view.start_time = player.start_time.map(format_system_time);
        view.player = Some(PlayerSummary {
            player_id: player.id,
            nickname: player.nickname,
            receipt_number: player.receipt_number,
        });
    }

    Ok(view)
}

/// An open assignment renders the bay occupied no matter what the stored
/// status says; the stored value is reported alongside.
fn effective_status(bay: &BayEntity, assignment: Option<&AssignmentEntity>) -> BayStatus {
    if assignment.is_some() {
        BayStatus::Occupied
    } else {
        bay.status
    }
}

/// Facility counters plus the "next free" hint for the dispatcher board.
pub fn summarize(views: &[BayView]) -> OverviewSummary {
    let total_bays = views.len();
    let occupied_bays = views
        .iter()
        .filter(|view| view.status == BayStatus::Occupied)
        .count();
    let maintenance_bays = views
        .iter()
        .filter(|view| view.stored_status == BayStatus::Maintenance)
        .count();
    let reserved_bays = views
        .iter()
        .filter(|view| view.status == BayStatus::Reserved)
        .count();
    let available_bays = total_bays.saturating_sub(occupied_bays + maintenance_bays + reserved_bays);

    let next_free = if available_bays > 0 {
        Some("Bay Ready".to_string())
    } else {
        views
            .iter()
            .filter_map(|view| view.planned_end_time.clone())
            .min()
    };

    OverviewSummary {
        total_bays,
        occupied_bays,
        maintenance_bays,
        reserved_bays,
        available_bays,
        next_free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn view(number: u32, status: BayStatus, stored: BayStatus) -> BayView {
        BayView {
            bay_id: Uuid::new_v4(),
            bay_number: number,
            status,
            stored_status: stored,
            assignment_id: None,
            player: None,
            session_kind: None,
            assigned_time: None,
            start_time: None,
            planned_end_time: None,
            reserved_label: None,
            total_balls: 0,
            transactions_count: 0,
            expired: false,
        }
    }

    #[test]
    fn summary_counts_and_bay_ready() {
        let views = vec![
            view(1, BayStatus::Available, BayStatus::Available),
            view(2, BayStatus::Occupied, BayStatus::Occupied),
            view(3, BayStatus::Maintenance, BayStatus::Maintenance),
            view(4, BayStatus::Reserved, BayStatus::Reserved),
        ];
        let summary = summarize(&views);
        assert_eq!(summary.total_bays, 4);
        assert_eq!(summary.occupied_bays, 1);
        assert_eq!(summary.maintenance_bays, 1);
        assert_eq!(summary.reserved_bays, 1);
        assert_eq!(summary.available_bays, 1);
        assert_eq!(summary.next_free.as_deref(), Some("Bay Ready"));
    }

    #[test]
    fn next_free_falls_back_to_earliest_planned_end() {
        let mut first = view(1, BayStatus::Occupied, BayStatus::Occupied);
        first.planned_end_time = Some("2026-08-05T11:00:00Z".into());
        let mut second = view(2, BayStatus::Occupied, BayStatus::Occupied);
        second.planned_end_time = Some("2026-08-05T10:30:00Z".into());

        let summary = summarize(&[first, second]);
        assert_eq!(summary.available_bays, 0);
        assert_eq!(summary.next_free.as_deref(), Some("2026-08-05T10:30:00Z"));
    }
}
