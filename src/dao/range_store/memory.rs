use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CloseOutcome, RangeStore, ReservationStamp};
use crate::dao::{
    models::{AssignmentEntity, BallTransactionEntity, BayEntity, BayStatus, PlayerEntity},
    storage::{StorageError, StorageResult},
};

/// In-process store backing tests and database-less deployments.
///
/// Collections are lock-free maps; the compound conditional operations take
/// the write gate so their read-check-then-write sequences are atomic with
/// respect to each other, which is what the lifecycle guards rely on.
#[derive(Clone, Default)]
pub struct MemoryRangeStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    bays: DashMap<Uuid, BayEntity>,
    assignments: DashMap<Uuid, AssignmentEntity>,
    players: DashMap<Uuid, PlayerEntity>,
    transactions: DashMap<Uuid, BallTransactionEntity>,
    write_gate: Mutex<()>,
}

impl MemoryRangeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn open_assignment_for_bay_sync(&self, bay_id: Uuid) -> Option<AssignmentEntity> {
        self.inner
            .assignments
            .iter()
            .find(|entry| entry.bay_id == bay_id && entry.open)
            .map(|entry| entry.value().clone())
    }

    async fn seed_bays(&self, count: u32) -> StorageResult<usize> {
        let _gate = self.inner.write_gate.lock().await;
        let existing: Vec<u32> = self
            .inner
            .bays
            .iter()
            .map(|entry| entry.bay_number)
            .collect();

        let mut created = 0;
        for number in 1..=count {
            if !existing.contains(&number) {
                let bay = BayEntity::new(number);
                self.inner.bays.insert(bay.id, bay);
                created += 1;
            }
        }
        Ok(created)
    }

    async fn create_session(
        &self,
        player: PlayerEntity,
        assignment: AssignmentEntity,
    ) -> StorageResult<()> {
        let _gate = self.inner.write_gate.lock().await;

        let bay_id = assignment.bay_id;
        let Some(mut bay) = self.inner.bays.get_mut(&bay_id) else {
            return Err(StorageError::conflict(format!("bay `{bay_id}` does not exist")));
        };
        if bay.status != BayStatus::Available {
            return Err(StorageError::conflict(format!(
                "bay `{}` is {:?}",
                bay.bay_number, bay.status
            )));
        }
        if self.open_assignment_for_bay_sync(bay_id).is_some() {
            return Err(StorageError::conflict(format!(
                "bay `{}` already has an open assignment",
                bay.bay_number
            )));
        }

        bay.status = BayStatus::Occupied;
        drop(bay);
        self.inner.players.insert(player.id, player);
        self.inner.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    async fn close_session(
        &self,
        assignment_id: Uuid,
        end_time: SystemTime,
    ) -> StorageResult<CloseOutcome> {
        let _gate = self.inner.write_gate.lock().await;

        let Some(mut assignment) = self.inner.assignments.get_mut(&assignment_id) else {
            return Err(StorageError::conflict(format!(
                "assignment `{assignment_id}` does not exist"
            )));
        };
        if !assignment.open {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        assignment.open = false;
        assignment.end_time = Some(end_time);
        let bay_id = assignment.bay_id;
        let player_id = assignment.player_id;
        drop(assignment);

        if let Some(mut player) = self.inner.players.get_mut(&player_id) {
            player.end_time = Some(end_time);
        }

        Ok(CloseOutcome::Closed { bay_id, player_id })
    }

    async fn append_transaction(&self, transaction: BallTransactionEntity) -> StorageResult<()> {
        let _gate = self.inner.write_gate.lock().await;

        let open = self
            .inner
            .assignments
            .get(&transaction.assignment_id)
            .map(|assignment| assignment.open)
            .unwrap_or(false);
        if !open {
            return Err(StorageError::conflict(format!(
                "assignment `{}` is not open",
                transaction.assignment_id
            )));
        }

        self.inner.transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn set_player_start_time(
        &self,
        player_id: Uuid,
        start_time: SystemTime,
    ) -> StorageResult<bool> {
        let _gate = self.inner.write_gate.lock().await;

        let Some(mut player) = self.inner.players.get_mut(&player_id) else {
            return Err(StorageError::conflict(format!(
                "player `{player_id}` does not exist"
            )));
        };
        if player.start_time.is_some() {
            return Ok(false);
        }
        player.start_time = Some(start_time);
        Ok(true)
    }

    async fn set_bay_status(
        &self,
        bay_id: Uuid,
        expected: Vec<BayStatus>,
        next: BayStatus,
        reservation: Option<ReservationStamp>,
    ) -> StorageResult<bool> {
        let _gate = self.inner.write_gate.lock().await;

        let Some(mut bay) = self.inner.bays.get_mut(&bay_id) else {
            return Ok(false);
        };
        if !expected.contains(&bay.status) {
            return Ok(false);
        }

        bay.status = next;
        match reservation {
            Some(stamp) => {
                bay.reserved_at = Some(stamp.reserved_at);
                bay.reserved_label = stamp.label;
            }
            None => {
                bay.reserved_at = None;
                bay.reserved_label = None;
            }
        }
        Ok(true)
    }

    async fn release_bay_if_idle(&self, bay_id: Uuid) -> StorageResult<bool> {
        let _gate = self.inner.write_gate.lock().await;

        if self.open_assignment_for_bay_sync(bay_id).is_some() {
            return Ok(false);
        }
        let Some(mut bay) = self.inner.bays.get_mut(&bay_id) else {
            return Ok(false);
        };
        if bay.status != BayStatus::Occupied {
            return Ok(false);
        }
        bay.status = BayStatus::Available;
        Ok(true)
    }
}

impl RangeStore for MemoryRangeStore {
    fn seed_bays(&self, count: u32) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.seed_bays(count).await })
    }

    fn list_bays(&self) -> BoxFuture<'static, StorageResult<Vec<BayEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut bays: Vec<BayEntity> = store
                .inner
                .bays
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            bays.sort_by_key(|bay| bay.bay_number);
            Ok(bays)
        })
    }

    fn find_bay(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BayEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.bays.get(&id).map(|entry| entry.value().clone())) })
    }

    fn find_assignment(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.assignments.get(&id).map(|entry| entry.value().clone())) })
    }

    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.players.get(&id).map(|entry| entry.value().clone())) })
    }

    fn open_assignments(&self) -> BoxFuture<'static, StorageResult<Vec<AssignmentEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut open: Vec<AssignmentEntity> = store
                .inner
                .assignments
                .iter()
                .filter(|entry| entry.open)
                .map(|entry| entry.value().clone())
                .collect();
            open.sort_by_key(|assignment| assignment.assigned_time);
            Ok(open)
        })
    }

    fn open_assignment_for_bay(
        &self,
        bay_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.open_assignment_for_bay_sync(bay_id)) })
    }

    fn transactions_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<BallTransactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut transactions: Vec<BallTransactionEntity> = store
                .inner
                .transactions
                .iter()
                .filter(|entry| entry.assignment_id == assignment_id)
                .map(|entry| entry.value().clone())
                .collect();
            transactions.sort_by_key(|transaction| transaction.delivered_time);
            Ok(transactions)
        })
    }

    fn create_session(
        &self,
        player: PlayerEntity,
        assignment: AssignmentEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_session(player, assignment).await })
    }

    fn close_session(
        &self,
        assignment_id: Uuid,
        end_time: SystemTime,
    ) -> BoxFuture<'static, StorageResult<CloseOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.close_session(assignment_id, end_time).await })
    }

    fn append_transaction(
        &self,
        transaction: BallTransactionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_transaction(transaction).await })
    }

    fn set_player_start_time(
        &self,
        player_id: Uuid,
        start_time: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.set_player_start_time(player_id, start_time).await })
    }

    fn set_bay_status(
        &self,
        bay_id: Uuid,
        expected: Vec<BayStatus>,
        next: BayStatus,
        reservation: Option<ReservationStamp>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.set_bay_status(bay_id, expected, next, reservation).await })
    }

    fn release_bay_if_idle(&self, bay_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.release_bay_if_idle(bay_id).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::models::SessionKind;

    fn sample_session(bay_id: Uuid) -> (PlayerEntity, AssignmentEntity) {
        let staff = Uuid::new_v4();
        let player = PlayerEntity {
            id: Uuid::new_v4(),
            nickname: "Alex".into(),
            receipt_number: "100001".into(),
            price_per_hour: None,
            start_time: None,
            end_time: None,
            created_by: staff,
        };
        let assignment = AssignmentEntity {
            id: Uuid::new_v4(),
            bay_id,
            player_id: player.id,
            dispatcher_id: staff,
            assigned_time: SystemTime::now(),
            end_time: None,
            planned_end_time: None,
            kind: SessionKind::Open,
            open: true,
        };
        (player, assignment)
    }

    async fn store_with_bay() -> (MemoryRangeStore, Uuid) {
        let store = MemoryRangeStore::new();
        store.seed_bays(3).await.unwrap();
        let bays = RangeStore::list_bays(&store).await.unwrap();
        (store.clone(), bays[0].id)
    }

    #[tokio::test]
    async fn claim_rejects_second_session_on_same_bay() {
        let (store, bay_id) = store_with_bay().await;

        let (player, assignment) = sample_session(bay_id);
        store.create_session(player, assignment).await.unwrap();

        let (player, assignment) = sample_session(bay_id);
        let err = store.create_session(player, assignment).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_bay() {
        let (store, bay_id) = store_with_bay().await;
        let (player, assignment) = sample_session(bay_id);
        let assignment_id = assignment.id;
        store.create_session(player, assignment).await.unwrap();

        let end = SystemTime::now();
        let first = store.close_session(assignment_id, end).await.unwrap();
        assert!(matches!(first, CloseOutcome::Closed { .. }));

        let second = store
            .close_session(assignment_id, end + Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(second, CloseOutcome::AlreadyClosed);

        assert!(store.release_bay_if_idle(bay_id).await.unwrap());
        let bay = RangeStore::find_bay(&store, bay_id).await.unwrap().unwrap();
        assert_eq!(bay.status, BayStatus::Available);
    }

    #[tokio::test]
    async fn start_time_is_set_exactly_once() {
        let (store, bay_id) = store_with_bay().await;
        let (player, assignment) = sample_session(bay_id);
        let player_id = player.id;
        store.create_session(player, assignment).await.unwrap();

        let first = SystemTime::now();
        assert!(store.set_player_start_time(player_id, first).await.unwrap());
        assert!(
            !store
                .set_player_start_time(player_id, first + Duration::from_secs(60))
                .await
                .unwrap()
        );

        let player = RangeStore::find_player(&store, player_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(player.start_time, Some(first));
    }

    #[tokio::test]
    async fn append_rejected_once_assignment_closed() {
        let (store, bay_id) = store_with_bay().await;
        let (player, assignment) = sample_session(bay_id);
        let assignment_id = assignment.id;
        store.create_session(player, assignment).await.unwrap();
        store
            .close_session(assignment_id, SystemTime::now())
            .await
            .unwrap();

        let transaction = BallTransactionEntity {
            id: Uuid::new_v4(),
            assignment_id,
            handler_id: Uuid::new_v4(),
            bucket_count: 2,
            delivered_time: SystemTime::now(),
        };
        let err = store.append_transaction(transaction).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }
}
