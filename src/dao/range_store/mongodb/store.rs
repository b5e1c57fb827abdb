use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, DateTime, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAssignmentDocument, MongoBayDocument, MongoPlayerDocument, MongoTransactionDocument,
        doc_id, status_str, uuid_as_binary,
    },
};
use crate::dao::{
    models::{AssignmentEntity, BallTransactionEntity, BayEntity, BayStatus, PlayerEntity},
    range_store::{CloseOutcome, RangeStore, ReservationStamp},
    storage::StorageResult,
};

const BAY_COLLECTION_NAME: &str = "bays";
const ASSIGNMENT_COLLECTION_NAME: &str = "assignments";
const PLAYER_COLLECTION_NAME: &str = "players";
const TRANSACTION_COLLECTION_NAME: &str = "ball_transactions";

/// MongoDB-backed range store.
///
/// The one-open-assignment-per-bay invariant is enforced server-side by a
/// partial unique index over open assignments; bay status moves through
/// status-match-then-update writes. Every compound operation either commits
/// fully or unwinds its partial writes before reporting a conflict.
#[derive(Clone)]
pub struct MongoRangeStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRangeStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let bays = self.bay_collection().await;
        let bay_number_index = IndexModel::builder()
            .keys(doc! {"bay_number": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("bay_number_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        bays.create_index(bay_number_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: BAY_COLLECTION_NAME,
                index: "bay_number",
                source,
            })?;

        // The database-level guard behind the one-open-assignment-per-bay
        // invariant: at most one assignment document per bay may carry
        // `open: true` at any time.
        let assignments = self.assignment_collection().await;
        let open_per_bay_index = IndexModel::builder()
            .keys(doc! {"bay_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("one_open_per_bay_idx".to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! {"open": true}))
                    .build(),
            )
            .build();
        assignments
            .create_index(open_per_bay_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ASSIGNMENT_COLLECTION_NAME,
                index: "bay_id(open)",
                source,
            })?;

        let open_index = IndexModel::builder()
            .keys(doc! {"open": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("assignment_open_idx".to_owned()))
                    .build(),
            )
            .build();
        assignments
            .create_index(open_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ASSIGNMENT_COLLECTION_NAME,
                index: "open",
                source,
            })?;

        let transactions = self.transaction_collection().await;
        let transaction_index = IndexModel::builder()
            .keys(doc! {"assignment_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("transaction_assignment_idx".to_owned()))
                    .build(),
            )
            .build();
        transactions
            .create_index(transaction_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TRANSACTION_COLLECTION_NAME,
                index: "assignment_id",
                source,
            })?;

        Ok(())
    }

    async fn bay_collection(&self) -> Collection<MongoBayDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(BAY_COLLECTION_NAME)
    }

    async fn assignment_collection(&self) -> Collection<MongoAssignmentDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(ASSIGNMENT_COLLECTION_NAME)
    }

    async fn player_collection(&self) -> Collection<MongoPlayerDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(PLAYER_COLLECTION_NAME)
    }

    async fn transaction_collection(&self) -> Collection<MongoTransactionDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(TRANSACTION_COLLECTION_NAME)
    }

    async fn seed_bays(&self, count: u32) -> MongoResult<usize> {
        let existing: Vec<u32> = self
            .list_bays()
            .await?
            .into_iter()
            .map(|bay| bay.bay_number)
            .collect();

        let collection = self.bay_collection().await;
        let mut created = 0;
        for number in 1..=count {
            if existing.contains(&number) {
                continue;
            }
            let document: MongoBayDocument = BayEntity::new(number).into();
            match collection.insert_one(&document).await {
                Ok(_) => created += 1,
                // Another instance seeded this bay number concurrently.
                Err(err) if is_duplicate_key(&err) => {}
                Err(source) => return Err(MongoDaoError::SeedBays { source }),
            }
        }
        Ok(created)
    }

    async fn list_bays(&self) -> MongoResult<Vec<BayEntity>> {
        let collection = self.bay_collection().await;
        let documents: Vec<MongoBayDocument> = collection
            .find(doc! {})
            .sort(doc! {"bay_number": 1})
            .await
            .map_err(|source| MongoDaoError::ListBays { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListBays { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_bay(&self, id: Uuid) -> MongoResult<Option<BayEntity>> {
        let collection = self.bay_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadBay { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_assignment(&self, id: Uuid) -> MongoResult<Option<AssignmentEntity>> {
        let collection = self.assignment_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadAssignment { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_player(&self, id: Uuid) -> MongoResult<Option<PlayerEntity>> {
        let collection = self.player_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadPlayer { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn open_assignments(&self) -> MongoResult<Vec<AssignmentEntity>> {
        let collection = self.assignment_collection().await;
        let documents: Vec<MongoAssignmentDocument> = collection
            .find(doc! {"open": true})
            .sort(doc! {"assigned_time": 1})
            .await
            .map_err(|source| MongoDaoError::ListAssignments { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListAssignments { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn open_assignment_for_bay(&self, bay_id: Uuid) -> MongoResult<Option<AssignmentEntity>> {
        let collection = self.assignment_collection().await;
        let document = collection
            .find_one(doc! {"bay_id": uuid_as_binary(bay_id), "open": true})
            .await
            .map_err(|source| MongoDaoError::ListAssignments { source })?;
        Ok(document.map(Into::into))
    }

    async fn transactions_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> MongoResult<Vec<BallTransactionEntity>> {
        let collection = self.transaction_collection().await;
        let documents: Vec<MongoTransactionDocument> = collection
            .find(doc! {"assignment_id": uuid_as_binary(assignment_id)})
            .sort(doc! {"delivered_time": 1})
            .await
            .map_err(|source| MongoDaoError::ListTransactions {
                id: assignment_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListTransactions {
                id: assignment_id,
                source,
            })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn create_session(
        &self,
        player: PlayerEntity,
        assignment: AssignmentEntity,
    ) -> MongoResult<()> {
        let bay_id = assignment.bay_id;

        // Claim the bay first: the status-matched update only wins while the
        // bay still reads Available.
        let bays = self.bay_collection().await;
        let claim = bays
            .update_one(
                doc! {"_id": uuid_as_binary(bay_id), "status": status_str(BayStatus::Available)},
                doc! {"$set": {
                    "status": status_str(BayStatus::Occupied),
                    "reserved_at": Bson::Null,
                    "reserved_label": Bson::Null,
                }},
            )
            .await
            .map_err(|source| MongoDaoError::SaveSession { bay_id, source })?;
        if claim.matched_count == 0 {
            return Err(MongoDaoError::conflict(format!(
                "bay `{bay_id}` is not available"
            )));
        }

        let players = self.player_collection().await;
        let player_id = player.id;
        let player_document: MongoPlayerDocument = player.into();
        if let Err(source) = players.insert_one(&player_document).await {
            let _ = self.unclaim_bay(bay_id).await;
            return Err(MongoDaoError::SaveSession { bay_id, source });
        }

        let assignments = self.assignment_collection().await;
        let assignment_document: MongoAssignmentDocument = assignment.into();
        if let Err(source) = assignments.insert_one(&assignment_document).await {
            let _ = players.delete_one(doc_id(player_id)).await;
            let _ = self.unclaim_bay(bay_id).await;
            if is_duplicate_key(&source) {
                // The partial unique index caught a concurrent open
                // assignment the bay claim could not see.
                return Err(MongoDaoError::conflict(format!(
                    "bay `{bay_id}` already has an open assignment"
                )));
            }
            return Err(MongoDaoError::SaveSession { bay_id, source });
        }

        Ok(())
    }

    async fn unclaim_bay(&self, bay_id: Uuid) -> MongoResult<()> {
        let bays = self.bay_collection().await;
        bays.update_one(
            doc! {"_id": uuid_as_binary(bay_id), "status": status_str(BayStatus::Occupied)},
            doc! {"$set": {"status": status_str(BayStatus::Available)}},
        )
        .await
        .map_err(|source| MongoDaoError::UpdateBay { id: bay_id, source })?;
        Ok(())
    }

    async fn close_session(
        &self,
        assignment_id: Uuid,
        end_time: SystemTime,
    ) -> MongoResult<CloseOutcome> {
        let assignments = self.assignment_collection().await;
        let end = DateTime::from_system_time(end_time);

        let closed = assignments
            .find_one_and_update(
                doc! {"_id": uuid_as_binary(assignment_id), "open": true},
                doc! {"$set": {"open": false, "end_time": end}},
            )
            .await
            .map_err(|source| MongoDaoError::CloseSession {
                id: assignment_id,
                source,
            })?;

        let Some(document) = closed else {
            let exists = assignments
                .find_one(doc_id(assignment_id))
                .await
                .map_err(|source| MongoDaoError::LoadAssignment {
                    id: assignment_id,
                    source,
                })?;
            return if exists.is_some() {
                Ok(CloseOutcome::AlreadyClosed)
            } else {
                Err(MongoDaoError::conflict(format!(
                    "assignment `{assignment_id}` does not exist"
                )))
            };
        };

        let assignment: AssignmentEntity = document.into();
        let players = self.player_collection().await;
        players
            .update_one(
                doc_id(assignment.player_id),
                doc! {"$set": {"end_time": end}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdatePlayer {
                id: assignment.player_id,
                source,
            })?;

        Ok(CloseOutcome::Closed {
            bay_id: assignment.bay_id,
            player_id: assignment.player_id,
        })
    }

    async fn append_transaction(&self, transaction: BallTransactionEntity) -> MongoResult<()> {
        let assignment_id = transaction.assignment_id;
        let open = self
            .assignment_is_open(assignment_id)
            .await?;
        if !open {
            return Err(MongoDaoError::conflict(format!(
                "assignment `{assignment_id}` is not open"
            )));
        }

        let transactions = self.transaction_collection().await;
        let transaction_id = transaction.id;
        let document: MongoTransactionDocument = transaction.into();
        transactions
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::AppendTransaction {
                id: transaction_id,
                source,
            })?;

        // Re-check after the insert: a close may have slipped between the
        // guard read and the write. Unwinding keeps the ledger clean and
        // hands the race verdict to exactly one side.
        let still_open = self.assignment_is_open(assignment_id).await?;
        if !still_open {
            let _ = transactions.delete_one(doc_id(transaction_id)).await;
            return Err(MongoDaoError::conflict(format!(
                "assignment `{assignment_id}` closed while recording the delivery"
            )));
        }

        Ok(())
    }

    async fn assignment_is_open(&self, assignment_id: Uuid) -> MongoResult<bool> {
        let assignments = self.assignment_collection().await;
        let open = assignments
            .find_one(doc! {"_id": uuid_as_binary(assignment_id), "open": true})
            .await
            .map_err(|source| MongoDaoError::LoadAssignment {
                id: assignment_id,
                source,
            })?;
        Ok(open.is_some())
    }

    async fn set_player_start_time(
        &self,
        player_id: Uuid,
        start_time: SystemTime,
    ) -> MongoResult<bool> {
        let players = self.player_collection().await;
        let result = players
            .update_one(
                doc! {"_id": uuid_as_binary(player_id), "start_time": Bson::Null},
                doc! {"$set": {"start_time": DateTime::from_system_time(start_time)}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdatePlayer {
                id: player_id,
                source,
            })?;

        if result.matched_count > 0 {
            return Ok(true);
        }

        let exists = players
            .find_one(doc_id(player_id))
            .await
            .map_err(|source| MongoDaoError::LoadPlayer {
                id: player_id,
                source,
            })?;
        if exists.is_none() {
            return Err(MongoDaoError::conflict(format!(
                "player `{player_id}` does not exist"
            )));
        }
        Ok(false)
    }

    async fn set_bay_status(
        &self,
        bay_id: Uuid,
        expected: Vec<BayStatus>,
        next: BayStatus,
        reservation: Option<ReservationStamp>,
    ) -> MongoResult<bool> {
        let expected: Vec<&'static str> = expected.into_iter().map(status_str).collect();
        let update = match reservation {
            Some(stamp) => doc! {"$set": {
                "status": status_str(next),
                "reserved_at": DateTime::from_system_time(stamp.reserved_at),
                "reserved_label": stamp.label.map(Bson::String).unwrap_or(Bson::Null),
            }},
            None => doc! {"$set": {
                "status": status_str(next),
                "reserved_at": Bson::Null,
                "reserved_label": Bson::Null,
            }},
        };

        let bays = self.bay_collection().await;
        let result = bays
            .update_one(
                doc! {"_id": uuid_as_binary(bay_id), "status": {"$in": expected}},
                update,
            )
            .await
            .map_err(|source| MongoDaoError::UpdateBay { id: bay_id, source })?;

        Ok(result.matched_count > 0)
    }

    async fn release_bay_if_idle(&self, bay_id: Uuid) -> MongoResult<bool> {
        if self.open_assignment_for_bay(bay_id).await?.is_some() {
            return Ok(false);
        }

        // A new assignment cannot appear while the bay still reads Occupied,
        // so the status-matched update closes the gap left by the check.
        let bays = self.bay_collection().await;
        let result = bays
            .update_one(
                doc! {"_id": uuid_as_binary(bay_id), "status": status_str(BayStatus::Occupied)},
                doc! {"$set": {"status": status_str(BayStatus::Available)}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateBay { id: bay_id, source })?;

        Ok(result.matched_count > 0)
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

impl RangeStore for MongoRangeStore {
    fn seed_bays(&self, count: u32) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.seed_bays(count).await.map_err(Into::into) })
    }

    fn list_bays(&self) -> BoxFuture<'static, StorageResult<Vec<BayEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_bays().await.map_err(Into::into) })
    }

    fn find_bay(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BayEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_bay(id).await.map_err(Into::into) })
    }

    fn find_assignment(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_assignment(id).await.map_err(Into::into) })
    }

    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_player(id).await.map_err(Into::into) })
    }

    fn open_assignments(&self) -> BoxFuture<'static, StorageResult<Vec<AssignmentEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.open_assignments().await.map_err(Into::into) })
    }

    fn open_assignment_for_bay(
        &self,
        bay_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.open_assignment_for_bay(bay_id).await.map_err(Into::into) })
    }

    fn transactions_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<BallTransactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .transactions_for_assignment(assignment_id)
                .await
                .map_err(Into::into)
        })
    }

    fn create_session(
        &self,
        player: PlayerEntity,
        assignment: AssignmentEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .create_session(player, assignment)
                .await
                .map_err(Into::into)
        })
    }

    fn close_session(
        &self,
        assignment_id: Uuid,
        end_time: SystemTime,
    ) -> BoxFuture<'static, StorageResult<CloseOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .close_session(assignment_id, end_time)
                .await
                .map_err(Into::into)
        })
    }

    fn append_transaction(
        &self,
        transaction: BallTransactionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_transaction(transaction).await.map_err(Into::into) })
    }

    fn set_player_start_time(
        &self,
        player_id: Uuid,
        start_time: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_player_start_time(player_id, start_time)
                .await
                .map_err(Into::into)
        })
    }

    fn set_bay_status(
        &self,
        bay_id: Uuid,
        expected: Vec<BayStatus>,
        next: BayStatus,
        reservation: Option<ReservationStamp>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_bay_status(bay_id, expected, next, reservation)
                .await
                .map_err(Into::into)
        })
    }

    fn release_bay_if_idle(&self, bay_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.release_bay_if_idle(bay_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
