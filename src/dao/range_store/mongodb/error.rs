use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Errors raised by the MongoDB-backed range store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to seed the bay pool")]
    SeedBays {
        #[source]
        source: MongoError,
    },
    #[error("failed to load bays")]
    ListBays {
        #[source]
        source: MongoError,
    },
    #[error("failed to load bay `{id}`")]
    LoadBay {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load assignment `{id}`")]
    LoadAssignment {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list open assignments")]
    ListAssignments {
        #[source]
        source: MongoError,
    },
    #[error("failed to load player `{id}`")]
    LoadPlayer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load transactions for assignment `{id}`")]
    ListTransactions {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to persist session on bay `{bay_id}`")]
    SaveSession {
        bay_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to close assignment `{id}`")]
    CloseSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to append transaction `{id}`")]
    AppendTransaction {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to update player `{id}`")]
    UpdatePlayer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to update bay `{id}`")]
    UpdateBay {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    /// A guarded precondition no longer held; surfaced to callers as a
    /// storage conflict rather than an outage.
    #[error("conflict: {message}")]
    Conflict { message: String },
}

impl MongoDaoError {
    /// Construct a conflict for a lost guarded update.
    pub fn conflict(message: impl Into<String>) -> Self {
        MongoDaoError::Conflict {
            message: message.into(),
        }
    }
}
