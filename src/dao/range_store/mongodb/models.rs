use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    AssignmentEntity, BallTransactionEntity, BayEntity, BayStatus, PlayerEntity, SessionKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoBayDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    bay_number: u32,
    status: BayStatus,
    reserved_at: Option<DateTime>,
    reserved_label: Option<String>,
}

impl From<BayEntity> for MongoBayDocument {
    fn from(value: BayEntity) -> Self {
        Self {
            id: value.id,
            bay_number: value.bay_number,
            status: value.status,
            reserved_at: value.reserved_at.map(DateTime::from_system_time),
            reserved_label: value.reserved_label,
        }
    }
}

impl From<MongoBayDocument> for BayEntity {
    fn from(value: MongoBayDocument) -> Self {
        Self {
            id: value.id,
            bay_number: value.bay_number,
            status: value.status,
            reserved_at: value.reserved_at.map(DateTime::to_system_time),
            reserved_label: value.reserved_label,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAssignmentDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    bay_id: Uuid,
    player_id: Uuid,
    dispatcher_id: Uuid,
    assigned_time: DateTime,
    end_time: Option<DateTime>,
    planned_end_time: Option<DateTime>,
    kind: SessionKind,
    open: bool,
}

impl From<AssignmentEntity> for MongoAssignmentDocument {
    fn from(value: AssignmentEntity) -> Self {
        Self {
            id: value.id,
            bay_id: value.bay_id,
            player_id: value.player_id,
            dispatcher_id: value.dispatcher_id,
            assigned_time: DateTime::from_system_time(value.assigned_time),
            end_time: value.end_time.map(DateTime::from_system_time),
            planned_end_time: value.planned_end_time.map(DateTime::from_system_time),
            kind: value.kind,
            open: value.open,
        }
    }
}

impl From<MongoAssignmentDocument> for AssignmentEntity {
    fn from(value: MongoAssignmentDocument) -> Self {
        Self {
            id: value.id,
            bay_id: value.bay_id,
            player_id: value.player_id,
            dispatcher_id: value.dispatcher_id,
            assigned_time: value.assigned_time.to_system_time(),
            end_time: value.end_time.map(DateTime::to_system_time),
            planned_end_time: value.planned_end_time.map(DateTime::to_system_time),
            kind: value.kind,
            open: value.open,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    nickname: String,
    receipt_number: String,
    price_per_hour: Option<f64>,
    start_time: Option<DateTime>,
    end_time: Option<DateTime>,
    created_by: Uuid,
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            nickname: value.nickname,
            receipt_number: value.receipt_number,
            price_per_hour: value.price_per_hour,
            start_time: value.start_time.map(DateTime::from_system_time),
            end_time: value.end_time.map(DateTime::from_system_time),
            created_by: value.created_by,
        }
    }
}

impl From<MongoPlayerDocument> for PlayerEntity {
    fn from(value: MongoPlayerDocument) -> Self {
        Self {
            id: value.id,
            nickname: value.nickname,
            receipt_number: value.receipt_number,
            price_per_hour: value.price_per_hour,
            start_time: value.start_time.map(DateTime::to_system_time),
            end_time: value.end_time.map(DateTime::to_system_time),
            created_by: value.created_by,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTransactionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    assignment_id: Uuid,
    handler_id: Uuid,
    bucket_count: u32,
    delivered_time: DateTime,
}

impl From<BallTransactionEntity> for MongoTransactionDocument {
    fn from(value: BallTransactionEntity) -> Self {
        Self {
            id: value.id,
            assignment_id: value.assignment_id,
            handler_id: value.handler_id,
            bucket_count: value.bucket_count,
            delivered_time: DateTime::from_system_time(value.delivered_time),
        }
    }
}

impl From<MongoTransactionDocument> for BallTransactionEntity {
    fn from(value: MongoTransactionDocument) -> Self {
        Self {
            id: value.id,
            assignment_id: value.assignment_id,
            handler_id: value.handler_id,
            bucket_count: value.bucket_count,
            delivered_time: value.delivered_time.to_system_time(),
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}

/// Stored string for a bay status, used in conditional update filters.
pub fn status_str(status: BayStatus) -> &'static str {
    match status {
        BayStatus::Available => "Available",
        BayStatus::Occupied => "Occupied",
        BayStatus::Reserved => "Reserved",
        BayStatus::Maintenance => "Maintenance",
    }
}
