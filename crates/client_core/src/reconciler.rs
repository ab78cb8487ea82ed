use serde::Serialize;
use shared::{
    codec::decode_record,
    domain::{CalculationRecord, ObjectId},
    error::SessionError,
    protocol::ObjectData,
};

/// Latest read of a tracked object. `data` is `None` when the node reported
/// no such object or the read failed before any data arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSlot {
    pub object_id: ObjectId,
    pub data: Option<ObjectData>,
    pub error: Option<SessionError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum ObjectView {
    NoObjectTracked,
    ExistsButInvalid,
    ExistsValid(CalculationRecord),
    NotFoundOrLoading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub object_exists: bool,
    pub decoded: Option<CalculationRecord>,
    pub has_valid_data: bool,
    pub view: ObjectView,
}

impl Reconciliation {
    fn untracked() -> Self {
        Self {
            object_exists: false,
            decoded: None,
            has_valid_data: false,
            view: ObjectView::NoObjectTracked,
        }
    }
}

/// Derives the record view for the tracked id. A slot fetched for another id
/// is stale and reads as still loading.
pub fn reconcile(tracked: Option<&ObjectId>, fetch: Option<&FetchSlot>) -> Reconciliation {
    let Some(tracked) = tracked else {
        return Reconciliation::untracked();
    };

    let data = fetch
        .filter(|slot| &slot.object_id == tracked)
        .and_then(|slot| slot.data.as_ref());

    let object_exists = data.is_some();
    let decoded = data.and_then(decode_record);
    let has_valid_data = decoded.is_some();

    let view = match (&decoded, object_exists) {
        (Some(record), _) => ObjectView::ExistsValid(record.clone()),
        (None, true) => ObjectView::ExistsButInvalid,
        (None, false) => ObjectView::NotFoundOrLoading,
    };

    Reconciliation {
        object_exists,
        decoded,
        has_valid_data,
        view,
    }
}
