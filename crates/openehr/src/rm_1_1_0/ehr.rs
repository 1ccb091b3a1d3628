//! RM 1.x `EHR` REST representation.
//!
//! `POST /ehr` (with `Prefer: return=representation`) and `GET /ehr/{ehr_id}` both answer with
//! this shape. Only the identifier wrappers are modelled; `ehr_status` and other members are
//! ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OpenEhrError, OpenEhrResult};

/// RM `HIER_OBJECT_ID` / `OBJECT_ID` (simplified to its `value`).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct HierObjectId {
    pub value: String,
}

/// RM `DV_DATE_TIME` (simplified to its ISO 8601 `value`).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvDateTime {
    pub value: String,
}

/// Wire representation of an EHR as returned by the REST API.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Ehr {
    pub ehr_id: HierObjectId,
    pub system_id: HierObjectId,
    pub time_created: DvDateTime,
}

/// Decode an EHR representation from a response body.
///
/// # Errors
///
/// Returns [`OpenEhrError::Translation`] naming the failing path if the body does not match.
pub fn read_json(body: Value) -> OpenEhrResult<Ehr> {
    serde_path_to_error::deserialize(body).map_err(|e| {
        OpenEhrError::Translation(format!("EHR representation at {}: {}", e.path(), e.inner()))
    })
}
