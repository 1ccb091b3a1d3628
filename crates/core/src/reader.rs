//! Read vitals compositions back from the repository.

use crate::error::Operation;
use crate::fields::FieldTable;
use crate::normalizer::{normalise_result_set, record_from_flat};
use crate::query::{vitals_query, QueryShape};
use crate::record::VitalsRecord;
use crate::transport::{dispatch, CallOptions, Method, RepositoryRequest, Transport};
use crate::{VitalsError, VitalsResult};
use clinic_types::{CompositionUid, EhrId, TemplateId};
use openehr::{FlatComposition, ResultSet, FLAT_CONTENT_TYPE, JSON_CONTENT_TYPE};
use tracing::debug;

/// Every vitals recording of `template_id` in `ehr_id`, in the order the repository returned
/// them (newest first). No recordings is an empty vector, not an error.
///
/// # Errors
///
/// Transport failures propagate unchanged. A response without a `rows` array is
/// [`VitalsError::MalformedResponse`].
pub async fn list(
    transport: &dyn Transport,
    options: &CallOptions,
    ehr_id: &EhrId,
    template_id: &TemplateId,
    table: &FieldTable,
    shape: QueryShape,
) -> VitalsResult<Vec<VitalsRecord>> {
    let query = vitals_query(shape, ehr_id, template_id, table)?;
    let body = serde_json::to_value(&query)
        .map_err(|e| VitalsError::InvalidInput(format!("AQL query could not be encoded: {e}")))?;

    let target = format!("ehr {ehr_id}, template {template_id}");
    let request = RepositoryRequest::new(Operation::QueryCompositions, Method::Post, ["query", "aql"])
        .accept(JSON_CONTENT_TYPE)
        .body(JSON_CONTENT_TYPE, body)
        .target(target.clone());

    let response = dispatch(transport, request, options).await?;
    let malformed = |detail: String| VitalsError::MalformedResponse {
        operation: Operation::QueryCompositions,
        target: target.clone(),
        detail,
    };
    let body = response
        .body
        .ok_or_else(|| malformed("empty response to an AQL query".into()))?;
    let result = ResultSet::from_json(body).map_err(|e| malformed(e.to_string()))?;

    let records = normalise_result_set(&result, shape, table);
    debug!(%ehr_id, %template_id, count = records.len(), "vitals compositions read");
    Ok(records)
}

/// Fetch one composition in the flat format.
///
/// # Errors
///
/// An unknown uid is a [`VitalsError::Transport`] error with status 404. A body that is not a
/// JSON object is [`VitalsError::MalformedResponse`].
pub async fn get_flat(
    transport: &dyn Transport,
    options: &CallOptions,
    ehr_id: &EhrId,
    uid: &CompositionUid,
) -> VitalsResult<FlatComposition> {
    let target = format!("ehr {ehr_id}, composition {uid}");
    let request = RepositoryRequest::new(
        Operation::GetComposition,
        Method::Get,
        ["ehr", ehr_id.as_str(), "composition", uid.as_str()],
    )
    .query("format", "FLAT")
    .accept(FLAT_CONTENT_TYPE)
    .target(target.clone());

    let response = dispatch(transport, request, options).await?;
    let malformed = |detail: String| VitalsError::MalformedResponse {
        operation: Operation::GetComposition,
        target: target.clone(),
        detail,
    };
    let body = response
        .body
        .ok_or_else(|| malformed("empty composition body".into()))?;
    FlatComposition::from_json(body).map_err(|e| malformed(e.to_string()))
}

/// Normalise a stored flat composition read under `template_id`.
///
/// The record always carries `uid` and `template_id`, even when the document omits its uid.
pub fn stored_record(
    flat: &FlatComposition,
    uid: &CompositionUid,
    template_id: &TemplateId,
    table: &FieldTable,
) -> VitalsRecord {
    let mut record = record_from_flat(flat, table);
    if record.uid.is_none() {
        record.uid = Some(uid.clone());
    }
    record.template_id = Some(template_id.to_string());
    record
}
