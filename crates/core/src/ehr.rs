//! EHR registration and lookup.
//!
//! A patient gets one EHR in the repository when they are registered. This module only creates
//! and reads EHRs; which patient owns which EHR is the caller's business.

use crate::error::Operation;
use crate::transport::{dispatch, CallOptions, Method, RepositoryRequest, RepositoryResponse, Transport};
use crate::{VitalsError, VitalsResult};
use clinic_types::EhrId;
use openehr::rm_1_1_0::ehr::read_json;
use openehr::JSON_CONTENT_TYPE;
use serde::Serialize;
use tracing::info;

/// What the repository reports about an EHR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EhrSummary {
    pub ehr_id: EhrId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_created: Option<String>,
}

fn summary_from_response(
    operation: Operation,
    target: &str,
    response: RepositoryResponse,
) -> VitalsResult<EhrSummary> {
    let malformed = |detail: String| VitalsError::MalformedResponse {
        operation,
        target: target.to_string(),
        detail,
    };

    if let Some(body) = response.body {
        let ehr = read_json(body).map_err(|e| malformed(e.to_string()))?;
        let ehr_id = EhrId::new(&ehr.ehr_id.value).map_err(|e| malformed(e.to_string()))?;
        return Ok(EhrSummary {
            ehr_id,
            system_id: Some(ehr.system_id.value),
            time_created: Some(ehr.time_created.value),
        });
    }

    // Without a representation the id is only available from the headers.
    let raw = response
        .etag
        .as_deref()
        .map(|etag| etag.trim_start_matches("W/").trim_matches('"').to_string())
        .or_else(|| {
            response
                .location
                .as_deref()
                .and_then(|l| l.trim_end_matches('/').rsplit('/').next())
                .map(str::to_string)
        })
        .ok_or_else(|| malformed("response carries no EHR id".into()))?;
    let ehr_id = EhrId::new(&raw).map_err(|e| malformed(e.to_string()))?;
    Ok(EhrSummary {
        ehr_id,
        system_id: None,
        time_created: None,
    })
}

/// Create a new, empty EHR.
pub async fn create_ehr(transport: &dyn Transport, options: &CallOptions) -> VitalsResult<EhrSummary> {
    let request = RepositoryRequest::new(Operation::CreateEhr, Method::Post, ["ehr"])
        .accept(JSON_CONTENT_TYPE)
        .header("Prefer", "return=representation")
        .target("new EHR");
    let target = request.target.clone();
    let response = dispatch(transport, request, options).await?;
    let summary = summary_from_response(Operation::CreateEhr, &target, response)?;
    info!(ehr_id = %summary.ehr_id, "EHR created");
    Ok(summary)
}

/// Read an existing EHR. An unknown id is a 404 [`VitalsError::Transport`] error.
pub async fn get_ehr(
    transport: &dyn Transport,
    options: &CallOptions,
    ehr_id: &EhrId,
) -> VitalsResult<EhrSummary> {
    let request = RepositoryRequest::new(Operation::GetEhr, Method::Get, ["ehr", ehr_id.as_str()])
        .accept(JSON_CONTENT_TYPE)
        .target(format!("ehr {ehr_id}"));
    let target = request.target.clone();
    let response = dispatch(transport, request, options).await?;
    summary_from_response(Operation::GetEhr, &target, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_the_representation() {
        let response = RepositoryResponse {
            status: 201,
            body: Some(json!({
                "system_id": {"value": "local.ehrbase.org"},
                "ehr_id": {"value": "7d44b88c-4199-4bad-97dc-d78268e01398"},
                "time_created": {"value": "2024-03-01T10:00:00.000Z"},
                "ehr_status": {"id": {"value": "8cc6a0ff-ed2c-4ad4-9f8e-0bd3a3f7d1b8::local.ehrbase.org::1"}}
            })),
            ..Default::default()
        };
        let summary = summary_from_response(Operation::CreateEhr, "new EHR", response).expect("summary");
        assert_eq!(summary.ehr_id.as_str(), "7d44b88c-4199-4bad-97dc-d78268e01398");
        assert_eq!(summary.system_id.as_deref(), Some("local.ehrbase.org"));
    }

    #[test]
    fn falls_back_to_headers() {
        let response = RepositoryResponse {
            status: 201,
            etag: Some("\"7d44b88c-4199-4bad-97dc-d78268e01398\"".into()),
            ..Default::default()
        };
        let summary = summary_from_response(Operation::CreateEhr, "new EHR", response).expect("summary");
        assert_eq!(summary.ehr_id.as_str(), "7d44b88c-4199-4bad-97dc-d78268e01398");
        assert!(summary.time_created.is_none());

        let response = RepositoryResponse {
            status: 201,
            location: Some("https://cdr.example.org/ehr/7d44b88c-4199-4bad-97dc-d78268e01398".into()),
            ..Default::default()
        };
        let summary = summary_from_response(Operation::CreateEhr, "new EHR", response).expect("summary");
        assert_eq!(summary.ehr_id.as_str(), "7d44b88c-4199-4bad-97dc-d78268e01398");
    }

    #[test]
    fn rejects_unusable_representations() {
        let response = RepositoryResponse {
            status: 200,
            body: Some(json!({"ehr_id": "flat string"})),
            ..Default::default()
        };
        let err = summary_from_response(Operation::GetEhr, "ehr x", response).expect_err("malformed");
        assert!(matches!(err, VitalsError::MalformedResponse { operation: Operation::GetEhr, .. }));

        let response = RepositoryResponse {
            status: 204,
            ..Default::default()
        };
        assert!(summary_from_response(Operation::CreateEhr, "new EHR", response).is_err());
    }
}
