//! Submit vitals recordings as flat compositions.
//!
//! - create: `POST /ehr/{ehr_id}/composition?templateId=…`
//! - update: `PUT /ehr/{ehr_id}/composition/{versioned_object_id}` with `If-Match: {uid}`
//! - delete: `DELETE /ehr/{ehr_id}/composition/{uid}`
//!
//! Writes are not partially applied here: any transport failure is returned unchanged and no uid
//! is reported for a failed create.

use crate::config::CompositionDefaults;
use crate::error::Operation;
use crate::fields::{FieldTable, VitalSign};
use crate::record::VitalsRecord;
use crate::transport::{dispatch, CallOptions, Method, RepositoryRequest, RepositoryResponse, Transport};
use crate::{VitalsError, VitalsResult};
use chrono::{DateTime, SecondsFormat, Utc};
use clinic_types::{CompositionUid, EhrId, TemplateId};
use openehr::terminology::{category_code, setting_code, OPENEHR_TERMINOLOGY};
use openehr::ucum::normalise_unit;
use openehr::{DataValue, DvProportion, DvQuantity, FlatComposition, FLAT_CONTENT_TYPE};
use openehr::data_types::PROPORTION_KIND_PERCENT;
use serde_json::Value;
use tracing::info;

/// Serialise `record` into the flat format of the template described by `table`.
///
/// Administrative fields the record leaves out are taken from `defaults`; a missing start time
/// becomes `now`. Units are normalised to UCUM and empty units get the sign's default unit.
///
/// # Errors
///
/// Returns [`VitalsError::InvalidInput`] if the start time is not RFC 3339, a number is not
/// finite, a magnitude is negative, an SpO₂ denominator is not positive, or the record carries
/// no vital signs at all.
pub fn to_flat(
    record: &VitalsRecord,
    table: &FieldTable,
    defaults: &CompositionDefaults,
    now: DateTime<Utc>,
) -> VitalsResult<FlatComposition> {
    if !record.has_measurements() {
        return Err(VitalsError::InvalidInput(
            "a vitals recording needs at least one measurement".into(),
        ));
    }

    let start_time = match record.start_time.as_deref() {
        Some(raw) => {
            DateTime::parse_from_rfc3339(raw).map_err(|e| {
                VitalsError::InvalidInput(format!("startTime {raw:?} is not RFC 3339: {e}"))
            })?;
            raw.to_string()
        }
        None => now.to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    let language = record.language.as_deref().unwrap_or(&defaults.language);
    let territory = record.territory.as_deref().unwrap_or(&defaults.territory);
    let composer = record.composer_name.as_deref().unwrap_or(&defaults.composer_name);
    let category = record.category.as_deref().unwrap_or(&defaults.category);
    let setting = record.setting.as_deref().unwrap_or(&defaults.setting);

    let mut flat = FlatComposition::new();
    flat.insert("ctx/language", language);
    flat.insert("ctx/territory", territory);
    flat.insert("ctx/composer_name", composer);
    flat.insert(table.root_key("context/start_time"), start_time);
    flat.set_coded_text(
        &table.root_key("category"),
        category,
        category_code(category).map(|code| (OPENEHR_TERMINOLOGY, code)),
    );
    flat.set_coded_text(
        &table.root_key("context/setting"),
        setting,
        setting_code(setting).map(|code| (OPENEHR_TERMINOLOGY, code)),
    );

    for field in table.fields() {
        let Some(value) = record.measurement(field.sign) else {
            continue;
        };
        let path = table.flat_key(field);
        match value {
            DataValue::Quantity(quantity) => {
                flat.set_quantity(&path, &checked_quantity(field.sign, quantity)?);
            }
            DataValue::Proportion(proportion) => {
                flat.set_proportion(&path, &checked_proportion(proportion)?);
            }
            DataValue::CodedText(_) | DataValue::Text(_) => {}
        }
    }

    Ok(flat)
}

fn checked_quantity(sign: VitalSign, quantity: DvQuantity) -> VitalsResult<DvQuantity> {
    if !quantity.magnitude.is_finite() || quantity.magnitude < 0.0 {
        return Err(VitalsError::InvalidInput(format!(
            "{} must be a non-negative number, got {}",
            sign.column_name(),
            quantity.magnitude
        )));
    }
    let units = match quantity.units.trim() {
        "" => sign.default_unit().to_string(),
        units => normalise_unit(units).into_owned(),
    };
    Ok(DvQuantity::new(quantity.magnitude, units))
}

fn checked_proportion(proportion: DvProportion) -> VitalsResult<DvProportion> {
    let DvProportion {
        numerator,
        denominator,
        ..
    } = proportion;
    if !numerator.is_finite() || numerator < 0.0 {
        return Err(VitalsError::InvalidInput(format!(
            "spo2 numerator must be a non-negative number, got {numerator}"
        )));
    }
    if !denominator.is_finite() || denominator <= 0.0 {
        return Err(VitalsError::InvalidInput(format!(
            "spo2 denominator must be positive, got {denominator}"
        )));
    }
    let mut checked = DvProportion::new(numerator, denominator);
    checked.proportion_type = Some(PROPORTION_KIND_PERCENT);
    Ok(checked)
}

pub fn create_request(ehr_id: &EhrId, template_id: &TemplateId, flat: FlatComposition) -> RepositoryRequest {
    RepositoryRequest::new(
        Operation::CreateComposition,
        Method::Post,
        ["ehr", ehr_id.as_str(), "composition"],
    )
    .query("templateId", template_id.as_str())
    .accept(FLAT_CONTENT_TYPE)
    .header("Prefer", "return=representation")
    .body(FLAT_CONTENT_TYPE, flat.into_json())
    .target(format!("ehr {ehr_id}, template {template_id}"))
}

pub fn update_request(
    ehr_id: &EhrId,
    uid: &CompositionUid,
    template_id: &TemplateId,
    flat: FlatComposition,
) -> RepositoryRequest {
    RepositoryRequest::new(
        Operation::UpdateComposition,
        Method::Put,
        ["ehr", ehr_id.as_str(), "composition", uid.versioned_object_id()],
    )
    .query("templateId", template_id.as_str())
    .accept(FLAT_CONTENT_TYPE)
    .header("Prefer", "return=representation")
    .header("If-Match", uid.as_str())
    .body(FLAT_CONTENT_TYPE, flat.into_json())
    .target(format!("ehr {ehr_id}, composition {uid}"))
}

pub fn delete_request(ehr_id: &EhrId, uid: &CompositionUid) -> RepositoryRequest {
    RepositoryRequest::new(
        Operation::DeleteComposition,
        Method::Delete,
        ["ehr", ehr_id.as_str(), "composition", uid.as_str()],
    )
    .target(format!("ehr {ehr_id}, composition {uid}"))
}

/// Find the uid the repository assigned.
///
/// Looked for in the flat representation (`<root>/_uid`), a canonical `uid.value`, a
/// `compositionUid` member, then the `ETag` and `Location` headers.
pub fn uid_from_response(
    operation: Operation,
    target: &str,
    response: &RepositoryResponse,
) -> VitalsResult<CompositionUid> {
    let from_body = response.body.as_ref().and_then(|body| {
        FlatComposition::from_json(body.clone())
            .ok()
            .and_then(|flat| flat.uid().map(str::to_string))
            .or_else(|| {
                body.get("uid")
                    .and_then(|u| u.get("value"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .or_else(|| {
                body.get("compositionUid")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
    });
    let from_etag = || {
        response
            .etag
            .as_deref()
            .map(|etag| etag.trim_start_matches("W/").trim_matches('"').to_string())
    };
    let from_location = || {
        response
            .location
            .as_deref()
            .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
            .map(str::to_string)
    };

    let raw = from_body
        .or_else(from_etag)
        .or_else(from_location)
        .ok_or_else(|| VitalsError::MalformedResponse {
            operation,
            target: target.to_string(),
            detail: "response carries no composition uid".into(),
        })?;

    CompositionUid::new(&raw).map_err(|e| VitalsError::MalformedResponse {
        operation,
        target: target.to_string(),
        detail: format!("unusable composition uid {raw:?}: {e}"),
    })
}

/// Create a composition and return its uid.
pub async fn create(
    transport: &dyn Transport,
    options: &CallOptions,
    ehr_id: &EhrId,
    template_id: &TemplateId,
    flat: FlatComposition,
) -> VitalsResult<CompositionUid> {
    let request = create_request(ehr_id, template_id, flat);
    let target = request.target.clone();
    let response = dispatch(transport, request, options).await?;
    let uid = uid_from_response(Operation::CreateComposition, &target, &response)?;
    info!(%ehr_id, %template_id, %uid, "vitals composition created");
    Ok(uid)
}

/// Replace the composition `uid` and return the uid of the new version.
pub async fn update(
    transport: &dyn Transport,
    options: &CallOptions,
    ehr_id: &EhrId,
    uid: &CompositionUid,
    template_id: &TemplateId,
    flat: FlatComposition,
) -> VitalsResult<CompositionUid> {
    let request = update_request(ehr_id, uid, template_id, flat);
    let target = request.target.clone();
    let response = dispatch(transport, request, options).await?;
    let new_uid = uid_from_response(Operation::UpdateComposition, &target, &response)?;
    info!(%ehr_id, previous = %uid, uid = %new_uid, "vitals composition updated");
    Ok(new_uid)
}

/// Delete the composition `uid`. A uid the repository does not know is an error.
pub async fn delete(
    transport: &dyn Transport,
    options: &CallOptions,
    ehr_id: &EhrId,
    uid: &CompositionUid,
) -> VitalsResult<()> {
    dispatch(transport, delete_request(ehr_id, uid), options).await?;
    info!(%ehr_id, %uid, "vitals composition deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BloodPressure, Pulse, Quantity, Spo2};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single().expect("valid time")
    }

    fn scenario_record() -> VitalsRecord {
        VitalsRecord {
            blood_pressure: Some(BloodPressure {
                systolic: Quantity::new(120.0, "mm[Hg]"),
                diastolic: Quantity::new(80.0, "mm[Hg]"),
            }),
            pulse: Some(Pulse {
                rate: 72.0,
                units: "/min".into(),
            }),
            ..Default::default()
        }
    }

    fn ids() -> (EhrId, TemplateId, CompositionUid) {
        (
            EhrId::new("abc-123").expect("ehr"),
            TemplateId::new("vitals.v1").expect("template"),
            CompositionUid::new("8849182c-82ad-4088-a07f-48ead4180515::local.ehrbase.org::1")
                .expect("uid"),
        )
    }

    #[test]
    fn flattens_measurements_and_context() {
        let flat = to_flat(
            &scenario_record(),
            &FieldTable::vitals(),
            &CompositionDefaults::default(),
            now(),
        )
        .expect("flat");
        let body = flat.into_json();

        assert_eq!(body["ctx/language"], json!("en"));
        assert_eq!(body["ctx/territory"], json!("IN"));
        assert_eq!(body["ctx/composer_name"], json!("Clinic"));
        assert_eq!(body["vitals/context/start_time"], json!("2024-03-01T10:00:00.000Z"));
        assert_eq!(body["vitals/category|code"], json!("433"));
        assert_eq!(body["vitals/context/setting|value"], json!("other care"));
        assert_eq!(body["vitals/context/setting|code"], json!("238"));
        assert_eq!(body["vitals/blood_pressure/any_event:0/systolic|magnitude"], json!(120.0));
        assert_eq!(body["vitals/blood_pressure/any_event:0/diastolic|unit"], json!("mm[Hg]"));
        assert_eq!(body["vitals/pulse_heart_beat/any_event:0/rate|magnitude"], json!(72.0));
        assert!(body.get("vitals/pulse_oximetry/any_event:0/spo|numerator").is_none());
        assert!(body.get("vitals/body_weight/any_event:0/weight|magnitude").is_none());
    }

    #[test]
    fn keeps_the_callers_start_time_and_context() {
        let record = VitalsRecord {
            start_time: Some("2024-03-01T10:00:00.123456+05:30".into()),
            composer_name: Some("Dr Rao".into()),
            setting: Some("home".into()),
            ..scenario_record()
        };
        let body = to_flat(&record, &FieldTable::vitals(), &CompositionDefaults::default(), now())
            .expect("flat")
            .into_json();
        assert_eq!(body["vitals/context/start_time"], json!("2024-03-01T10:00:00.123456+05:30"));
        assert_eq!(body["ctx/composer_name"], json!("Dr Rao"));
        assert_eq!(body["vitals/context/setting|code"], json!("225"));
    }

    #[test]
    fn normalises_units_and_fills_blanks() {
        let record = VitalsRecord {
            body_weight: Some(Quantity::new(70.5, "Kg")),
            height: Some(Quantity::new(172.0, "")),
            pulse: Some(Pulse {
                rate: 64.0,
                units: "bpm".into(),
            }),
            spo2: Some(Spo2 {
                numerator: 19.0,
                denominator: 20.0,
            }),
            ..Default::default()
        };
        let body = to_flat(&record, &FieldTable::vitals(), &CompositionDefaults::default(), now())
            .expect("flat")
            .into_json();
        assert_eq!(body["vitals/body_weight/any_event:0/weight|unit"], json!("kg"));
        assert_eq!(body["vitals/height_length/any_event:0/height_length|unit"], json!("cm"));
        assert_eq!(body["vitals/pulse_heart_beat/any_event:0/rate|unit"], json!("/min"));
        assert_eq!(body["vitals/pulse_oximetry/any_event:0/spo|numerator"], json!(19.0));
        assert_eq!(body["vitals/pulse_oximetry/any_event:0/spo|denominator"], json!(20.0));
        assert_eq!(body["vitals/pulse_oximetry/any_event:0/spo|type"], json!(2));
    }

    #[test]
    fn zero_readings_are_stored() {
        let record = VitalsRecord {
            body_weight: Some(Quantity::new(0.0, "kg")),
            spo2: Some(Spo2 {
                numerator: 0.0,
                denominator: 100.0,
            }),
            ..Default::default()
        };
        let flat = to_flat(&record, &FieldTable::vitals(), &CompositionDefaults::default(), now())
            .expect("zero is a reading");
        let body = flat.into_json();
        assert_eq!(body["vitals/body_weight/any_event:0/weight|magnitude"], json!(0.0));
        assert_eq!(body["vitals/pulse_oximetry/any_event:0/spo|numerator"], json!(0.0));
    }

    #[test]
    fn rejects_unusable_input() {
        let defaults = CompositionDefaults::default();
        let table = FieldTable::vitals();

        let empty = VitalsRecord::default();
        assert!(matches!(
            to_flat(&empty, &table, &defaults, now()),
            Err(VitalsError::InvalidInput(_))
        ));

        let bad_time = VitalsRecord {
            start_time: Some("01/03/2024".into()),
            ..scenario_record()
        };
        assert!(to_flat(&bad_time, &table, &defaults, now()).is_err());

        let negative = VitalsRecord {
            height: Some(Quantity::new(-1.0, "cm")),
            ..Default::default()
        };
        assert!(to_flat(&negative, &table, &defaults, now()).is_err());

        let zero_denominator = VitalsRecord {
            spo2: Some(Spo2 {
                numerator: 98.0,
                denominator: 0.0,
            }),
            ..Default::default()
        };
        assert!(to_flat(&zero_denominator, &table, &defaults, now()).is_err());

        let nan = VitalsRecord {
            body_weight: Some(Quantity::new(f64::NAN, "kg")),
            ..Default::default()
        };
        assert!(to_flat(&nan, &table, &defaults, now()).is_err());
    }

    #[test]
    fn requests_address_the_right_resources() {
        let (ehr_id, template_id, uid) = ids();

        let create = create_request(&ehr_id, &template_id, FlatComposition::new());
        assert_eq!(create.method, Method::Post);
        assert_eq!(create.segments, ["ehr", "abc-123", "composition"]);
        assert_eq!(create.query, [("templateId".to_string(), "vitals.v1".to_string())]);
        assert_eq!(create.header_value("Content-Type"), Some(FLAT_CONTENT_TYPE));
        assert_eq!(create.header_value("Prefer"), Some("return=representation"));

        let update = update_request(&ehr_id, &uid, &template_id, FlatComposition::new());
        assert_eq!(update.method, Method::Put);
        assert_eq!(
            update.segments,
            ["ehr", "abc-123", "composition", "8849182c-82ad-4088-a07f-48ead4180515"]
        );
        assert_eq!(update.header_value("If-Match"), Some(uid.as_str()));

        let delete = delete_request(&ehr_id, &uid);
        assert_eq!(delete.method, Method::Delete);
        assert_eq!(delete.segments[3], uid.as_str());
        assert!(delete.body.is_none());
    }

    #[test]
    fn finds_the_uid_wherever_the_repository_put_it() {
        let expected = "8849182c-82ad-4088-a07f-48ead4180515::local.ehrbase.org::1";
        let op = Operation::CreateComposition;

        let flat = RepositoryResponse {
            status: 201,
            body: Some(json!({"vitals/_uid": expected, "vitals/language|code": "en"})),
            ..Default::default()
        };
        assert_eq!(uid_from_response(op, "t", &flat).expect("flat").as_str(), expected);

        let canonical = RepositoryResponse {
            status: 201,
            body: Some(json!({"uid": {"value": expected}})),
            ..Default::default()
        };
        assert_eq!(uid_from_response(op, "t", &canonical).expect("canonical").as_str(), expected);

        let etag = RepositoryResponse {
            status: 204,
            etag: Some(format!("\"{expected}\"")),
            ..Default::default()
        };
        assert_eq!(uid_from_response(op, "t", &etag).expect("etag").as_str(), expected);

        let location = RepositoryResponse {
            status: 201,
            location: Some(format!("https://cdr.example.org/ehr/abc-123/composition/{expected}")),
            ..Default::default()
        };
        assert_eq!(uid_from_response(op, "t", &location).expect("location").as_str(), expected);

        let nothing = RepositoryResponse {
            status: 201,
            ..Default::default()
        };
        assert!(matches!(
            uid_from_response(op, "t", &nothing),
            Err(VitalsError::MalformedResponse { .. })
        ));
    }
}
