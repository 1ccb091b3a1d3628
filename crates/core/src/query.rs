//! AQL for a patient's vitals history.
//!
//! Both query shapes select every composition of one template in one EHR, newest first. The EHR
//! and template ids travel as `query_parameters` (`$ehr_id`, `$template_id`) and never appear in
//! the query text.

use crate::fields::FieldTable;
use crate::VitalsResult;
use clinic_types::{EhrId, TemplateId};
use openehr::AqlQuery;

/// Row layout requested from the repository.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryShape {
    /// One column holding the whole canonical composition (`SELECT c`).
    #[default]
    Composition,
    /// One scalar column per administrative field and per vital sign.
    Projection,
}

/// Composition-level columns of the projection shape, as `(alias, path below c)`.
pub const METADATA_COLUMNS: [(&str, &str); 8] = [
    ("uid", "uid/value"),
    ("start_time", "context/start_time/value"),
    ("category", "category/value"),
    ("setting", "context/setting/value"),
    ("language", "language/code_string"),
    ("territory", "territory/code_string"),
    ("composer_name", "composer/name"),
    ("template_id", "archetype_details/template_id/value"),
];

const FROM_WHERE_ORDER: &str = "FROM EHR e CONTAINS COMPOSITION c \
WHERE e/ehr_id/value = $ehr_id AND c/archetype_details/template_id/value = $template_id \
ORDER BY c/context/start_time/value DESC";

/// Build the history query for `ehr_id` and `template_id`.
///
/// # Errors
///
/// Fails only if the generated text stops referencing a bound parameter.
pub fn vitals_query(
    shape: QueryShape,
    ehr_id: &EhrId,
    template_id: &TemplateId,
    table: &FieldTable,
) -> VitalsResult<AqlQuery> {
    let select = match shape {
        QueryShape::Composition => "SELECT c".to_string(),
        QueryShape::Projection => projection_select(table),
    };

    let query = AqlQuery::new(format!("{select} {FROM_WHERE_ORDER}"))
        .bind("ehr_id", ehr_id.as_str())?
        .bind("template_id", template_id.as_str())?;
    Ok(query)
}

fn projection_select(table: &FieldTable) -> String {
    let mut columns: Vec<String> = METADATA_COLUMNS
        .iter()
        .map(|(alias, path)| format!("c/{path} AS {alias}"))
        .collect();

    columns.extend(table.fields().iter().map(|field| {
        format!(
            "c/content[{}]/{}/value AS {}",
            field.archetype_id,
            field.projection_path,
            field.sign.column_name()
        )
    }));

    format!("SELECT {}", columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (EhrId, TemplateId) {
        (
            EhrId::new("abc-123").expect("ehr id"),
            TemplateId::new("vitals.v1").expect("template id"),
        )
    }

    #[test]
    fn composition_query_binds_identifiers() {
        let (ehr_id, template_id) = ids();
        let query = vitals_query(QueryShape::Composition, &ehr_id, &template_id, &FieldTable::vitals())
            .expect("query");

        assert!(query.q.starts_with("SELECT c FROM EHR e CONTAINS COMPOSITION c"));
        assert!(query.q.ends_with("ORDER BY c/context/start_time/value DESC"));
        assert!(!query.q.contains("abc-123"));
        assert!(!query.q.contains("vitals.v1"));
        assert_eq!(query.query_parameters.get("ehr_id"), Some(&json!("abc-123")));
        assert_eq!(query.query_parameters.get("template_id"), Some(&json!("vitals.v1")));
    }

    #[test]
    fn projection_query_selects_every_field() {
        let (ehr_id, template_id) = ids();
        let table = FieldTable::vitals();
        let query = vitals_query(QueryShape::Projection, &ehr_id, &template_id, &table).expect("query");

        assert!(query.q.contains("c/uid/value AS uid"));
        assert!(query.q.contains("c/context/start_time/value AS start_time"));
        assert!(query.q.contains(
            "c/content[openEHR-EHR-OBSERVATION.blood_pressure.v2]/data[at0001]/events[at0006]/data[at0003]/items[at0004]/value AS systolic"
        ));
        assert!(query.q.contains(
            "c/content[openEHR-EHR-OBSERVATION.pulse_oximetry.v1]/data[at0001]/events[at0002]/data[at0003]/items[at0006]/value AS spo2"
        ));
        for field in table.fields() {
            assert!(query.q.contains(&format!(" AS {}", field.sign.column_name())));
        }
        assert_eq!(query.query_parameters.len(), 2);
    }

    #[test]
    fn serialises_for_the_query_endpoint() {
        let (ehr_id, template_id) = ids();
        let query = vitals_query(QueryShape::Composition, &ehr_id, &template_id, &FieldTable::vitals())
            .expect("query");
        let body = serde_json::to_value(&query).expect("json");
        assert_eq!(body["query_parameters"]["ehr_id"], json!("abc-123"));
        assert!(body["q"].as_str().is_some_and(|q| q.contains("$template_id")));
    }
}
