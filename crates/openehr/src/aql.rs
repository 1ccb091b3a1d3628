//! AQL request and result-set wire types.
//!
//! `POST /query/aql` takes `{"q": "...", "query_parameters": {...}}` and answers with a result
//! set of named columns and positional rows. Parameters are referenced from the query text as
//! `$name`, which keeps caller-supplied identifiers out of the query text itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{OpenEhrError, OpenEhrResult};

/// An ad-hoc AQL query with bound parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AqlQuery {
    pub q: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_parameters: BTreeMap<String, Value>,
}

impl AqlQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            query_parameters: BTreeMap::new(),
        }
    }

    /// Binds `$name` to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidInput`] if the query text does not reference `$name`, so a
    /// misspelt parameter fails before it reaches the server.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> OpenEhrResult<Self> {
        if !references_parameter(&self.q, name) {
            return Err(OpenEhrError::InvalidInput(format!(
                "query does not reference parameter ${name}"
            )));
        }
        self.query_parameters.insert(name.to_string(), value.into());
        Ok(self)
    }
}

fn references_parameter(q: &str, name: &str) -> bool {
    let needle = format!("${name}");
    q.match_indices(&needle).any(|(idx, _)| {
        q[idx + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'))
    })
}

/// A result-set column descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// An AQL result set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    pub rows: Vec<Value>,
}

impl ResultSet {
    /// Decode a result set from a response body.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::Translation`] naming the failing path when `rows` is missing or
    /// is not an array. Individual rows are not inspected here.
    pub fn from_json(body: Value) -> OpenEhrResult<Self> {
        serde_path_to_error::deserialize(body).map_err(|e| {
            let path = e.path().to_string();
            OpenEhrError::Translation(format!("AQL result set at {path}: {}", e.inner()))
        })
    }

    /// Position of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binds_referenced_parameters() {
        let query = AqlQuery::new("SELECT c FROM EHR e WHERE e/ehr_id/value = $ehr_id")
            .bind("ehr_id", "abc-123")
            .expect("bound");
        let body = serde_json::to_value(&query).expect("serialise");
        assert_eq!(body["query_parameters"]["ehr_id"], json!("abc-123"));
    }

    #[test]
    fn rejects_unreferenced_parameters() {
        let err = AqlQuery::new("SELECT c FROM EHR e WHERE e/ehr_id/value = $ehr_id_x")
            .bind("ehr_id", "abc")
            .expect_err("prefix match must not count");
        assert!(matches!(err, OpenEhrError::InvalidInput(msg) if msg.contains("$ehr_id")));
    }

    #[test]
    fn omits_empty_parameter_map() {
        let body = serde_json::to_value(AqlQuery::new("SELECT 1")).expect("serialise");
        assert_eq!(body, json!({"q": "SELECT 1"}));
    }

    #[test]
    fn decodes_result_sets() {
        let rs = ResultSet::from_json(json!({
            "q": "SELECT c ...",
            "columns": [{"name": "uid", "path": "c/uid/value"}, {"name": "systolic"}],
            "rows": [["a::b::1", {"magnitude": 120}]]
        }))
        .expect("result set");
        assert_eq!(rs.rows.len(), 1);
        assert_eq!(rs.column_index("systolic"), Some(1));
        assert_eq!(rs.column_index("missing"), None);
    }

    #[test]
    fn missing_rows_is_a_translation_error() {
        let err = ResultSet::from_json(json!({"columns": []})).expect_err("should reject");
        assert!(matches!(err, OpenEhrError::Translation(msg) if msg.contains("rows")));

        let err = ResultSet::from_json(json!({"rows": "nope"})).expect_err("should reject");
        assert!(matches!(err, OpenEhrError::Translation(msg) if msg.contains("rows")));
    }
}
