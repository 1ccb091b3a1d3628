//! Operational template definitions as served by the REST API.
//!
//! - `GET /definition/template/adl1.4` lists uploaded templates ([`TemplateListItem`]).
//! - `GET /definition/template/adl1.4/{id}` with `Accept: application/openehr.wt+json` returns
//!   the web template, kept as JSON because only a handful of its members are ever read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OpenEhrError, OpenEhrResult};

/// One entry of the template listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateListItem {
    pub template_id: String,
    #[serde(default)]
    pub concept: Option<String>,
    #[serde(default)]
    pub archetype_id: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Decode the template listing.
///
/// # Errors
///
/// Returns [`OpenEhrError::Translation`] naming the failing path if the body is not an array of
/// template entries.
pub fn read_listing(body: Value) -> OpenEhrResult<Vec<TemplateListItem>> {
    serde_path_to_error::deserialize(body).map_err(|e| {
        OpenEhrError::Translation(format!("template listing at {}: {}", e.path(), e.inner()))
    })
}

/// Template id declared by a web template document (`templateId` member).
pub fn web_template_id(web_template: &Value) -> Option<&str> {
    web_template.get("templateId")?.as_str()
}

/// Root node id of a web template tree (`tree.id`), which prefixes every flat path.
pub fn web_template_root(web_template: &Value) -> Option<&str> {
    web_template.get("tree")?.get("id")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_listing_with_optional_members() {
        let items = read_listing(json!([
            {
                "template_id": "jitendra.choudhary.vitals.v1",
                "concept": "Vitals",
                "archetype_id": "openEHR-EHR-COMPOSITION.encounter.v1",
                "created_timestamp": "2024-01-10T08:00:00.000Z"
            },
            {"template_id": "gynaec_case_record_jitendra.v0"}
        ]))
        .expect("listing");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].concept.as_deref(), Some("Vitals"));
        assert!(items[1].concept.is_none());
    }

    #[test]
    fn rejects_non_array_listing() {
        assert!(read_listing(json!({"template_id": "x"})).is_err());
    }

    #[test]
    fn reads_web_template_root() {
        let wt = json!({"templateId": "jitendra.choudhary.vitals.v1", "tree": {"id": "vitals"}});
        assert_eq!(web_template_id(&wt), Some("jitendra.choudhary.vitals.v1"));
        assert_eq!(web_template_root(&wt), Some("vitals"));
        assert_eq!(web_template_root(&json!({})), None);
    }
}
