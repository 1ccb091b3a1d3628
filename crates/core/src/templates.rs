//! Template registry.
//!
//! Templates come from two places:
//! - web-template JSON files in a local directory, loaded once at start-up
//! - the repository's template listing (`GET /definition/template/adl1.4`)
//!
//! The registry also owns the [`FieldTable`] used for each template. Templates without an
//! explicit table reuse the vitals vocabulary under their own web-template root.

use crate::error::Operation;
use crate::fields::FieldTable;
use crate::transport::{dispatch, CallOptions, Method, RepositoryRequest, Transport};
use crate::{VitalsError, VitalsResult};
use clinic_types::TemplateId;
use openehr::template::{read_listing, web_template_id, web_template_root, TemplateListItem};
use openehr::{JSON_CONTENT_TYPE, WEB_TEMPLATE_CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Display names for template ids that do not humanise well.
const NAME_ALIASES: &[(&str, &str)] = &[("gynaec_case_record", "Gynaecology Case Record")];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSource {
    Local,
    Remote,
}

/// One entry of the merged template listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub template_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: TemplateSource,
}

impl TemplateSummary {
    pub fn from_remote(item: &TemplateListItem) -> Self {
        Self {
            template_id: item.template_id.clone(),
            name: item
                .concept
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| humanise_template_id(&item.template_id)),
            description: item.description.clone(),
            source: TemplateSource::Remote,
        }
    }

    /// Case-insensitive match on the name or the template id.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.name.to_lowercase().contains(&term)
            || self.template_id.to_lowercase().contains(&term)
    }
}

/// A web template read from the local template directory.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalTemplate {
    pub template_id: TemplateId,
    pub path: PathBuf,
    pub web_template: Value,
}

impl LocalTemplate {
    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            template_id: self.template_id.to_string(),
            name: friendly_name(self.template_id.as_str(), &self.web_template),
            description: Some(format!("Local template from {}", self.path.display())),
            source: TemplateSource::Local,
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// Best available display name of a web template.
///
/// Tries, in order: `name`, `concept`, the English `tree.localizedNames`, `tree.name`,
/// `tree.localizedName` and `tree.id` (each skipped when equal to the template id), and finally
/// a name derived from the id itself.
pub fn extract_template_name(template_id: &str, web_template: &Value) -> String {
    name_from_web_template(template_id, web_template)
        .or_else(|| {
            meaningful_id_part(template_id)
                .filter(|part| *part != "example")
                .map(capitalise)
        })
        .unwrap_or_else(|| template_id.to_string())
}

/// Display name of a template: a name declared by the web template, otherwise the humanised id.
pub fn friendly_name(template_id: &str, web_template: &Value) -> String {
    name_from_web_template(template_id, web_template)
        .unwrap_or_else(|| humanise_template_id(template_id))
}

fn name_from_web_template(template_id: &str, web_template: &Value) -> Option<String> {
    if let Some(name) = non_empty_str(web_template.get("name"))
        .or_else(|| non_empty_str(web_template.get("concept")))
    {
        return Some(name.to_string());
    }

    let tree = web_template.get("tree")?;
    let candidates = [
        tree.get("localizedNames").and_then(|n| n.get("en")),
        tree.get("name"),
        tree.get("localizedName"),
        tree.get("id"),
    ];
    candidates
        .into_iter()
        .filter_map(non_empty_str)
        .find(|name| *name != template_id)
        .map(str::to_string)
}

/// The last dot-separated part of an id that is not a version or a number:
/// `jitendra.choudhary.vitals.v1` → `vitals`.
fn meaningful_id_part(template_id: &str) -> Option<&str> {
    template_id
        .split('.')
        .filter(|part| {
            !part.is_empty() && !is_version(part) && !part.chars().all(|c| c.is_ascii_digit())
        })
        .last()
}

fn is_version(part: &str) -> bool {
    part.strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// `gynaec_case_record_jitendra.v0` → `Gynaecology Case Record`, `blood_sugar.v1` → `Blood Sugar`.
pub fn humanise_template_id(template_id: &str) -> String {
    if let Some((_, alias)) = NAME_ALIASES
        .iter()
        .find(|(needle, _)| template_id.contains(needle))
    {
        return (*alias).to_string();
    }

    let stem = meaningful_id_part(template_id).unwrap_or(template_id);
    let humanised = stem
        .split('_')
        .filter(|part| !part.is_empty())
        .map(capitalise)
        .collect::<Vec<_>>()
        .join(" ");
    if humanised.is_empty() {
        template_id.to_string()
    } else {
        humanised
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Local templates first, then remote ones not already listed locally, with `pinned` moved to
/// the front. A failed remote listing leaves only the local templates.
pub fn merge_listing(
    local: Vec<TemplateSummary>,
    remote: VitalsResult<Vec<TemplateSummary>>,
    pinned: &str,
) -> Vec<TemplateSummary> {
    let mut merged = local;
    match remote {
        Ok(remote) => {
            let known: HashSet<String> = merged.iter().map(|t| t.template_id.clone()).collect();
            merged.extend(
                remote
                    .into_iter()
                    .filter(|t| !known.contains(&t.template_id)),
            );
        }
        Err(e) => warn!(error = %e, "remote template listing failed; using local templates only"),
    }

    // Stable, so everything else keeps its order.
    merged.sort_by_key(|t| t.template_id != pinned);
    merged
}

/// Load every `*.json` web template in `dir`, sorted by file name.
///
/// Files without a `templateId` are skipped with a warning.
///
/// # Errors
///
/// Returns [`VitalsError::TemplateFileRead`] or [`VitalsError::TemplateFileParse`] for a file
/// that cannot be read or is not JSON, and [`VitalsError::InvalidId`] for an unusable id.
pub fn load_local_templates(dir: &Path) -> VitalsResult<Vec<LocalTemplate>> {
    let read_err = |path: &Path, source| VitalsError::TemplateFileRead {
        path: path.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| read_err(dir, e))? {
        let path = entry.map_err(|e| read_err(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path).map_err(|e| read_err(&path, e))?;
        let web_template: Value =
            serde_json::from_str(&raw).map_err(|source| VitalsError::TemplateFileParse {
                path: path.clone(),
                source,
            })?;
        let Some(id) = web_template_id(&web_template) else {
            warn!(path = %path.display(), "skipping web template without templateId");
            continue;
        };
        let template_id = TemplateId::new(id)?;
        debug!(%template_id, path = %path.display(), "loaded local web template");
        templates.push(LocalTemplate {
            template_id,
            path,
            web_template,
        });
    }
    Ok(templates)
}

/// Repository template listing.
pub async fn list_remote(
    transport: &dyn Transport,
    options: &CallOptions,
) -> VitalsResult<Vec<TemplateListItem>> {
    let request = RepositoryRequest::new(
        Operation::ListTemplates,
        Method::Get,
        ["definition", "template", "adl1.4"],
    )
    .accept(JSON_CONTENT_TYPE)
    .target("template listing");
    let target = request.target.clone();
    let response = dispatch(transport, request, options).await?;
    let malformed = |detail: String| VitalsError::MalformedResponse {
        operation: Operation::ListTemplates,
        target: target.clone(),
        detail,
    };
    let body = response
        .body
        .ok_or_else(|| malformed("empty template listing".into()))?;
    read_listing(body).map_err(|e| malformed(e.to_string()))
}

/// The web template of `template_id`, as JSON.
pub async fn get_web_template(
    transport: &dyn Transport,
    options: &CallOptions,
    template_id: &TemplateId,
) -> VitalsResult<Value> {
    let request = RepositoryRequest::new(
        Operation::GetWebTemplate,
        Method::Get,
        ["definition", "template", "adl1.4", template_id.as_str()],
    )
    .accept(WEB_TEMPLATE_CONTENT_TYPE)
    .target(format!("template {template_id}"));
    let target = request.target.clone();
    let response = dispatch(transport, request, options).await?;
    response.body.ok_or_else(|| VitalsError::MalformedResponse {
        operation: Operation::GetWebTemplate,
        target,
        detail: "empty web template".into(),
    })
}

/// Known templates and their field vocabularies.
#[derive(Clone, Debug)]
pub struct TemplateRegistry {
    default_template: TemplateId,
    local: Vec<LocalTemplate>,
    tables: HashMap<TemplateId, FieldTable>,
}

impl TemplateRegistry {
    /// A registry whose default template uses the standard vitals vocabulary.
    pub fn new(default_template: TemplateId) -> Self {
        let mut tables = HashMap::new();
        tables.insert(default_template.clone(), FieldTable::vitals());
        Self {
            default_template,
            local: Vec::new(),
            tables,
        }
    }

    pub fn with_local_templates(mut self, local: Vec<LocalTemplate>) -> Self {
        self.local = local;
        self
    }

    /// Use `table` for `template_id`, replacing any previous vocabulary.
    pub fn register(&mut self, template_id: TemplateId, table: FieldTable) {
        self.tables.insert(template_id, table);
    }

    pub fn default_template(&self) -> &TemplateId {
        &self.default_template
    }

    pub fn local_templates(&self) -> &[LocalTemplate] {
        &self.local
    }

    pub fn local_web_template(&self, template_id: &TemplateId) -> Option<&Value> {
        self.local
            .iter()
            .find(|t| &t.template_id == template_id)
            .map(|t| &t.web_template)
    }

    pub fn local_summaries(&self) -> Vec<TemplateSummary> {
        self.local.iter().map(LocalTemplate::summary).collect()
    }

    /// The template whose web-template root is `root`.
    ///
    /// The default template wins, then local templates in load order, then other registered
    /// vocabularies by id.
    pub fn template_for_root(&self, root: &str) -> Option<TemplateId> {
        if self.field_table(&self.default_template).root() == root {
            return Some(self.default_template.clone());
        }
        if let Some(local) = self
            .local
            .iter()
            .find(|t| self.field_table(&t.template_id).root() == root)
        {
            return Some(local.template_id.clone());
        }
        let mut registered: Vec<&TemplateId> = self
            .tables
            .iter()
            .filter(|(_, table)| table.root() == root)
            .map(|(id, _)| id)
            .collect();
        registered.sort();
        registered.first().map(|id| (*id).clone())
    }

    /// Field vocabulary for `template_id`.
    pub fn field_table(&self, template_id: &TemplateId) -> FieldTable {
        if let Some(table) = self.tables.get(template_id) {
            return table.clone();
        }
        match self.local_web_template(template_id).and_then(web_template_root) {
            Some(root) if !root.contains('/') => FieldTable::vitals_with_root(root),
            _ => FieldTable::vitals(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn summary(id: &str, source: TemplateSource) -> TemplateSummary {
        TemplateSummary {
            template_id: id.into(),
            name: id.into(),
            description: None,
            source,
        }
    }

    #[test]
    fn name_prefers_explicit_members() {
        let id = "jitendra.choudhary.vitals.v1";
        assert_eq!(extract_template_name(id, &json!({"name": "Vitals form"})), "Vitals form");
        assert_eq!(extract_template_name(id, &json!({"concept": "Vitals"})), "Vitals");
        assert_eq!(
            extract_template_name(id, &json!({"tree": {"localizedNames": {"en": "Vital signs"}}})),
            "Vital signs"
        );
    }

    #[test]
    fn name_skips_tree_values_equal_to_the_id() {
        let id = "gynaec_case_record_jitendra.v0";
        let wt = json!({
            "templateId": id,
            "tree": {"localizedNames": {"en": id}, "name": id, "id": "gynaec_case_record"}
        });
        assert_eq!(extract_template_name(id, &wt), "gynaec_case_record");
    }

    #[test]
    fn name_falls_back_to_the_id() {
        assert_eq!(extract_template_name("jitendra.choudhary.vitals.v1", &json!({})), "Vitals");
        assert_eq!(extract_template_name("example.v2", &json!({})), "example.v2");
    }

    #[test]
    fn friendly_name_humanises_bare_ids() {
        assert_eq!(
            friendly_name("gynaec_case_record_jitendra.v0", &json!({"tree": {"id": "gynaec_case_record_jitendra.v0"}})),
            "Gynaecology Case Record"
        );
        assert_eq!(friendly_name("example.v2", &json!({})), "Example");
        assert_eq!(humanise_template_id("blood_sugar.v1"), "Blood Sugar");
    }

    #[test]
    fn remote_summary_uses_concept() {
        let item = TemplateListItem {
            template_id: "blood_sugar.v1".into(),
            concept: None,
            archetype_id: None,
            created_timestamp: None,
            description: Some("Capillary glucose".into()),
        };
        let summary = TemplateSummary::from_remote(&item);
        assert_eq!(summary.name, "Blood Sugar");
        assert_eq!(summary.source, TemplateSource::Remote);

        let item = TemplateListItem {
            concept: Some("Blood sugar".into()),
            ..item
        };
        assert_eq!(TemplateSummary::from_remote(&item).name, "Blood sugar");
    }

    #[test]
    fn merge_puts_local_first_and_pins_the_vitals_template() {
        let local = vec![summary("example.v2", TemplateSource::Local)];
        let remote = vec![
            summary("blood_sugar.v1", TemplateSource::Remote),
            summary("example.v2", TemplateSource::Remote),
            summary("jitendra.choudhary.vitals.v1", TemplateSource::Remote),
        ];

        let merged = merge_listing(local, Ok(remote), "jitendra.choudhary.vitals.v1");
        let ids: Vec<&str> = merged.iter().map(|t| t.template_id.as_str()).collect();
        assert_eq!(ids, ["jitendra.choudhary.vitals.v1", "example.v2", "blood_sugar.v1"]);
        assert_eq!(merged[1].source, TemplateSource::Local);
    }

    #[test]
    fn merge_survives_remote_failure() {
        let local = vec![summary("example.v2", TemplateSource::Local)];
        let err = VitalsError::InvalidInput("unreachable".into());
        let merged = merge_listing(local.clone(), Err(err), "jitendra.choudhary.vitals.v1");
        assert_eq!(merged, local);
    }

    #[test]
    fn search_matches_name_or_id() {
        let mut t = summary("jitendra.choudhary.vitals.v1", TemplateSource::Remote);
        t.name = "Vitals".into();
        assert!(t.matches("VITAL"));
        assert!(t.matches("choudhary"));
        assert!(t.matches(""));
        assert!(!t.matches("gynae"));
    }

    #[test]
    fn loads_local_templates_from_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("b_gynaec.json"),
            json!({"templateId": "gynaec_case_record_jitendra.v0", "tree": {"id": "gynaec_case_record"}}).to_string(),
        )
        .expect("write");
        fs::write(
            dir.path().join("a_vitals.json"),
            json!({"templateId": "ward.vitals.v1", "tree": {"id": "ward_vitals", "localizedNames": {"en": "Ward vitals"}}}).to_string(),
        )
        .expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");
        fs::write(dir.path().join("c_no_id.json"), "{}").expect("write");

        let templates = load_local_templates(dir.path()).expect("load");
        let ids: Vec<&str> = templates.iter().map(|t| t.template_id.as_str()).collect();
        assert_eq!(ids, ["ward.vitals.v1", "gynaec_case_record_jitendra.v0"]);
        assert_eq!(templates[0].summary().name, "Ward vitals");
        assert_eq!(templates[0].summary().source, TemplateSource::Local);
    }

    #[test]
    fn unparseable_local_template_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("broken.json"), "{not json").expect("write");
        let err = load_local_templates(dir.path()).expect_err("should fail");
        assert!(matches!(err, VitalsError::TemplateFileParse { .. }));

        let err = load_local_templates(&dir.path().join("missing")).expect_err("should fail");
        assert!(matches!(err, VitalsError::TemplateFileRead { .. }));
    }

    #[test]
    fn registry_picks_field_tables() {
        let default = TemplateId::new("jitendra.choudhary.vitals.v1").expect("id");
        let ward = TemplateId::new("ward.vitals.v1").expect("id");
        let unknown = TemplateId::new("unknown.v1").expect("id");

        let registry = TemplateRegistry::new(default.clone()).with_local_templates(vec![LocalTemplate {
            template_id: ward.clone(),
            path: PathBuf::from("ward.json"),
            web_template: json!({"templateId": "ward.vitals.v1", "tree": {"id": "ward_vitals"}}),
        }]);

        assert_eq!(registry.field_table(&default).root(), "vitals");
        assert_eq!(registry.field_table(&ward).root(), "ward_vitals");
        assert_eq!(registry.field_table(&unknown).root(), "vitals");
        assert!(registry.local_web_template(&ward).is_some());
        assert_eq!(registry.local_summaries().len(), 1);

        let mut registry = registry;
        registry.register(unknown.clone(), FieldTable::vitals_with_root("unknown"));
        assert_eq!(registry.field_table(&unknown).root(), "unknown");

        assert_eq!(registry.template_for_root("vitals"), Some(default));
        assert_eq!(registry.template_for_root("ward_vitals"), Some(ward));
        assert_eq!(registry.template_for_root("unknown"), Some(unknown));
        assert_eq!(registry.template_for_root("gynaec"), None);
    }
}
