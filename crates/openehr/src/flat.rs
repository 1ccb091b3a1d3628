//! Flat (web template) composition format.
//!
//! The flat format (`application/openehr.wt.flat.schema+json`) is a single JSON object whose
//! keys are slash-separated web-template paths with optional `|attribute` suffixes:
//!
//! ```text
//! "ctx/language": "en"
//! "vitals/context/start_time": "2024-03-01T10:00:00Z"
//! "vitals/blood_pressure/any_event:0/systolic|magnitude": 120
//! "vitals/blood_pressure/any_event:0/systolic|unit": "mm[Hg]"
//! "vitals/pulse_oximetry/any_event:0/spo|numerator": 98
//! ```
//!
//! [`FlatComposition`] keeps keys ordered so serialised bodies are stable, and offers typed
//! setters/getters for the value shapes the clinic uses. Getters are total: a missing or
//! mistyped attribute yields `None`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::data_types::{DvProportion, DvQuantity};
use crate::{OpenEhrError, OpenEhrResult};

/// Suffix used by the repository for the composition uid in flat output.
const UID_SUFFIX: &str = "/_uid";

/// A flat composition document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatComposition(BTreeMap<String, Value>);

impl FlatComposition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a flat document from a response body.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::Translation`] if the body is not a JSON object.
    pub fn from_json(body: Value) -> OpenEhrResult<Self> {
        match body {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(OpenEhrError::Translation(format!(
                "flat composition must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.0.into_iter().collect::<Map<String, Value>>())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Text at `key`, if present and a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str()
    }

    /// First text found among `keys`.
    pub fn first_text(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.text(k))
    }

    /// Writes `path|magnitude` and `path|unit`.
    pub fn set_quantity(&mut self, path: &str, quantity: &DvQuantity) {
        self.insert(format!("{path}|magnitude"), quantity.magnitude);
        self.insert(format!("{path}|unit"), quantity.units.clone());
    }

    /// Reads `path|magnitude` (required, numeric) and `path|unit`.
    pub fn quantity(&self, path: &str) -> Option<DvQuantity> {
        let magnitude = self.0.get(&format!("{path}|magnitude"))?.as_f64()?;
        let units = self
            .text(&format!("{path}|unit"))
            .unwrap_or_default()
            .to_string();
        Some(DvQuantity::new(magnitude, units))
    }

    /// Writes `path|numerator`, `path|denominator` and, when known, `path|type`.
    pub fn set_proportion(&mut self, path: &str, proportion: &DvProportion) {
        self.insert(format!("{path}|numerator"), proportion.numerator);
        self.insert(format!("{path}|denominator"), proportion.denominator);
        if let Some(kind) = proportion.proportion_type {
            self.insert(format!("{path}|type"), kind);
        }
    }

    /// Reads `path|numerator` and `path|denominator`; both must be numeric.
    pub fn proportion(&self, path: &str) -> Option<DvProportion> {
        let numerator = self.0.get(&format!("{path}|numerator"))?.as_f64()?;
        let denominator = self.0.get(&format!("{path}|denominator"))?.as_f64()?;
        let mut proportion = DvProportion::new(numerator, denominator);
        proportion.proportion_type = self.0.get(&format!("{path}|type")).and_then(Value::as_i64);
        Some(proportion)
    }

    /// Writes a coded text as `path|value`, plus `path|code` and `path|terminology` when a code
    /// is known.
    pub fn set_coded_text(&mut self, path: &str, value: &str, code: Option<(&str, &str)>) {
        self.insert(format!("{path}|value"), value);
        if let Some((terminology, code)) = code {
            self.insert(format!("{path}|code"), code);
            self.insert(format!("{path}|terminology"), terminology);
        }
    }

    fn uid_entry(&self) -> Option<(&str, &Value)> {
        self.0.iter().find_map(|(k, v)| {
            let root = k.strip_suffix(UID_SUFFIX)?;
            (!root.is_empty() && !root.contains('/')).then_some((root, v))
        })
    }

    /// The composition uid, if the document carries one (`<root>/_uid`).
    pub fn uid(&self) -> Option<&str> {
        self.uid_entry().and_then(|(_, v)| v.as_str())
    }

    /// Web-template root node id the keys start with.
    ///
    /// Taken from `<root>/_uid` when present, otherwise from the first key outside `ctx/`.
    pub fn root(&self) -> Option<&str> {
        if let Some((root, _)) = self.uid_entry() {
            return Some(root);
        }
        self.0
            .keys()
            .filter_map(|k| k.split(['/', '|']).next())
            .find(|segment| !segment.is_empty() && *segment != "ctx")
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_quantity_and_proportion_attributes() {
        let mut flat = FlatComposition::new();
        flat.set_quantity(
            "vitals/blood_pressure/any_event:0/systolic",
            &DvQuantity::new(120.0, "mm[Hg]"),
        );
        let mut spo2 = DvProportion::new(19.0, 20.0);
        spo2.proportion_type = Some(2);
        flat.set_proportion("vitals/pulse_oximetry/any_event:0/spo", &spo2);

        let json = flat.clone().into_json();
        assert_eq!(json["vitals/blood_pressure/any_event:0/systolic|magnitude"], json!(120.0));
        assert_eq!(json["vitals/blood_pressure/any_event:0/systolic|unit"], json!("mm[Hg]"));
        assert_eq!(json["vitals/pulse_oximetry/any_event:0/spo|denominator"], json!(20.0));
        assert_eq!(json["vitals/pulse_oximetry/any_event:0/spo|type"], json!(2));

        let back = flat
            .proportion("vitals/pulse_oximetry/any_event:0/spo")
            .expect("proportion");
        assert_eq!(back.percentage(), Some(95.0));
    }

    #[test]
    fn getters_are_total() {
        let flat = FlatComposition::from_json(json!({
            "vitals/height/any_event:0/height|magnitude": "tall",
            "vitals/body_weight/any_event:0/weight|magnitude": 70
        }))
        .expect("object");
        assert!(flat.quantity("vitals/height/any_event:0/height").is_none());
        assert!(flat.quantity("vitals/missing").is_none());
        let weight = flat
            .quantity("vitals/body_weight/any_event:0/weight")
            .expect("weight");
        assert_eq!(weight.magnitude, 70.0);
        assert_eq!(weight.units, "");
    }

    #[test]
    fn finds_root_level_uid_only() {
        let flat = FlatComposition::from_json(json!({
            "vitals/blood_pressure/_uid": "nested-should-be-ignored",
            "vitals/_uid": "8849182c-82ad-4088-a07f-48ead4180515::local.ehrbase.org::1"
        }))
        .expect("object");
        assert_eq!(
            flat.uid(),
            Some("8849182c-82ad-4088-a07f-48ead4180515::local.ehrbase.org::1")
        );
    }

    #[test]
    fn rejects_non_object_bodies() {
        let err = FlatComposition::from_json(json!([1, 2])).expect_err("should reject");
        assert!(matches!(err, OpenEhrError::Translation(msg) if msg.contains("an array")));
    }

    #[test]
    fn writes_coded_text_with_optional_code() {
        let mut flat = FlatComposition::new();
        flat.set_coded_text("vitals/category", "event", Some(("openehr", "433")));
        flat.set_coded_text("vitals/context/setting", "tele-clinic", None);
        assert_eq!(flat.text("vitals/category|code"), Some("433"));
        assert_eq!(flat.text("vitals/category|terminology"), Some("openehr"));
        assert_eq!(flat.text("vitals/context/setting|value"), Some("tele-clinic"));
        assert!(flat.get("vitals/context/setting|code").is_none());
    }

    #[test]
    fn root_comes_from_uid_then_keys() {
        let flat = FlatComposition::from_json(json!({
            "ctx/language": "en",
            "ward_vitals/_uid": "8849182c-82ad-4088-a07f-48ead4180515::local.ehrbase.org::1",
            "ward_vitals/pulse_heart_beat/any_event:0/rate|magnitude": 72
        }))
        .expect("object");
        assert_eq!(flat.root(), Some("ward_vitals"));

        let flat = FlatComposition::from_json(json!({
            "ctx/territory": "IN",
            "vitals/context/start_time": "2024-03-01T10:00:00Z"
        }))
        .expect("object");
        assert_eq!(flat.root(), Some("vitals"));

        let flat = FlatComposition::from_json(json!({"ctx/language": "en"})).expect("object");
        assert_eq!(flat.root(), None);
    }
}
