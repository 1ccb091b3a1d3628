//! OpenEHR RM data value types.
//!
//! This module provides wire representations of the openEHR Reference Model (RM) data values
//! the clinic reads and writes, together with total extractors from untyped JSON.
//!
//! Key types:
//! - [`DataValue`]: tagged union of the value shapes that appear in vitals observations.
//! - [`DvQuantity`], [`DvProportion`], [`DvCodedText`]: the individual RM value types.
//! - [`ArchetypeId`]: parsed and validated openEHR archetype identifier.
//!
//! Every `from_json` constructor returns `Option`: a value that is present and well-typed
//! yields `Some`, anything else (missing keys, strings where numbers belong, an unexpected
//! `_type`) yields `None`. Callers never see a type error for clinical data that is simply
//! shaped differently.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::OpenEhrError;

/// RM `DV_QUANTITY`: a magnitude with UCUM units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvQuantity {
    pub magnitude: f64,
    #[serde(default)]
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
}

impl DvQuantity {
    pub fn new(magnitude: f64, units: impl Into<String>) -> Self {
        Self {
            magnitude,
            units: units.into(),
            precision: None,
        }
    }

    /// Extracts a quantity from JSON.
    ///
    /// Requires a numeric `magnitude`. Missing `units` are read as an empty string.
    pub fn from_json(value: &Value) -> Option<Self> {
        let magnitude = value.get("magnitude")?.as_f64()?;
        if !magnitude.is_finite() {
            return None;
        }
        let units = value
            .get("units")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let precision = value.get("precision").and_then(Value::as_i64);
        Some(Self {
            magnitude,
            units,
            precision,
        })
    }
}

/// RM `DV_PROPORTION`: a ratio.
///
/// The denominator is whatever the recording system stored. A saturation of 19/20 is 95 %,
/// exactly like 95/100.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvProportion {
    pub numerator: f64,
    pub denominator: f64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub proportion_type: Option<i64>,
}

/// `PROPORTION_KIND` code for a percentage.
pub const PROPORTION_KIND_PERCENT: i64 = 2;

impl DvProportion {
    pub fn new(numerator: f64, denominator: f64) -> Self {
        Self {
            numerator,
            denominator,
            proportion_type: None,
        }
    }

    /// Extracts a proportion from JSON. Both `numerator` and `denominator` must be numbers.
    pub fn from_json(value: &Value) -> Option<Self> {
        let numerator = value.get("numerator")?.as_f64()?;
        let denominator = value.get("denominator")?.as_f64()?;
        if !numerator.is_finite() || !denominator.is_finite() {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
            proportion_type: value.get("type").and_then(Value::as_i64),
        })
    }

    /// Ratio expressed as a percentage. `None` when the denominator is zero.
    pub fn percentage(&self) -> Option<f64> {
        if self.denominator == 0.0 {
            return None;
        }
        Some(self.numerator * 100.0 / self.denominator)
    }
}

/// RM `DV_CODED_TEXT`, reduced to the display value and its defining code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvCodedText {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminology: Option<String>,
}

impl DvCodedText {
    /// Extracts a coded text from JSON. Only the display `value` is required.
    pub fn from_json(value: &Value) -> Option<Self> {
        let text = value.get("value")?.as_str()?.to_string();
        let defining_code = value.get("defining_code");
        Some(Self {
            value: text,
            code_string: defining_code
                .and_then(|c| c.get("code_string"))
                .and_then(Value::as_str)
                .map(str::to_string),
            terminology: defining_code
                .and_then(|c| c.get("terminology_id"))
                .and_then(|t| t.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// The value shapes an observation element may carry.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Quantity(DvQuantity),
    Proportion(DvProportion),
    CodedText(DvCodedText),
    Text(String),
}

impl DataValue {
    /// Classifies an element `value` node.
    ///
    /// The RM `_type` tag is authoritative when present. Without it the shape is inferred from
    /// the keys, quantity first.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value.get("_type").and_then(Value::as_str) {
            Some("DV_QUANTITY") => DvQuantity::from_json(value).map(Self::Quantity),
            Some("DV_PROPORTION") => DvProportion::from_json(value).map(Self::Proportion),
            Some("DV_CODED_TEXT") => DvCodedText::from_json(value).map(Self::CodedText),
            Some("DV_TEXT") => Self::text_from_json(value),
            Some(_) => None,
            None => DvQuantity::from_json(value)
                .map(Self::Quantity)
                .or_else(|| DvProportion::from_json(value).map(Self::Proportion))
                .or_else(|| {
                    value
                        .get("defining_code")
                        .and_then(|_| DvCodedText::from_json(value))
                        .map(Self::CodedText)
                })
                .or_else(|| Self::text_from_json(value)),
        }
    }

    fn text_from_json(value: &Value) -> Option<Self> {
        value
            .get("value")
            .and_then(Value::as_str)
            .map(|s| Self::Text(s.to_string()))
    }

    pub fn as_quantity(&self) -> Option<&DvQuantity> {
        match self {
            Self::Quantity(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_proportion(&self) -> Option<&DvProportion> {
        match self {
            Self::Proportion(p) => Some(p),
            _ => None,
        }
    }

    /// Display text of a coded or plain text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::CodedText(c) => Some(&c.value),
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Parsed and validated representation of an openEHR archetype identifier.
///
/// # Canonical Form
///
/// `<authority>-<rm_package>-<RM_CLASS>.<concept>.v<version>`
///
/// Example: `openEHR-EHR-OBSERVATION.blood_pressure.v2`
///
/// Archetype ids appear in AQL predicates (`c/content[openEHR-EHR-OBSERVATION.pulse.v2]`), so
/// parsing them up front keeps malformed ids out of query text.
///
/// ```rust
/// # use openehr::data_types::ArchetypeId;
/// let id = ArchetypeId::parse("openEHR-EHR-OBSERVATION.blood_pressure.v2")?;
/// assert!(id.is_observation());
/// assert_eq!(id.to_string(), "openEHR-EHR-OBSERVATION.blood_pressure.v2");
/// # Ok::<(), openehr::OpenEhrError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeId {
    /// Archetype authority (e.g. "openEHR")
    pub authority: String,

    /// Reference Model package (e.g. "EHR")
    pub rm_package: String,

    /// Reference Model class (e.g. "OBSERVATION", "COMPOSITION")
    pub rm_class: String,

    /// Archetype concept, including any specialisation suffix (e.g. "blood_pressure")
    pub concept: String,

    /// Archetype major version (e.g. 2)
    pub version: u32,
}

const RM_CLASSES: &[&str] = &[
    "COMPOSITION",
    "SECTION",
    "OBSERVATION",
    "EVALUATION",
    "INSTRUCTION",
    "ACTION",
    "ADMIN_ENTRY",
    "CLUSTER",
    "ELEMENT",
];

impl ArchetypeId {
    fn validate_components(
        authority: &str,
        rm_package: &str,
        rm_class: &str,
        concept: &str,
        version: u32,
    ) -> Result<(), OpenEhrError> {
        if authority.is_empty() || !authority.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "authority must be alphanumeric, got '{}'",
                authority
            )));
        }

        if rm_package != "EHR" {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "rm_package must be 'EHR', got '{}'",
                rm_package
            )));
        }

        if !RM_CLASSES.contains(&rm_class) {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "unsupported rm_class '{}'",
                rm_class
            )));
        }

        let concept_ok = !concept.is_empty()
            && concept
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        if !concept_ok {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "concept contains invalid characters: '{}'",
                concept
            )));
        }

        if version == 0 {
            return Err(OpenEhrError::InvalidArchetypeId(
                "version must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Creates a new `ArchetypeId` from individual components with validation.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidArchetypeId`] if any component fails validation.
    pub fn new(
        authority: &str,
        rm_package: &str,
        rm_class: &str,
        concept: &str,
        version: u32,
    ) -> Result<Self, OpenEhrError> {
        Self::validate_components(authority, rm_package, rm_class, concept, version)?;

        Ok(Self {
            authority: authority.to_string(),
            rm_package: rm_package.to_string(),
            rm_class: rm_class.to_string(),
            concept: concept.to_string(),
            version,
        })
    }

    /// Parses and validates an archetype identifier string.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidArchetypeId`] if the string is not in canonical form or
    /// a component fails validation.
    pub fn parse(raw: &str) -> Result<Self, OpenEhrError> {
        let (authority, rest) = raw
            .split_once('-')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (rm_package, remainder) = rest
            .split_once('-')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (rm_class, remainder) = remainder
            .split_once('.')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (concept, version_part) = remainder
            .rsplit_once(".v")
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let version = version_part
            .parse::<u32>()
            .map_err(|_| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        Self::new(authority, rm_package, rm_class, concept, version)
    }

    pub fn is_composition(&self) -> bool {
        self.rm_class == "COMPOSITION"
    }

    pub fn is_observation(&self) -> bool {
        self.rm_class == "OBSERVATION"
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{}.v{}",
            self.authority, self.rm_package, self.rm_class, self.concept, self.version
        )
    }
}

impl Serialize for ArchetypeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ArchetypeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
