//! Template field vocabulary.
//!
//! A [`FieldTable`] maps each vital sign to where a template keeps it:
//!
//! | sign | observation | element | shape | flat path |
//! |---|---|---|---|---|
//! | systolic | Blood pressure | Systolic | quantity | `blood_pressure/any_event:0/systolic` |
//! | pulse rate | Pulse | Pulse rate | quantity | `pulse_heart_beat/any_event:0/rate` |
//! | SpO₂ | Pulse oximetry | SpO₂ | proportion | `pulse_oximetry/any_event:0/spo` |
//!
//! Reading, writing and querying all walk the same table, so supporting another vital sign or
//! another template is a table entry rather than new traversal code.

use crate::constants::{BLOOD_PRESSURE, BODY_WEIGHT, DEFAULT_VITALS_FLAT_ROOT, HEIGHT, PULSE, PULSE_OXIMETRY};
use crate::record::Measurements;
use crate::{VitalsError, VitalsResult};
use openehr::{ArchetypeId, DataValue};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VitalSign {
    Systolic,
    Diastolic,
    PulseRate,
    Spo2,
    BodyWeight,
    Height,
}

impl VitalSign {
    pub const ALL: [VitalSign; 6] = [
        VitalSign::Systolic,
        VitalSign::Diastolic,
        VitalSign::PulseRate,
        VitalSign::Spo2,
        VitalSign::BodyWeight,
        VitalSign::Height,
    ];

    /// AQL column alias used by projection queries.
    pub fn column_name(self) -> &'static str {
        match self {
            VitalSign::Systolic => "systolic",
            VitalSign::Diastolic => "diastolic",
            VitalSign::PulseRate => "pulse_rate",
            VitalSign::Spo2 => "spo2",
            VitalSign::BodyWeight => "body_weight",
            VitalSign::Height => "height",
        }
    }

    pub fn shape(self) -> ValueShape {
        match self {
            VitalSign::Spo2 => ValueShape::Proportion,
            _ => ValueShape::Quantity,
        }
    }

    /// UCUM unit written when a quantity arrives without one.
    pub fn default_unit(self) -> &'static str {
        match self {
            VitalSign::Systolic | VitalSign::Diastolic => "mm[Hg]",
            VitalSign::PulseRate => "/min",
            VitalSign::Spo2 => "",
            VitalSign::BodyWeight => "kg",
            VitalSign::Height => "cm",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueShape {
    Quantity,
    Proportion,
}

impl ValueShape {
    pub fn matches(self, value: &DataValue) -> bool {
        match self {
            ValueShape::Quantity => value.as_quantity().is_some(),
            ValueShape::Proportion => value.as_proportion().is_some(),
        }
    }
}

/// Where one vital sign lives in a template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub sign: VitalSign,
    /// `name.value` of the observation in `content[]`.
    pub archetype_name: String,
    pub archetype_id: String,
    /// `name.value` of the element in the first event's `items[]`.
    pub element_name: String,
    pub shape: ValueShape,
    /// Flat path below the template root, without `|attribute` suffixes.
    pub flat_path: String,
    /// Canonical path of the element below its observation, used by projection queries.
    pub projection_path: String,
}

impl FieldSpec {
    fn vitals(
        sign: VitalSign,
        archetype_name: &str,
        archetype_id: &str,
        element_name: &str,
        flat_path: &str,
        projection_path: &str,
    ) -> Self {
        Self {
            sign,
            archetype_name: archetype_name.into(),
            archetype_id: archetype_id.into(),
            element_name: element_name.into(),
            shape: sign.shape(),
            flat_path: flat_path.into(),
            projection_path: projection_path.into(),
        }
    }
}

/// The vital-sign vocabulary of one template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldTable {
    root: String,
    fields: Vec<FieldSpec>,
}

impl FieldTable {
    /// Build a table after checking it is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`VitalsError::InvalidInput`] if the root is empty or contains `/`, a sign is
    /// listed twice, a shape does not fit its sign, or an archetype id does not parse.
    pub fn new(root: impl Into<String>, fields: Vec<FieldSpec>) -> VitalsResult<Self> {
        let root = root.into();
        if root.trim().is_empty() || root.contains('/') {
            return Err(VitalsError::InvalidInput(format!(
                "flat root {root:?} must be a single non-empty path segment"
            )));
        }

        let mut seen = BTreeSet::new();
        for field in &fields {
            if !seen.insert(field.sign) {
                return Err(VitalsError::InvalidInput(format!(
                    "{:?} appears more than once",
                    field.sign
                )));
            }
            if field.shape != field.sign.shape() {
                return Err(VitalsError::InvalidInput(format!(
                    "{:?} must be read as {:?}",
                    field.sign,
                    field.sign.shape()
                )));
            }
            let archetype = ArchetypeId::parse(&field.archetype_id)?;
            if !archetype.is_observation() {
                return Err(VitalsError::InvalidInput(format!(
                    "{} is not an observation archetype",
                    field.archetype_id
                )));
            }
        }

        Ok(Self { root, fields })
    }

    /// The vocabulary of the default vitals template, rooted at `vitals`.
    pub fn vitals() -> Self {
        Self::vitals_with_root(DEFAULT_VITALS_FLAT_ROOT)
    }

    /// The default vitals vocabulary below a different web-template root.
    pub fn vitals_with_root(root: impl Into<String>) -> Self {
        const BP: &str = "openEHR-EHR-OBSERVATION.blood_pressure.v2";
        const BP_EVENT: &str = "data[at0001]/events[at0006]/data[at0003]/items";
        Self {
            root: root.into(),
            fields: vec![
                FieldSpec::vitals(
                    VitalSign::Systolic,
                    BLOOD_PRESSURE,
                    BP,
                    "Systolic",
                    "blood_pressure/any_event:0/systolic",
                    &format!("{BP_EVENT}[at0004]"),
                ),
                FieldSpec::vitals(
                    VitalSign::Diastolic,
                    BLOOD_PRESSURE,
                    BP,
                    "Diastolic",
                    "blood_pressure/any_event:0/diastolic",
                    &format!("{BP_EVENT}[at0005]"),
                ),
                FieldSpec::vitals(
                    VitalSign::PulseRate,
                    PULSE,
                    "openEHR-EHR-OBSERVATION.pulse.v2",
                    "Pulse rate",
                    "pulse_heart_beat/any_event:0/rate",
                    "data[at0002]/events[at0003]/data[at0001]/items[at0004]",
                ),
                FieldSpec::vitals(
                    VitalSign::Spo2,
                    PULSE_OXIMETRY,
                    "openEHR-EHR-OBSERVATION.pulse_oximetry.v1",
                    "SpO₂",
                    "pulse_oximetry/any_event:0/spo",
                    "data[at0001]/events[at0002]/data[at0003]/items[at0006]",
                ),
                FieldSpec::vitals(
                    VitalSign::BodyWeight,
                    BODY_WEIGHT,
                    "openEHR-EHR-OBSERVATION.body_weight.v2",
                    "Weight",
                    "body_weight/any_event:0/weight",
                    "data[at0002]/events[at0003]/data[at0001]/items[at0004]",
                ),
                FieldSpec::vitals(
                    VitalSign::Height,
                    HEIGHT,
                    "openEHR-EHR-OBSERVATION.height.v2",
                    "Height",
                    "height_length/any_event:0/height_length",
                    "data[at0001]/events[at0002]/data[at0003]/items[at0004]",
                ),
            ],
        }
    }

    /// Root node id of the web template; every flat path starts with it.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, sign: VitalSign) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.sign == sign)
    }

    /// Full flat key of a field, e.g. `vitals/pulse_heart_beat/any_event:0/rate`.
    pub fn flat_key(&self, field: &FieldSpec) -> String {
        format!("{}/{}", self.root, field.flat_path)
    }

    /// Full flat key of a composition-level path such as `context/start_time`.
    pub fn root_key(&self, path: &str) -> String {
        format!("{}/{}", self.root, path)
    }

    /// Run `lookup` for every field and keep the values whose shape fits.
    pub fn extract(&self, mut lookup: impl FnMut(&FieldSpec) -> Option<DataValue>) -> Measurements {
        self.fields
            .iter()
            .filter_map(|field| {
                let value = lookup(field)?;
                field.shape.matches(&value).then_some((field.sign, value))
            })
            .collect()
    }
}

impl Default for FieldTable {
    fn default() -> Self {
        Self::vitals()
    }
}
