//! The flat vitals record exchanged with callers.
//!
//! Every clinical field is optional on its own: `None` means "not measured", never zero. A record
//! without a `uid` has not been saved yet.

use crate::fields::VitalSign;
use chrono::{DateTime, FixedOffset};
use clinic_types::CompositionUid;
use openehr::{DataValue, DvProportion, DvQuantity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A measured amount with its unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub magnitude: f64,
    #[serde(default)]
    pub units: String,
}

impl Quantity {
    pub fn new(magnitude: f64, units: impl Into<String>) -> Self {
        Self {
            magnitude,
            units: units.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub rate: f64,
    #[serde(default)]
    pub units: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: Quantity,
    pub diastolic: Quantity,
}

/// Oxygen saturation as a ratio. The denominator is whatever the device reported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spo2 {
    pub numerator: f64,
    pub denominator: f64,
}

impl Spo2 {
    /// `numerator / denominator * 100`, or `None` for a zero denominator.
    pub fn percentage(&self) -> Option<f64> {
        DvProportion::new(self.numerator, self.denominator).percentage()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<CompositionUid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<Pulse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<Spo2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_weight: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub territory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

/// Extracted element values keyed by the vital sign they belong to.
pub type Measurements = BTreeMap<VitalSign, DataValue>;

impl VitalsRecord {
    pub fn is_new(&self) -> bool {
        self.uid.is_none()
    }

    /// `true` if at least one clinical field is present.
    pub fn has_measurements(&self) -> bool {
        VitalSign::ALL.iter().any(|sign| self.measurement(*sign).is_some())
    }

    /// `start_time` parsed as RFC 3339, if present and parseable.
    pub fn parsed_start_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.start_time.as_deref()?).ok()
    }

    /// The value this record carries for `sign`, in its element shape.
    pub fn measurement(&self, sign: VitalSign) -> Option<DataValue> {
        let quantity = |q: &Quantity| DataValue::Quantity(DvQuantity::new(q.magnitude, q.units.clone()));
        match sign {
            VitalSign::Systolic => self.blood_pressure.as_ref().map(|bp| quantity(&bp.systolic)),
            VitalSign::Diastolic => self.blood_pressure.as_ref().map(|bp| quantity(&bp.diastolic)),
            VitalSign::PulseRate => self
                .pulse
                .as_ref()
                .map(|p| DataValue::Quantity(DvQuantity::new(p.rate, p.units.clone()))),
            VitalSign::Spo2 => self
                .spo2
                .as_ref()
                .map(|s| DataValue::Proportion(DvProportion::new(s.numerator, s.denominator))),
            VitalSign::BodyWeight => self.body_weight.as_ref().map(quantity),
            VitalSign::Height => self.height.as_ref().map(quantity),
        }
    }

    /// Fill the clinical fields from extracted values.
    ///
    /// Values of the wrong shape are ignored. Blood pressure is only set when both systolic and
    /// diastolic are present.
    pub fn apply_measurements(&mut self, values: &Measurements) {
        let quantity = |sign: VitalSign| {
            values
                .get(&sign)
                .and_then(DataValue::as_quantity)
                .map(|q| Quantity::new(q.magnitude, q.units.clone()))
        };

        self.blood_pressure = match (quantity(VitalSign::Systolic), quantity(VitalSign::Diastolic)) {
            (Some(systolic), Some(diastolic)) => Some(BloodPressure {
                systolic,
                diastolic,
            }),
            _ => None,
        };
        self.pulse = quantity(VitalSign::PulseRate).map(|q| Pulse {
            rate: q.magnitude,
            units: q.units,
        });
        self.spo2 = values
            .get(&VitalSign::Spo2)
            .and_then(DataValue::as_proportion)
            .map(|p| Spo2 {
                numerator: p.numerator,
                denominator: p.denominator,
            });
        self.body_weight = quantity(VitalSign::BodyWeight);
        self.height = quantity(VitalSign::Height);
    }
}
