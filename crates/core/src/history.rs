//! Chronological views of a vitals history.
//!
//! The repository answers newest first, but nothing in the record relies on that. Callers that
//! need time order sort here: instants are compared after RFC 3339 parsing, so sub-second
//! differences and offsets are honoured, and equal instants fall back to the raw string.

use crate::record::VitalsRecord;
use serde::Serialize;
use std::cmp::Ordering;

fn chronological(a: &VitalsRecord, b: &VitalsRecord) -> Ordering {
    match (a.parsed_start_time(), b.parsed_start_time()) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.start_time.cmp(&b.start_time)),
        // Undated records go last.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.start_time.cmp(&b.start_time),
    }
}

/// Oldest first.
pub fn sort_chronologically(records: &mut [VitalsRecord]) {
    records.sort_by(chronological);
}

/// Newest first; undated records still go last.
pub fn sort_newest_first(records: &mut [VitalsRecord]) {
    records.sort_by(|a, b| match (a.parsed_start_time(), b.parsed_start_time()) {
        (Some(_), Some(_)) => chronological(b, a),
        _ => chronological(a, b),
    });
}

/// One point of the vitals dashboard series.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systolic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diastolic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse: Option<f64>,
    /// Whole percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl From<&VitalsRecord> for ChartPoint {
    fn from(record: &VitalsRecord) -> Self {
        let bp = record.blood_pressure.as_ref();
        Self {
            date: record.start_time.clone().unwrap_or_default(),
            systolic: bp.map(|bp| bp.systolic.magnitude),
            diastolic: bp.map(|bp| bp.diastolic.magnitude),
            pulse: record.pulse.as_ref().map(|p| p.rate),
            spo2: record
                .spo2
                .as_ref()
                .and_then(|s| s.percentage())
                .map(f64::round),
            height: record.height.as_ref().map(|q| q.magnitude),
            weight: record.body_weight.as_ref().map(|q| q.magnitude),
        }
    }
}

/// Dashboard series, oldest first. Records without a start time are left out.
pub fn chart_points(records: &[VitalsRecord]) -> Vec<ChartPoint> {
    let mut dated: Vec<VitalsRecord> = records
        .iter()
        .filter(|r| r.parsed_start_time().is_some())
        .cloned()
        .collect();
    sort_chronologically(&mut dated);
    dated.iter().map(ChartPoint::from).collect()
}
