//! Reshape repository responses into [`VitalsRecord`]s.
//!
//! Fields are located by name through the [`FieldTable`], never by position, so reordered
//! `content[]` or `items[]` arrays produce the same record. Missing clinical data is normal: the
//! field is left `None` and a debug event is emitted. A structurally broken row still yields a
//! record holding whatever could be read; it never aborts the batch.

use crate::fields::{FieldTable, ValueShape, VitalSign};
use crate::query::QueryShape;
use crate::record::{Measurements, VitalsRecord};
use clinic_types::CompositionUid;
use openehr::{CompositionView, DataValue, FlatComposition, ResultSet};
use serde_json::Value;
use tracing::{debug, warn};

/// Normalise every row of `result`, preserving the repository's order.
pub fn normalise_result_set(
    result: &ResultSet,
    shape: QueryShape,
    table: &FieldTable,
) -> Vec<VitalsRecord> {
    result
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| match shape {
            QueryShape::Composition => match composition_in_row(row) {
                Some(composition) => record_from_composition(composition, table),
                None => {
                    warn!(row = index, "AQL row holds no composition object");
                    VitalsRecord::default()
                }
            },
            QueryShape::Projection => record_from_projection(row, result, table),
        })
        .collect()
}

/// A composition row is either `[ {composition} ]` or the composition object itself.
fn composition_in_row(row: &Value) -> Option<&Value> {
    match row {
        Value::Array(cells) => cells.iter().find(|cell| cell.is_object()),
        Value::Object(_) => Some(row),
        _ => None,
    }
}

/// Build a record from one canonical composition.
pub fn record_from_composition(composition: &Value, table: &FieldTable) -> VitalsRecord {
    let view = CompositionView::new(composition);
    if !view.is_well_formed() {
        warn!(
            uid = view.uid().unwrap_or("<none>"),
            "composition is missing content or context; keeping what is readable"
        );
    }

    let mut record = VitalsRecord {
        uid: view.uid().and_then(parse_uid),
        start_time: view.start_time().map(str::to_string),
        category: view.category().map(|c| c.value),
        setting: view.setting().map(|c| c.value),
        language: view.language().map(str::to_string),
        territory: view.territory().map(str::to_string),
        composer_name: view.composer_name().map(str::to_string),
        template_id: view.template_id().map(str::to_string),
        ..Default::default()
    };

    let values = table.extract(|field| {
        view.entry(&field.archetype_name)?
            .element(&field.element_name)
    });
    record.apply_measurements(&values);
    note_missing(&record, table, &values);
    record
}

/// Build a record from one projection row, reading cells by column name.
pub fn record_from_projection(row: &Value, result: &ResultSet, table: &FieldTable) -> VitalsRecord {
    let Some(cells) = row.as_array() else {
        warn!("AQL projection row is not an array");
        return VitalsRecord::default();
    };
    let cell = |name: &str| projection_cell(cells, result, name);
    let text = |name: &str| cell(name).and_then(Value::as_str).map(str::to_string);

    let mut record = VitalsRecord {
        uid: cell("uid").and_then(Value::as_str).and_then(parse_uid),
        start_time: text("start_time"),
        category: text("category"),
        setting: text("setting"),
        language: text("language"),
        territory: text("territory"),
        composer_name: text("composer_name"),
        template_id: text("template_id"),
        ..Default::default()
    };

    let values = table.extract(|field| DataValue::from_json(cell(field.sign.column_name())?));
    record.apply_measurements(&values);
    note_missing(&record, table, &values);
    record
}

/// Build a record from a flat composition document.
pub fn record_from_flat(flat: &FlatComposition, table: &FieldTable) -> VitalsRecord {
    let key = |path: &str| table.root_key(path);
    let text = |keys: &[&str]| flat.first_text(keys).map(str::to_string);

    let mut record = VitalsRecord {
        uid: flat.uid().and_then(parse_uid),
        start_time: text(&[key("context/start_time").as_str()]),
        category: text(&[key("category|value").as_str()]),
        setting: text(&[key("context/setting|value").as_str()]),
        language: text(&[key("language|code").as_str(), "ctx/language"]),
        territory: text(&[key("territory|code").as_str(), "ctx/territory"]),
        composer_name: text(&[key("composer|name").as_str(), "ctx/composer_name"]),
        ..Default::default()
    };

    let values = table.extract(|field| {
        let path = table.flat_key(field);
        match field.shape {
            ValueShape::Quantity => flat.quantity(&path).map(DataValue::Quantity),
            ValueShape::Proportion => flat.proportion(&path).map(DataValue::Proportion),
        }
    });
    record.apply_measurements(&values);
    note_missing(&record, table, &values);
    record
}

fn projection_cell<'a>(cells: &'a [Value], result: &ResultSet, name: &str) -> Option<&'a Value> {
    let value = cells.get(result.column_index(name)?)?;
    (!value.is_null()).then_some(value)
}

fn parse_uid(raw: &str) -> Option<CompositionUid> {
    match CompositionUid::new(raw) {
        Ok(uid) => Some(uid),
        Err(e) => {
            warn!(uid = raw, error = %e, "ignoring unusable composition uid");
            None
        }
    }
}

fn note_missing(record: &VitalsRecord, table: &FieldTable, values: &Measurements) {
    let missing: Vec<VitalSign> = table
        .fields()
        .iter()
        .map(|f| f.sign)
        .filter(|sign| !values.contains_key(sign))
        .collect();
    if !missing.is_empty() {
        debug!(
            uid = record.uid.as_ref().map(CompositionUid::as_str).unwrap_or("<none>"),
            ?missing,
            "partial extraction"
        );
    }
}
