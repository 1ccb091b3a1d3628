//! openEHR terminology codes for composition categories and care settings.
//!
//! Flat submissions of `DV_CODED_TEXT` fields need the `openehr` terminology code alongside the
//! display value. Lookups are by display value, case-insensitive.

/// Terminology id for the openEHR support terminology.
pub const OPENEHR_TERMINOLOGY: &str = "openehr";

const CATEGORIES: &[(&str, &str)] = &[
    ("persistent", "431"),
    ("event", "433"),
    ("episodic", "451"),
];

const SETTINGS: &[(&str, &str)] = &[
    ("home", "225"),
    ("emergency care", "227"),
    ("primary medical care", "228"),
    ("primary nursing care", "229"),
    ("primary allied health care", "230"),
    ("midwifery care", "231"),
    ("secondary medical care", "232"),
    ("secondary nursing care", "233"),
    ("secondary allied health care", "234"),
    ("complementary health care", "235"),
    ("dental care", "236"),
    ("nursing home care", "237"),
    ("other care", "238"),
];

fn lookup(table: &'static [(&'static str, &'static str)], value: &str) -> Option<&'static str> {
    let value = value.trim();
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, code)| *code)
}

/// Code for a composition category display value (for example `event` → `433`).
pub fn category_code(value: &str) -> Option<&'static str> {
    lookup(CATEGORIES, value)
}

/// Code for a care setting display value (for example `other care` → `238`).
pub fn setting_code(value: &str) -> Option<&'static str> {
    lookup(SETTINGS, value)
}
