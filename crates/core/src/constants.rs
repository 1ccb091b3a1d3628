//! Constants used throughout the clinic core crate.
//!
//! Defaults for configuration live here so the binaries and the tests agree on them.

/// Default openEHR REST base URL (the EHRbase bootcamp server).
pub const DEFAULT_OPENEHR_BASE_URL: &str =
    "https://openehr-bootcamp.medblocks.com/ehrbase/rest/openehr/v1";

/// Default vitals template id.
pub const DEFAULT_VITALS_TEMPLATE_ID: &str = "jitendra.choudhary.vitals.v1";

/// Root node id of the default vitals web template; prefixes every flat path.
pub const DEFAULT_VITALS_FLAT_ROOT: &str = "vitals";

/// Default composer name written to `ctx/composer_name`.
pub const DEFAULT_COMPOSER_NAME: &str = "Clinic";

/// Default composition language (ISO 639-1).
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default composition territory (ISO 3166-1).
pub const DEFAULT_TERRITORY: &str = "IN";

/// Default composition category.
pub const DEFAULT_CATEGORY: &str = "event";

/// Default care setting.
pub const DEFAULT_SETTING: &str = "other care";

/// Observation names of the default vitals template.
pub const BLOOD_PRESSURE: &str = "Blood pressure";
pub const PULSE: &str = "Pulse";
pub const PULSE_OXIMETRY: &str = "Pulse oximetry";
pub const BODY_WEIGHT: &str = "Body weight";
pub const HEIGHT: &str = "Height";

/// Environment variables read by the binaries at start-up.
pub const ENV_OPENEHR_BASE_URL: &str = "OPENEHR_BASE_URL";
pub const ENV_VITALS_TEMPLATE_ID: &str = "VITALS_TEMPLATE_ID";
pub const ENV_OPENEHR_TIMEOUT_SECS: &str = "OPENEHR_TIMEOUT_SECS";
pub const ENV_OPENEHR_USERNAME: &str = "OPENEHR_USERNAME";
pub const ENV_OPENEHR_PASSWORD: &str = "OPENEHR_PASSWORD";
pub const ENV_VITALS_CACHE_READS: &str = "VITALS_CACHE_READS";
pub const ENV_VITALS_QUERY_SHAPE: &str = "VITALS_QUERY_SHAPE";
pub const ENV_CLINIC_TEMPLATE_DIR: &str = "CLINIC_TEMPLATE_DIR";
pub const ENV_CLINIC_COMPOSER_NAME: &str = "CLINIC_COMPOSER_NAME";
pub const ENV_CLINIC_LANGUAGE: &str = "CLINIC_LANGUAGE";
pub const ENV_CLINIC_TERRITORY: &str = "CLINIC_TERRITORY";
