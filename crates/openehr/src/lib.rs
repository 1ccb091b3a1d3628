//! openEHR wire/boundary support.
//!
//! This crate translates between the openEHR REST representations a clinical data repository
//! speaks and plain Rust values:
//! - canonical composition JSON (read through name-keyed views, [`rm_1_1_0::composition`])
//! - the flat web-template format used for writes ([`flat`])
//! - AQL requests and result sets ([`aql`])
//! - template listings and web templates ([`template`])
//!
//! Clinical meaning (what a "vitals record" is) lives in `clinic-core`. This crate handles wire
//! formats and standards alignment only, and performs no I/O.

pub mod aql;
pub mod data_types;
pub mod flat;
pub mod rm_1_1_0;
pub mod template;
pub mod terminology;
pub mod ucum;

pub use aql::{AqlQuery, Column, ResultSet};
pub use data_types::{ArchetypeId, DataValue, DvCodedText, DvProportion, DvQuantity};
pub use flat::FlatComposition;
pub use rm_1_1_0::composition::{CompositionView, EntryView};

/// Content type of flat (web template) composition bodies.
pub const FLAT_CONTENT_TYPE: &str = "application/openehr.wt.flat.schema+json";

/// Content type of web template documents.
pub const WEB_TEMPLATE_CONTENT_TYPE: &str = "application/openehr.wt+json";

/// Content type of canonical JSON and AQL bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors returned by the `openehr` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum OpenEhrError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid archetype id: {0}")]
    InvalidArchetypeId(String),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with an [`OpenEhrError`].
pub type OpenEhrResult<T> = Result<T, OpenEhrError>;
