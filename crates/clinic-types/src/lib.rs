//! Validated primitive types shared by the clinic crates.
//!
//! Identifiers issued by the clinical data repository travel through URLs, AQL query parameters
//! and flat composition keys. Wrapping them in newtypes that validate on construction means a
//! value that reaches the wire has already been checked once, at the boundary where it entered
//! the process.

mod ids;

pub use ids::{CompositionUid, EhrId, IdError, TemplateId};
