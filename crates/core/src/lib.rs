//! # Clinic Core
//!
//! Vitals data layer of the clinic backend, on top of an openEHR clinical data repository.
//!
//! - Saving, updating and deleting vitals recordings as flat compositions
//! - Reading a patient's vitals history back through AQL and normalising every result shape
//!   into [`VitalsRecord`]s
//! - Template discovery, merging local web templates with the repository's listing
//!
//! **No API concerns**: HTTP routing and the command line belong in `api-rest` and `cli`.
//! Everything here talks to the repository through the [`Transport`] trait.

pub mod cache;
pub mod config;
pub mod constants;
pub mod ehr;
pub mod error;
pub mod fields;
pub mod history;
pub mod normalizer;
pub mod query;
pub mod reader;
pub mod record;
pub mod service;
pub mod templates;
pub mod transport;
pub mod writer;

pub use config::{CompositionDefaults, CoreConfig, Credentials};
pub use ehr::EhrSummary;
pub use error::{Operation, VitalsError, VitalsResult};
pub use fields::{FieldTable, VitalSign};
pub use history::ChartPoint;
pub use query::QueryShape;
pub use record::{BloodPressure, Pulse, Quantity, Spo2, VitalsRecord};
pub use service::VitalsService;
pub use templates::{TemplateRegistry, TemplateSource, TemplateSummary};
pub use transport::{
    cancel_pair, CallOptions, CancelHandle, CancelSignal, HttpTransport, RepositoryRequest,
    RepositoryResponse, Transport,
};
