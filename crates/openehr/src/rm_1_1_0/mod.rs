//! openEHR Reference Model (RM) 1.1.0 wire support.
//!
//! This module implements RM 1.1.0 specific views and wire structs for the REST
//! representations the clinic consumes.

pub mod composition;
pub mod ehr;
