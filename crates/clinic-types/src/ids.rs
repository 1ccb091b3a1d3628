//! Repository identifiers.
//!
//! - [`EhrId`]: per-patient EHR identifier issued by the repository when the patient is
//!   registered.
//! - [`TemplateId`]: operational template identifier (for example
//!   `jitendra.choudhary.vitals.v1`).
//! - [`CompositionUid`]: version uid of a stored composition, in the openEHR
//!   `<object_id>::<creating_system_id>::<version>` form.
//!
//! Each type restricts its character set so that values are safe to place in URL path segments
//! and AQL query parameters. None of them accept quotes, `$`, `/` or control characters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MAX_EHR_ID_LEN: usize = 128;
const MAX_TEMPLATE_ID_LEN: usize = 256;
const MAX_UID_LEN: usize = 512;

/// Errors raised when an identifier fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    #[error("{kind} exceeds maximum length of {max} characters")]
    TooLong { kind: &'static str, max: usize },

    #[error("{kind} contains invalid character {found:?}")]
    InvalidCharacter { kind: &'static str, found: char },

    #[error("composition uid is malformed: {0}")]
    MalformedUid(String),
}

fn validate(
    kind: &'static str,
    raw: &str,
    max: usize,
    allowed: impl Fn(char) -> bool,
) -> Result<(), IdError> {
    if raw.trim().is_empty() {
        return Err(IdError::Empty { kind });
    }
    if raw.len() > max {
        return Err(IdError::TooLong { kind, max });
    }
    match raw.chars().find(|c| !allowed(*c)) {
        Some(found) => Err(IdError::InvalidCharacter { kind, found }),
        None => Ok(()),
    }
}

/// Per-patient EHR identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EhrId(String);

impl EhrId {
    /// Validates and wraps an EHR identifier.
    ///
    /// Accepted characters are ASCII alphanumerics, `-`, `_` and `.`, which covers UUIDs in
    /// either hyphenated or simple form.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if the value is empty, too long, or contains other characters.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        let raw = raw.as_ref().trim();
        validate("ehr_id", raw, MAX_EHR_ID_LEN, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
        })?;
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Operational template identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(String);

impl TemplateId {
    /// Validates and wraps a template identifier.
    ///
    /// Template ids published by modelling tools may contain spaces (`IDCR - Vital Signs.v1`),
    /// so a single interior space is allowed alongside ASCII alphanumerics, `-`, `_` and `.`.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if the value is empty, too long, or contains other characters.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        let raw = raw.as_ref().trim();
        validate("template_id", raw, MAX_TEMPLATE_ID_LEN, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
        })?;
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Version uid of a stored composition.
///
/// The repository returns uids as `<object_id>::<creating_system_id>::<version>`. A bare object
/// id (no `::` parts) is also accepted because some endpoints address the versioned object
/// rather than one of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositionUid(String);

impl CompositionUid {
    /// Validates and wraps a composition uid.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if the value is empty, too long, contains characters outside
    /// ASCII alphanumerics, `-`, `_`, `.` and `:`, or has a non-numeric version part.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        let raw = raw.as_ref().trim();
        validate("composition uid", raw, MAX_UID_LEN, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
        })?;

        let parts: Vec<&str> = raw.split("::").collect();
        match parts.as_slice() {
            [object_id] if !object_id.contains(':') => {}
            [object_id, system, version]
                if !object_id.is_empty()
                    && !system.is_empty()
                    && version.parse::<u32>().is_ok() => {}
            _ => return Err(IdError::MalformedUid(raw.to_owned())),
        }

        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The versioned object id (the part before the first `::`).
    pub fn versioned_object_id(&self) -> &str {
        self.0.split("::").next().unwrap_or(&self.0)
    }

    /// The version number, if this uid addresses a specific version.
    pub fn version(&self) -> Option<u32> {
        self.0.rsplit_once("::").and_then(|(_, v)| v.parse().ok())
    }
}

macro_rules! string_id_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $ty {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::new(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_id_impls!(EhrId);
string_id_impls!(TemplateId);
string_id_impls!(CompositionUid);
