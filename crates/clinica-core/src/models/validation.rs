//! Required-field validation and the typed-entity trait.

use std::str::FromStr;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use super::Collection;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// An entity of one of the store's collections, with the form it is
/// entered through.
pub trait ClinicEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    /// Raw form input, one string per field.
    type Form: Send;

    fn id(&self) -> Option<i64>;

    /// Check required fields and value ranges.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Map form input to the entity, then validate it.
    fn from_form(form: Self::Form) -> Result<Self, ValidationError>;

    /// Short human label for notifications.
    fn label(&self) -> String;
}

/// Collects missing required fields while a form is mapped.
#[derive(Debug, Default)]
pub(crate) struct FieldCheck {
    missing: Vec<&'static str>,
}

impl FieldCheck {
    pub(crate) fn text(&mut self, field: &'static str, value: &str) -> String {
        let value = value.trim();
        if value.is_empty() {
            self.missing.push(field);
        }
        value.to_string()
    }

    pub(crate) fn parse<T: FromStr + Default>(
        &mut self,
        field: &'static str,
        value: &str,
    ) -> Result<T, ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            self.missing.push(field);
            return Ok(T::default());
        }
        parse_field(field, value)
    }

    pub(crate) fn finish(self) -> Result<(), ValidationError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(self.missing))
        }
    }
}

pub(crate) fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn optional_parse<T: FromStr>(field: &'static str, value: &str) -> Result<Option<T>, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Ok(None)
    } else {
        parse_field(field, value).map(Some)
    }
}

pub(crate) fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidField {
        field,
        reason: format!("'{}' is not valid", value),
    })
}

/// Fails with `MissingFields` listing every blank field.
pub(crate) fn require_all(fields: &[(&'static str, bool)]) -> Result<(), ValidationError> {
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingFields(missing))
    }
}
