//! Service records as stored in the registry and served to callers.

use serde::{Deserialize, Serialize};

/// A registered service: the identifier callers resolve, plus where to reach it.
///
/// Field names on the wire follow the registry's historical document layout
/// (`id`, `ServiceName`, `ServiceAddress`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    #[serde(rename = "ServiceName", alias = "name")]
    pub name: String,
    #[serde(rename = "ServiceAddress", alias = "address")]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    EmptyField(&'static str),
    InvalidIdentifier(String),
    InvalidAddress(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::EmptyField(field) => write!(f, "{} must not be empty", field),
            RecordError::InvalidIdentifier(id) => {
                write!(f, "identifier '{}' must not contain '/' or whitespace", id)
            }
            RecordError::InvalidAddress(addr) => {
                write!(f, "address '{}' must start with http:// or https://", addr)
            }
        }
    }
}

impl std::error::Error for RecordError {}

impl ServiceRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
        }
    }

    /// Check a record before it is written to the registry.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.is_empty() {
            return Err(RecordError::EmptyField("id"));
        }
        if self.id.contains('/') || self.id.chars().any(char::is_whitespace) {
            return Err(RecordError::InvalidIdentifier(self.id.clone()));
        }
        if self.name.is_empty() {
            return Err(RecordError::EmptyField("name"));
        }
        if self.address.is_empty() {
            return Err(RecordError::EmptyField("address"));
        }
        if !(self.address.starts_with("http://") || self.address.starts_with("https://")) {
            return Err(RecordError::InvalidAddress(self.address.clone()));
        }
        Ok(())
    }
}
