//! Rebuilding stores from declarative descriptors.
//!
//! A descriptor is a flat JSON object whose `subclass_name` field names the
//! backend; the remaining fields are that backend's configuration. The set
//! of backends is closed: [`VectorDbDescriptor`] has one variant per
//! backend and unknown names are rejected before any field is parsed.

use kbstore_core::{KbError, VectorDb};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::basic::{BasicVectorDb, BasicVectorDbConfig, BASIC_VECTOR_DB};

/// Field holding the backend name.
pub const DISCRIMINATOR: &str = "subclass_name";

/// Every backend name [`from_descriptor`] accepts.
pub const KNOWN_BACKENDS: &[&str] = &[BASIC_VECTOR_DB];

/// Parsed descriptor, one variant per backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subclass_name")]
pub enum VectorDbDescriptor {
    #[serde(rename = "BasicVectorDB")]
    Basic(BasicVectorDbConfig),
}

impl VectorDbDescriptor {
    /// Parse a raw descriptor, failing with [`KbError::Config`] when the
    /// discriminator is missing or names an unknown backend.
    pub fn from_value(value: Value) -> Result<Self, KbError> {
        let name = value
            .get(DISCRIMINATOR)
            .ok_or_else(|| {
                KbError::Config(format!("descriptor is missing the `{DISCRIMINATOR}` field"))
            })?
            .as_str()
            .ok_or_else(|| KbError::Config(format!("`{DISCRIMINATOR}` must be a string")))?
            .to_string();

        if !KNOWN_BACKENDS.contains(&name.as_str()) {
            return Err(KbError::Config(format!(
                "unknown vector store backend: {name} (known: {})",
                KNOWN_BACKENDS.join(", ")
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| KbError::Config(format!("invalid {name} descriptor: {e}")))
    }

    /// Backend name written in the discriminator.
    pub fn backend_name(&self) -> &'static str {
        match self {
            VectorDbDescriptor::Basic(_) => BASIC_VECTOR_DB,
        }
    }

    /// Construct the store this descriptor describes. No persisted content
    /// is read; call [`VectorDb::load`] for that.
    pub fn build(self) -> Result<Box<dyn VectorDb>, KbError> {
        match self {
            VectorDbDescriptor::Basic(config) => Ok(Box::new(BasicVectorDb::new(config)?)),
        }
    }
}

/// Rebuild a store from the output of [`VectorDb::to_descriptor`].
pub fn from_descriptor(descriptor: Value) -> Result<Box<dyn VectorDb>, KbError> {
    let parsed = VectorDbDescriptor::from_value(descriptor)?;
    tracing::debug!(backend = parsed.backend_name(), "building vector store from descriptor");
    parsed.build()
}
