use std::collections::HashMap;

use serde::Serialize;

use crate::properties::PropertyValue;

/// A named occurrence with a property bag, the unit of export.
///
/// Immutable once constructed; owned by the event buffer until its export
/// attempt succeeds or the batch is classified as non-retryable.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "event")]
    pub name: String,
    pub properties: HashMap<String, PropertyValue>,
}

impl Event {
    pub fn new(name: impl Into<String>, properties: HashMap<String, PropertyValue>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }
}
