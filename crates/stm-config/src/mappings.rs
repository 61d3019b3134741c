//! User-supplied additions to the built-in field tables.
//!
//! ```toml
//! [mappings.objects.file]
//! "file:x_acme_path" = { type = "text", relation = "path" }
//!
//! [mappings.attributes]
//! "mutex:name" = "mutex"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stm_core::mapping::{FieldSpec, ObjectCategory};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingOverrides {
    /// Extra object field entries, keyed by category then qualified field key.
    #[serde(default)]
    pub objects: BTreeMap<ObjectCategory, BTreeMap<String, FieldSpec>>,

    /// Extra single-attribute entries: qualified field key to attribute type.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl MappingOverrides {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.values().all(BTreeMap::is_empty) && self.attributes.is_empty()
    }
}
