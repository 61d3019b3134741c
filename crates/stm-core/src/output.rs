//! MISP-shaped output model.
//!
//! Serialized field names follow the MISP event JSON layout (`Attribute`,
//! `Object`, `ObjectReference`, `meta-category`, ...). The event is built by
//! exactly one writer during a run and handed off by value afterwards.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relationship kind of a child → parent containment edge.
pub const INCLUDED_IN: &str = "included-in";

// ---------------------------------------------------------------------------
// OutputAttribute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutputAttribute {
    #[serde(rename = "type")]
    pub attribute_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub value: String,
    pub to_ids: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(
        rename = "object_relation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub relation: Option<String>,
    /// Base64 content of an attachment or malware sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl OutputAttribute {
    /// Create an attribute. Returns `None` for an empty value, so an empty
    /// attribute can never be constructed through this path.
    #[must_use]
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return None;
        }
        Some(Self {
            attribute_type: attribute_type.into(),
            category: None,
            value,
            to_ids: false,
            timestamp: None,
            comment: None,
            relation: None,
            data: None,
        })
    }

    #[must_use]
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    #[must_use]
    pub const fn with_to_ids(mut self, to_ids: bool) -> Self {
        self.to_ids = to_ids;
        self
    }

    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

// ---------------------------------------------------------------------------
// OutputObject
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectReference {
    pub referenced_uuid: Uuid,
    pub relationship_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutputObject {
    pub name: String,
    #[serde(
        rename = "meta-category",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub meta_category: Option<String>,
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<OutputAttribute>,
    #[serde(rename = "ObjectReference", default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ObjectReference>,
}

impl OutputObject {
    #[must_use]
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            meta_category: None,
            uuid,
            timestamp: None,
            attributes: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn add_reference(&mut self, target: Uuid, relationship_type: impl Into<String>) {
        self.references.push(ObjectReference {
            referenced_uuid: target,
            relationship_type: relationship_type.into(),
        });
    }

    /// Attributes with the given relation, in order.
    pub fn attributes_with_relation<'a>(
        &'a self,
        relation: &'a str,
    ) -> impl Iterator<Item = &'a OutputAttribute> + 'a {
        self.attributes
            .iter()
            .filter(move |a| a.relation.as_deref() == Some(relation))
    }
}

// ---------------------------------------------------------------------------
// Galaxies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GalaxyCluster {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Galaxy {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub galaxy_type: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "GalaxyCluster")]
    pub clusters: Vec<GalaxyCluster>,
}

// ---------------------------------------------------------------------------
// OutputEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Org {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutputEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_timestamp: Option<i64>,
    #[serde(rename = "Org", default, skip_serializing_if = "Option::is_none")]
    pub org: Option<Org>,
    #[serde(rename = "Tag", default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<OutputAttribute>,
    #[serde(rename = "Object", default)]
    pub objects: Vec<OutputObject>,
    #[serde(rename = "Galaxy", default)]
    pub galaxies: Vec<Galaxy>,
}

impl OutputEvent {
    /// True when nothing translatable was appended (metadata aside).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.objects.is_empty() && self.galaxies.is_empty()
    }

    pub fn add_tag(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.tags.iter().any(|t| t.name == name) {
            self.tags.push(Tag { name });
        }
    }

    #[must_use]
    pub fn object(&self, uuid: Uuid) -> Option<&OutputObject> {
        self.objects.iter().find(|o| o.uuid == uuid)
    }

    /// Objects with the given name, in order of insertion.
    pub fn objects_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a OutputObject> + 'a {
        self.objects.iter().filter(move |o| o.name == name)
    }

    /// Serialize as a MISP event document (`{"Event": {...}}`).
    ///
    /// # Errors
    ///
    /// Returns the serializer error; the model has no non-string map keys so
    /// this only fails on writer errors.
    pub fn to_document_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&EventDocument { event: self })
    }
}

/// Top-level wrapper of a serialized event.
#[derive(Debug, Serialize)]
pub struct EventDocument<'a> {
    #[serde(rename = "Event")]
    pub event: &'a OutputEvent,
}
