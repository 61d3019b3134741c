//! Source objects decoded from a STIX 2.0 bundle.
//!
//! [`SourceKind`] is closed over the kinds the translator understands, with an
//! explicit [`SourceKind::Unsupported`] arm instead of a catch-all.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::observable::ObservableSubObject;

// ---------------------------------------------------------------------------
// ClassificationHint
// ---------------------------------------------------------------------------

/// Marker label set on objects exported from a MISP object (not an attribute).
pub const FROM_OBJECT_LABEL: &str = "from_object";

/// The exporter's two-label convention, kept raw.
///
/// `type_label` is normally `misp:type="<type>"`; `qualifier_label` is
/// `misp:category="<category>"`, `misp:to_ids="<bool>"`, or for galaxies the
/// cluster tag. Parsing (and rejecting) the labels is the dispatcher's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationHint {
    pub type_label: String,
    pub qualifier_label: String,
    pub from_object: bool,
}

impl ClassificationHint {
    /// Build a hint from an object's `labels`. `None` when there are none.
    ///
    /// A missing second label is kept as an empty string so that the
    /// dispatcher fails closed on it.
    #[must_use]
    pub fn from_labels(labels: &[String]) -> Option<Self> {
        let type_label = labels.first()?.clone();
        Some(Self {
            type_label,
            qualifier_label: labels.get(1).cloned().unwrap_or_default(),
            from_object: labels.iter().any(|l| l == FROM_OBJECT_LABEL),
        })
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Indicator {
    pub name: Option<String>,
    pub pattern: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObservedData {
    pub first_observed: Option<DateTime<Utc>>,
    pub objects: BTreeMap<String, ObservableSubObject>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Vulnerability {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CourseOfAction {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExternalReference {
    pub source_name: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Report {
    pub name: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub external_references: Vec<ExternalReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Relationship {
    pub relationship_type: Option<String>,
    pub source_ref: Option<String>,
    pub target_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KillChainPhase {
    pub kill_chain_name: Option<String>,
    pub phase_name: Option<String>,
}

/// SDO types that become galaxy clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GalaxyKind {
    AttackPattern,
    IntrusionSet,
    Malware,
    ThreatActor,
    Tool,
}

impl GalaxyKind {
    #[must_use]
    pub fn from_stix_type(stix_type: &str) -> Option<Self> {
        match stix_type {
            "attack-pattern" => Some(Self::AttackPattern),
            "intrusion-set" => Some(Self::IntrusionSet),
            "malware" => Some(Self::Malware),
            "threat-actor" => Some(Self::ThreatActor),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }

    #[must_use]
    pub const fn stix_type(self) -> &'static str {
        match self {
            Self::AttackPattern => "attack-pattern",
            Self::IntrusionSet => "intrusion-set",
            Self::Malware => "malware",
            Self::ThreatActor => "threat-actor",
            Self::Tool => "tool",
        }
    }

    /// Galaxy name used for clusters from bundles with no hints.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::AttackPattern => "Attack Pattern",
            Self::IntrusionSet => "Intrusion Set",
            Self::Malware => "Malware",
            Self::ThreatActor => "Threat Actor",
            Self::Tool => "Tool",
        }
    }
}

impl fmt::Display for GalaxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stix_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalaxyObject {
    pub kind: GalaxyKind,
    pub name: Option<String>,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub kill_chain_phases: Vec<KillChainPhase>,
}

/// Properties shared by every galaxy SDO; the kind comes from the type tag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GalaxyProperties {
    pub name: Option<String>,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub kill_chain_phases: Vec<KillChainPhase>,
}

impl GalaxyObject {
    #[must_use]
    pub fn new(kind: GalaxyKind, props: GalaxyProperties) -> Self {
        Self {
            kind,
            name: props.name,
            description: props.description,
            aliases: props.aliases,
            kill_chain_phases: props.kill_chain_phases,
        }
    }
}

/// `x-misp-object-<name>` custom objects written by the exporter.
///
/// Single attributes carry `x_misp_value`; whole objects carry
/// `x_misp_values`, keyed `<attribute type>_<relation>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CustomObject {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "x_misp_value")]
    pub value: Option<String>,
    #[serde(rename = "x_misp_values")]
    pub values: BTreeMap<String, String>,
    #[serde(rename = "x_misp_timestamp")]
    pub timestamp: Option<String>,
    #[serde(rename = "x_misp_category", alias = "category")]
    pub category: Option<String>,
    #[serde(rename = "x_misp_comment")]
    pub comment: Option<String>,
}

/// Prefix of custom object type tags.
pub const CUSTOM_OBJECT_PREFIX: &str = "x-misp-object-";

impl CustomObject {
    /// Name after the `x-misp-object-` prefix.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.type_name
            .strip_prefix(CUSTOM_OBJECT_PREFIX)
            .unwrap_or(&self.type_name)
    }
}

// ---------------------------------------------------------------------------
// SourceObject
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Indicator(Indicator),
    ObservedData(ObservedData),
    Vulnerability(Vulnerability),
    CourseOfAction(CourseOfAction),
    Report(Report),
    Identity(Identity),
    Galaxy(GalaxyObject),
    Custom(CustomObject),
    Relationship(Relationship),
    /// Unknown type tag, or a known one whose properties failed to decode.
    Unsupported {
        type_name: String,
        reason: Option<String>,
    },
}

impl SourceKind {
    /// STIX type tag.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Indicator(_) => "indicator",
            Self::ObservedData(_) => "observed-data",
            Self::Vulnerability(_) => "vulnerability",
            Self::CourseOfAction(_) => "course-of-action",
            Self::Report(_) => "report",
            Self::Identity(_) => "identity",
            Self::Galaxy(galaxy) => galaxy.kind.stix_type(),
            Self::Custom(custom) => &custom.type_name,
            Self::Relationship(_) => "relationship",
            Self::Unsupported { type_name, .. } => type_name,
        }
    }
}

/// One top-level bundle object.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceObject {
    pub id: String,
    pub hint: Option<ClassificationHint>,
    pub kind: SourceKind,
}

impl SourceObject {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            hint: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: ClassificationHint) -> Self {
        self.hint = Some(hint);
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}
