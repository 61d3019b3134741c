//! Bundle ingestion: JSON text to typed [`SourceObject`]s.
//!
//! A bundle exported by MISP is recognised by a report carrying the origin
//! label (by default `misp:tool="misp2stix2"`). Only in such bundles do object
//! labels become [`ClassificationHint`]s; labels in third-party bundles are
//! free-form and never steer classification.
//!
//! Individual objects that fail to decode do not fail ingestion: they become
//! [`SourceKind::Unsupported`] with the decode error as the reason.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::TranslationError;
use crate::source::{
    ClassificationHint, CUSTOM_OBJECT_PREFIX, GalaxyKind, GalaxyObject, GalaxyProperties,
    SourceKind, SourceObject,
};

/// Label marking a bundle produced by the MISP exporter.
pub const DEFAULT_ORIGIN_LABEL: &str = "misp:tool=\"misp2stix2\"";

/// A decoded bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub spec_version: Option<String>,
    /// Whether the bundle was produced by the MISP exporter.
    pub from_misp: bool,
    pub objects: Vec<SourceObject>,
}

impl Bundle {
    /// Decode a bundle from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError::UnreadableInput`] when the text is not JSON
    /// or has no `objects` array.
    pub fn parse(text: &str, origin_label: &str) -> Result<Self, TranslationError> {
        let root: Value = serde_json::from_str(text)
            .map_err(|e| TranslationError::UnreadableInput(e.to_string()))?;
        Self::from_value(&root, origin_label)
    }

    /// Decode a bundle from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError::UnreadableInput`] when there is no
    /// `objects` array.
    pub fn from_value(root: &Value, origin_label: &str) -> Result<Self, TranslationError> {
        let raw_objects = root
            .get("objects")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                TranslationError::UnreadableInput("bundle has no 'objects' array".to_string())
            })?;

        let from_misp = raw_objects.iter().any(|o| is_origin_report(o, origin_label));

        let objects = raw_objects
            .iter()
            .map(|raw| decode_object(raw, from_misp))
            .collect();

        Ok(Self {
            spec_version: root
                .get("spec_version")
                .and_then(Value::as_str)
                .map(str::to_string),
            from_misp,
            objects,
        })
    }
}

fn labels_of(raw: &Value) -> Vec<String> {
    raw.get("labels")
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_origin_report(raw: &Value, origin_label: &str) -> bool {
    raw.get("type").and_then(Value::as_str) == Some("report")
        && labels_of(raw).iter().any(|l| l == origin_label)
}

/// Decode one bundle entry; never fails.
#[must_use]
pub fn decode_object(raw: &Value, from_misp: bool) -> SourceObject {
    let type_name = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let kind = decode_kind(&type_name, raw).unwrap_or_else(|reason| SourceKind::Unsupported {
        type_name: type_name.clone(),
        reason: Some(reason),
    });

    let object = SourceObject::new(id, kind);
    if !from_misp {
        return object;
    }
    match ClassificationHint::from_labels(&labels_of(raw)) {
        Some(hint) => object.with_hint(hint),
        None => object,
    }
}

fn decode<T: DeserializeOwned>(raw: &Value) -> Result<T, String> {
    T::deserialize(raw).map_err(|e| e.to_string())
}

fn decode_kind(type_name: &str, raw: &Value) -> Result<SourceKind, String> {
    if let Some(kind) = GalaxyKind::from_stix_type(type_name) {
        let props: GalaxyProperties = decode(raw)?;
        return Ok(SourceKind::Galaxy(GalaxyObject::new(kind, props)));
    }
    if type_name.starts_with(CUSTOM_OBJECT_PREFIX) {
        return decode(raw).map(SourceKind::Custom);
    }

    match type_name {
        "indicator" => decode(raw).map(SourceKind::Indicator),
        "observed-data" => decode(raw).map(SourceKind::ObservedData),
        "vulnerability" => decode(raw).map(SourceKind::Vulnerability),
        "course-of-action" => decode(raw).map(SourceKind::CourseOfAction),
        "report" => decode(raw).map(SourceKind::Report),
        "identity" => decode(raw).map(SourceKind::Identity),
        "relationship" => decode(raw).map(SourceKind::Relationship),
        other => Ok(SourceKind::Unsupported {
            type_name: other.to_string(),
            reason: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn misp_bundle() -> Value {
        json!({
            "type": "bundle",
            "spec_version": "2.0",
            "objects": [
                {"type": "identity", "id": "identity--1", "name": "CIRCL"},
                {
                    "type": "report",
                    "id": "report--1",
                    "name": "Event",
                    "labels": ["misp:tool=\"misp2stix2\""]
                },
                {
                    "type": "indicator",
                    "id": "indicator--1",
                    "pattern": "[ipv4-addr:value = '1.2.3.4']",
                    "valid_from": "2018-01-01T00:00:00Z",
                    "labels": ["misp:type=\"ip-dst\"", "misp:category=\"Network activity\""]
                }
            ]
        })
    }

    #[test]
    fn detects_misp_origin_and_attaches_hints() {
        let bundle = Bundle::from_value(&misp_bundle(), DEFAULT_ORIGIN_LABEL).unwrap();
        assert!(bundle.from_misp);
        assert_eq!(bundle.spec_version.as_deref(), Some("2.0"));
        assert_eq!(bundle.objects.len(), 3);

        let indicator = &bundle.objects[2];
        assert_eq!(indicator.type_name(), "indicator");
        assert_eq!(
            indicator.hint.as_ref().map(|h| h.type_label.as_str()),
            Some("misp:type=\"ip-dst\"")
        );
        assert!(bundle.objects[0].hint.is_none());
    }

    #[test]
    fn third_party_labels_are_not_hints() {
        let root = json!({
            "type": "bundle",
            "objects": [{
                "type": "indicator",
                "id": "indicator--2",
                "pattern": "[url:value = 'http://x']",
                "labels": ["malicious-activity"]
            }]
        });
        let bundle = Bundle::from_value(&root, DEFAULT_ORIGIN_LABEL).unwrap();
        assert!(!bundle.from_misp);
        assert!(bundle.objects[0].hint.is_none());
    }

    #[test]
    fn malformed_object_becomes_unsupported() {
        let root = json!({
            "objects": [{"type": "indicator", "id": "indicator--3", "pattern": 42}]
        });
        let bundle = Bundle::from_value(&root, DEFAULT_ORIGIN_LABEL).unwrap();
        match &bundle.objects[0].kind {
            SourceKind::Unsupported { type_name, reason } => {
                assert_eq!(type_name, "indicator");
                assert!(reason.is_some());
            }
            other => panic!("expected unsupported, got {other:?}"),
        }
    }

    #[test]
    fn galaxy_and_custom_types_decode() {
        let root = json!({
            "objects": [
                {"type": "malware", "id": "malware--1", "name": "Agent.BTZ", "aliases": ["ComRAT"]},
                {"type": "x-misp-object-btc", "id": "x-misp-object-btc--1", "x_misp_value": "1Abc"},
                {"type": "grouping", "id": "grouping--1"}
            ]
        });
        let bundle = Bundle::from_value(&root, DEFAULT_ORIGIN_LABEL).unwrap();
        assert!(matches!(&bundle.objects[0].kind, SourceKind::Galaxy(g) if g.aliases == ["ComRAT"]));
        assert!(
            matches!(&bundle.objects[1].kind, SourceKind::Custom(c) if c.value.as_deref() == Some("1Abc"))
        );
        assert!(matches!(
            &bundle.objects[2].kind,
            SourceKind::Unsupported { type_name, reason: None } if type_name == "grouping"
        ));
    }

    #[test]
    fn rejects_non_json_and_missing_objects() {
        assert!(matches!(
            Bundle::parse("not json", DEFAULT_ORIGIN_LABEL),
            Err(TranslationError::UnreadableInput(_))
        ));
        assert!(matches!(
            Bundle::parse("{\"type\": \"bundle\"}", DEFAULT_ORIGIN_LABEL),
            Err(TranslationError::UnreadableInput(_))
        ));
    }
}
