//! Classification of source objects.
//!
//! Bundles written by the MISP exporter label every object with
//! `misp:type="<type>"` plus a qualifier (`misp:category="<category>"` or
//! `misp:to_ids="<True|False>"`, or the cluster tag for galaxies). When a
//! hint is present it decides the outcome and nothing is inferred; a hint
//! that does not follow the convention fails the object closed. Without a
//! hint the STIX kind alone decides.

use stm_core::errors::TranslationError;
use stm_core::mapping::ObjectCategory;
use stm_core::source::{ClassificationHint, CustomObject, SourceKind, SourceObject};
use stm_pattern::CompositeGroup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeHint {
    pub attribute_type: String,
    pub category: Option<String>,
    /// Detection flag from a `misp:to_ids` qualifier; `None` keeps the
    /// configured default.
    pub to_ids: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHint {
    pub category: ObjectCategory,
    pub meta_category: Option<String>,
    pub to_ids: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalaxyHint {
    pub galaxy_type: String,
    pub tag: String,
    /// Cluster value read out of the tag.
    pub value: String,
}

/// What to build from one source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// One standalone attribute of the hinted type.
    Attribute(AttributeHint),
    /// One object using the category's field table.
    Object(ObjectHint),
    /// An `x-misp-object-*` object built from its `x_misp_values`.
    CustomObject,
    /// A galaxy cluster, hinted or read from the native SDO.
    GalaxyCluster(Option<GalaxyHint>),
    CourseOfAction,
    /// Un-hinted indicator: a `stix2-pattern` object plus the attributes the
    /// pattern spells out directly.
    PatternObject,
    /// Un-hinted observed data: one object or attribute per graph root.
    ObservableRoots,
    /// Un-hinted vulnerability attribute.
    Vulnerability,
    /// Report or identity; consumed before the object loop.
    Metadata,
    Skip(TranslationError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn classify(&self, object: &SourceObject) -> Decision {
        let hint = object.hint.as_ref();
        match &object.kind {
            SourceKind::Report(_) | SourceKind::Identity(_) => Decision::Metadata,
            SourceKind::CourseOfAction(_) => Decision::CourseOfAction,
            SourceKind::Indicator(_) => match hint {
                Some(hint) => classify_hinted(hint),
                None => Decision::PatternObject,
            },
            SourceKind::ObservedData(_) => match hint {
                Some(hint) => classify_hinted(hint),
                None => Decision::ObservableRoots,
            },
            SourceKind::Vulnerability(_) => match hint {
                Some(hint) => attribute_hint(hint).map_or_else(Decision::Skip, Decision::Attribute),
                None => Decision::Vulnerability,
            },
            SourceKind::Galaxy(_) => match hint {
                Some(hint) => galaxy_hint(hint)
                    .map_or_else(Decision::Skip, |h| Decision::GalaxyCluster(Some(h))),
                None => Decision::GalaxyCluster(None),
            },
            SourceKind::Custom(custom) => classify_custom(custom, hint),
            SourceKind::Relationship(_) => {
                Decision::Skip(TranslationError::UnsupportedObject("relationship".to_string()))
            }
            SourceKind::Unsupported { type_name, reason } => {
                let detail = match reason {
                    Some(reason) => format!("{type_name} ({reason})"),
                    None => type_name.clone(),
                };
                Decision::Skip(TranslationError::UnsupportedObject(detail))
            }
        }
    }
}

fn classify_hinted(hint: &ClassificationHint) -> Decision {
    if !hint.from_object {
        return attribute_hint(hint).map_or_else(Decision::Skip, Decision::Attribute);
    }
    object_hint(hint).map_or_else(Decision::Skip, Decision::Object)
}

fn classify_custom(custom: &CustomObject, hint: Option<&ClassificationHint>) -> Decision {
    let carries_values = !custom.values.is_empty();
    match hint {
        Some(hint) => {
            if let Err(err) = type_label(hint) {
                return Decision::Skip(err);
            }
            if hint.from_object {
                return Decision::CustomObject;
            }
            if custom.value.is_none() && carries_values {
                return Decision::Skip(TranslationError::MalformedHint(format!(
                    "{} carries several values but is not marked from_object",
                    custom.type_name
                )));
            }
            // The hint category wins over the object's own `category`.
            let (category, to_ids) = match qualifier(hint) {
                Ok(Qualifier::Category(category)) => (Some(category), None),
                Ok(Qualifier::ToIds(flag)) => (custom.category.clone(), Some(flag)),
                Err(err) => return Decision::Skip(err),
            };
            Decision::Attribute(AttributeHint {
                attribute_type: custom_attribute_type(custom.short_name()),
                category,
                to_ids,
            })
        }
        None if carries_values && custom.value.is_none() => Decision::CustomObject,
        None if custom.value.is_some() => Decision::Attribute(AttributeHint {
            attribute_type: custom_attribute_type(custom.short_name()),
            category: custom.category.clone(),
            to_ids: None,
        }),
        None => Decision::Skip(TranslationError::EmptyObject(custom.type_name.clone())),
    }
}

// ---------------------------------------------------------------------------
// Label parsing
// ---------------------------------------------------------------------------

enum Qualifier {
    Category(String),
    ToIds(bool),
}

/// Value of a `misp:<key>="<value>"` label.
fn label_value<'l>(label: &'l str, key: &str) -> Option<&'l str> {
    let quoted = label
        .strip_prefix("misp:")?
        .strip_prefix(key)?
        .strip_prefix('=')?;
    let value = quoted.strip_prefix('"')?.strip_suffix('"')?;
    (!value.is_empty()).then_some(value)
}

fn type_label(hint: &ClassificationHint) -> Result<&str, TranslationError> {
    label_value(&hint.type_label, "type").ok_or_else(|| {
        TranslationError::MalformedHint(format!("bad type label '{}'", hint.type_label))
    })
}

fn qualifier(hint: &ClassificationHint) -> Result<Qualifier, TranslationError> {
    let label = hint.qualifier_label.as_str();
    if let Some(category) = label_value(label, "category") {
        return Ok(Qualifier::Category(category.to_string()));
    }
    match label_value(label, "to_ids") {
        Some(flag) if flag.eq_ignore_ascii_case("true") => Ok(Qualifier::ToIds(true)),
        Some(flag) if flag.eq_ignore_ascii_case("false") => Ok(Qualifier::ToIds(false)),
        _ => Err(TranslationError::MalformedHint(format!(
            "bad qualifier label '{label}'"
        ))),
    }
}

fn attribute_hint(hint: &ClassificationHint) -> Result<AttributeHint, TranslationError> {
    let attribute_type = type_label(hint)?.to_string();
    Ok(match qualifier(hint)? {
        Qualifier::Category(category) => AttributeHint {
            attribute_type,
            category: Some(category),
            to_ids: None,
        },
        Qualifier::ToIds(flag) => AttributeHint {
            attribute_type,
            category: None,
            to_ids: Some(flag),
        },
    })
}

fn object_hint(hint: &ClassificationHint) -> Result<ObjectHint, TranslationError> {
    let name = type_label(hint)?;
    let (meta_category, to_ids) = match qualifier(hint)? {
        Qualifier::Category(category) => (Some(category), None),
        Qualifier::ToIds(flag) => (None, Some(flag)),
    };
    let category = ObjectCategory::from_hint_type(name).ok_or_else(|| {
        TranslationError::UnsupportedObject(format!("object template '{name}' has no field table"))
    })?;
    Ok(ObjectHint {
        category,
        meta_category,
        to_ids,
    })
}

fn galaxy_hint(hint: &ClassificationHint) -> Result<GalaxyHint, TranslationError> {
    let galaxy_type = type_label(hint)?.to_string();
    let tag = hint.qualifier_label.trim();
    let value = tag
        .split_once('=')
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TranslationError::MalformedHint(format!("bad galaxy tag '{tag}'")))?;
    Ok(GalaxyHint {
        galaxy_type,
        tag: tag.to_string(),
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Custom attribute types
// ---------------------------------------------------------------------------

fn is_known_composite(attribute_type: &str) -> bool {
    CompositeGroup::for_attribute_type(attribute_type).is_some()
}

/// Attribute type of a custom single-value object.
///
/// The exporter writes `|` as `-` in type tags, so `regkey-value` is read
/// back as `regkey|value`. Only a single `-` is restored, and only when the
/// result is a known composite type; anything else is kept as written.
#[must_use]
pub fn custom_attribute_type(short_name: &str) -> String {
    short_name
        .match_indices('-')
        .map(|(position, _)| {
            let mut candidate = short_name.to_string();
            candidate.replace_range(position..=position, "|");
            candidate
        })
        .find(|candidate| is_known_composite(candidate))
        .unwrap_or_else(|| short_name.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use stm_core::source::{GalaxyKind, GalaxyObject, Indicator, ObservedData, Relationship};

    use super::*;

    fn hint(type_label: &str, qualifier: &str, from_object: bool) -> ClassificationHint {
        ClassificationHint {
            type_label: type_label.to_string(),
            qualifier_label: qualifier.to_string(),
            from_object,
        }
    }

    fn indicator() -> SourceKind {
        SourceKind::Indicator(Indicator {
            pattern: "[ipv4-addr:value = '1.2.3.4']".into(),
            ..Indicator::default()
        })
    }

    fn classify(object: &SourceObject) -> Decision {
        Dispatcher::new().classify(object)
    }

    #[test]
    fn hinted_attribute_with_category() {
        let object = SourceObject::new("indicator--1", indicator()).with_hint(hint(
            "misp:type=\"ip-src\"",
            "misp:category=\"Network activity\"",
            false,
        ));
        assert_eq!(
            classify(&object),
            Decision::Attribute(AttributeHint {
                attribute_type: "ip-src".into(),
                category: Some("Network activity".into()),
                to_ids: None,
            })
        );
    }

    #[test]
    fn hinted_attribute_with_detection_flag() {
        let object = SourceObject::new("indicator--1", indicator())
            .with_hint(hint("misp:type=\"ip-dst\"", "misp:to_ids=\"False\"", false));
        assert!(matches!(
            classify(&object),
            Decision::Attribute(AttributeHint { to_ids: Some(false), .. })
        ));
    }

    #[test]
    fn from_object_selects_object() {
        let object = SourceObject::new("observed-data--1", SourceKind::ObservedData(ObservedData::default()))
            .with_hint(hint("misp:type=\"WindowsPEBinaryFile\"", "misp:category=\"Payload delivery\"", true));
        assert_eq!(
            classify(&object),
            Decision::Object(ObjectHint {
                category: ObjectCategory::File,
                meta_category: Some("Payload delivery".into()),
                to_ids: None,
            })
        );
    }

    #[test]
    fn malformed_hints_fail_closed() {
        for (type_label, qualifier) in [
            ("ip-dst", "misp:category=\"Network activity\""),
            ("misp:type=\"\"", "misp:category=\"Network activity\""),
            ("misp:type=\"ip-dst\"", ""),
            ("misp:type=\"ip-dst\"", "misp:to_ids=\"maybe\""),
            ("misp:type=ip-dst", "misp:category=\"Network activity\""),
        ] {
            let object = SourceObject::new("indicator--1", indicator())
                .with_hint(hint(type_label, qualifier, false));
            assert!(
                matches!(classify(&object), Decision::Skip(TranslationError::MalformedHint(_))),
                "{type_label} / {qualifier} was accepted"
            );
        }
    }

    #[test]
    fn unknown_object_template_is_unsupported() {
        let object = SourceObject::new("indicator--1", indicator())
            .with_hint(hint("misp:type=\"yara\"", "misp:category=\"Payload installation\"", true));
        assert!(matches!(
            classify(&object),
            Decision::Skip(TranslationError::UnsupportedObject(_))
        ));
    }

    #[test]
    fn unhinted_kinds() {
        assert_eq!(classify(&SourceObject::new("i", indicator())), Decision::PatternObject);
        assert_eq!(
            classify(&SourceObject::new("o", SourceKind::ObservedData(ObservedData::default()))),
            Decision::ObservableRoots
        );
        assert!(matches!(
            classify(&SourceObject::new("r", SourceKind::Relationship(Relationship::default()))),
            Decision::Skip(TranslationError::UnsupportedObject(_))
        ));
        assert!(matches!(
            classify(&SourceObject::new(
                "g",
                SourceKind::Unsupported {
                    type_name: "grouping".into(),
                    reason: None
                }
            )),
            Decision::Skip(TranslationError::UnsupportedObject(detail)) if detail == "grouping"
        ));
    }

    #[test]
    fn galaxy_tag_yields_cluster_value() {
        let galaxy = SourceKind::Galaxy(GalaxyObject {
            kind: GalaxyKind::ThreatActor,
            name: Some("APT 29".into()),
            description: None,
            aliases: Vec::new(),
            kill_chain_phases: Vec::new(),
        });
        let object = SourceObject::new("threat-actor--1", galaxy.clone()).with_hint(hint(
            "misp:type=\"threat-actor\"",
            "misp-galaxy:threat-actor=\"APT 29\"",
            false,
        ));
        assert_eq!(
            classify(&object),
            Decision::GalaxyCluster(Some(GalaxyHint {
                galaxy_type: "threat-actor".into(),
                tag: "misp-galaxy:threat-actor=\"APT 29\"".into(),
                value: "APT 29".into(),
            }))
        );

        let bad = SourceObject::new("threat-actor--2", galaxy)
            .with_hint(hint("misp:type=\"threat-actor\"", "apt", false));
        assert!(matches!(classify(&bad), Decision::Skip(TranslationError::MalformedHint(_))));
    }

    #[test]
    fn custom_values_without_from_object_are_ambiguous() {
        let mut values = BTreeMap::new();
        values.insert("text_name".to_string(), "a".to_string());
        values.insert("text_note".to_string(), "b".to_string());
        let custom = SourceKind::Custom(CustomObject {
            type_name: "x-misp-object-thing".into(),
            values,
            ..CustomObject::default()
        });
        let object = SourceObject::new("x-misp-object-thing--1", custom)
            .with_hint(hint("misp:type=\"thing\"", "misp:category=\"Other\"", false));
        assert!(matches!(classify(&object), Decision::Skip(TranslationError::MalformedHint(_))));
    }

    #[test]
    fn custom_attribute_reads_detection_flag() {
        let custom = SourceKind::Custom(CustomObject {
            type_name: "x-misp-object-btc".into(),
            value: Some("1Abc".into()),
            category: Some("Financial fraud".into()),
            ..CustomObject::default()
        });
        let object = SourceObject::new("x-misp-object-btc--1", custom)
            .with_hint(hint("misp:type=\"btc\"", "misp:to_ids=\"True\"", false));
        assert_eq!(
            classify(&object),
            Decision::Attribute(AttributeHint {
                attribute_type: "btc".into(),
                category: Some("Financial fraud".into()),
                to_ids: Some(true),
            })
        );
    }

    #[test]
    fn custom_attribute_takes_the_hinted_category() {
        let custom = SourceKind::Custom(CustomObject {
            type_name: "x-misp-object-iban".into(),
            value: Some("LU28 0019 4006 4475 0000".into()),
            category: Some("Other".into()),
            ..CustomObject::default()
        });
        let object = SourceObject::new("x-misp-object-iban--1", custom)
            .with_hint(hint("misp:type=\"iban\"", "misp:category=\"Financial fraud\"", false));
        assert_eq!(
            classify(&object),
            Decision::Attribute(AttributeHint {
                attribute_type: "iban".into(),
                category: Some("Financial fraud".into()),
                to_ids: None,
            })
        );
    }

    #[test]
    fn custom_type_restores_composite_separator() {
        assert_eq!(custom_attribute_type("regkey-value"), "regkey|value");
        assert_eq!(custom_attribute_type("ip-dst-port"), "ip-dst|port");
        assert_eq!(custom_attribute_type("filename-sha256"), "filename|sha256");
        assert_eq!(custom_attribute_type("filename-impfuzzy"), "filename|impfuzzy");
        assert_eq!(custom_attribute_type("filename-pehash"), "filename|pehash");
        assert_eq!(custom_attribute_type("github-username"), "github-username");
        assert_eq!(custom_attribute_type("btc"), "btc");
    }
}
