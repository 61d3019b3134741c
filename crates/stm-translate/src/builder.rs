//! Assembly of output attributes, objects and galaxies.
//!
//! Both extraction paths end here as lists of [`FlatField`]s: pattern
//! clauses keyed by [`stm_pattern::FieldPath::key`] and walked observables
//! keyed by the walker. Nested list elements (PE sections) arrive as separate
//! field groups and become child objects pointing at their parent with an
//! `included-in` reference. A parent is emitted together with its children
//! even when it carries no attribute of its own.

use std::collections::BTreeMap;

use stm_core::errors::TranslationError;
use stm_core::ids::new_object_uuid;
use stm_core::mapping::{ObjectCategory, hash_attribute_type};
use stm_core::output::{Galaxy, GalaxyCluster, INCLUDED_IN, OutputAttribute, OutputObject};
use stm_core::source::{CourseOfAction, CustomObject, GalaxyObject};
use stm_core::timestamp::parse_epoch;
use stm_pattern::{CompositeGroup, Pattern};

use crate::dispatcher::GalaxyHint;
use crate::tables::{FieldMapper, Fragment, Mapping, category_for_key};
use crate::walker::{FlatField, FlatRecord};

const SECTION_KEY_PREFIX: &str = "file:extensions.windows-pebinary-ext.sections";

/// Preferred observable keys for hinted single-value types the attribute
/// table types differently (an address observable is `ip-dst` there).
const VALUE_CANDIDATES: &[(&str, &[&str])] = &[
    (
        "ip-src",
        &["ipv4-addr:value", "ipv6-addr:value", "network-traffic:src_ref.value"],
    ),
    (
        "ip-dst",
        &["ipv4-addr:value", "ipv6-addr:value", "network-traffic:dst_ref.value"],
    ),
    ("email-src", &["email-addr:value", "email-message:from_ref.value"]),
    ("email-dst", &["email-addr:value", "email-message:to_refs.value"]),
    ("hostname", &["domain-name:value"]),
    ("link", &["url:value"]),
    ("uri", &["url:value"]),
];

/// Everything one source object contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Built {
    pub attributes: Vec<OutputAttribute>,
    pub objects: Vec<OutputObject>,
    pub galaxies: Vec<Galaxy>,
    /// Non-fatal diagnostics (dropped attachment halves, failed roots).
    pub warnings: Vec<TranslationError>,
    /// Keys no table or convention recognised.
    pub unmapped: Vec<String>,
}

/// Target of a field-table object build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSpec {
    pub category: ObjectCategory,
    pub meta_category: Option<String>,
    pub timestamp: Option<i64>,
    pub to_ids: bool,
}

/// Main fields plus one field group per nested list element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldGroups {
    pub fields: Vec<FlatField>,
    pub sections: Vec<Vec<FlatField>>,
}

impl Built {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.objects.is_empty() && self.galaxies.is_empty()
    }

    /// Append `other`, keeping order.
    pub fn absorb(&mut self, other: Self) {
        self.attributes.extend(other.attributes);
        self.objects.extend(other.objects);
        self.galaxies.extend(other.galaxies);
        self.warnings.extend(other.warnings);
        self.unmapped.extend(other.unmapped);
    }
}

impl FieldGroups {
    /// Significant clauses of an `AND` pattern. Section clauses are grouped
    /// by their list index, in index order.
    #[must_use]
    pub fn from_pattern(pattern: &Pattern) -> Self {
        let mut groups = Self::default();
        let mut sections: BTreeMap<Option<usize>, Vec<FlatField>> = BTreeMap::new();
        for clause in pattern.significant_clauses() {
            let field = FlatField::new(clause.key(), clause.value.as_value());
            if field.key.starts_with(SECTION_KEY_PREFIX) {
                sections
                    .entry(clause.path.first_index())
                    .or_default()
                    .push(field);
            } else {
                groups.fields.push(field);
            }
        }
        groups.sections = sections.into_values().collect();
        groups
    }

    /// All roots of one observable graph, merged into one logical unit.
    #[must_use]
    pub fn from_records(records: &[FlatRecord]) -> Self {
        Self {
            fields: records.iter().flat_map(|r| r.fields.iter().cloned()).collect(),
            sections: records
                .iter()
                .flat_map(|r| r.children.iter().map(|child| child.fields.clone()))
                .collect(),
        }
    }
}

/// One attachment being put back together from its two fragments.
struct Attachment {
    attribute_type: String,
    relation: String,
    value: Option<String>,
    data: Option<String>,
}

// ---------------------------------------------------------------------------
// ObjectBuilder
// ---------------------------------------------------------------------------

pub struct ObjectBuilder<'a> {
    mapper: FieldMapper<'a>,
    separator: &'a str,
}

impl<'a> ObjectBuilder<'a> {
    #[must_use]
    pub const fn new(mapper: FieldMapper<'a>, separator: &'a str) -> Self {
        Self { mapper, separator }
    }

    /// Build the object (or object family) for one logical unit.
    ///
    /// A `file` unit with PE extension fields or sections becomes a `file`
    /// object, a `pe` object included in it, and one `pe-section` object per
    /// section included in the `pe`.
    ///
    /// # Errors
    ///
    /// [`TranslationError::EmptyObject`] when no field mapped to an attribute
    /// and there are no children to carry the object.
    pub fn build_object(&self, spec: &ObjectSpec, groups: &FieldGroups) -> Result<Built, TranslationError> {
        let mut built = Built::default();

        if spec.category == ObjectCategory::File {
            let mut file_fields = Vec::new();
            let mut pe_fields = Vec::new();
            let mut stray_section = Vec::new();
            for field in &groups.fields {
                match category_for_key(ObjectCategory::File, &field.key) {
                    ObjectCategory::Pe => pe_fields.push(field.clone()),
                    ObjectCategory::PeSection => stray_section.push(field.clone()),
                    _ => file_fields.push(field.clone()),
                }
            }
            let mut sections = groups.sections.clone();
            if !stray_section.is_empty() {
                sections.push(stray_section);
            }
            if !pe_fields.is_empty() || !sections.is_empty() {
                self.build_pe_family(spec, &file_fields, &pe_fields, &sections, &mut built);
                return Ok(built);
            }
        }

        let attributes = self.map_fields(spec.category, &groups.fields, spec, &mut built);
        if attributes.is_empty() {
            return Err(TranslationError::EmptyObject(format!(
                "no field of the {} object could be mapped",
                spec.category
            )));
        }
        let mut object = new_object(spec.category.as_str(), spec);
        object.attributes = attributes;
        built.objects.push(object);
        Ok(built)
    }

    fn build_pe_family(
        &self,
        spec: &ObjectSpec,
        file_fields: &[FlatField],
        pe_fields: &[FlatField],
        sections: &[Vec<FlatField>],
        built: &mut Built,
    ) {
        let mut file = new_object(ObjectCategory::File.as_str(), spec);
        file.attributes = self.map_fields(ObjectCategory::File, file_fields, spec, built);

        let mut pe = new_object(ObjectCategory::Pe.as_str(), spec);
        pe.attributes = self.map_fields(ObjectCategory::Pe, pe_fields, spec, built);
        pe.add_reference(file.uuid, INCLUDED_IN);

        let children: Vec<OutputObject> = sections
            .iter()
            .map(|fields| {
                let mut section = new_object(ObjectCategory::PeSection.as_str(), spec);
                section.attributes = self.map_fields(ObjectCategory::PeSection, fields, spec, built);
                section.add_reference(pe.uuid, INCLUDED_IN);
                section
            })
            .collect();

        built.objects.push(file);
        built.objects.push(pe);
        built.objects.extend(children);
    }

    /// Map fields against one category's table and merge attachment
    /// fragments. Unmapped keys and dropped attachments go to `built`.
    fn map_fields(
        &self,
        category: ObjectCategory,
        fields: &[FlatField],
        spec: &ObjectSpec,
        built: &mut Built,
    ) -> Vec<OutputAttribute> {
        let mut attributes = Vec::new();
        let mut attachments: Vec<Attachment> = Vec::new();

        for field in fields {
            let owner = category_for_key(category, &field.key);
            let mapped = match self.mapper.map_object_field(owner, &field.key, &field.value) {
                Mapping::Mapped(mapped) => mapped,
                Mapping::Unmapped(key) => {
                    built.unmapped.push(key);
                    continue;
                }
            };
            let Some(fragment) = mapped.fragment else {
                attributes.extend(
                    OutputAttribute::new(mapped.attribute_type, mapped.value)
                        .map(|a| object_attribute(a, mapped.relation, spec)),
                );
                continue;
            };

            let index = attachments
                .iter()
                .position(|a| a.relation == mapped.relation)
                .unwrap_or_else(|| {
                    attachments.push(Attachment {
                        attribute_type: mapped.attribute_type.clone(),
                        relation: mapped.relation.clone(),
                        value: None,
                        data: None,
                    });
                    attachments.len() - 1
                });
            match fragment {
                Fragment::Value => attachments[index].value = Some(mapped.value),
                Fragment::Data => attachments[index].data = Some(mapped.value),
            }
        }

        for attachment in attachments {
            match (attachment.value, attachment.data) {
                (Some(value), Some(data)) => attributes.extend(
                    OutputAttribute::new(attachment.attribute_type, value)
                        .map(|a| object_attribute(a, attachment.relation, spec).with_data(data)),
                ),
                (value, _) => built.warnings.push(TranslationError::PartialAttachment {
                    relation: attachment.relation,
                    missing: if value.is_some() {
                        Fragment::Data.as_str()
                    } else {
                        Fragment::Value.as_str()
                    },
                }),
            }
        }
        attributes
    }

    /// Value of a hinted single attribute read out of walked observables.
    ///
    /// Composite types join their members; other types take the first field
    /// whose key the type is normally read from, then any field the
    /// attribute table types the same way. `None` when no field fits.
    #[must_use]
    pub fn observable_value(&self, attribute_type: &str, records: &[FlatRecord]) -> Option<String> {
        let fields: Vec<&FlatField> = records.iter().flat_map(|r| r.fields.iter()).collect();
        let find = |key: &str| {
            fields
                .iter()
                .find(|f| f.key == key)
                .map(|f| f.value.clone())
        };

        if let Some(group) = CompositeGroup::for_attribute_type(attribute_type) {
            let [first_key, second_key] = group.member_keys();
            let first = find(first_key).or_else(|| {
                (group == CompositeGroup::HostnamePort)
                    .then(|| find("network-traffic:dst_ref.value"))
                    .flatten()
            });
            let second = match attribute_type.strip_prefix("filename|") {
                Some(hash) => fields
                    .iter()
                    .find(|f| {
                        f.key
                            .strip_prefix("file:hashes.")
                            .and_then(hash_attribute_type)
                            == Some(hash)
                    })
                    .map(|f| f.value.clone()),
                None => find(second_key),
            };
            return Some(format!("{}{}{}", first?, self.separator, second?));
        }

        if let Some((_, keys)) = VALUE_CANDIDATES.iter().find(|(t, _)| *t == attribute_type) {
            if let Some(value) = keys.iter().find_map(|key| find(*key)) {
                return Some(value);
            }
        }
        fields
            .iter()
            .find(|f| self.mapper.map_attribute(&f.key).as_deref() == Some(attribute_type))
            .map(|f| f.value.clone())
    }

    /// `stix2-pattern` object holding the raw pattern of an indicator.
    ///
    /// # Errors
    ///
    /// [`TranslationError::EmptyObject`] for a blank pattern.
    pub fn pattern_object(
        &self,
        pattern: &str,
        spec_version: Option<&str>,
        timestamp: Option<i64>,
        to_ids: bool,
    ) -> Result<OutputObject, TranslationError> {
        let pattern_attribute = OutputAttribute::new("stix2-pattern", pattern)
            .ok_or_else(|| TranslationError::EmptyObject("indicator has no pattern".to_string()))?
            .with_relation("stix2-pattern")
            .with_to_ids(to_ids);
        let version = OutputAttribute::new(
            "text",
            format!("stix {}", spec_version.unwrap_or("2.0")),
        )
        .map(|a| a.with_relation("version"));

        let mut object = OutputObject::new("stix2-pattern", new_object_uuid());
        object.meta_category = Some("stix2-pattern".to_string());
        object.timestamp = timestamp;
        object.attributes.extend(version);
        object.attributes.push(pattern_attribute);
        Ok(object)
    }

    /// # Errors
    ///
    /// [`TranslationError::EmptyObject`] when the course of action has no name.
    pub fn course_of_action(&self, source: &CourseOfAction) -> Result<OutputObject, TranslationError> {
        let name = source
            .name
            .as_deref()
            .and_then(|name| OutputAttribute::new("text", name))
            .ok_or_else(|| TranslationError::EmptyObject("course-of-action has no name".to_string()))?;

        let mut object = OutputObject::new("course-of-action", new_object_uuid());
        object.attributes.push(name.with_relation("name"));
        object.attributes.extend(
            source
                .description
                .as_deref()
                .and_then(|d| OutputAttribute::new("text", d))
                .map(|a| a.with_relation("description")),
        );
        Ok(object)
    }

    /// Object written as `x_misp_values` keyed `<attribute type>_<relation>`.
    ///
    /// # Errors
    ///
    /// [`TranslationError::EmptyObject`] when no value is left.
    pub fn custom_object(&self, custom: &CustomObject) -> Result<OutputObject, TranslationError> {
        let mut object = OutputObject::new(custom.short_name(), new_object_uuid());
        object.meta_category.clone_from(&custom.category);
        let timestamp = custom.timestamp.as_deref().and_then(parse_epoch);
        object.timestamp = timestamp;
        object.attributes = custom
            .values
            .iter()
            .filter_map(|(key, value)| {
                let key = key.as_str();
                let (attribute_type, relation) = key.split_once('_').unwrap_or((key, key));
                OutputAttribute::new(attribute_type, value.as_str())
                    .map(|a| a.with_relation(relation).with_timestamp(timestamp))
            })
            .collect();
        if object.attributes.is_empty() {
            return Err(TranslationError::EmptyObject(custom.type_name.clone()));
        }
        Ok(object)
    }

    /// Galaxy with a single cluster.
    ///
    /// A hinted galaxy takes its type and cluster value from the labels and
    /// splits its description at `|` into galaxy and cluster descriptions.
    /// A native SDO becomes a cluster of the kind's galaxy, with aliases as
    /// synonyms and the first kill-chain phase as the galaxy type.
    ///
    /// # Errors
    ///
    /// [`TranslationError::EmptyObject`] when a native SDO has no name.
    pub fn galaxy(&self, source: &GalaxyObject, hint: Option<&GalaxyHint>) -> Result<Galaxy, TranslationError> {
        let description = non_empty(source.description.as_deref());

        if let Some(hint) = hint {
            let (galaxy_description, cluster_description) = match description {
                Some(text) => match text.split_once('|') {
                    Some((galaxy, cluster)) => (non_empty(Some(galaxy)), non_empty(Some(cluster))),
                    None => (None, Some(text.to_string())),
                },
                None => (None, None),
            };
            return Ok(Galaxy {
                galaxy_type: Some(hint.galaxy_type.clone()),
                name: non_empty(source.name.as_deref())
                    .unwrap_or_else(|| source.kind.display_name().to_string()),
                description: galaxy_description,
                clusters: vec![GalaxyCluster {
                    cluster_type: Some(hint.galaxy_type.clone()),
                    value: hint.value.clone(),
                    tag_name: Some(hint.tag.clone()),
                    description: cluster_description,
                    meta: BTreeMap::new(),
                }],
            });
        }

        let value = non_empty(source.name.as_deref()).ok_or_else(|| {
            TranslationError::EmptyObject(format!("{} has no name", source.kind))
        })?;
        let mut meta = BTreeMap::new();
        if !source.aliases.is_empty() {
            meta.insert("synonyms".to_string(), source.aliases.clone());
        }
        Ok(Galaxy {
            galaxy_type: source
                .kill_chain_phases
                .first()
                .and_then(|phase| non_empty(phase.phase_name.as_deref())),
            name: source.kind.display_name().to_string(),
            description: None,
            clusters: vec![GalaxyCluster {
                cluster_type: None,
                value,
                tag_name: None,
                description,
                meta,
            }],
        })
    }
}

fn new_object(name: &str, spec: &ObjectSpec) -> OutputObject {
    let mut object = OutputObject::new(name, new_object_uuid());
    object.meta_category.clone_from(&spec.meta_category);
    object.timestamp = spec.timestamp;
    object
}

fn object_attribute(attribute: OutputAttribute, relation: String, spec: &ObjectSpec) -> OutputAttribute {
    attribute
        .with_relation(relation)
        .with_to_ids(spec.to_ids)
        .with_timestamp(spec.timestamp)
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
