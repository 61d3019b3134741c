//! Qualified field key to `(attribute type, relation)` tables.
//!
//! Keys are `<stix-type>:<property path>` with list indices and quotes
//! removed, the same shape [`stm_pattern::FieldPath::key`] produces for a
//! pattern clause and the walker produces for an observable field. Both
//! translation paths therefore share one set of tables.
//!
//! Lookups never fail: a key that matches no table entry, no hash dictionary
//! and no custom-field convention comes back as [`Mapping::Unmapped`].

use std::collections::HashMap;

use stm_config::MappingOverrides;
use stm_core::mapping::{FieldSpec, ObjectCategory, hash_attribute_type};

type Entry = (&'static str, &'static str, &'static str);

const PE_PREFIX: &str = "file:extensions.windows-pebinary-ext";
const SECTION_PREFIX: &str = "file:extensions.windows-pebinary-ext.sections";

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

const ASN: &[Entry] = &[
    ("autonomous-system:number", "AS", "asn"),
    ("autonomous-system:name", "text", "description"),
];

const DOMAIN_IP: &[Entry] = &[
    ("domain-name:value", "domain", "domain"),
    ("domain-name:resolves_to_refs.value", "ip-dst", "ip"),
];

const EMAIL: &[Entry] = &[
    ("email-message:from_ref.value", "email-src", "from"),
    ("email-message:to_refs.value", "email-dst", "to"),
    ("email-message:cc_refs.value", "email-dst", "cc"),
    ("email-message:bcc_refs.value", "email-dst", "bcc"),
    ("email-message:subject", "email-subject", "subject"),
    ("email-message:date", "datetime", "send-date"),
    ("email-message:body", "email-body", "email-body"),
    ("email-message:body_multipart.body_raw_ref.name", "email-attachment", "attachment"),
    ("email-message:additional_header_fields.reply_to", "email-reply-to", "reply-to"),
    ("email-message:additional_header_fields.x_mailer", "email-x-mailer", "x-mailer"),
];

const FILE: &[Entry] = &[
    ("file:name", "filename", "filename"),
    ("file:size", "size-in-bytes", "size-in-bytes"),
    ("file:mime_type", "mime-type", "mimetype"),
    ("file:name_enc", "text", "file-encoding"),
    ("file:parent_directory_ref.path", "text", "path"),
];

const IP_PORT: &[Entry] = &[
    ("network-traffic:src_port", "port", "src-port"),
    ("network-traffic:dst_port", "port", "dst-port"),
    ("network-traffic:src_ref.value", "ip-src", "ip"),
    ("network-traffic:dst_ref.value", "ip-dst", "ip"),
    ("domain-name:value", "domain", "domain"),
];

const NETWORK_SOCKET: &[Entry] = &[
    ("network-traffic:src_ref.value", "ip-src", "ip-src"),
    ("network-traffic:dst_ref.value", "ip-dst", "ip-dst"),
    ("network-traffic:src_port", "port", "src-port"),
    ("network-traffic:dst_port", "port", "dst-port"),
    ("network-traffic:protocols", "text", "protocol"),
    ("network-traffic:extensions.socket-ext.address_family", "text", "address-family"),
    ("network-traffic:extensions.socket-ext.protocol_family", "text", "domain-family"),
    ("network-traffic:extensions.socket-ext.socket_type", "text", "socket-type"),
];

const PROCESS: &[Entry] = &[
    ("process:pid", "text", "pid"),
    ("process:name", "text", "name"),
    ("process:command_line", "text", "command-line"),
    ("process:parent_ref.pid", "text", "parent-pid"),
    ("process:child_refs.pid", "text", "child-pid"),
    ("process:binary_ref.name", "filename", "image"),
];

const REGISTRY_KEY: &[Entry] = &[
    ("windows-registry-key:key", "regkey", "key"),
    ("windows-registry-key:modified", "datetime", "last-modified"),
    ("windows-registry-key:values.name", "text", "name"),
    ("windows-registry-key:values.data", "text", "data"),
    ("windows-registry-key:values.data_type", "text", "data-type"),
];

const URL: &[Entry] = &[
    ("url:value", "url", "url"),
    ("domain-name:value", "domain", "domain"),
    ("network-traffic:dst_port", "port", "port"),
    ("ipv4-addr:value", "ip-dst", "ip"),
    ("ipv6-addr:value", "ip-dst", "ip"),
];

const PE: &[Entry] = &[
    ("file:extensions.windows-pebinary-ext.pe_type", "text", "type"),
    ("file:extensions.windows-pebinary-ext.imphash", "imphash", "imphash"),
    ("file:extensions.windows-pebinary-ext.number_of_sections", "counter", "number-sections"),
    (
        "file:extensions.windows-pebinary-ext.optional_header.address_of_entry_point",
        "text",
        "entrypoint-address",
    ),
];

const PE_SECTION: &[Entry] = &[
    ("file:extensions.windows-pebinary-ext.sections.name", "text", "name"),
    ("file:extensions.windows-pebinary-ext.sections.size", "size-in-bytes", "size-in-bytes"),
    ("file:extensions.windows-pebinary-ext.sections.entropy", "float", "entropy"),
];

const X509: &[Entry] = &[
    ("x509-certificate:serial_number", "text", "serial-number"),
    ("x509-certificate:issuer", "text", "issuer"),
    ("x509-certificate:subject", "text", "subject"),
    ("x509-certificate:version", "text", "version"),
    ("x509-certificate:validity_not_before", "datetime", "validity-not-before"),
    ("x509-certificate:validity_not_after", "datetime", "validity-not-after"),
    ("x509-certificate:subject_public_key_algorithm", "text", "pubkey-info-algorithm"),
    ("x509-certificate:subject_public_key_modulus", "text", "pubkey-info-modulus"),
    ("x509-certificate:subject_public_key_exponent", "text", "pubkey-info-exponent"),
];

/// Single-value keys of un-hinted indicators and observables.
const ATTRIBUTES: &[(&str, &str)] = &[
    ("ipv4-addr:value", "ip-dst"),
    ("ipv6-addr:value", "ip-dst"),
    ("mac-addr:value", "mac-address"),
    ("domain-name:value", "domain"),
    ("url:value", "url"),
    ("email-addr:value", "email-dst"),
    ("email-message:from_ref.value", "email-src"),
    ("email-message:to_refs.value", "email-dst"),
    ("email-message:subject", "email-subject"),
    ("file:name", "filename"),
    ("mutex:name", "mutex"),
    ("windows-registry-key:key", "regkey"),
    ("autonomous-system:number", "AS"),
    ("network-traffic:src_ref.value", "ip-src"),
    ("network-traffic:dst_ref.value", "ip-dst"),
    ("network-traffic:dst_port", "port"),
    ("user-account:user_id", "target-user"),
];

const fn builtin_entries(category: ObjectCategory) -> &'static [Entry] {
    match category {
        ObjectCategory::Asn => ASN,
        ObjectCategory::DomainIp => DOMAIN_IP,
        ObjectCategory::Email => EMAIL,
        ObjectCategory::File => FILE,
        ObjectCategory::IpPort => IP_PORT,
        ObjectCategory::NetworkSocket => NETWORK_SOCKET,
        ObjectCategory::Process => PROCESS,
        ObjectCategory::RegistryKey => REGISTRY_KEY,
        ObjectCategory::Url => URL,
        ObjectCategory::Pe => PE,
        ObjectCategory::PeSection => PE_SECTION,
        ObjectCategory::X509 => X509,
    }
}

/// How entries of a `hashes` dictionary are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashStyle {
    /// `md5`, `sha256`, ... with the type doubling as relation.
    Plain,
    /// `x509-fingerprint-<hash>`.
    Fingerprint,
}

impl HashStyle {
    fn spec(self, algorithm: &str) -> Option<FieldSpec> {
        let hash = hash_attribute_type(algorithm)?;
        Some(match self {
            Self::Plain => FieldSpec::new(hash, hash),
            Self::Fingerprint => {
                let name = format!("x509-fingerprint-{hash}");
                FieldSpec::new(name.clone(), name)
            }
        })
    }
}

fn builtin_hash_prefixes(category: ObjectCategory) -> Vec<(String, HashStyle)> {
    match category {
        ObjectCategory::File => vec![("file:hashes".to_string(), HashStyle::Plain)],
        ObjectCategory::PeSection => {
            vec![(format!("{SECTION_PREFIX}.hashes"), HashStyle::Plain)]
        }
        ObjectCategory::X509 => {
            vec![("x509-certificate:hashes".to_string(), HashStyle::Fingerprint)]
        }
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// MappingTables
// ---------------------------------------------------------------------------

/// All field tables, built once per run and passed by reference.
#[derive(Debug, Clone)]
pub struct MappingTables {
    objects: HashMap<ObjectCategory, HashMap<String, FieldSpec>>,
    hash_prefixes: HashMap<ObjectCategory, Vec<(String, HashStyle)>>,
    attributes: HashMap<String, String>,
    attribute_hash_prefixes: Vec<(String, HashStyle)>,
}

impl MappingTables {
    #[must_use]
    pub fn builtin() -> Self {
        let objects = ObjectCategory::ALL
            .into_iter()
            .map(|category| {
                let table = builtin_entries(category)
                    .iter()
                    .map(|(key, attribute_type, relation)| {
                        ((*key).to_string(), FieldSpec::new(*attribute_type, *relation))
                    })
                    .collect();
                (category, table)
            })
            .collect();
        let hash_prefixes = ObjectCategory::ALL
            .into_iter()
            .map(|category| (category, builtin_hash_prefixes(category)))
            .collect();
        let attributes = ATTRIBUTES
            .iter()
            .map(|(key, attribute_type)| ((*key).to_string(), (*attribute_type).to_string()))
            .collect();

        Self {
            objects,
            hash_prefixes,
            attributes,
            attribute_hash_prefixes: vec![
                ("file:hashes".to_string(), HashStyle::Plain),
                ("x509-certificate:hashes".to_string(), HashStyle::Fingerprint),
            ],
        }
    }

    /// Add (or replace) entries from configuration.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &MappingOverrides) -> Self {
        for (category, entries) in &overrides.objects {
            let table = self.objects.entry(*category).or_default();
            for (key, spec) in entries {
                table.insert(key.clone(), spec.clone());
            }
        }
        for (key, attribute_type) in &overrides.attributes {
            self.attributes.insert(key.clone(), attribute_type.clone());
        }
        self
    }

    /// Object table entry for `key`, including `hashes` dictionaries.
    #[must_use]
    pub fn object_spec(&self, category: ObjectCategory, key: &str) -> Option<FieldSpec> {
        if let Some(spec) = self.objects.get(&category).and_then(|t| t.get(key)) {
            return Some(spec.clone());
        }
        let prefixes = self.hash_prefixes.get(&category)?;
        hash_spec(prefixes, key)
    }

    /// Attribute type for an un-hinted single value.
    #[must_use]
    pub fn attribute_type(&self, key: &str) -> Option<String> {
        if let Some(attribute_type) = self.attributes.get(key) {
            return Some(attribute_type.clone());
        }
        hash_spec(&self.attribute_hash_prefixes, key).map(|spec| spec.attribute_type)
    }

    /// Number of entries in one category's table.
    #[must_use]
    pub fn len(&self, category: ObjectCategory) -> usize {
        self.objects.get(&category).map_or(0, HashMap::len)
    }
}

impl Default for MappingTables {
    fn default() -> Self {
        Self::builtin()
    }
}

fn hash_spec(prefixes: &[(String, HashStyle)], key: &str) -> Option<FieldSpec> {
    let (prefix, algorithm) = key.rsplit_once('.')?;
    prefixes
        .iter()
        .find(|(known, _)| known == prefix)
        .and_then(|(_, style)| style.spec(algorithm))
}

/// Object category whose table owns a key of a file record.
///
/// PE extension keys belong to the `pe` object and section keys to the
/// `pe-section` children; everything else stays with `fallback`.
#[must_use]
pub fn category_for_key(fallback: ObjectCategory, key: &str) -> ObjectCategory {
    if fallback != ObjectCategory::File {
        return fallback;
    }
    if key.starts_with(SECTION_PREFIX) {
        ObjectCategory::PeSection
    } else if key.starts_with(PE_PREFIX) {
        ObjectCategory::Pe
    } else {
        ObjectCategory::File
    }
}

// ---------------------------------------------------------------------------
// Mapped fields
// ---------------------------------------------------------------------------

/// Half of an attachment carried as two fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fragment {
    Value,
    Data,
}

impl Fragment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Data => "data",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "value" => Some(Self::Value),
            "data" => Some(Self::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedField {
    pub attribute_type: String,
    pub relation: String,
    pub value: String,
    /// Belongs to a nested child record (a PE section) rather than to the
    /// owning object.
    pub is_composite_member: bool,
    pub fragment: Option<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    Mapped(MappedField),
    /// No table entry and no custom convention; carries the key.
    Unmapped(String),
}

// ---------------------------------------------------------------------------
// FieldMapper
// ---------------------------------------------------------------------------

/// Resolves field keys against [`MappingTables`] and the custom-field
/// convention `<prefix><attribute type>_<relation>`.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper<'a> {
    tables: &'a MappingTables,
    custom_prefix: &'a str,
}

impl<'a> FieldMapper<'a> {
    #[must_use]
    pub const fn new(tables: &'a MappingTables, custom_prefix: &'a str) -> Self {
        Self {
            tables,
            custom_prefix,
        }
    }

    /// Map one field of an object record.
    #[must_use]
    pub fn map_object_field(&self, category: ObjectCategory, key: &str, value: &str) -> Mapping {
        let spec = self
            .tables
            .object_spec(category, key)
            .map(|spec| (spec, None))
            .or_else(|| self.custom(key));
        match spec {
            Some((spec, fragment)) => Mapping::Mapped(MappedField {
                attribute_type: spec.attribute_type,
                relation: spec.relation,
                value: value.to_string(),
                is_composite_member: category == ObjectCategory::PeSection,
                fragment,
            }),
            None => Mapping::Unmapped(key.to_string()),
        }
    }

    /// Attribute type of a single value, without a relation.
    #[must_use]
    pub fn map_attribute(&self, key: &str) -> Option<String> {
        self.tables.attribute_type(key).or_else(|| {
            self.custom(key)
                .filter(|(_, fragment)| fragment.is_none())
                .map(|(spec, _)| spec.attribute_type)
        })
    }

    /// Parse the custom-field convention out of the last path segment(s).
    fn custom(&self, key: &str) -> Option<(FieldSpec, Option<Fragment>)> {
        let property = key.split_once(':').map_or(key, |(_, property)| property);
        let mut segments = property.rsplit('.');
        let last = segments.next()?;

        let (name, fragment) = if last.starts_with(self.custom_prefix) {
            (last, None)
        } else {
            let fragment = Fragment::from_segment(last)?;
            let name = segments.next().filter(|s| s.starts_with(self.custom_prefix))?;
            (name, Some(fragment))
        };

        let (attribute_type, relation) = name.strip_prefix(self.custom_prefix)?.split_once('_')?;
        if attribute_type.is_empty() || relation.is_empty() {
            return None;
        }
        Some((FieldSpec::new(attribute_type, relation), fragment))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn mapped(mapping: Mapping) -> MappedField {
        match mapping {
            Mapping::Mapped(field) => field,
            Mapping::Unmapped(key) => panic!("{key} was not mapped"),
        }
    }

    #[test]
    fn every_category_has_a_table() {
        let tables = MappingTables::builtin();
        for category in ObjectCategory::ALL {
            assert!(tables.len(category) > 0, "{category} table is empty");
        }
    }

    #[test]
    fn table_entries_resolve() {
        let tables = MappingTables::builtin();
        let mapper = FieldMapper::new(&tables, "x_misp_");
        let field = mapped(mapper.map_object_field(
            ObjectCategory::Email,
            "email-message:to_refs.value",
            "a@b.c",
        ));
        assert_eq!(field.attribute_type, "email-dst");
        assert_eq!(field.relation, "to");
        assert!(!field.is_composite_member);
    }

    #[test]
    fn hashes_share_one_table() {
        let tables = MappingTables::builtin();
        let mapper = FieldMapper::new(&tables, "x_misp_");
        let file = mapped(mapper.map_object_field(ObjectCategory::File, "file:hashes.SHA-256", "f"));
        assert_eq!((file.attribute_type.as_str(), file.relation.as_str()), ("sha256", "sha256"));

        let section = mapped(mapper.map_object_field(
            ObjectCategory::PeSection,
            "file:extensions.windows-pebinary-ext.sections.hashes.MD5",
            "0",
        ));
        assert_eq!(section.attribute_type, "md5");
        assert!(section.is_composite_member);

        let cert = mapped(mapper.map_object_field(
            ObjectCategory::X509,
            "x509-certificate:hashes.SHA-1",
            "0",
        ));
        assert_eq!(cert.attribute_type, "x509-fingerprint-sha1");
    }

    #[test]
    fn custom_convention_splits_type_and_relation() {
        let tables = MappingTables::builtin();
        let mapper = FieldMapper::new(&tables, "x_misp_");
        let field = mapped(mapper.map_object_field(
            ObjectCategory::File,
            "file:x_misp_text_compilation_note",
            "note",
        ));
        assert_eq!(field.attribute_type, "text");
        assert_eq!(field.relation, "compilation_note");
        assert_eq!(field.fragment, None);
    }

    #[test]
    fn attachment_fragments_are_marked() {
        let tables = MappingTables::builtin();
        let mapper = FieldMapper::new(&tables, "x_misp_");
        let value = mapped(mapper.map_object_field(
            ObjectCategory::Email,
            "email-message:x_misp_attachment_screenshot.value",
            "shot.png",
        ));
        let data = mapped(mapper.map_object_field(
            ObjectCategory::Email,
            "email-message:x_misp_attachment_screenshot.data",
            "aGVsbG8=",
        ));
        assert_eq!(value.fragment, Some(Fragment::Value));
        assert_eq!(data.fragment, Some(Fragment::Data));
        assert_eq!(value.relation, "screenshot");
        assert_eq!(data.attribute_type, "attachment");
    }

    #[test]
    fn unknown_keys_never_raise() {
        let tables = MappingTables::builtin();
        let mapper = FieldMapper::new(&tables, "x_misp_");
        for key in [
            "file:accessed",
            "",
            ":",
            "file:x_misp_",
            "file:x_misp_nounderscore",
            "file:x_misp_text_a.other",
            "email-message:x_acme_field",
        ] {
            assert_eq!(
                mapper.map_object_field(ObjectCategory::File, key, "v"),
                Mapping::Unmapped(key.to_string())
            );
        }
        assert_eq!(mapper.map_attribute("software:name"), None);
    }

    #[test]
    fn custom_prefix_is_configurable() {
        let tables = MappingTables::builtin();
        let mapper = FieldMapper::new(&tables, "x_acme_");
        assert!(matches!(
            mapper.map_object_field(ObjectCategory::Url, "url:x_acme_text_note", "n"),
            Mapping::Mapped(_)
        ));
        assert!(matches!(
            mapper.map_object_field(ObjectCategory::Url, "url:x_misp_text_note", "n"),
            Mapping::Unmapped(_)
        ));
    }

    #[test]
    fn attribute_table_and_hashes() {
        let tables = MappingTables::builtin();
        let mapper = FieldMapper::new(&tables, "x_misp_");
        assert_eq!(mapper.map_attribute("ipv4-addr:value").as_deref(), Some("ip-dst"));
        assert_eq!(mapper.map_attribute("file:hashes.MD5").as_deref(), Some("md5"));
        assert_eq!(
            mapper.map_attribute("x509-certificate:hashes.SHA-256").as_deref(),
            Some("x509-fingerprint-sha256")
        );
    }

    #[test]
    fn overrides_extend_tables() {
        let mut overrides = MappingOverrides::default();
        let mut file = BTreeMap::new();
        file.insert("file:x_acme_path".to_string(), FieldSpec::new("text", "path"));
        overrides.objects.insert(ObjectCategory::File, file);
        overrides
            .attributes
            .insert("mutex:name".to_string(), "named-pipe".to_string());

        let tables = MappingTables::builtin().with_overrides(&overrides);
        assert_eq!(
            tables.object_spec(ObjectCategory::File, "file:x_acme_path"),
            Some(FieldSpec::new("text", "path"))
        );
        assert_eq!(tables.attribute_type("mutex:name").as_deref(), Some("named-pipe"));
    }

    #[test]
    fn file_keys_route_to_pe_categories() {
        assert_eq!(
            category_for_key(ObjectCategory::File, "file:extensions.windows-pebinary-ext.imphash"),
            ObjectCategory::Pe
        );
        assert_eq!(
            category_for_key(
                ObjectCategory::File,
                "file:extensions.windows-pebinary-ext.sections.name"
            ),
            ObjectCategory::PeSection
        );
        assert_eq!(category_for_key(ObjectCategory::File, "file:name"), ObjectCategory::File);
        assert_eq!(category_for_key(ObjectCategory::Url, "file:name"), ObjectCategory::Url);
    }
}
