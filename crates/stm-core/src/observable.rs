//! Observable sub-objects held in an observed-data reference graph.
//!
//! Each sub-object flattens into [`RawField`]s: a path relative to the
//! sub-object (`hashes.MD5`, `to_refs`, `extensions.windows-pebinary-ext.imphash`)
//! and either a scalar or a local-id reference. Dereferencing is the walker's
//! job (`stm-translate`); this module only describes what is there.
//!
//! Custom `x_*` properties are kept. A custom property holding an object
//! (the exporter's attachment shape `{"value": …, "data": …}`) flattens into
//! one field per member (`x_misp_attachment_screenshot.value`, `….data`).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Key of the PE binary extension inside `file.extensions`.
pub const PE_EXTENSION: &str = "windows-pebinary-ext";
/// Key of the socket extension inside `network-traffic.extensions`.
pub const SOCKET_EXTENSION: &str = "socket-ext";

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// A scalar property normalised to text.
///
/// Exporters disagree on whether ports, sizes and pids are strings or
/// numbers, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scalar(pub String);

impl Scalar {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Integer(i64),
            Float(f64),
            Boolean(bool),
        }

        Ok(Self(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text,
            Repr::Integer(n) => n.to_string(),
            Repr::Float(f) => f.to_string(),
            Repr::Boolean(b) => b.to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Raw fields
// ---------------------------------------------------------------------------

/// Value of a flattened field before dereferencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Scalar(String),
    /// Local id of another sub-object in the same graph.
    Reference(String),
}

/// One flattened field of a sub-object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub path: String,
    pub value: RawValue,
}

impl RawField {
    fn scalar(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: RawValue::Scalar(value.into()),
        }
    }

    fn reference(path: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: RawValue::Reference(id.into()),
        }
    }
}

/// Small accumulator so each sub-object can list its fields tersely.
#[derive(Default)]
struct Fields(Vec<RawField>);

impl Fields {
    fn text(&mut self, path: &str, value: Option<&String>) {
        if let Some(value) = value {
            self.0.push(RawField::scalar(path, value.as_str()));
        }
    }

    fn scalar(&mut self, path: &str, value: Option<&Scalar>) {
        if let Some(value) = value {
            self.0.push(RawField::scalar(path, value.as_str()));
        }
    }

    fn reference(&mut self, path: &str, id: Option<&String>) {
        if let Some(id) = id {
            self.0.push(RawField::reference(path, id.as_str()));
        }
    }

    fn references(&mut self, path: &str, ids: &[String]) {
        for id in ids {
            self.0.push(RawField::reference(path, id.as_str()));
        }
    }

    fn hashes(&mut self, prefix: &str, hashes: &BTreeMap<String, String>) {
        for (algorithm, value) in hashes {
            self.0
                .push(RawField::scalar(format!("{prefix}.{algorithm}"), value.as_str()));
        }
    }

    fn custom(&mut self, prefix: &str, custom: &BTreeMap<String, Value>) {
        for (key, value) in custom.iter().filter(|(key, _)| key.starts_with("x_")) {
            let path = join(prefix, key);
            match value {
                Value::Object(members) => {
                    for (member, inner) in members {
                        if let Some(text) = scalar_text(inner) {
                            self.0.push(RawField::scalar(format!("{path}.{member}"), text));
                        }
                    }
                }
                Value::Array(items) => {
                    for text in items.iter().filter_map(scalar_text) {
                        self.0.push(RawField::scalar(path.as_str(), text));
                    }
                }
                other => {
                    if let Some(text) = scalar_text(other) {
                        self.0.push(RawField::scalar(path, text));
                    }
                }
            }
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sub-object structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct File {
    pub name: Option<String>,
    pub size: Option<Scalar>,
    pub mime_type: Option<String>,
    pub name_enc: Option<String>,
    pub hashes: BTreeMap<String, String>,
    pub parent_directory_ref: Option<String>,
    pub extensions: FileExtensions,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileExtensions {
    #[serde(rename = "windows-pebinary-ext")]
    pub windows_pebinary_ext: Option<PeBinaryExtension>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PeBinaryExtension {
    pub pe_type: Option<String>,
    pub imphash: Option<String>,
    pub number_of_sections: Option<Scalar>,
    pub optional_header: Option<PeOptionalHeader>,
    pub sections: Vec<PeSection>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PeOptionalHeader {
    pub address_of_entry_point: Option<Scalar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PeSection {
    pub name: Option<String>,
    pub size: Option<Scalar>,
    pub entropy: Option<Scalar>,
    pub hashes: BTreeMap<String, String>,
}

impl PeSection {
    /// Fields of one section, with paths relative to the owning file.
    #[must_use]
    pub fn raw_fields(&self) -> Vec<RawField> {
        let prefix = format!("extensions.{PE_EXTENSION}.sections");
        let mut fields = Fields::default();
        fields.text(&format!("{prefix}.name"), self.name.as_ref());
        fields.scalar(&format!("{prefix}.size"), self.size.as_ref());
        fields.scalar(&format!("{prefix}.entropy"), self.entropy.as_ref());
        fields.hashes(&format!("{prefix}.hashes"), &self.hashes);
        fields.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Directory {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmailAddress {
    pub value: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmailMessage {
    pub from_ref: Option<String>,
    pub sender_ref: Option<String>,
    pub to_refs: Vec<String>,
    pub cc_refs: Vec<String>,
    pub bcc_refs: Vec<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub body: Option<String>,
    pub body_multipart: Vec<MimePart>,
    pub additional_header_fields: BTreeMap<String, HeaderValue>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MimePart {
    pub body_raw_ref: Option<String>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Header values are a single string or, for repeated headers, a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    One(String),
    Many(Vec<String>),
}

impl HeaderValue {
    fn values(&self) -> &[String] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkTraffic {
    pub src_ref: Option<String>,
    pub dst_ref: Option<String>,
    pub src_port: Option<Scalar>,
    pub dst_port: Option<Scalar>,
    pub protocols: Vec<String>,
    pub extensions: NetworkExtensions,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkExtensions {
    #[serde(rename = "socket-ext")]
    pub socket_ext: Option<SocketExtension>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SocketExtension {
    pub address_family: Option<String>,
    pub protocol_family: Option<String>,
    pub socket_type: Option<String>,
    pub is_listening: Option<Scalar>,
    pub is_blocking: Option<Scalar>,
}

/// Observables whose whole content is a single `value`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AddressValue {
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DomainName {
    pub value: Option<String>,
    pub resolves_to_refs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Process {
    pub pid: Option<Scalar>,
    pub name: Option<String>,
    pub command_line: Option<String>,
    pub parent_ref: Option<String>,
    pub child_refs: Vec<String>,
    pub binary_ref: Option<String>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryKey {
    pub key: Option<String>,
    pub modified: Option<String>,
    pub values: Vec<RegistryValue>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryValue {
    pub name: Option<String>,
    pub data: Option<String>,
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct X509Certificate {
    pub serial_number: Option<String>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub version: Option<Scalar>,
    pub validity_not_before: Option<String>,
    pub validity_not_after: Option<String>,
    pub subject_public_key_algorithm: Option<String>,
    pub subject_public_key_modulus: Option<String>,
    pub subject_public_key_exponent: Option<Scalar>,
    pub hashes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AutonomousSystem {
    pub number: Option<Scalar>,
    pub name: Option<String>,
    pub rir: Option<String>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// ObservableSubObject
// ---------------------------------------------------------------------------

/// One entry of an observed-data `objects` mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservableSubObject {
    File(File),
    Directory(Directory),
    EmailAddress(EmailAddress),
    EmailMessage(EmailMessage),
    NetworkTraffic(NetworkTraffic),
    Ipv4Addr(AddressValue),
    Ipv6Addr(AddressValue),
    MacAddr(AddressValue),
    DomainName(DomainName),
    Url(AddressValue),
    Process(Process),
    RegistryKey(RegistryKey),
    X509Certificate(X509Certificate),
    AutonomousSystem(AutonomousSystem),
    /// A type with no translation, or one whose properties failed to decode.
    Unsupported { type_name: String },
}

impl ObservableSubObject {
    /// Decode a sub-object from its JSON form, dispatching on `type`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let decoded = match type_name.as_str() {
            "file" => serde_json::from_value(value).map(Self::File),
            "directory" => serde_json::from_value(value).map(Self::Directory),
            "email-addr" => serde_json::from_value(value).map(Self::EmailAddress),
            "email-message" => serde_json::from_value(value).map(Self::EmailMessage),
            "network-traffic" => serde_json::from_value(value).map(Self::NetworkTraffic),
            "ipv4-addr" => serde_json::from_value(value).map(Self::Ipv4Addr),
            "ipv6-addr" => serde_json::from_value(value).map(Self::Ipv6Addr),
            "mac-addr" => serde_json::from_value(value).map(Self::MacAddr),
            "domain-name" => serde_json::from_value(value).map(Self::DomainName),
            "url" => serde_json::from_value(value).map(Self::Url),
            "process" => serde_json::from_value(value).map(Self::Process),
            "windows-registry-key" => serde_json::from_value(value).map(Self::RegistryKey),
            "x509-certificate" => serde_json::from_value(value).map(Self::X509Certificate),
            "autonomous-system" => serde_json::from_value(value).map(Self::AutonomousSystem),
            _ => {
                return Self::Unsupported {
                    type_name: type_name.clone(),
                };
            }
        };

        decoded.unwrap_or(Self::Unsupported { type_name })
    }

    /// STIX type tag of this sub-object.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::File(_) => "file",
            Self::Directory(_) => "directory",
            Self::EmailAddress(_) => "email-addr",
            Self::EmailMessage(_) => "email-message",
            Self::NetworkTraffic(_) => "network-traffic",
            Self::Ipv4Addr(_) => "ipv4-addr",
            Self::Ipv6Addr(_) => "ipv6-addr",
            Self::MacAddr(_) => "mac-addr",
            Self::DomainName(_) => "domain-name",
            Self::Url(_) => "url",
            Self::Process(_) => "process",
            Self::RegistryKey(_) => "windows-registry-key",
            Self::X509Certificate(_) => "x509-certificate",
            Self::AutonomousSystem(_) => "autonomous-system",
            Self::Unsupported { type_name } => type_name,
        }
    }

    /// The scalar a reference to this sub-object resolves to, with the
    /// field name it is read from.
    #[must_use]
    pub fn representative(&self) -> Option<(&'static str, &str)> {
        match self {
            Self::EmailAddress(addr) => addr.value.as_deref().map(|v| ("value", v)),
            Self::Ipv4Addr(addr) | Self::Ipv6Addr(addr) | Self::MacAddr(addr) | Self::Url(addr) => {
                addr.value.as_deref().map(|v| ("value", v))
            }
            Self::DomainName(domain) => domain.value.as_deref().map(|v| ("value", v)),
            Self::File(file) => file.name.as_deref().map(|v| ("name", v)),
            Self::Directory(dir) => dir.path.as_deref().map(|v| ("path", v)),
            Self::Process(process) => process.pid.as_ref().map(|v| ("pid", v.as_str())),
            Self::AutonomousSystem(asn) => asn.number.as_ref().map(|v| ("number", v.as_str())),
            Self::EmailMessage(_)
            | Self::NetworkTraffic(_)
            | Self::RegistryKey(_)
            | Self::X509Certificate(_)
            | Self::Unsupported { .. } => None,
        }
    }

    /// Ordered sections of a PE binary extension, empty for everything else.
    #[must_use]
    pub fn pe_sections(&self) -> &[PeSection] {
        match self {
            Self::File(file) => file
                .extensions
                .windows_pebinary_ext
                .as_ref()
                .map_or(&[], |ext| ext.sections.as_slice()),
            _ => &[],
        }
    }

    /// Flattened fields in declaration order. PE sections are not included;
    /// see [`Self::pe_sections`].
    #[must_use]
    pub fn raw_fields(&self) -> Vec<RawField> {
        let mut fields = Fields::default();
        match self {
            Self::File(file) => {
                fields.text("name", file.name.as_ref());
                fields.hashes("hashes", &file.hashes);
                fields.scalar("size", file.size.as_ref());
                fields.text("mime_type", file.mime_type.as_ref());
                fields.text("name_enc", file.name_enc.as_ref());
                fields.reference("parent_directory_ref", file.parent_directory_ref.as_ref());
                if let Some(ext) = &file.extensions.windows_pebinary_ext {
                    let prefix = format!("extensions.{PE_EXTENSION}");
                    fields.text(&format!("{prefix}.pe_type"), ext.pe_type.as_ref());
                    fields.text(&format!("{prefix}.imphash"), ext.imphash.as_ref());
                    fields.scalar(
                        &format!("{prefix}.number_of_sections"),
                        ext.number_of_sections.as_ref(),
                    );
                    if let Some(header) = &ext.optional_header {
                        fields.scalar(
                            &format!("{prefix}.optional_header.address_of_entry_point"),
                            header.address_of_entry_point.as_ref(),
                        );
                    }
                    fields.custom(&prefix, &ext.custom);
                }
                fields.custom("", &file.custom);
            }
            Self::Directory(dir) => fields.text("path", dir.path.as_ref()),
            Self::EmailAddress(addr) => {
                fields.text("value", addr.value.as_ref());
                fields.text("display_name", addr.display_name.as_ref());
            }
            Self::EmailMessage(message) => {
                fields.reference("from_ref", message.from_ref.as_ref());
                fields.reference("sender_ref", message.sender_ref.as_ref());
                fields.references("to_refs", &message.to_refs);
                fields.references("cc_refs", &message.cc_refs);
                fields.references("bcc_refs", &message.bcc_refs);
                fields.text("subject", message.subject.as_ref());
                fields.text("date", message.date.as_ref());
                fields.text("body", message.body.as_ref());
                for part in &message.body_multipart {
                    fields.reference("body_multipart.body_raw_ref", part.body_raw_ref.as_ref());
                }
                for (header, value) in &message.additional_header_fields {
                    let path = format!(
                        "additional_header_fields.{}",
                        header.to_ascii_lowercase().replace('-', "_")
                    );
                    for item in value.values() {
                        fields.0.push(RawField::scalar(path.as_str(), item.as_str()));
                    }
                }
                fields.custom("", &message.custom);
            }
            Self::NetworkTraffic(traffic) => {
                fields.reference("src_ref", traffic.src_ref.as_ref());
                fields.reference("dst_ref", traffic.dst_ref.as_ref());
                fields.scalar("src_port", traffic.src_port.as_ref());
                fields.scalar("dst_port", traffic.dst_port.as_ref());
                for protocol in &traffic.protocols {
                    fields.0.push(RawField::scalar("protocols", protocol.as_str()));
                }
                if let Some(socket) = &traffic.extensions.socket_ext {
                    let prefix = format!("extensions.{SOCKET_EXTENSION}");
                    fields.text(&format!("{prefix}.address_family"), socket.address_family.as_ref());
                    fields.text(
                        &format!("{prefix}.protocol_family"),
                        socket.protocol_family.as_ref(),
                    );
                    fields.text(&format!("{prefix}.socket_type"), socket.socket_type.as_ref());
                    fields.scalar(&format!("{prefix}.is_listening"), socket.is_listening.as_ref());
                    fields.scalar(&format!("{prefix}.is_blocking"), socket.is_blocking.as_ref());
                }
                fields.custom("", &traffic.custom);
            }
            Self::Ipv4Addr(addr) | Self::Ipv6Addr(addr) | Self::MacAddr(addr) | Self::Url(addr) => {
                fields.text("value", addr.value.as_ref());
            }
            Self::DomainName(domain) => {
                fields.text("value", domain.value.as_ref());
                fields.references("resolves_to_refs", &domain.resolves_to_refs);
            }
            Self::Process(process) => {
                fields.scalar("pid", process.pid.as_ref());
                fields.text("name", process.name.as_ref());
                fields.text("command_line", process.command_line.as_ref());
                fields.reference("parent_ref", process.parent_ref.as_ref());
                fields.references("child_refs", &process.child_refs);
                fields.reference("binary_ref", process.binary_ref.as_ref());
                fields.custom("", &process.custom);
            }
            Self::RegistryKey(key) => {
                fields.text("key", key.key.as_ref());
                fields.text("modified", key.modified.as_ref());
                for value in &key.values {
                    fields.text("values.name", value.name.as_ref());
                    fields.text("values.data", value.data.as_ref());
                    fields.text("values.data_type", value.data_type.as_ref());
                }
                fields.custom("", &key.custom);
            }
            Self::X509Certificate(cert) => {
                fields.text("serial_number", cert.serial_number.as_ref());
                fields.text("issuer", cert.issuer.as_ref());
                fields.text("subject", cert.subject.as_ref());
                fields.scalar("version", cert.version.as_ref());
                fields.text("validity_not_before", cert.validity_not_before.as_ref());
                fields.text("validity_not_after", cert.validity_not_after.as_ref());
                fields.text(
                    "subject_public_key_algorithm",
                    cert.subject_public_key_algorithm.as_ref(),
                );
                fields.text(
                    "subject_public_key_modulus",
                    cert.subject_public_key_modulus.as_ref(),
                );
                fields.scalar(
                    "subject_public_key_exponent",
                    cert.subject_public_key_exponent.as_ref(),
                );
                fields.hashes("hashes", &cert.hashes);
                fields.custom("", &cert.custom);
            }
            Self::AutonomousSystem(asn) => {
                fields.scalar("number", asn.number.as_ref());
                fields.text("name", asn.name.as_ref());
                fields.text("rir", asn.rir.as_ref());
                fields.custom("", &asn.custom);
            }
            Self::Unsupported { .. } => {}
        }
        fields.0
    }

    /// Local ids this sub-object references, in field order.
    #[must_use]
    pub fn references(&self) -> Vec<String> {
        self.raw_fields()
            .into_iter()
            .filter_map(|field| match field.value {
                RawValue::Reference(id) => Some(id),
                RawValue::Scalar(_) => None,
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for ObservableSubObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}
