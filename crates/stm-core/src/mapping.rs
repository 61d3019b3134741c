//! Object categories and field specs shared by the mapping tables and config.
//!
//! A category names one MISP object template. Each category owns one field
//! table in `stm-translate`; configuration can add entries to those tables
//! using the same [`FieldSpec`] shape.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Target attribute type and object relation for one field key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub relation: String,
}

impl FieldSpec {
    #[must_use]
    pub fn new(attribute_type: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            relation: relation.into(),
        }
    }
}

/// Attribute type for a STIX hash algorithm name.
///
/// Names are compared after upper-casing and removing `-`, so `SHA-256`,
/// `sha256` and `SHA256` all resolve to `sha256`.
#[must_use]
pub fn hash_attribute_type(algorithm: &str) -> Option<&'static str> {
    let normalized: String = algorithm
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let attribute_type = match normalized.as_str() {
        "MD5" => "md5",
        "SHA1" => "sha1",
        "SHA224" => "sha224",
        "SHA256" => "sha256",
        "SHA384" => "sha384",
        "SHA512" => "sha512",
        "SHA3224" => "sha3-224",
        "SHA3256" => "sha3-256",
        "SHA3384" => "sha3-384",
        "SHA3512" => "sha3-512",
        "SSDEEP" => "ssdeep",
        "TLSH" => "tlsh",
        "IMPHASH" => "imphash",
        "AUTHENTIHASH" => "authentihash",
        "IMPFUZZY" => "impfuzzy",
        "PEHASH" => "pehash",
        _ => return None,
    };
    Some(attribute_type)
}

// ---------------------------------------------------------------------------
// ObjectCategory
// ---------------------------------------------------------------------------

/// MISP object template a source maps onto.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectCategory {
    Asn,
    DomainIp,
    Email,
    File,
    IpPort,
    NetworkSocket,
    Process,
    RegistryKey,
    Url,
    Pe,
    PeSection,
    X509,
}

impl ObjectCategory {
    pub const ALL: [Self; 12] = [
        Self::Asn,
        Self::DomainIp,
        Self::Email,
        Self::File,
        Self::IpPort,
        Self::NetworkSocket,
        Self::Process,
        Self::RegistryKey,
        Self::Url,
        Self::Pe,
        Self::PeSection,
        Self::X509,
    ];

    /// Object name emitted in the output event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asn => "asn",
            Self::DomainIp => "domain-ip",
            Self::Email => "email",
            Self::File => "file",
            Self::IpPort => "ip-port",
            Self::NetworkSocket => "network-socket",
            Self::Process => "process",
            Self::RegistryKey => "registry-key",
            Self::Url => "url",
            Self::Pe => "pe",
            Self::PeSection => "pe-section",
            Self::X509 => "x509",
        }
    }

    /// Category named by the `misp:type` label of a hinted object.
    ///
    /// `WindowsPEBinaryFile` is the exporter's name for a file object that
    /// carries a PE extension; it maps onto [`Self::File`].
    #[must_use]
    pub fn from_hint_type(name: &str) -> Option<Self> {
        match name {
            "WindowsPEBinaryFile" => Some(Self::File),
            other => Self::ALL.into_iter().find(|c| c.as_str() == other),
        }
    }

    /// Category for an un-hinted observable root of the given STIX type.
    #[must_use]
    pub fn for_observable_type(stix_type: &str) -> Option<Self> {
        match stix_type {
            "autonomous-system" => Some(Self::Asn),
            "domain-name" => Some(Self::DomainIp),
            "email-message" => Some(Self::Email),
            "file" => Some(Self::File),
            "network-traffic" => Some(Self::NetworkSocket),
            "process" => Some(Self::Process),
            "windows-registry-key" => Some(Self::RegistryKey),
            "url" => Some(Self::Url),
            "x509-certificate" => Some(Self::X509),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
