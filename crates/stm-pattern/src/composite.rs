//! Composite attribute values spread over several clauses.
//!
//! Exporters write a two-part attribute such as `filename|md5` as one clause
//! per part. [`CompositeRules::collapse`] puts the parts back together and
//! [`CompositeRules::encode`] writes them out again.
//!
//! Groups are picked by the object-type tag of the first significant clause
//! and then by the member keys of the remaining clauses; collapsing never
//! looks at values. Encoding an `ip-src|port` or `ip-dst|port` value is the
//! one place a value is read: the address syntax picks the `*_ref.type`
//! discriminator (`ipv6-addr` for IPv6, `ipv4-addr` otherwise).

use std::fmt;
use std::net::IpAddr;

use stm_core::mapping::hash_attribute_type;

use crate::error::PatternError;
use crate::grammar::{Clause, Joiner, Pattern};
use crate::path::{FieldPath, Segment};

/// Most clauses a composite pattern may carry, discriminators included.
const MAX_COMPOSITE_CLAUSES: usize = 3;

// ---------------------------------------------------------------------------
// CompositeGroup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeGroup {
    FilenameHash,
    DomainIp,
    HostnamePort,
    IpSrcPort,
    IpDstPort,
    RegkeyValue,
}

impl CompositeGroup {
    pub const ALL: [Self; 6] = [
        Self::FilenameHash,
        Self::DomainIp,
        Self::HostnamePort,
        Self::IpSrcPort,
        Self::IpDstPort,
        Self::RegkeyValue,
    ];

    /// Group name; `filename|hash` stands for every `filename|<hash>` type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilenameHash => "filename|hash",
            Self::DomainIp => "domain|ip",
            Self::HostnamePort => "hostname|port",
            Self::IpSrcPort => "ip-src|port",
            Self::IpDstPort => "ip-dst|port",
            Self::RegkeyValue => "regkey|value",
        }
    }

    /// Object-type tag the first clause of the group carries.
    #[must_use]
    pub const fn object_type(self) -> &'static str {
        match self {
            Self::FilenameHash => "file",
            Self::DomainIp | Self::HostnamePort => "domain-name",
            Self::IpSrcPort | Self::IpDstPort => "network-traffic",
            Self::RegkeyValue => "windows-registry-key",
        }
    }

    /// Member keys in value order. `file:hashes` matches any algorithm.
    #[must_use]
    pub const fn member_keys(self) -> [&'static str; 2] {
        match self {
            Self::FilenameHash => ["file:name", "file:hashes"],
            Self::DomainIp => ["domain-name:value", "domain-name:resolves_to_refs.value"],
            Self::HostnamePort => ["domain-name:value", "network-traffic:dst_port"],
            Self::IpSrcPort => ["network-traffic:src_ref.value", "network-traffic:src_port"],
            Self::IpDstPort => ["network-traffic:dst_ref.value", "network-traffic:dst_port"],
            Self::RegkeyValue => ["windows-registry-key:key", "windows-registry-key:values.data"],
        }
    }

    fn member_index(self, clause: &Clause) -> Option<usize> {
        let key = clause
            .path
            .hash_prefix()
            .unwrap_or_else(|| clause.path.key());
        self.member_keys().iter().position(|member| *member == key)
    }

    /// Attribute type for a match. Only `filename|hash` depends on the clauses.
    fn attribute_type(self, clauses: &[&Clause]) -> Option<String> {
        match self {
            Self::FilenameHash => {
                let algorithm = clauses.iter().find_map(|c| c.path.hash_algorithm())?;
                Some(format!("filename|{}", hash_attribute_type(algorithm)?))
            }
            other => Some(other.as_str().to_string()),
        }
    }

    /// Group a composite attribute type belongs to (`filename|sha1` is
    /// [`Self::FilenameHash`]).
    #[must_use]
    pub fn for_attribute_type(attribute_type: &str) -> Option<Self> {
        Self::from_attribute_type(attribute_type).map(|(group, _)| group)
    }

    /// Group and hash type named by a composite attribute type.
    fn from_attribute_type(attribute_type: &str) -> Option<(Self, Option<&str>)> {
        if let Some(hash) = attribute_type.strip_prefix("filename|") {
            return (hash_attribute_type(hash) == Some(hash)).then_some((Self::FilenameHash, Some(hash)));
        }
        Self::ALL
            .into_iter()
            .find(|g| *g != Self::FilenameHash && g.as_str() == attribute_type)
            .map(|g| (g, None))
    }

    fn encode_clauses(self, first: &str, second: &str, hash: Option<&str>) -> Vec<Clause> {
        match self {
            Self::FilenameHash => {
                let algorithm = hash.unwrap_or("md5").to_ascii_uppercase();
                vec![
                    Clause::equal(FieldPath::from_fields("file", &["name"]), first),
                    Clause::equal(FieldPath::from_fields("file", &["hashes", algorithm.as_str()]), second),
                ]
            }
            Self::DomainIp => vec![
                Clause::equal(FieldPath::from_fields("domain-name", &["value"]), first),
                Clause::equal(
                    FieldPath::new(
                        "domain-name",
                        vec![
                            Segment::Field("resolves_to_refs".into()),
                            Segment::Index(None),
                            Segment::Field("value".into()),
                        ],
                    ),
                    second,
                ),
            ],
            Self::HostnamePort => vec![
                Clause::equal(FieldPath::from_fields("domain-name", &["value"]), first),
                Clause::equal(FieldPath::from_fields("network-traffic", &["dst_port"]), second),
            ],
            Self::RegkeyValue => vec![
                Clause::equal(FieldPath::from_fields("windows-registry-key", &["key"]), first),
                Clause::equal(
                    FieldPath::new(
                        "windows-registry-key",
                        vec![
                            Segment::Field("values".into()),
                            Segment::Index(Some(0)),
                            Segment::Field("data".into()),
                        ],
                    ),
                    second,
                ),
            ],
            Self::IpSrcPort | Self::IpDstPort => {
                let side = if self == Self::IpSrcPort { "src" } else { "dst" };
                let reference = format!("{side}_ref");
                let address_type = match first.parse::<IpAddr>() {
                    Ok(IpAddr::V6(_)) => "ipv6-addr",
                    _ => "ipv4-addr",
                };
                vec![
                    Clause::equal(
                        FieldPath::from_fields("network-traffic", &[format!("{side}_port").as_str()]),
                        second,
                    ),
                    Clause::equal(
                        FieldPath::from_fields("network-traffic", &[reference.as_str(), "type"]),
                        address_type,
                    ),
                    Clause::equal(
                        FieldPath::from_fields("network-traffic", &[reference.as_str(), "value"]),
                        first,
                    ),
                ]
            }
        }
    }
}

impl fmt::Display for CompositeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Collapse results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeValue {
    pub group: CompositeGroup,
    /// Concrete attribute type, e.g. `filename|sha256`.
    pub attribute_type: String,
    pub value: String,
}

/// One value read out of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collapsed {
    /// Exactly one significant clause.
    Single { key: String, value: String },
    Composite(CompositeValue),
}

impl Collapsed {
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Single { value, .. } => value,
            Self::Composite(composite) => &composite.value,
        }
    }
}

// ---------------------------------------------------------------------------
// CompositeRules
// ---------------------------------------------------------------------------

/// Collapse and encode composite values with a fixed separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeRules {
    separator: String,
}

impl Default for CompositeRules {
    fn default() -> Self {
        Self::new("|")
    }
}

impl CompositeRules {
    #[must_use]
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Read one value out of `pattern`.
    ///
    /// Discriminator clauses are dropped first. One remaining clause yields
    /// its value; two `AND`-joined clauses yield the joined value of the
    /// group they form.
    ///
    /// # Errors
    ///
    /// [`PatternError::Alternatives`] for `OR` patterns with several clauses,
    /// [`PatternError::NoCompositeGroup`] for any other shape.
    pub fn collapse(&self, pattern: &Pattern) -> Result<Collapsed, PatternError> {
        let significant: Vec<&Clause> = pattern.significant_clauses().collect();

        if let [only] = significant.as_slice() {
            return Ok(Collapsed::Single {
                key: only.key(),
                value: only.value.as_value(),
            });
        }
        if pattern.joiner == Joiner::Or {
            return Err(PatternError::Alternatives(pattern.clauses.len()));
        }
        let no_group = PatternError::NoCompositeGroup {
            clauses: pattern.clauses.len(),
        };
        if pattern.clauses.len() > MAX_COMPOSITE_CLAUSES || significant.len() != 2 {
            return Err(no_group);
        }

        let tag = significant[0].path.object_type();
        for group in CompositeGroup::ALL.into_iter().filter(|g| g.object_type() == tag) {
            let mut parts: [Option<String>; 2] = [None, None];
            for clause in &significant {
                if let Some(slot) = group.member_index(clause) {
                    parts[slot] = Some(clause.value.as_value());
                }
            }
            let [Some(first), Some(second)] = parts else {
                continue;
            };
            let Some(attribute_type) = group.attribute_type(&significant) else {
                continue;
            };
            return Ok(Collapsed::Composite(CompositeValue {
                group,
                attribute_type,
                value: format!("{first}{}{second}", self.separator),
            }));
        }
        Err(no_group)
    }

    /// Write a composite attribute as a pattern string.
    ///
    /// # Errors
    ///
    /// [`PatternError::UnknownComposite`] when `attribute_type` names no group,
    /// [`PatternError::MalformedComposite`] when `value` does not split into
    /// two non-empty parts.
    pub fn encode(&self, attribute_type: &str, value: &str) -> Result<String, PatternError> {
        let (group, hash) = CompositeGroup::from_attribute_type(attribute_type)
            .ok_or_else(|| PatternError::UnknownComposite(attribute_type.to_string()))?;
        let malformed = || PatternError::MalformedComposite {
            attribute_type: attribute_type.to_string(),
            value: value.to_string(),
        };
        let (first, second) = value.split_once(self.separator.as_str()).ok_or_else(malformed)?;
        if first.is_empty() || second.is_empty() || second.contains(self.separator.as_str()) {
            return Err(malformed());
        }

        let pattern = Pattern {
            joiner: Joiner::And,
            clauses: group.encode_clauses(first, second, hash),
        };
        Ok(pattern.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse;
    use pretty_assertions::assert_eq;

    fn collapse(text: &str) -> Result<Collapsed, PatternError> {
        CompositeRules::default().collapse(&parse(text).unwrap())
    }

    #[test]
    fn filename_hash_uses_declared_order() {
        let collapsed = collapse("[file:hashes.MD5 = 'aaa' AND file:name = 'x.exe']").unwrap();
        assert_eq!(
            collapsed,
            Collapsed::Composite(CompositeValue {
                group: CompositeGroup::FilenameHash,
                attribute_type: "filename|md5".into(),
                value: "x.exe|aaa".into(),
            })
        );
    }

    #[test]
    fn three_clause_form_yields_third_then_first() {
        let collapsed = collapse(
            "[network-traffic:dst_port = '8080' AND network-traffic:dst_ref.type = 'ipv4-addr' AND network-traffic:dst_ref.value = '10.0.0.1']",
        )
        .unwrap();
        assert_eq!(collapsed.value(), "10.0.0.1|8080");
        let Collapsed::Composite(composite) = collapsed else {
            panic!("expected a composite");
        };
        assert_eq!(composite.attribute_type, "ip-dst|port");
    }

    #[test]
    fn discriminator_with_one_value_is_single() {
        let collapsed = collapse(
            "[network-traffic:src_ref.type = 'ipv6-addr' AND network-traffic:src_ref.value = '::1']",
        )
        .unwrap();
        assert_eq!(
            collapsed,
            Collapsed::Single {
                key: "network-traffic:src_ref.value".into(),
                value: "::1".into(),
            }
        );
    }

    #[test]
    fn hostname_and_domain_groups_share_a_tag() {
        assert_eq!(
            collapse("[domain-name:value = 'example.org' AND network-traffic:dst_port = '443']")
                .unwrap()
                .value(),
            "example.org|443"
        );
        assert_eq!(
            collapse("[domain-name:value = 'example.org' AND domain-name:resolves_to_refs[*].value = '1.2.3.4']")
                .unwrap()
                .value(),
            "example.org|1.2.3.4"
        );
    }

    #[test]
    fn registry_key_and_value_join() {
        let collapsed = collapse(
            "[windows-registry-key:key = 'HKLM\\\\Run' AND windows-registry-key:values[0].data = 'evil.exe']",
        )
        .unwrap();
        assert_eq!(collapsed.value(), "HKLM\\Run|evil.exe");
        let Collapsed::Composite(composite) = collapsed else {
            panic!("expected a composite");
        };
        assert_eq!(composite.group, CompositeGroup::RegkeyValue);
        assert_eq!(composite.attribute_type, "regkey|value");
    }

    #[test]
    fn first_clause_tag_selects_the_group() {
        let err =
            collapse("[network-traffic:dst_port = '443' AND domain-name:value = 'example.org']")
                .unwrap_err();
        assert_eq!(err, PatternError::NoCompositeGroup { clauses: 2 });
    }

    #[test]
    fn unsupported_shapes() {
        assert_eq!(
            collapse("[file:hashes.MD5 = 'x' OR file:hashes.SHA1 = 'y']").unwrap_err(),
            PatternError::Alternatives(2)
        );
        assert!(matches!(
            collapse("[file:name = 'a' AND file:size = 1 AND file:mime_type = 'b' AND file:name_enc = 'c']"),
            Err(PatternError::NoCompositeGroup { clauses: 4 })
        ));
        assert!(collapse("[file:name = 'a' AND file:name = 'b']").is_err());
    }

    #[test]
    fn custom_separator_is_used_both_ways() {
        let rules = CompositeRules::new("||");
        let encoded = rules.encode("domain|ip", "example.org||1.2.3.4").unwrap();
        let collapsed = rules.collapse(&parse(&encoded).unwrap()).unwrap();
        assert_eq!(collapsed.value(), "example.org||1.2.3.4");
    }

    #[test]
    fn encode_rejects_bad_input() {
        let rules = CompositeRules::default();
        assert!(matches!(
            rules.encode("ip-dst", "1.2.3.4|80"),
            Err(PatternError::UnknownComposite(_))
        ));
        assert!(matches!(
            rules.encode("filename|md5", "no-separator"),
            Err(PatternError::MalformedComposite { .. })
        ));
        assert!(matches!(
            rules.encode("filename|crc32", "a|b"),
            Err(PatternError::UnknownComposite(_))
        ));
    }

    #[test]
    fn attribute_types_name_their_group() {
        assert_eq!(
            CompositeGroup::for_attribute_type("filename|sha256"),
            Some(CompositeGroup::FilenameHash)
        );
        assert_eq!(
            CompositeGroup::for_attribute_type("ip-src|port"),
            Some(CompositeGroup::IpSrcPort)
        );
        assert_eq!(
            CompositeGroup::for_attribute_type("regkey|value"),
            Some(CompositeGroup::RegkeyValue)
        );
        assert_eq!(
            CompositeGroup::for_attribute_type("filename|impfuzzy"),
            Some(CompositeGroup::FilenameHash)
        );
        assert_eq!(CompositeGroup::for_attribute_type("filename|crc32"), None);
        assert_eq!(CompositeGroup::for_attribute_type("ip-dst"), None);
    }
}
