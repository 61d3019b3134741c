//! Object paths: `object-type ':' segment ('.' segment | '[' index ']')*`.

use std::fmt;

/// One step of an object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A property name, quoted or bare in the source text.
    Field(String),
    /// A list index; `None` is the `[*]` wildcard.
    Index(Option<usize>),
}

/// Parsed object path of a comparison clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    object_type: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    #[must_use]
    pub fn new(object_type: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            object_type: object_type.into(),
            segments,
        }
    }

    /// Build a path from dotted property names with no list indices.
    #[must_use]
    pub fn from_fields(object_type: &str, fields: &[&str]) -> Self {
        Self::new(
            object_type,
            fields
                .iter()
                .map(|f| Segment::Field((*f).to_string()))
                .collect(),
        )
    }

    /// The literal object-type tag before the colon.
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Property names in order, with list indices skipped.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Index(_) => None,
        })
    }

    /// Dotted property path without indices or quotes.
    #[must_use]
    pub fn property(&self) -> String {
        self.fields().collect::<Vec<_>>().join(".")
    }

    /// Qualified key used by the field tables: `<object-type>:<property>`.
    ///
    /// `email-message:to_refs[0].value` becomes `email-message:to_refs.value`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.object_type, self.property())
    }

    /// Last property name.
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.fields().last()
    }

    /// Algorithm name when the path addresses a `hashes` dictionary entry.
    #[must_use]
    pub fn hash_algorithm(&self) -> Option<&str> {
        let fields: Vec<&str> = self.fields().collect();
        match fields.as_slice() {
            [.., "hashes", algorithm] => Some(*algorithm),
            _ => None,
        }
    }

    /// Key of the enclosing `hashes` dictionary (`file:hashes` for
    /// `file:hashes.MD5`).
    #[must_use]
    pub fn hash_prefix(&self) -> Option<String> {
        self.hash_algorithm()?;
        let fields: Vec<&str> = self.fields().collect();
        Some(format!(
            "{}:{}",
            self.object_type,
            fields[..fields.len() - 1].join(".")
        ))
    }

    /// `true` for `*_ref.type` / `*_refs.type` clauses, which only name the
    /// kind of a referenced object.
    #[must_use]
    pub fn is_type_discriminator(&self) -> bool {
        let fields: Vec<&str> = self.fields().collect();
        matches!(
            fields.as_slice(),
            [.., reference, "type"] if reference.ends_with("_ref") || reference.ends_with("_refs")
        )
    }

    /// First concrete list index in the path, used to group clauses that
    /// address the same list element (`sections[2].name`).
    #[must_use]
    pub fn first_index(&self) -> Option<usize> {
        self.segments.iter().find_map(|s| match s {
            Segment::Index(index) => *index,
            Segment::Field(_) => None,
        })
    }
}

fn needs_quotes(name: &str) -> bool {
    name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.object_type)?;
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) => {
                    if position > 0 {
                        f.write_str(".")?;
                    }
                    if needs_quotes(name) {
                        write!(f, "'{name}'")?;
                    } else {
                        f.write_str(name)?;
                    }
                }
                Segment::Index(Some(index)) => write!(f, "[{index}]")?,
                Segment::Index(None) => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}
