//! Dereferencing of observed-data reference graphs.
//!
//! An observed-data object carries a mapping of local ids to sub-objects
//! whose `*_ref`/`*_refs` fields point at each other. The walker turns each
//! root of that graph into a [`FlatRecord`]: every field keyed by
//! `<root type>:<path>`, with references replaced by the representative
//! scalar of the target (`email-message:to_refs` becomes
//! `email-message:to_refs.value`).
//!
//! A broken reference fails the root that owns it and nothing else.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use stm_core::errors::TranslationError;
use stm_core::ids::new_synthetic_id;
use stm_core::observable::{ObservableSubObject, RawField, RawValue};

/// One dereferenced field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatField {
    /// Qualified key, `<stix-type>:<dotted path>`.
    pub key: String,
    pub value: String,
}

impl FlatField {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A root sub-object with all references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRecord {
    /// Local id of the root, or a synthetic id for lifted list elements.
    pub id: String,
    pub object_type: String,
    pub fields: Vec<FlatField>,
    /// Lifted elements of nested ordered lists (PE sections), in list order.
    pub children: Vec<FlatRecord>,
}

impl FlatRecord {
    /// Value of the first field with `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }
}

/// Result of walking every root of one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    pub records: Vec<FlatRecord>,
    /// Roots that could not be flattened, with the reason.
    pub failures: Vec<(String, TranslationError)>,
}

// ---------------------------------------------------------------------------
// ObservableWalker
// ---------------------------------------------------------------------------

pub struct ObservableWalker<'a> {
    objects: &'a BTreeMap<String, ObservableSubObject>,
}

impl<'a> ObservableWalker<'a> {
    #[must_use]
    pub const fn new(objects: &'a BTreeMap<String, ObservableSubObject>) -> Self {
        Self { objects }
    }

    /// Ids no other sub-object references, numeric ids first in numeric
    /// order.
    ///
    /// A graph where every node is referenced (a cycle) has no natural
    /// root; its first id is used so the graph is not silently dropped.
    #[must_use]
    pub fn roots(&self) -> Vec<&'a str> {
        let referenced: HashSet<String> = self
            .objects
            .values()
            .flat_map(ObservableSubObject::references)
            .collect();

        let mut roots: Vec<&'a str> = self
            .objects
            .keys()
            .map(String::as_str)
            .filter(|id| !referenced.contains(*id))
            .collect();
        if roots.is_empty() {
            roots.extend(self.objects.keys().next().map(String::as_str));
        }
        roots.sort_by(|a, b| local_id_order(a, b));
        roots
    }

    /// Flatten every root. Failures are collected per root.
    #[must_use]
    pub fn walk(&self) -> WalkOutcome {
        let mut outcome = WalkOutcome::default();
        for root in self.roots() {
            match self.flatten(root) {
                Ok(record) => outcome.records.push(record),
                Err(err) => outcome.failures.push((root.to_string(), err)),
            }
        }
        outcome
    }

    /// Flatten one sub-object, dereferencing its references one level deep.
    ///
    /// # Errors
    ///
    /// [`TranslationError::MissingReferencedSubObject`] when `id` or one of
    /// its references is absent from the graph, and
    /// [`TranslationError::UnresolvableReference`] when a referenced
    /// sub-object has no representative scalar.
    pub fn flatten(&self, id: &str) -> Result<FlatRecord, TranslationError> {
        let object = self
            .objects
            .get(id)
            .ok_or_else(|| TranslationError::MissingReferencedSubObject {
                field: "objects".to_string(),
                reference: id.to_string(),
            })?;
        let object_type = object.type_name().to_string();

        let fields = object
            .raw_fields()
            .into_iter()
            .map(|raw| self.resolve(&object_type, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let children = object
            .pe_sections()
            .iter()
            .map(|section| FlatRecord {
                id: new_synthetic_id("pe-section"),
                object_type: object_type.clone(),
                fields: section
                    .raw_fields()
                    .into_iter()
                    .filter_map(|raw| match raw.value {
                        RawValue::Scalar(value) => {
                            Some(FlatField::new(format!("{object_type}:{}", raw.path), value))
                        }
                        RawValue::Reference(_) => None,
                    })
                    .collect(),
                children: Vec::new(),
            })
            .collect();

        Ok(FlatRecord {
            id: id.to_string(),
            object_type,
            fields,
            children,
        })
    }

    fn resolve(&self, object_type: &str, raw: RawField) -> Result<FlatField, TranslationError> {
        match raw.value {
            RawValue::Scalar(value) => Ok(FlatField::new(format!("{object_type}:{}", raw.path), value)),
            RawValue::Reference(reference) => {
                let target = self.objects.get(&reference).ok_or_else(|| {
                    TranslationError::MissingReferencedSubObject {
                        field: raw.path.clone(),
                        reference: reference.clone(),
                    }
                })?;
                let (name, value) =
                    target
                        .representative()
                        .ok_or_else(|| TranslationError::UnresolvableReference {
                            field: raw.path.clone(),
                            reference: reference.clone(),
                        })?;
                Ok(FlatField::new(
                    format!("{object_type}:{}.{name}", raw.path),
                    value,
                ))
            }
        }
    }
}

/// `"2"` sorts before `"10"`; non-numeric ids follow in string order.
fn local_id_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn graph(value: serde_json::Value) -> BTreeMap<String, ObservableSubObject> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn references_resolve_to_representatives() {
        let objects = graph(json!({
            "0": {"type": "email-message", "from_ref": "1", "to_refs": ["2"], "subject": "hi"},
            "1": {"type": "email-addr", "value": "a@x.org"},
            "2": {"type": "email-addr", "value": "b@x.org"}
        }));
        let outcome = ObservableWalker::new(&objects).walk();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].fields,
            vec![
                FlatField::new("email-message:from_ref.value", "a@x.org"),
                FlatField::new("email-message:to_refs.value", "b@x.org"),
                FlatField::new("email-message:subject", "hi"),
            ]
        );
    }

    #[test]
    fn roots_use_numeric_order() {
        let objects = graph(json!({
            "10": {"type": "ipv4-addr", "value": "10.0.0.1"},
            "2": {"type": "ipv4-addr", "value": "10.0.0.2"},
            "a": {"type": "mac-addr", "value": "00:11:22:33:44:55"}
        }));
        assert_eq!(ObservableWalker::new(&objects).roots(), vec!["2", "10", "a"]);
    }

    #[test]
    fn missing_reference_fails_only_its_root() {
        let objects = graph(json!({
            "0": {"type": "network-traffic", "dst_ref": "9", "dst_port": 80},
            "1": {"type": "url", "value": "http://x.org"}
        }));
        let outcome = ObservableWalker::new(&objects).walk();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].id, "1");
        assert_eq!(
            outcome.failures,
            vec![(
                "0".to_string(),
                TranslationError::MissingReferencedSubObject {
                    field: "dst_ref".into(),
                    reference: "9".into(),
                }
            )]
        );
    }

    #[test]
    fn reference_without_representative_is_unresolvable() {
        let objects = graph(json!({
            "0": {"type": "process", "pid": 4, "child_refs": ["1"]},
            "1": {"type": "process"}
        }));
        let outcome = ObservableWalker::new(&objects).walk();
        assert!(matches!(
            outcome.failures.as_slice(),
            [(root, TranslationError::UnresolvableReference { .. })] if root == "0"
        ));
    }

    #[test]
    fn pe_sections_become_children_in_order() {
        let objects = graph(json!({
            "0": {
                "type": "file",
                "name": "a.exe",
                "extensions": {"windows-pebinary-ext": {"sections": [
                    {"name": ".text"}, {"name": ".data"}, {"name": ".rsrc"}
                ]}}
            }
        }));
        let record = ObservableWalker::new(&objects).flatten("0").unwrap();
        let names: Vec<&str> = record
            .children
            .iter()
            .filter_map(|c| c.get("file:extensions.windows-pebinary-ext.sections.name"))
            .collect();
        assert_eq!(names, vec![".text", ".data", ".rsrc"]);
        assert!(record.children.iter().all(|c| c.id.starts_with("pe-section--")));
        assert_ne!(record.children[0].id, record.children[1].id);
    }

    #[test]
    fn cycle_still_has_a_root() {
        let objects = graph(json!({
            "0": {"type": "process", "pid": 1, "parent_ref": "1"},
            "1": {"type": "process", "pid": 2, "parent_ref": "0"}
        }));
        let walker = ObservableWalker::new(&objects);
        assert_eq!(walker.roots(), vec!["0"]);
        assert_eq!(walker.walk().records[0].get("process:parent_ref.pid"), Some("2"));
    }
}
