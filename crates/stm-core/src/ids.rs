//! Identifier generation for created output objects and synthetic records.

use uuid::Uuid;

/// Fresh identifier for an output object.
///
/// Random v4 ids are never reused within (or across) runs.
#[must_use]
pub fn new_object_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Fresh identifier for a synthetic sub-record lifted out of a nested list.
#[must_use]
pub fn new_synthetic_id(prefix: &str) -> String {
    format!("{prefix}--{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn object_uuids_do_not_repeat() {
        let ids: HashSet<Uuid> = (0..256).map(|_| new_object_uuid()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn synthetic_ids_carry_prefix() {
        let id = new_synthetic_id("pe-section");
        assert!(id.starts_with("pe-section--"));
        assert_ne!(id, new_synthetic_id("pe-section"));
    }
}
