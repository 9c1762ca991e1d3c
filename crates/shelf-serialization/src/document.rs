//! Type-free inspection of stored documents.
//!
//! Nothing here reconstructs entities, so no type registrations are needed.

use std::collections::{BTreeSet, VecDeque};

use serde_json::Value as Json;
use shelf_backend::StorageBackend;
use shelf_types::{Identifier, IDENTIFIER_KEY, REFERENCE_TYPE_TAG, TYPE_TAG_KEY};

use crate::error::Result;

/// Identifiers referenced from a document, at any depth.
pub fn references(text: &str) -> Result<BTreeSet<Identifier>> {
    let json: Json = serde_json::from_str(text)?;
    let mut out = BTreeSet::new();
    collect_references(&json, &mut out)?;
    Ok(out)
}

fn collect_references(json: &Json, out: &mut BTreeSet<Identifier>) -> Result<()> {
    match json {
        Json::Array(items) => {
            for item in items {
                collect_references(item, out)?;
            }
        }
        Json::Object(map) => {
            if map.get(TYPE_TAG_KEY).and_then(Json::as_str) == Some(REFERENCE_TYPE_TAG) {
                if let Some(id) = map.get(IDENTIFIER_KEY).and_then(Json::as_str) {
                    out.insert(Identifier::new(id)?);
                }
                return Ok(());
            }
            for value in map.values() {
                collect_references(value, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Type tag of the top-level record, if the document holds one.
pub fn document_type_tag(text: &str) -> Result<Option<String>> {
    let json: Json = serde_json::from_str(text)?;
    Ok(json
        .get(TYPE_TAG_KEY)
        .and_then(Json::as_str)
        .map(str::to_string))
}

/// Result of walking references outward from one document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceReport {
    /// Documents reached, the root included.
    pub reachable: BTreeSet<Identifier>,
    /// Referenced identifiers with no stored document.
    pub dangling: BTreeSet<Identifier>,
}

impl ReferenceReport {
    pub fn is_complete(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Follow references from `root` through `backend`.
///
/// The root itself must exist. Missing targets further out are reported as
/// dangling rather than failing the walk.
pub fn reference_closure(
    backend: &dyn StorageBackend,
    root: &Identifier,
) -> Result<ReferenceReport> {
    let mut report = ReferenceReport::default();
    let mut queue = VecDeque::from([root.clone()]);
    let mut first = true;

    while let Some(id) = queue.pop_front() {
        if report.reachable.contains(&id) || report.dangling.contains(&id) {
            continue;
        }
        let text = match backend.get(id.as_str()) {
            Ok(text) => text,
            Err(e) if e.is_not_found() && !first => {
                report.dangling.insert(id);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        first = false;
        for target in references(&text)? {
            queue.push_back(target);
        }
        report.reachable.insert(id);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerializationError;
    use shelf_backend::InMemoryBackend;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    const MAIN: &str = r##"{
        "#identifier": "main",
        "#type": "Container",
        "first": {"#identifier": "p1", "#type": "reference"},
        "second": {"#type": "Wrapper", "inner": [{"#identifier": "p2", "#type": "reference"}]}
    }"##;

    #[test]
    fn references_found_at_any_depth() {
        let refs = references(MAIN).unwrap();
        assert_eq!(refs, BTreeSet::from([id("p1"), id("p2")]));
    }

    #[test]
    fn references_of_leaf_document() {
        let refs = references(r##"{"#type": "Pulse", "n": 1}"##).unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn type_tag_of_document() {
        assert_eq!(document_type_tag(MAIN).unwrap().as_deref(), Some("Container"));
        assert_eq!(document_type_tag("[1, 2]").unwrap(), None);
        assert!(matches!(
            document_type_tag("nope").unwrap_err(),
            SerializationError::Json(_)
        ));
    }

    #[test]
    fn closure_reports_dangling_targets() {
        let backend = InMemoryBackend::new();
        backend.put("main", MAIN, false).unwrap();
        backend
            .put("p1", r##"{"#identifier": "p1", "#type": "Pulse", "n": 1}"##, false)
            .unwrap();

        let report = reference_closure(&backend, &id("main")).unwrap();
        assert_eq!(report.reachable, BTreeSet::from([id("main"), id("p1")]));
        assert_eq!(report.dangling, BTreeSet::from([id("p2")]));
        assert!(!report.is_complete());
    }

    #[test]
    fn closure_handles_cycles() {
        let backend = InMemoryBackend::new();
        backend
            .put("a", r##"{"#type": "Node", "next": {"#type": "reference", "#identifier": "b"}}"##, false)
            .unwrap();
        backend
            .put("b", r##"{"#type": "Node", "next": {"#type": "reference", "#identifier": "a"}}"##, false)
            .unwrap();

        let report = reference_closure(&backend, &id("a")).unwrap();
        assert_eq!(report.reachable.len(), 2);
        assert!(report.is_complete());
    }

    #[test]
    fn closure_root_must_exist() {
        let backend = InMemoryBackend::new();
        let err = reference_closure(&backend, &id("ghost")).unwrap_err();
        assert!(matches!(err, SerializationError::Backend(ref e) if e.is_not_found()));
    }
}
