//! Reserved keys of the stored document format.
//!
//! A stored document is a JSON object tree. Two keys are reserved in every
//! object of that tree: the type tag, which selects the reconstruction
//! callback of an entity shape, and the identifier tag. The leading `#`
//! keeps them apart from ordinary field names of domain objects.

use crate::error::TypeError;

/// Key holding the type tag of an encoded entity.
pub const TYPE_TAG_KEY: &str = "#type";

/// Key holding the identifier of an encoded entity or reference token.
pub const IDENTIFIER_KEY: &str = "#identifier";

/// Type tag of a reference token. Never a legal tag for an entity shape.
pub const REFERENCE_TYPE_TAG: &str = "reference";

/// Returns `true` if `name` is one of the reserved document keys.
pub fn is_reserved_key(name: &str) -> bool {
    name == TYPE_TAG_KEY || name == IDENTIFIER_KEY
}

/// Check that `tag` may name an entity shape.
pub fn validate_type_tag(tag: &str) -> Result<(), TypeError> {
    if tag.is_empty() {
        return Err(TypeError::EmptyTypeTag);
    }
    if tag == REFERENCE_TYPE_TAG {
        return Err(TypeError::ReservedTypeTag(tag.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys() {
        assert!(is_reserved_key("#type"));
        assert!(is_reserved_key("#identifier"));
        assert!(!is_reserved_key("type"));
        assert!(!is_reserved_key("identifier"));
    }

    #[test]
    fn reference_tag_is_reserved() {
        assert_eq!(
            validate_type_tag("reference"),
            Err(TypeError::ReservedTypeTag("reference".into()))
        );
    }

    #[test]
    fn empty_tag_rejected() {
        assert_eq!(validate_type_tag(""), Err(TypeError::EmptyTypeTag));
    }

    #[test]
    fn ordinary_tag_accepted() {
        assert!(validate_type_tag("Pulse").is_ok());
    }
}
