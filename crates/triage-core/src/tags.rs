//! Tag catalog used by the portal.
//!
//! Tags are categorical and independent of tier: a tier is derived from
//! tag semantics plus subject content, not looked up from the tag.

/// Sentinel code for messages that have not been labelled.
pub const UNLABELED_TAG: &str = "00";

/// Human name of the sentinel tag.
pub const UNLABELED_TAG_NAME: &str = "NO ETIQUETADOS";

/// Known tag codes and names, in code order.
pub const TAGS: &[(&str, &str)] = &[
    (UNLABELED_TAG, UNLABELED_TAG_NAME),
    ("10", "VALORES"),
    ("11", "RESOLUCIONES DE COBRANZAS"),
    ("13", "RESOLUCIONES NO CONTENCIOSAS"),
    ("14", "RESOLUCIONES DE FISCALIZACION"),
    ("15", "RESOLUCIONES ANTERIORES"),
    ("16", "AVISOS"),
];

/// Look up the name of a known tag code.
pub fn tag_name(code: &str) -> Option<&'static str> {
    TAGS.iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Whether the code belongs to the catalog.
pub fn is_known(code: &str) -> bool {
    tag_name(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(tag_name("11"), Some("RESOLUCIONES DE COBRANZAS"));
        assert_eq!(tag_name("00"), Some(UNLABELED_TAG_NAME));
        assert_eq!(tag_name("12"), None);
        assert!(is_known("16"));
        assert!(!is_known(""));
    }
}
