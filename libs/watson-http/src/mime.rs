//! Content-type classification used for body dispatch.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static JSON_MIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^application/((json)|(merge-patch\+json))(;.*)?$")
        .case_insensitive(true)
        .build()
        .expect("static regex should not panic")
});

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static JSON_PATCH_MIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^application/json-patch\+json(;.*)?$")
        .case_insensitive(true)
        .build()
        .expect("static regex should not panic")
});

/// Returns `true` for `application/json` and `application/merge-patch+json`,
/// with optional parameters after `;`. Matching is case-insensitive.
#[must_use]
pub fn is_json_mime_type(mime_type: &str) -> bool {
    !mime_type.is_empty() && JSON_MIME_PATTERN.is_match(mime_type)
}

/// Returns `true` for `application/json-patch+json`, with optional parameters.
#[must_use]
pub fn is_json_patch_mime_type(mime_type: &str) -> bool {
    !mime_type.is_empty() && JSON_PATCH_MIME_PATTERN.is_match(mime_type)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn json_mime_types() {
        assert!(is_json_mime_type("application/json"));
        assert!(is_json_mime_type("APPLICATION/JSON"));
        assert!(is_json_mime_type("application/json;charset=utf-8"));
        assert!(is_json_mime_type("application/merge-patch+json"));
        assert!(is_json_mime_type("Application/Merge-Patch+JSON; charset=utf-8"));
    }

    #[test]
    fn json_patch_is_not_plain_json() {
        assert!(!is_json_mime_type("application/json-patch+json"));
        assert!(is_json_patch_mime_type("application/json-patch+json"));
        assert!(is_json_patch_mime_type("APPLICATION/JSON-PATCH+JSON;charset=utf-8"));
        assert!(!is_json_patch_mime_type("application/json"));
    }

    #[test]
    fn empty_and_malformed_inputs_are_rejected() {
        assert!(!is_json_mime_type(""));
        assert!(!is_json_patch_mime_type(""));
        assert!(!is_json_mime_type("json"));
        assert!(!is_json_mime_type("text/json"));
        assert!(!is_json_mime_type(" application/json"));
        assert!(!is_json_mime_type("application/jsonx"));
        assert!(!is_json_patch_mime_type("application/json-patch+jsonx"));
    }
}
