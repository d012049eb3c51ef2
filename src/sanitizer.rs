//! Identifier Sanitizer
//!
//! Turns display names into Terraform-safe local names. The output is
//! deterministic but not unique; uniqueness of exported resources is keyed on
//! `(kind, id)` and label collisions are handled by the registry.

/// Character substituted for anything outside `[A-Za-z0-9]`
pub const FILLER: char = '_';

/// Lower-case `name` and replace every character outside `[A-Za-z0-9]` with
/// [`FILLER`]. Idempotent, and keeps one output char per input char.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { FILLER })
        .collect()
}

/// Absent names sanitize to the empty string
pub fn sanitize_optional(name: Option<&str>) -> String {
    name.map(sanitize_name).unwrap_or_default()
}

/// Lower-case `name` and drop every character outside `[A-Za-z0-9_]`.
///
/// Used for variable names where the filler would read badly. Distinct
/// inputs may collide ("a-b" and "ab").
pub fn sanitize_strict(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_alphanumeric() || *c == FILLER)
        .collect()
}

/// Build a block label such as `environment_production`
pub fn resource_label(prefix: &str, name: &str) -> String {
    let sanitized = sanitize_name(name);
    if prefix.is_empty() {
        sanitized
    } else if sanitized.is_empty() {
        prefix.to_string()
    } else {
        format!("{}{}{}", prefix, FILLER, sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_punctuation() {
        assert_eq!(sanitize_name("My Project (v2)"), "my_project__v2_");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize_name("Deploy: Web/API");
        assert_eq!(sanitize_name(&once), once);
    }

    #[test]
    fn test_sanitize_absent_is_empty() {
        assert_eq!(sanitize_optional(None), "");
        assert_eq!(sanitize_optional(Some("AWS")), "aws");
    }

    #[test]
    fn test_sanitize_never_empty_for_non_empty_input() {
        assert_eq!(sanitize_name("!!!"), "___");
    }

    #[test]
    fn test_sanitize_non_ascii_is_filled_per_char() {
        assert_eq!(sanitize_name("Café"), "caf_");
    }

    #[test]
    fn test_strict_drops_characters() {
        assert_eq!(sanitize_strict("Secret-Key.Value"), "secretkeyvalue");
        assert_eq!(sanitize_strict("already_ok"), "already_ok");
    }

    #[test]
    fn test_resource_label() {
        assert_eq!(resource_label("environment", "Production"), "environment_production");
        assert_eq!(resource_label("", "Production"), "production");
        assert_eq!(resource_label("feed", ""), "feed");
    }
}
