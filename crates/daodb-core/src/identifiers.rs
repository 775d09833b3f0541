//! Identifier and literal helpers.

use std::sync::OnceLock;

use regex::Regex;

/// Escape a value for use inside a single-quoted SQL literal.
///
/// Field instances never escape Varchar values themselves; callers that accept untrusted
/// text pass it through here before storing it.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Whether `name` is a plain SQL identifier, optionally schema-qualified (`schema.table`).
pub fn is_valid_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*(\.[A-Za-z_][A-Za-z0-9_$#]*)?$")
                .expect("identifier pattern is valid")
        })
        .is_match(name)
}

/// Strip every schema qualifier from a possibly qualified name.
pub fn bare_name(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, bare)| bare)
}

/// Whether a SQL fragment starts with the given keyword (case-insensitive, whole word).
pub fn starts_with_keyword(fragment: &str, keyword: &str) -> bool {
    let trimmed = fragment.trim_start();
    let Some(head) = trimmed.get(..keyword.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return false;
    }
    trimmed[keyword.len()..]
        .chars()
        .next()
        .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_literal("plain"), "plain");
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("ITEM"));
        assert!(is_valid_identifier("dbo.ORDER_LINE"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("a b"));
        assert!(!is_valid_identifier("a.b.c"));
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(bare_name("DBO.ITEM"), "ITEM");
        assert_eq!(bare_name("ITEM"), "ITEM");
    }

    #[test]
    fn test_starts_with_keyword() {
        assert!(starts_with_keyword("  ORDER BY a.price", "order"));
        assert!(starts_with_keyword("left join ORDERS o on 1=1", "left"));
        assert!(!starts_with_keyword("ordered = 1", "order"));
        assert!(!starts_with_keyword("or", "order"));
    }
}
