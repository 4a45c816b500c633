//! Shell escaping and quoting utilities.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    // Characters that require quoting
    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_branch_names_stay_bare() {
        assert_eq!(quote_arg("master"), "master");
        assert_eq!(quote_arg("release/2024-06"), "release/2024-06");
    }

    #[test]
    fn metacharacters_are_quoted() {
        assert_eq!(quote_arg("feature; rm -rf /"), "'feature; rm -rf /'");
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
    }

    #[test]
    fn empty_arg_is_an_empty_word() {
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn paths_are_always_quoted() {
        assert_eq!(quote_path("/srv/shop/current"), "'/srv/shop/current'");
        assert_eq!(quote_path("/srv/bob's shop"), "'/srv/bob'\\''s shop'");
    }
}
