//! Identifier quoting and normalization utilities
//! ----------------------------------------------
//! Single source of truth for de-quoting routine/parameter identifiers and
//! for deriving the sanitized names used by mangled session variables.

/// Normalize an identifier according to SQL rules:
/// - If enclosed in backticks or double-quotes, strip quotes (un-doubling any
///   embedded quote character) and preserve case
/// - Otherwise, convert to lowercase for case-insensitive matching
pub fn normalize_identifier(ident: &str) -> String {
    let trimmed = ident.trim();
    for q in ['`', '"'] {
        if trimmed.len() >= 2 && trimmed.starts_with(q) && trimmed.ends_with(q) {
            // Quoted: preserve case, strip quotes, collapse doubled quotes
            let inner = &trimmed[1..trimmed.len() - 1];
            return inner.replace(&format!("{q}{q}"), &q.to_string());
        }
    }
    trimmed.to_ascii_lowercase()
}

/// Backtick-quote an identifier, doubling any embedded backticks.
pub fn quote_identifier(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Reduce a parameter name to the character set safe for a session-variable
/// suffix: ASCII alphanumerics and underscores; everything else becomes `_`.
pub fn sanitize_for_session_var(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}
