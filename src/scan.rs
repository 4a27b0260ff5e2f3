//! Quote- and parenthesis-aware text scanning helpers shared by the DDL
//! extractor, the placeholder mapper and the emulator. All helpers treat
//! single-quoted and double-quoted strings (with backslash and doubled-quote
//! escapes) and backtick-quoted identifiers as opaque.

/// Build an uppercase "shadow" string used only for keyword scanning.
/// - Converts ASCII letters to uppercase
/// - Replaces newlines (\n, \r) with a single space to keep clause cuts stable
/// - Preserves overall length to keep indices aligned with the original input
pub fn upper_shadow(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch.to_ascii_uppercase()),
        }
    }
    out
}

#[derive(Clone, Copy, Default)]
struct QuoteState {
    in_squote: bool,
    in_dquote: bool,
    in_btick: bool,
}

impl QuoteState {
    fn quoted(&self) -> bool {
        self.in_squote || self.in_dquote || self.in_btick
    }

    /// Advance over one byte. Returns the number of bytes consumed (1, or 2
    /// when a backslash escape inside a string literal swallows the next byte).
    fn step(&mut self, bytes: &[u8], i: usize) -> usize {
        let ch = bytes[i] as char;
        if (self.in_squote || self.in_dquote) && ch == '\\' && i + 1 < bytes.len() {
            return 2;
        }
        match ch {
            '\'' if !self.in_dquote && !self.in_btick => self.in_squote = !self.in_squote,
            '"' if !self.in_squote && !self.in_btick => self.in_dquote = !self.in_dquote,
            '`' if !self.in_squote && !self.in_dquote => self.in_btick = !self.in_btick,
            _ => {}
        }
        1
    }
}

/// Strip SQL comments from the input while preserving content inside string
/// literals and quoted identifiers. Supported comment styles:
/// - Line comments starting with `--` or `#` until end of line
/// - Block comments delimited by `/* ... */` (nesting handled)
/// Newlines inside comments are preserved to keep offsets usable.
pub fn strip_sql_comments(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0usize;
    // Kept text is copied in whole segments; comment delimiters are ASCII, so
    // segment boundaries always land on char boundaries.
    let mut seg_start = 0usize;
    let mut q = QuoteState::default();
    let mut block_depth: i32 = 0;
    let mut line_comment = false;

    while i < bytes.len() {
        let b = bytes[i];

        if line_comment {
            if b == b'\n' || b == b'\r' {
                out.push(b as char);
                line_comment = false;
                seg_start = i + 1;
            }
            i += 1;
            continue;
        }

        if block_depth > 0 {
            if b == b'\n' || b == b'\r' {
                out.push(b as char);
                i += 1;
                continue;
            }
            if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
                block_depth += 1;
                i += 2;
                continue;
            }
            if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                block_depth -= 1;
                i += 2;
                if block_depth == 0 {
                    seg_start = i;
                }
                continue;
            }
            i += 1;
            continue;
        }

        if !q.quoted() {
            if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
                out.push_str(&input[seg_start..i]);
                line_comment = true;
                i += 2;
                continue;
            }
            if b == b'#' {
                out.push_str(&input[seg_start..i]);
                line_comment = true;
                i += 1;
                continue;
            }
            if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
                out.push_str(&input[seg_start..i]);
                block_depth = 1;
                i += 2;
                continue;
            }
        }

        i += q.step(bytes, i);
    }

    if !line_comment && block_depth == 0 {
        out.push_str(&input[seg_start..]);
    }
    out
}

/// Same-length copy of the input with every byte of quoted regions (the quote
/// characters included) replaced by a space. Keyword and punctuation searches
/// over the mask can never match inside string literals or quoted
/// identifiers, and byte offsets stay aligned with the original.
pub fn mask_quoted(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut q = QuoteState::default();
    let mut i = 0usize;
    while i < bytes.len() {
        let was_quoted = q.quoted();
        let step = q.step(bytes, i);
        let masked = was_quoted || q.quoted();
        for k in 0..step {
            out.push(if masked { b' ' } else { bytes[i + k] });
        }
        i += step;
    }
    // Quoted regions begin and end on ASCII quote bytes, so the unmasked
    // remainder is still valid UTF-8
    String::from_utf8_lossy(&out).into_owned()
}

/// Locate the first top-level `(` at or after `from` and scan forward tracking
/// paren depth (quote-aware) until depth returns to zero. Returns the byte
/// range of the inner text (exclusive of both parens) and the index just past
/// the closing paren. `None` when no opening paren exists; an opening paren
/// without a balancing close yields `Some` with `closed = false`.
pub struct ParenSpan {
    pub inner_start: usize,
    pub inner_end: usize,
    pub after: usize,
    pub closed: bool,
}

pub fn find_balanced_paren(s: &str, from: usize) -> Option<ParenSpan> {
    let bytes = s.as_bytes();
    let mut q = QuoteState::default();
    let mut i = from.min(bytes.len());
    // Seek the opening paren outside quotes
    let open = loop {
        if i >= bytes.len() {
            return None;
        }
        if !q.quoted() && bytes[i] as char == '(' {
            break i;
        }
        i += q.step(bytes, i);
    };
    let mut depth = 0i32;
    let mut q = QuoteState::default();
    let mut i = open;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        if !q.quoted() {
            if ch == '(' {
                depth += 1;
            } else if ch == ')' {
                depth -= 1;
                if depth == 0 {
                    return Some(ParenSpan { inner_start: open + 1, inner_end: i, after: i + 1, closed: true });
                }
            }
        }
        i += q.step(bytes, i);
    }
    Some(ParenSpan { inner_start: open + 1, inner_end: bytes.len(), after: bytes.len(), closed: false })
}

/// Split `s` on commas at paren depth zero, ignoring commas inside quoted
/// regions. Segments are trimmed; an empty input yields no segments.
pub fn split_top_level_commas(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut out: Vec<&str> = Vec::new();
    let mut q = QuoteState::default();
    let mut depth = 0i32;
    let mut seg_start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        if !q.quoted() {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                ',' if depth == 0 => {
                    out.push(s[seg_start..i].trim());
                    seg_start = i + 1;
                    i += 1;
                    continue;
                }
                _ => {}
            }
        }
        i += q.step(bytes, i);
    }
    out.push(s[seg_start..].trim());
    // A lone empty segment means the list itself was empty
    if out.len() == 1 && out[0].is_empty() {
        out.clear();
    }
    out
}

/// Count `?` markers outside quoted regions. Comments are expected to be
/// stripped by the caller when they may contain `?`.
pub fn count_placeholders(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut q = QuoteState::default();
    let mut n = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if !q.quoted() && bytes[i] as char == '?' {
            n += 1;
        }
        i += q.step(bytes, i);
    }
    n
}

/// Find a keyword as a whole word in an uppercase shadow, at or after `from`.
/// Word boundaries are non-alphanumeric/non-underscore characters.
pub fn find_keyword(shadow: &str, keyword: &str, from: usize) -> Option<usize> {
    let bytes = shadow.as_bytes();
    let kw = keyword.as_bytes();
    let mut i = from;
    while i + kw.len() <= bytes.len() {
        if &bytes[i..i + kw.len()] == kw {
            let left_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let right_ok = i + kw.len() == bytes.len() || !is_word_byte(bytes[i + kw.len()]);
            if left_ok && right_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Read one token starting at `start`: a quoted identifier (backtick or
/// double-quote, consumed through its closing quote) or a run of non-space,
/// non-paren characters. Returns the token and the index past it.
pub fn read_token(s: &str, start: usize) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return (String::new(), i);
    }
    let ch = bytes[i] as char;
    if ch == '`' || ch == '"' {
        let quote = ch;
        let mut j = i + 1;
        while j < bytes.len() {
            if bytes[j] as char == quote {
                // Doubled quote stays inside the token
                if j + 1 < bytes.len() && bytes[j + 1] as char == quote {
                    j += 2;
                    continue;
                }
                return (s[i..=j].to_string(), j + 1);
            }
            j += 1;
        }
        return (s[i..].to_string(), bytes.len());
    }
    let mut j = i;
    while j < bytes.len() {
        let c = bytes[j] as char;
        if c.is_ascii_whitespace() || c == '(' || c == ')' {
            break;
        }
        j += 1;
    }
    (s[i..j].to_string(), j)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_stripped_quotes_preserved() {
        let sql = "CALL p('a -- not a comment', /* gone */ 2) -- tail";
        let out = strip_sql_comments(sql);
        assert!(out.contains("-- not a comment"));
        assert!(!out.contains("gone"));
        assert!(!out.contains("tail"));
    }

    #[test]
    fn hash_line_comment() {
        let out = strip_sql_comments("SELECT 1 # trailing\n+ 2");
        assert!(!out.contains("trailing"));
        assert!(out.contains("+ 2"));
    }

    #[test]
    fn nested_block_comments() {
        let out = strip_sql_comments("/* outer /* inner */ still */ CALL p()");
        assert_eq!(out.trim(), "CALL p()");
    }

    #[test]
    fn multibyte_text_survives_comment_stripping() {
        let out = strip_sql_comments("CALL p('café', 'über') -- naïve");
        assert_eq!(out, "CALL p('café', 'über') ");
        let out2 = strip_sql_comments("SELECT 'ε' /* π */ + δ");
        assert_eq!(out2, "SELECT 'ε'  + δ");
    }

    #[test]
    fn mask_replaces_quoted_regions_with_spaces() {
        assert_eq!(mask_quoted("a 'b:c' d"), "a       d");
        assert_eq!(mask_quoted("ENUM('no','yes') X"), "ENUM(    ,     ) X");
        // Byte offsets stay aligned even through multibyte literals
        let s = "x 'é' RETURN";
        let masked = mask_quoted(s);
        assert_eq!(masked.len(), s.len());
        assert_eq!(find_keyword(&masked, "RETURN", 0), s.find("RETURN"));
    }

    #[test]
    fn balanced_paren_spans_nested() {
        let s = "CALL p(f(1, 2), 'a)b', 3) tail";
        let span = find_balanced_paren(s, 0).unwrap();
        assert!(span.closed);
        assert_eq!(&s[span.inner_start..span.inner_end], "f(1, 2), 'a)b', 3");
        assert_eq!(&s[span.after..], " tail");
    }

    #[test]
    fn unbalanced_paren_reported_open() {
        let span = find_balanced_paren("CALL p(1, (2", 0).unwrap();
        assert!(!span.closed);
    }

    #[test]
    fn split_respects_quotes_and_parens() {
        let parts = split_top_level_commas("a, f(1,2), 'x,y', `c,d`");
        assert_eq!(parts, vec!["a", "f(1,2)", "'x,y'", "`c,d`"]);
    }

    #[test]
    fn split_empty_list() {
        assert!(split_top_level_commas("   ").is_empty());
    }

    #[test]
    fn placeholder_counting_ignores_quoted() {
        assert_eq!(count_placeholders("?, '?', `?`, CONCAT(?, ?)"), 3);
        assert_eq!(count_placeholders("no markers"), 0);
    }

    #[test]
    fn backslash_escape_inside_string() {
        // The escaped quote does not terminate the literal
        assert_eq!(count_placeholders(r"'it\'s ?', ?"), 1);
    }

    #[test]
    fn keyword_word_boundaries() {
        let shadow = upper_shadow("returns int return x");
        assert_eq!(find_keyword(&shadow, "RETURNS", 0), Some(0));
        assert_eq!(find_keyword(&shadow, "RETURN", 1), Some(12));
        assert_eq!(find_keyword(&shadow, "URNS", 0), None);
    }

    #[test]
    fn token_reading() {
        let (tok, next) = read_token("  `odd name` INT", 0);
        assert_eq!(tok, "`odd name`");
        let (tok2, _) = read_token("  `odd name` INT", next);
        assert_eq!(tok2, "INT");
    }
}
