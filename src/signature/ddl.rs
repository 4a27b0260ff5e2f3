//! DDL Signature Extractor: recovers a routine's parameter list (and, for
//! functions, the return type) from its full creation-statement text. The
//! scan is quote- and paren-balance aware throughout; the parameter list is
//! bounded by the first top-level paren pair after the routine name, never by
//! the first `)` encountered.

use tracing::debug;

use crate::error::{CallError, CallResult};
use crate::ident::normalize_identifier;
use crate::scan::{
    find_balanced_paren, find_keyword, mask_quoted, read_token, split_top_level_commas,
    strip_sql_comments, upper_shadow,
};
use crate::signature::{Direction, ParameterDescriptor, RoutineSignature};
use crate::typespec::{parse_type_spec, Nullability};

/// Keywords that bound the return-type clause of a function body. The nearest
/// of these (or a label colon) after RETURNS ends the type text.
const RETURNS_TERMINATORS: &[&str] = &[
    "LANGUAGE",
    "DETERMINISTIC",
    "CONTAINS",
    "NO",
    "READS",
    "READ",
    "MODIFIES",
    "SQL",
    "COMMENT",
    "BEGIN",
    "RETURN",
];

/// Raw pieces pulled out of the creation statement before type parsing.
#[derive(Debug, Clone)]
pub struct ExtractedDdl {
    /// One raw declaration per parameter, in declaration order.
    pub parameter_decls: Vec<String>,
    /// Trimmed return-type text, functions only.
    pub return_type: Option<String>,
}

/// One raw parameter declaration split into its three pieces.
#[derive(Debug, Clone)]
pub struct RawParameter {
    pub direction: Direction,
    pub name: String,
    pub type_decl: String,
}

/// Extract the parameter-list declarations and (for functions) the return-type
/// text from the full creation statement.
pub fn extract(ddl: &str, is_function: bool) -> CallResult<ExtractedDdl> {
    let text = strip_sql_comments(ddl);
    let span = find_balanced_paren(&text, 0).ok_or_else(|| {
        CallError::general("ddl_parse", "no parameter list found in creation statement")
    })?;
    if !span.closed {
        return Err(CallError::general("ddl_parse", "unbalanced parens in parameter list"));
    }
    let list_text = &text[span.inner_start..span.inner_end];
    let parameter_decls: Vec<String> = split_top_level_commas(list_text)
        .into_iter()
        .filter(|seg| !seg.is_empty())
        .map(|seg| seg.to_string())
        .collect();

    let return_type = if is_function {
        Some(extract_return_type(&text, span.after)?)
    } else {
        None
    };

    Ok(ExtractedDdl { parameter_decls, return_type })
}

/// Locate `RETURNS` after the parameter list and bound the type text by the
/// nearest terminator keyword or label colon. The search runs over a
/// quote-masked shadow so terminator words or colons inside the type's own
/// literals (ENUM/SET lists, COMMENT text) never cut the clause.
fn extract_return_type(text: &str, from: usize) -> CallResult<String> {
    let shadow = upper_shadow(&mask_quoted(text));
    let returns_at = find_keyword(&shadow, "RETURNS", from)
        .ok_or_else(|| CallError::general("ddl_parse", "function DDL has no RETURNS clause"))?;
    let type_start = returns_at + "RETURNS".len();
    let tail = &shadow[type_start..];

    let mut cut: Option<usize> = None;
    for kw in RETURNS_TERMINATORS {
        if let Some(i) = find_keyword(tail, kw, 0) {
            cut = Some(cut.map(|b| b.min(i)).unwrap_or(i));
        }
    }
    if let Some(colon) = tail.find(':') {
        // A label bounds the clause at the start of the label word, not at the
        // colon itself
        let tb = tail.as_bytes();
        let mut lbl = colon;
        while lbl > 0 && (tb[lbl - 1].is_ascii_alphanumeric() || tb[lbl - 1] == b'_' || tb[lbl - 1] == b'$') {
            lbl -= 1;
        }
        cut = Some(cut.map(|b| b.min(lbl)).unwrap_or(lbl));
    }
    let cut = cut.ok_or_else(|| {
        CallError::general("ddl_parse", "no terminator found after RETURNS clause")
    })?;
    let ty = text[type_start..type_start + cut].trim();
    if ty.is_empty() {
        return Err(CallError::general("ddl_parse", "empty return type after RETURNS"));
    }
    Ok(ty.to_string())
}

/// Split one raw declaration segment into direction keyword (default IN),
/// de-quoted parameter name, and the remaining type declaration text.
pub fn split_parameter_decl(segment: &str) -> CallResult<RawParameter> {
    let (first, mut next) = read_token(segment, 0);
    if first.is_empty() {
        return Err(CallError::general("ddl_parse", "empty parameter declaration"));
    }
    let (direction, name_tok) = match Direction::from_keyword(&first) {
        Some(d) => {
            let (tok, n) = read_token(segment, next);
            next = n;
            (d, tok)
        }
        None => (Direction::In, first),
    };
    if name_tok.is_empty() {
        return Err(CallError::general(
            "ddl_parse".to_string(),
            format!("parameter declaration '{}' has no name", segment.trim()),
        ));
    }
    let type_decl = segment[next..].trim().to_string();
    if type_decl.is_empty() {
        return Err(CallError::general(
            "ddl_parse".to_string(),
            format!("parameter '{}' has no type declaration", name_tok),
        ));
    }
    Ok(RawParameter { direction, name: normalize_identifier(&name_tok), type_decl })
}

/// Build a full signature from creation-statement text.
pub fn signature_from_ddl(
    schema: &str,
    routine_name: &str,
    is_function: bool,
    ddl: &str,
) -> CallResult<RoutineSignature> {
    let extracted = extract(ddl, is_function)?;
    debug!(
        routine = routine_name,
        params = extracted.parameter_decls.len(),
        is_function,
        "parsed routine DDL"
    );
    let mut parameters: Vec<ParameterDescriptor> = Vec::with_capacity(extracted.parameter_decls.len() + 1);
    if let Some(ret) = extracted.return_type.as_deref() {
        let spec = parse_type_spec(ret, Nullability::Unknown)?;
        parameters.push(ParameterDescriptor::from_type_spec("", 0, Direction::Out, spec));
    }
    let base = parameters.len();
    for (i, seg) in extracted.parameter_decls.iter().enumerate() {
        let raw = split_parameter_decl(seg)?;
        let spec = parse_type_spec(&raw.type_decl, Nullability::Unknown)?;
        parameters.push(ParameterDescriptor::from_type_spec(raw.name, base + i, raw.direction, spec));
    }
    RoutineSignature::new(routine_name, schema, is_function, parameters, false, false)
}
