//! Signature Resolution Orchestrator: picks catalog vs. DDL-parsing vs.
//! synthetic-fallback strategy per call, and fronts the whole pipeline with
//! the shared signature cache. Strategy choice is a per-call decision
//! returning the one uniform `RoutineSignature` shape; no dynamic dispatch.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::cache::SignatureCache;
use crate::config::CallConfig;
use crate::error::{CallError, CallResult};
use crate::exec::Connection;
use crate::ident::quote_identifier;
use crate::scan::{count_placeholders, strip_sql_comments};
use crate::signature::catalog::resolve_via_catalog;
use crate::signature::ddl::signature_from_ddl;
use crate::signature::{Direction, ParameterDescriptor, RoutineSignature};

/// Text that genuinely invokes a routine: a CALL statement (optionally inside
/// a JDBC-style escape with a return placeholder) or a SELECT over a function.
static CALL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?ix) ^ \s* (?: \{ \s* (?: \? \s* = \s* )? )? call \b | ^ \s* select \s+ [\w`"]+ \s* \("#)
        .expect("call pattern")
});

/// Does the raw call text look like a genuine CALL/function invocation?
pub fn looks_like_routine_call(call_text: &str) -> bool {
    CALL_PATTERN.is_match(call_text)
}

/// Resolve a routine's signature, choosing the strategy per configuration and
/// query outcomes:
/// 1. restricted catalog access -> straight to DDL parsing;
/// 2. otherwise the parameter catalog, when it has rows;
/// 3. otherwise fetch and parse the creation DDL;
/// 4. when the DDL fetch fails and the text does not look like a genuine call
///    (or the relaxed flag allows it), fabricate a synthetic signature.
/// Transport failures propagate unmodified; retry is the connection layer's
/// concern.
pub fn resolve(
    conn: &Connection,
    config: &CallConfig,
    schema: &str,
    routine_name: &str,
    is_function: bool,
    call_text: &str,
) -> CallResult<RoutineSignature> {
    if !config.restricted_catalog_access {
        match resolve_via_catalog(conn, schema, routine_name, is_function, None)? {
            Some(sig) => return Ok(sig),
            None => debug!(schema, routine = routine_name, "catalog empty, falling back to DDL"),
        }
    }

    match fetch_routine_ddl(conn, schema, routine_name, is_function) {
        Ok(ddl) => signature_from_ddl(schema, routine_name, is_function, &ddl),
        Err(err) if err.is_transport() => Err(err),
        Err(err) => {
            if !looks_like_routine_call(call_text) || config.relaxed_synthetic_params {
                debug!(
                    schema,
                    routine = routine_name,
                    %err,
                    "routine metadata unavailable, fabricating synthetic signature"
                );
                synthetic_signature(config, schema, routine_name, is_function, call_text)
            } else {
                Err(err)
            }
        }
    }
}

/// Fetch the routine's creation statement text. A missing or empty result is a
/// General error (the routine body may be inaccessible to this account).
fn fetch_routine_ddl(
    conn: &Connection,
    schema: &str,
    routine_name: &str,
    is_function: bool,
) -> CallResult<String> {
    let kind = if is_function { "FUNCTION" } else { "PROCEDURE" };
    let sql = format!(
        "SHOW CREATE {} {}.{}",
        kind,
        quote_identifier(schema),
        quote_identifier(routine_name)
    );
    let rows = conn.execute(&sql)?.into_rows()?;
    let create_col = rows
        .column_index(&format!("Create {}", if is_function { "Function" } else { "Procedure" }))
        .unwrap_or(2);
    let row = rows.single_row().ok_or_else(|| {
        CallError::general(
            "ddl_fetch".to_string(),
            format!("no creation statement returned for {schema}.{routine_name}"),
        )
    })?;
    let ddl = row
        .get(create_col)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            CallError::general(
                "ddl_fetch".to_string(),
                format!("creation statement for {schema}.{routine_name} is empty or inaccessible"),
            )
        })?;
    Ok(ddl.to_string())
}

/// Fabricate an untyped signature as a last resort: one IN parameter per `?`
/// in the raw call text. Restricted-access mode forces every parameter to
/// INOUT at construction time so output registration stays possible without
/// ever mutating a cached descriptor.
pub fn synthetic_signature(
    config: &CallConfig,
    schema: &str,
    routine_name: &str,
    is_function: bool,
    call_text: &str,
) -> CallResult<RoutineSignature> {
    let text = strip_sql_comments(call_text);
    let n = count_placeholders(&text);
    let direction = if config.restricted_catalog_access {
        Direction::InOut
    } else {
        Direction::In
    };
    let mut parameters: Vec<ParameterDescriptor> = Vec::with_capacity(n + 1);
    if is_function {
        parameters.push(ParameterDescriptor::untyped("", 0, Direction::Out));
    }
    let base = parameters.len();
    for i in 0..n {
        parameters.push(ParameterDescriptor::untyped(
            format!("p{}", i + 1),
            base + i,
            direction,
        ));
    }
    RoutineSignature::new(routine_name, schema, is_function, parameters, true, false)
}

/// Cache-fronted resolution entry point: the cache key is (schema, exact call
/// text); a hit shares the already-resolved signature, a miss resolves and
/// fills.
pub fn resolve_signature(
    conn: &Connection,
    cache: &SignatureCache,
    config: &CallConfig,
    schema: &str,
    routine_name: &str,
    is_function: bool,
    call_text: &str,
) -> CallResult<Arc<RoutineSignature>> {
    if let Some(sig) = cache.get(schema, call_text) {
        debug!(schema, routine = routine_name, "signature cache hit");
        return Ok(sig);
    }
    let sig = Arc::new(resolve(conn, config, schema, routine_name, is_function, call_text)?);
    cache.put(schema, call_text, sig.clone());
    Ok(sig)
}
