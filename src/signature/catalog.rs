//! Catalog Signature Resolver: builds a signature directly from the server's
//! routine-parameter catalog, bypassing DDL parsing. Zero catalog rows is a
//! distinct "not resolvable via catalog" outcome, never an error, so the
//! orchestrator can fall back cleanly.

use serde_json::Value;
use tracing::debug;

use crate::error::{CallError, CallResult};
use crate::exec::{Connection, ResultRows};
use crate::signature::{Direction, ParameterDescriptor, RoutineSignature};
use crate::typespec::{Nullability, ScalarKind};

/// Build the catalog query for one routine's parameters, ordered by ordinal.
/// `name_filter` restricts to parameter names matching a LIKE pattern.
pub fn catalog_query(schema: &str, routine_name: &str, name_filter: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT PARAMETER_NAME, PARAMETER_MODE, ORDINAL_POSITION, DATA_TYPE, \
         NUMERIC_PRECISION, CHARACTER_MAXIMUM_LENGTH, NUMERIC_SCALE, IS_NULLABLE \
         FROM INFORMATION_SCHEMA.PARAMETERS \
         WHERE SPECIFIC_SCHEMA = '{}' AND SPECIFIC_NAME = '{}'",
        escape_literal(schema),
        escape_literal(routine_name)
    );
    if let Some(filter) = name_filter {
        sql.push_str(&format!(" AND PARAMETER_NAME LIKE '{}'", escape_literal(filter)));
    }
    sql.push_str(" ORDER BY ORDINAL_POSITION");
    sql
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

/// Resolve via the parameter catalog. `Ok(None)` means the catalog had no rows
/// for this routine; transport failures propagate unmodified.
pub fn resolve_via_catalog(
    conn: &Connection,
    schema: &str,
    routine_name: &str,
    is_function: bool,
    name_filter: Option<&str>,
) -> CallResult<Option<RoutineSignature>> {
    let sql = catalog_query(schema, routine_name, name_filter);
    let rows = conn.execute(&sql)?.into_rows()?;
    if rows.is_empty() {
        debug!(schema, routine = routine_name, "routine not resolvable via catalog");
        return Ok(None);
    }
    let sig = signature_from_rows(schema, routine_name, is_function, &rows)?;
    Ok(Some(sig))
}

/// Map catalog rows (already ordered by ordinal) into the signature shape.
pub fn signature_from_rows(
    schema: &str,
    routine_name: &str,
    is_function: bool,
    rows: &ResultRows,
) -> CallResult<RoutineSignature> {
    let col = |name: &str| rows.column_index(name);
    let c_name = col("PARAMETER_NAME");
    let c_mode = col("PARAMETER_MODE");
    let c_ord = col("ORDINAL_POSITION");
    let c_type = col("DATA_TYPE");
    let c_prec = col("NUMERIC_PRECISION");
    let c_len = col("CHARACTER_MAXIMUM_LENGTH");
    let c_scale = col("NUMERIC_SCALE");
    let c_null = col("IS_NULLABLE");

    let mut parameters: Vec<ParameterDescriptor> = Vec::with_capacity(rows.rows.len());
    for (i, row) in rows.rows.iter().enumerate() {
        let name = cell_str(row, c_name).map(|s| s.to_string()).unwrap_or_default();
        let mode = cell_str(row, c_mode).unwrap_or("");
        let catalog_ordinal = cell_i64(row, c_ord);
        let type_name = cell_str(row, c_type).unwrap_or("").to_string();
        let precision = cell_i64(row, c_prec).or_else(|| cell_i64(row, c_len));
        let scale = cell_i64(row, c_scale).map(|v| v as i32);
        let nullability = cell_str(row, c_null)
            .map(Nullability::from_hint)
            .unwrap_or(Nullability::Unknown);

        // The server's return-value indicator: ordinal 0 with an empty mode
        let is_return = catalog_ordinal == Some(0) || (mode.is_empty() && i == 0 && is_function);
        let direction = if is_return {
            Direction::Out
        } else {
            match mode.to_ascii_uppercase().as_str() {
                "IN" => Direction::In,
                "OUT" => Direction::Out,
                "INOUT" => Direction::InOut,
                _ => Direction::Unknown,
            }
        };

        // Catalog ordinals are 1-based for declared parameters and 0 for a
        // function's return value; both collapse onto our 0-based scheme in
        // row order.
        let ordinal = parameters.len();
        if is_return && ordinal != 0 {
            return Err(CallError::general(
                "catalog_parse",
                "return-value row must be the first catalog row",
            ));
        }

        let scalar_kind = ScalarKind::from_type_name(&type_name);
        // The catalog only reports a character length for character-shaped
        // kinds, so it mirrors straight into the octet length.
        parameters.push(ParameterDescriptor {
            name,
            ordinal,
            direction,
            scalar_kind,
            type_name,
            precision,
            scale,
            char_octet_length: cell_i64(row, c_len),
            fractional_seconds: None,
            nullability,
        });
    }

    let sig = RoutineSignature::new(routine_name, schema, is_function, parameters, false, true)?;
    debug!(
        schema,
        routine = routine_name,
        params = sig.parameters().len(),
        "resolved signature via catalog"
    );
    Ok(sig)
}

fn cell_str(row: &[Value], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| row.get(i)).and_then(|v| v.as_str())
}

fn cell_i64(row: &[Value], idx: Option<usize>) -> Option<i64> {
    idx.and_then(|i| row.get(i)).and_then(|v| {
        v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    })
}
