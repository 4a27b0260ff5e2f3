//! Output-Parameter Emulator: the wire protocol has no notion of OUT/INOUT
//! routine parameters, so they are emulated with mangled session variables.
//! Per execution the sequence is: SET statements seeding INOUT variables, the
//! (rewritten) main call, then one consolidated SELECT reading every output
//! variable back. Each step depends on the session side effects of the last,
//! so the whole sequence holds the connection's session lock and no other
//! statement on the connection can run between the call and its read-back.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CallError, CallResult};
use crate::exec::{Connection, StatementExecutor};
use crate::ident::sanitize_for_session_var;
use crate::placeholder::PlaceholderMap;
use crate::scan::strip_sql_comments;
use crate::signature::{ParameterDescriptor, RoutineSignature};

/// Namespace prefix for mangled session variables. Kept stable so a failed
/// sequence leaves recognizable leftovers in the session.
pub const SESSION_VAR_PREFIX: &str = "@__callbridge_out_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Unbound,
    PendingExecute,
    Executed,
    OutputsRead,
    Failed,
}

/// The single read-back row plus the ordinal-to-column table restricted to
/// OUT/INOUT parameters. Replaced by the next execution.
#[derive(Debug, Clone)]
pub struct OutputParameterResult {
    row: Vec<Value>,
    column_by_ordinal: HashMap<usize, usize>,
}

impl OutputParameterResult {
    fn value_for(&self, ordinal: usize) -> Option<&Value> {
        self.column_by_ordinal.get(&ordinal).and_then(|&col| self.row.get(col))
    }

    fn has_ordinal(&self, ordinal: usize) -> bool {
        self.column_by_ordinal.contains_key(&ordinal)
    }
}

/// One call-statement instance: bound values, registered outputs and the
/// per-execution state machine `Unbound -> PendingExecute -> Executed ->
/// OutputsRead` (terminal `Failed` on an aborted sequence).
pub struct CallStatement {
    signature: Arc<RoutineSignature>,
    map: PlaceholderMap,
    call_text: String,
    bindings: HashMap<usize, Value>,
    registered_outputs: HashSet<usize>,
    state: CallState,
    outputs: Option<OutputParameterResult>,
    return_value: Option<Value>,
}

impl CallStatement {
    /// Build a statement for one call text against its resolved signature.
    /// The placeholder map is recomputed here because the schema may differ
    /// per execution even for textually identical SQL.
    pub fn new(signature: Arc<RoutineSignature>, call_text: impl Into<String>) -> CallResult<Self> {
        let call_text = call_text.into();
        let map = PlaceholderMap::build(&signature, &call_text)?;
        Ok(Self {
            signature,
            map,
            call_text,
            bindings: HashMap::new(),
            registered_outputs: HashSet::new(),
            state: CallState::Unbound,
            outputs: None,
            return_value: None,
        })
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn signature(&self) -> &RoutineSignature {
        &self.signature
    }

    pub fn placeholder_map(&self) -> &PlaceholderMap {
        &self.map
    }

    /// Bind a caller-supplied input value by caller index.
    pub fn bind_input(&mut self, caller_index: usize, value: Value) -> CallResult<()> {
        let ordinal = self.map.ordinal_for(caller_index)?;
        self.bindings.insert(ordinal, value);
        Ok(())
    }

    /// Register a parameter as output by caller index. Idempotent: repeated
    /// registration of the same parameter is a no-op. On non-synthetic
    /// signatures the parameter's declared direction must include OUT.
    pub fn register_output(&mut self, caller_index: usize) -> CallResult<()> {
        let ordinal = self.map.ordinal_for(caller_index)?;
        let param = self.signature.by_ordinal(ordinal).ok_or_else(|| {
            CallError::illegal("bad_parameter_index".to_string(), format!("no parameter at ordinal {ordinal}"))
        })?;
        if !self.signature.is_synthetic && !param.direction.includes_out() {
            return Err(CallError::illegal(
                "not_an_output".to_string(),
                format!("parameter '{}' (ordinal {}) is not declared OUT or INOUT", param.name, ordinal),
            ));
        }
        self.registered_outputs.insert(ordinal);
        Ok(())
    }

    /// Reset to `Unbound`, dropping bindings, registrations and any previous
    /// output row.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.registered_outputs.clear();
        self.outputs = None;
        self.return_value = None;
        self.state = CallState::Unbound;
    }

    /// Ordinals that participate in session-variable emulation: declared
    /// OUT/INOUT parameters plus (for synthetic signatures) explicitly
    /// registered ones — restricted to parameters actually reachable through
    /// a placeholder, and excluding a function's return pseudo-parameter.
    fn emulated_ordinals(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &ordinal in self.map.placeholder_ordinals() {
            if !seen.insert(ordinal) {
                continue;
            }
            let Some(param) = self.signature.by_ordinal(ordinal) else { continue };
            if self.signature.is_function && ordinal == 0 {
                continue;
            }
            if param.direction.includes_out() || self.registered_outputs.contains(&ordinal) {
                out.push(ordinal);
            }
        }
        out
    }

    fn session_var(&self, param: &ParameterDescriptor) -> String {
        if param.name.is_empty() {
            format!("{}p{}", SESSION_VAR_PREFIX, param.ordinal)
        } else {
            format!("{}{}", SESSION_VAR_PREFIX, sanitize_for_session_var(&param.name))
        }
    }

    /// Run the full SET / call / read-back sequence under one session-lock
    /// scope. Returns the function's return value when the routine is a
    /// function. With no emulated outputs the read-back is skipped entirely
    /// and the statement still reaches `OutputsRead` (pure passthrough).
    pub fn execute(&mut self, conn: &Connection) -> CallResult<Option<Value>> {
        // A new execution discards the prior output result
        self.outputs = None;
        self.return_value = None;
        self.state = CallState::PendingExecute;

        let emulated = self.emulated_ordinals();
        let main_sql = self.rewrite_call(&emulated)?;
        let readback_sql = if emulated.is_empty() {
            None
        } else {
            let vars: Vec<String> = emulated
                .iter()
                .map(|&o| self.session_var(self.signature.by_ordinal(o).expect("emulated ordinal")))
                .collect();
            Some(format!("SELECT {}", vars.join(", ")))
        };

        let result = conn.with_session(|exec| {
            // Seed INOUT variables with the caller's input before the call
            for &ordinal in &emulated {
                let param = self.signature.by_ordinal(ordinal).expect("emulated ordinal");
                if param.direction.includes_in() {
                    if let Some(value) = self.bindings.get(&ordinal) {
                        let set_sql = format!("SET {} = {}", self.session_var(param), render_literal(value));
                        exec.execute(&set_sql)?;
                    }
                }
            }

            // The main call; functions run as a selection expression whose
            // single-row result is the return value
            let outcome = exec.execute(&main_sql)?;
            let return_value = if self.signature.is_function {
                let rows = outcome.into_rows()?;
                let row = rows.single_row().ok_or_else(|| {
                    CallError::general("function_result", "function invocation did not yield a single row")
                })?;
                Some(row.first().cloned().unwrap_or(Value::Null))
            } else {
                None
            };

            // Read-back runs while the lock is still held; its failure is
            // reported separately because the call itself already succeeded
            let readback = match readback_sql.as_deref() {
                None => Ok(None),
                Some(sql) => {
                    debug!(
                        routine = %self.signature.routine_name,
                        outputs = emulated.len(),
                        "consolidated output read-back"
                    );
                    read_output_row(exec, sql).map(Some)
                }
            };
            Ok((return_value, readback))
        });

        let (return_value, readback) = match result {
            Ok(v) => v,
            Err(err) => {
                // Partially-set session variables are left as-is; the
                // sequence is not recoverable mid-flight
                self.state = CallState::Failed;
                return Err(err);
            }
        };
        self.state = CallState::Executed;
        self.return_value = return_value.clone();

        match readback {
            Ok(None) => {
                self.outputs = None;
                self.state = CallState::OutputsRead;
            }
            Ok(Some(row)) => {
                let column_by_ordinal = emulated.iter().enumerate().map(|(col, &o)| (o, col)).collect();
                self.outputs = Some(OutputParameterResult { row, column_by_ordinal });
                self.state = CallState::OutputsRead;
            }
            // The statement stays Executed: outputs are unreadable, not stale
            Err(err) => return Err(err),
        }
        Ok(return_value)
    }

    /// Read an output parameter's value by caller index, post read-back only.
    pub fn read_output(&self, caller_index: usize) -> CallResult<Value> {
        let ordinal = self.map.ordinal_for(caller_index)?;
        if self.state != CallState::OutputsRead {
            return Err(CallError::general(
                "no_outputs",
                "no output parameters available: routine has not executed through read-back",
            ));
        }
        if self.signature.is_function && ordinal == 0 {
            return Ok(self.return_value.clone().unwrap_or(Value::Null));
        }
        let outputs = self.outputs.as_ref().ok_or_else(|| {
            CallError::illegal(
                "not_an_output".to_string(),
                format!("parameter at ordinal {ordinal} was never marked as output"),
            )
        })?;
        if !outputs.has_ordinal(ordinal) {
            return Err(CallError::illegal(
                "not_an_output".to_string(),
                format!("parameter at ordinal {ordinal} was never marked as output"),
            ));
        }
        Ok(outputs.value_for(ordinal).cloned().unwrap_or(Value::Null))
    }

    /// The function return value from the last execution, if any.
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Substitute every placeholder with either its bound literal or, for an
    /// emulated output parameter, the mangled session variable reference.
    /// Untouched text is copied in whole segments; `?` is ASCII, so segment
    /// boundaries always land on char boundaries.
    fn rewrite_call(&self, emulated: &[usize]) -> CallResult<String> {
        let text = strip_sql_comments(&self.call_text);
        let placeholder_ordinals = self.map.placeholder_ordinals();
        let mut out = String::with_capacity(text.len());
        let mut placeholder_idx = 0usize;
        let bytes = text.as_bytes();
        let mut i = 0usize;
        let mut seg_start = 0usize;
        let mut in_squote = false;
        let mut in_dquote = false;
        let mut in_btick = false;
        while i < bytes.len() {
            let b = bytes[i];
            if (in_squote || in_dquote) && b == b'\\' && i + 1 < bytes.len() {
                i += 2;
                continue;
            }
            match b {
                b'\'' if !in_dquote && !in_btick => in_squote = !in_squote,
                b'"' if !in_squote && !in_btick => in_dquote = !in_dquote,
                b'`' if !in_squote && !in_dquote => in_btick = !in_btick,
                b'?' if !in_squote && !in_dquote && !in_btick => {
                    out.push_str(&text[seg_start..i]);
                    let ordinal = *placeholder_ordinals.get(placeholder_idx).ok_or_else(|| {
                        CallError::illegal("call_text", "more placeholders than mapped entries")
                    })?;
                    placeholder_idx += 1;
                    if emulated.contains(&ordinal) {
                        let param = self.signature.by_ordinal(ordinal).expect("mapped ordinal");
                        out.push_str(&self.session_var(param));
                    } else {
                        let value = self.bindings.get(&ordinal).ok_or_else(|| {
                            CallError::illegal(
                                "unbound_parameter".to_string(),
                                format!("no value bound for parameter at ordinal {ordinal}"),
                            )
                        })?;
                        out.push_str(&render_literal(value));
                    }
                    seg_start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        out.push_str(&text[seg_start..]);
        Ok(out)
    }
}

/// Execute the consolidated read-back SELECT and return its single row.
fn read_output_row(exec: &dyn StatementExecutor, sql: &str) -> CallResult<Vec<Value>> {
    let rows = exec.execute(sql)?.into_rows()?;
    let row = rows
        .single_row()
        .ok_or_else(|| CallError::general("output_readback", "read-back query did not yield a single row"))?
        .to_vec();
    Ok(row)
}

/// Render a JSON-shaped value as a SQL literal.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_string(s),
        other => quote_string(&other.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}
