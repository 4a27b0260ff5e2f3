//! Placeholder Mapper: parses the caller's literal call-argument list and
//! builds the placeholder-to-ordinal map. The caller may omit, abbreviate or
//! only partially reference parameters with `?` markers; each marker is
//! assigned the next signature ordinal in left-to-right order, so a literal
//! argument simply consumes an ordinal without producing a map entry.

use crate::error::{CallError, CallResult};
use crate::scan::{count_placeholders, find_balanced_paren, split_top_level_commas, strip_sql_comments};
use crate::signature::RoutineSignature;

/// Ordered ordinals, one per `?` present in the caller's text, plus an
/// implicit leading `0` entry when the routine is a function (the return
/// value is addressable at caller index 1 but never placeholder-indexed).
/// Built per call-statement instance; never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMap {
    ordinals: Vec<usize>,
    implicit_return: bool,
}

impl PlaceholderMap {
    /// Parse the call text against the resolved signature.
    pub fn build(signature: &RoutineSignature, call_text: &str) -> CallResult<PlaceholderMap> {
        let text = strip_sql_comments(call_text);
        let mut ordinals: Vec<usize> = Vec::new();
        let implicit_return = signature.is_function;
        if implicit_return {
            ordinals.push(0);
        }
        // First declared parameter sits at ordinal 0 for procedures, 1 for
        // functions (0 is the return pseudo-parameter).
        let mut next_ordinal = if signature.is_function { 1 } else { 0 };
        let mut total_placeholders = 0usize;

        if let Some(span) = find_balanced_paren(&text, 0) {
            if !span.closed {
                return Err(CallError::illegal("call_text", "unbalanced parens in call argument list"));
            }
            let args = &text[span.inner_start..span.inner_end];
            for segment in split_top_level_commas(args) {
                // A compound argument may hold several placeholders; each one
                // maps to this argument position's ordinal
                let n = count_placeholders(segment);
                for _ in 0..n {
                    ordinals.push(next_ordinal);
                }
                total_placeholders += n;
                next_ordinal += 1;
            }
        }

        let declared = signature.declared_parameter_count();
        if total_placeholders > declared {
            return Err(CallError::illegal(
                "too_many_placeholders".to_string(),
                format!(
                    "call text has {} placeholder(s) but routine '{}' declares {} parameter(s)",
                    total_placeholders, signature.routine_name, declared
                ),
            ));
        }
        Ok(PlaceholderMap { ordinals, implicit_return })
    }

    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// All map entries, the implicit function-return entry included.
    pub fn ordinals(&self) -> &[usize] {
        &self.ordinals
    }

    /// The placeholder-assigned entries only (skips the implicit return).
    pub fn placeholder_ordinals(&self) -> &[usize] {
        if self.implicit_return {
            &self.ordinals[1..]
        } else {
            &self.ordinals
        }
    }

    /// Translate a caller index (1-based, contiguous over placeholders
    /// present) into a signature ordinal.
    pub fn ordinal_for(&self, caller_index: usize) -> CallResult<usize> {
        if caller_index == 0 || caller_index > self.ordinals.len() {
            return Err(CallError::illegal(
                "bad_parameter_index".to_string(),
                format!(
                    "caller index {} out of range 1..={}",
                    caller_index,
                    self.ordinals.len()
                ),
            ));
        }
        Ok(self.ordinals[caller_index - 1])
    }
}

/// Degenerate translation when no map was built (no-substitution case):
/// caller index maps 1:1 onto 0-based ordinals.
pub fn degenerate_ordinal(caller_index: usize) -> CallResult<usize> {
    if caller_index == 0 {
        return Err(CallError::illegal("bad_parameter_index", "caller index must be >= 1"));
    }
    Ok(caller_index - 1)
}
