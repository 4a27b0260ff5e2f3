//! Routine signature data model: immutable parameter descriptors plus the
//! resolved signature shared (read-only) across every call instance that hits
//! the cache. Resolution strategies live in the submodules; all of them
//! produce this one shape.

pub mod catalog;
pub mod ddl;
pub mod resolve;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CallError, CallResult};
use crate::typespec::{Nullability, ScalarKind, TypeSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
    InOut,
    Unknown,
}

impl Direction {
    pub fn includes_in(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub fn includes_out(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }

    /// Parse a leading DDL direction keyword. `None` when the token is not a
    /// direction (the parameter list default is IN).
    pub fn from_keyword(tok: &str) -> Option<Direction> {
        match tok.to_ascii_uppercase().as_str() {
            "IN" => Some(Direction::In),
            "OUT" => Some(Direction::Out),
            "INOUT" => Some(Direction::InOut),
            _ => None,
        }
    }
}

/// One declared routine parameter. Immutable once constructed; policy such as
/// restricted-mode INOUT forcing is applied at construction time, never by
/// mutating a shared descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Declared name, or a synthesized one when absent.
    pub name: String,
    /// 0-based position in the full declared signature. For functions,
    /// ordinal 0 is the return-value pseudo-parameter.
    pub ordinal: usize,
    pub direction: Direction,
    pub scalar_kind: ScalarKind,
    /// Raw server type name as written/reported.
    pub type_name: String,
    pub precision: Option<i64>,
    pub scale: Option<i32>,
    pub char_octet_length: Option<i64>,
    pub fractional_seconds: Option<u32>,
    pub nullability: Nullability,
}

impl ParameterDescriptor {
    pub fn from_type_spec(name: impl Into<String>, ordinal: usize, direction: Direction, spec: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ordinal,
            direction,
            scalar_kind: spec.kind,
            type_name: spec.type_name,
            precision: spec.precision,
            scale: spec.scale,
            char_octet_length: spec.char_octet_length,
            fractional_seconds: spec.fractional_seconds,
            nullability: spec.nullability,
        }
    }

    /// An untyped descriptor for synthetic signatures.
    pub fn untyped(name: impl Into<String>, ordinal: usize, direction: Direction) -> Self {
        Self {
            name: name.into(),
            ordinal,
            direction,
            scalar_kind: ScalarKind::Unknown,
            type_name: String::new(),
            precision: None,
            scale: None,
            char_octet_length: None,
            fractional_seconds: None,
            nullability: Nullability::Unknown,
        }
    }
}

/// The resolved ordered parameter list of one routine. Created once per
/// distinct (schema, call text) pair and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct RoutineSignature {
    pub routine_name: String,
    pub schema: String,
    pub is_function: bool,
    parameters: Vec<ParameterDescriptor>,
    by_name: HashMap<String, usize>,
    /// True when fabricated as a last resort with no real metadata.
    pub is_synthetic: bool,
    /// Diagnostics/tests: which resolution path produced this signature.
    pub resolved_via_catalog: bool,
}

impl RoutineSignature {
    /// Build and validate. Parameters must arrive in ordinal order starting at
    /// 0 (first declared parameter for procedures, return pseudo-parameter for
    /// functions), and the ordinal-0 entry has direction OUT iff the routine
    /// is a function.
    pub fn new(
        routine_name: impl Into<String>,
        schema: impl Into<String>,
        is_function: bool,
        parameters: Vec<ParameterDescriptor>,
        is_synthetic: bool,
        resolved_via_catalog: bool,
    ) -> CallResult<Self> {
        for (i, p) in parameters.iter().enumerate() {
            if p.ordinal != i {
                return Err(CallError::general(
                    "signature_invalid".to_string(),
                    format!("parameter '{}' has ordinal {} at position {}", p.name, p.ordinal, i),
                ));
            }
        }
        if is_function {
            let ret_ok = parameters.first().map(|p| p.direction == Direction::Out).unwrap_or(false);
            if !ret_ok {
                return Err(CallError::general(
                    "signature_invalid",
                    "function signature must start with an OUT return pseudo-parameter",
                ));
            }
        }
        let mut by_name = HashMap::new();
        for (i, p) in parameters.iter().enumerate() {
            if !p.name.is_empty() {
                by_name.insert(p.name.to_ascii_lowercase(), i);
            }
        }
        Ok(Self {
            routine_name: routine_name.into(),
            schema: schema.into(),
            is_function,
            parameters,
            by_name,
            is_synthetic,
            resolved_via_catalog,
        })
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Number of bindable declared parameters, excluding a function's return
    /// pseudo-parameter.
    pub fn declared_parameter_count(&self) -> usize {
        if self.is_function {
            self.parameters.len().saturating_sub(1)
        } else {
            self.parameters.len()
        }
    }

    pub fn by_ordinal(&self, ordinal: usize) -> Option<&ParameterDescriptor> {
        self.parameters.get(ordinal)
    }

    /// Case-insensitive name lookup.
    pub fn parameter_by_name(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.parameters[i])
    }

    /// Return-value pseudo-parameter, for functions only.
    pub fn return_parameter(&self) -> Option<&ParameterDescriptor> {
        if self.is_function {
            self.parameters.first()
        } else {
            None
        }
    }
}
