//! Type-Spec Parser: turns a single column/parameter type declaration string
//! (e.g. "DECIMAL(10,2)", "ENUM('a','b')", "VARCHAR(32) CHARACTER SET utf8")
//! into a structured descriptor carrying size, scale and nullability. Pure
//! function, no I/O.

use serde::{Deserialize, Serialize};

use crate::error::{CallError, CallResult};
use crate::scan::find_balanced_paren;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

impl Nullability {
    /// Catalog hint values are `YES`/`NO`; anything else is unknown.
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_uppercase().as_str() {
            "YES" => Nullability::Nullable,
            "NO" => Nullability::NoNulls,
            _ => Nullability::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Decimal,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Float,
    Double,
    Bit,
    Year,
    Char,
    VarChar,
    Binary,
    VarBinary,
    TinyBlob,
    Blob,
    MediumBlob,
    LongBlob,
    TinyText,
    Text,
    MediumText,
    LongText,
    Enum,
    Set,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Geometry,
    Unknown,
}

impl ScalarKind {
    /// Map a raw server type name (case-insensitive, no parens) to a kind.
    pub fn from_type_name(name: &str) -> ScalarKind {
        let mut up = name.trim().to_ascii_uppercase();
        if let Some(rest) = up.strip_prefix("NATIONAL ") {
            up = rest.to_string();
        }
        match up.as_str() {
            "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" => ScalarKind::Decimal,
            "TINYINT" | "BOOL" | "BOOLEAN" => ScalarKind::TinyInt,
            "SMALLINT" => ScalarKind::SmallInt,
            "MEDIUMINT" => ScalarKind::MediumInt,
            "INT" | "INTEGER" => ScalarKind::Int,
            "BIGINT" => ScalarKind::BigInt,
            "FLOAT" | "REAL" => ScalarKind::Float,
            "DOUBLE" | "DOUBLE PRECISION" => ScalarKind::Double,
            "BIT" => ScalarKind::Bit,
            "YEAR" => ScalarKind::Year,
            "CHAR" | "CHARACTER" | "NCHAR" => ScalarKind::Char,
            "VARCHAR" | "CHARACTER VARYING" | "NVARCHAR" => ScalarKind::VarChar,
            "BINARY" => ScalarKind::Binary,
            "VARBINARY" => ScalarKind::VarBinary,
            "TINYBLOB" => ScalarKind::TinyBlob,
            "BLOB" => ScalarKind::Blob,
            "MEDIUMBLOB" => ScalarKind::MediumBlob,
            "LONGBLOB" => ScalarKind::LongBlob,
            "TINYTEXT" => ScalarKind::TinyText,
            "TEXT" => ScalarKind::Text,
            "MEDIUMTEXT" => ScalarKind::MediumText,
            "LONGTEXT" => ScalarKind::LongText,
            "ENUM" => ScalarKind::Enum,
            "SET" => ScalarKind::Set,
            "DATE" => ScalarKind::Date,
            "TIME" => ScalarKind::Time,
            "DATETIME" => ScalarKind::DateTime,
            "TIMESTAMP" => ScalarKind::Timestamp,
            "JSON" => ScalarKind::Json,
            "GEOMETRY" | "POINT" | "LINESTRING" | "POLYGON" => ScalarKind::Geometry,
            _ => ScalarKind::Unknown,
        }
    }

    fn is_character(self) -> bool {
        matches!(
            self,
            ScalarKind::Char
                | ScalarKind::VarChar
                | ScalarKind::TinyText
                | ScalarKind::Text
                | ScalarKind::MediumText
                | ScalarKind::LongText
        )
    }

    fn is_binary(self) -> bool {
        matches!(
            self,
            ScalarKind::Binary
                | ScalarKind::VarBinary
                | ScalarKind::TinyBlob
                | ScalarKind::Blob
                | ScalarKind::MediumBlob
                | ScalarKind::LongBlob
        )
    }

    fn is_enumerated(self) -> bool {
        matches!(self, ScalarKind::Enum | ScalarKind::Set)
    }

    fn is_temporal(self) -> bool {
        matches!(self, ScalarKind::Date | ScalarKind::Time | ScalarKind::DateTime | ScalarKind::Timestamp)
    }

    /// Default precision when the declaration carries no explicit size.
    fn default_precision(self) -> Option<i64> {
        match self {
            ScalarKind::Decimal => Some(10),
            ScalarKind::TinyInt => Some(3),
            ScalarKind::SmallInt => Some(5),
            ScalarKind::MediumInt => Some(7),
            ScalarKind::Int => Some(10),
            ScalarKind::BigInt => Some(19),
            ScalarKind::Float => Some(12),
            ScalarKind::Double => Some(22),
            ScalarKind::Bit => Some(1),
            ScalarKind::Year => Some(4),
            ScalarKind::Char | ScalarKind::Binary => Some(1),
            ScalarKind::VarChar | ScalarKind::VarBinary => Some(65535),
            ScalarKind::TinyBlob | ScalarKind::TinyText => Some(255),
            ScalarKind::Blob | ScalarKind::Text => Some(65535),
            ScalarKind::MediumBlob | ScalarKind::MediumText => Some(16_777_215),
            ScalarKind::LongBlob | ScalarKind::LongText => Some(4_294_967_295),
            ScalarKind::Date => Some(10),
            ScalarKind::Time => Some(10),
            ScalarKind::DateTime | ScalarKind::Timestamp => Some(19),
            // ENUM/SET sizes always come from the literal list
            ScalarKind::Enum | ScalarKind::Set => None,
            ScalarKind::Json | ScalarKind::Geometry | ScalarKind::Unknown => None,
        }
    }
}

/// Parsed representation of one type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub kind: ScalarKind,
    /// Raw type name token as written, without size arguments.
    pub type_name: String,
    pub precision: Option<i64>,
    pub scale: Option<i32>,
    /// Mirrors precision for character/binary/enumerated kinds, None otherwise.
    pub char_octet_length: Option<i64>,
    /// Explicit sub-second precision for temporal kinds, when > 0.
    pub fractional_seconds: Option<u32>,
    pub nullability: Nullability,
}

/// Precision beyond which a FLOAT/REAL declaration is promoted to DOUBLE,
/// mirroring server storage promotion.
const FLOAT_DOUBLE_PRECISION_THRESHOLD: i64 = 23;

/// Parse a single type declaration token string plus a nullability hint into a
/// populated size/scale record.
pub fn parse_type_spec(decl: &str, hint: Nullability) -> CallResult<TypeSpec> {
    let decl = decl.trim();
    if decl.is_empty() {
        return Err(CallError::general("type_parse", "empty type declaration"));
    }
    // Base name runs up to the first '(' or whitespace; "NATIONAL x"/"DOUBLE
    // PRECISION" style two-word names are folded in by from_type_name.
    let base_end = decl
        .find(|c: char| c == '(' || c.is_ascii_whitespace())
        .unwrap_or(decl.len());
    let mut base = decl[..base_end].to_string();
    let mut rest = &decl[base_end..];
    // Two-word spellings: NATIONAL VARCHAR, DOUBLE PRECISION, CHARACTER VARYING
    let first_up = base.to_ascii_uppercase();
    if matches!(first_up.as_str(), "NATIONAL" | "DOUBLE" | "CHARACTER") {
        let trimmed = rest.trim_start();
        let next_end = trimmed
            .find(|c: char| c == '(' || c.is_ascii_whitespace())
            .unwrap_or(trimmed.len());
        let next_up = trimmed[..next_end].to_ascii_uppercase();
        if matches!(next_up.as_str(), "VARCHAR" | "CHAR" | "PRECISION" | "VARYING") {
            base = format!("{} {}", base, &trimmed[..next_end]);
            rest = &trimmed[next_end..];
        }
    }
    let mut kind = ScalarKind::from_type_name(&base);

    // Size arguments immediately follow the base name (ignoring whitespace);
    // later parens belong to attributes like CHARACTER SET and are ignored.
    let rest_trimmed = rest.trim_start();
    let args: Option<String> = if rest_trimmed.starts_with('(') {
        let span = find_balanced_paren(rest_trimmed, 0)
            .ok_or_else(|| CallError::general("type_parse", "missing expected paren"))?;
        if !span.closed {
            return Err(CallError::general(
                "type_parse".to_string(),
                format!("unbalanced parens in type declaration '{decl}'"),
            ));
        }
        Some(rest_trimmed[span.inner_start..span.inner_end].to_string())
    } else {
        None
    };

    let mut precision: Option<i64> = None;
    let mut scale: Option<i32> = None;
    let mut fractional_seconds: Option<u32> = None;

    if kind.is_enumerated() {
        let args = args.ok_or_else(|| {
            CallError::general(
                "type_parse".to_string(),
                format!("{} declaration missing literal list", base.to_ascii_uppercase()),
            )
        })?;
        let lens = enum_literal_lengths(&args);
        precision = Some(match kind {
            ScalarKind::Enum => lens.iter().copied().max().unwrap_or(0),
            // SET size: all literals plus one separator per additional literal
            _ => lens.iter().sum::<i64>() + lens.len().saturating_sub(1) as i64,
        });
    } else if let Some(args) = args.as_deref() {
        let parts: Vec<&str> = args.split(',').map(|p| p.trim()).collect();
        if kind.is_temporal() {
            let f: u32 = parts
                .first()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| CallError::general("type_parse".to_string(), format!("bad fractional precision in '{decl}'")))?;
            let mut width = kind.default_precision().unwrap_or(0);
            if f > 0 {
                width += f as i64 + 1;
                fractional_seconds = Some(f);
            }
            precision = Some(width);
        } else {
            let p: i64 = parts
                .first()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| CallError::general("type_parse".to_string(), format!("bad precision in '{decl}'")))?;
            precision = Some(p);
            if let Some(s) = parts.get(1) {
                scale = s.parse().ok();
            }
            // Server-side storage promotion: a float with a precision beyond
            // single range is stored as a double.
            if kind == ScalarKind::Float && p > FLOAT_DOUBLE_PRECISION_THRESHOLD {
                kind = ScalarKind::Double;
            }
        }
    } else {
        precision = kind.default_precision();
        if kind == ScalarKind::Decimal {
            scale = Some(0);
        }
    }

    let char_octet_length = if kind.is_character() || kind.is_binary() || kind.is_enumerated() {
        precision
    } else {
        None
    };

    Ok(TypeSpec {
        kind,
        type_name: base,
        precision,
        scale,
        char_octet_length,
        fractional_seconds,
        nullability: hint,
    })
}

/// Lengths of the quoted literals in an ENUM/SET argument list, in characters
/// (not bytes). Doubled quotes inside a literal count as a single character.
fn enum_literal_lengths(args: &str) -> Vec<i64> {
    let mut lens = Vec::new();
    let mut chars = args.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\'' {
            continue;
        }
        let mut len = 0i64;
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    len += 1;
                    continue;
                }
                break;
            }
            len += 1;
        }
        lens.push(len);
    }
    lens
}
