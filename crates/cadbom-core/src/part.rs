//! Part codes and the normalizer that derives them from loose input.
//!
//! Callers hand part references over in several shapes:
//! - explicit `{ "typePrefix": "A", "partNumber": "1" }`
//! - composite codes such as `"A-001"`, `"P002"` or `"s_7"`, either bare or
//!   under one of the conventional fields `code`, `partCode`, `id`, `key`
//! - a nested `parentKey` carrying a composite code
//!
//! All of them resolve to one canonical [`PartCode`].

use crate::error::BomError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

const CODE_FIELDS: [&str; 4] = ["code", "partCode", "id", "key"];
const TYPE_PREFIX_FIELDS: [&str; 2] = ["typePrefix", "type_prefix"];
const PART_NUMBER_FIELDS: [&str; 2] = ["partNumber", "part_number"];
const PARENT_KEY_FIELD: &str = "parentKey";

/// Canonical identity of a part: one uppercase letter plus a three-digit
/// zero-padded number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PartCodeRepr", into = "PartCodeRepr")]
pub struct PartCode {
    type_prefix: char,
    number: u16,
}

impl PartCode {
    /// Build a code from already-separated fields, applying the same
    /// normalization as [`normalize_part`].
    pub fn new(type_prefix: &str, part_number: &str) -> Result<Self, BomError> {
        Ok(Self {
            type_prefix: normalize_type_prefix(type_prefix)?,
            number: normalize_part_number(part_number)?,
        })
    }

    /// Parse a composite code string (`A-001`, `A1`, `p_02`).
    pub fn parse(code: &str) -> Result<Self, BomError> {
        let (type_prefix, part_number) = split_code(code).ok_or_else(|| {
            BomError::InvalidPartReference(format!("unrecognized part code `{}`", code.trim()))
        })?;
        Self::new(&type_prefix, &part_number)
    }

    pub fn type_prefix(&self) -> char {
        self.type_prefix
    }

    /// Zero-padded part number, e.g. `"007"`.
    pub fn part_number(&self) -> String {
        format!("{:03}", self.number)
    }

    /// Canonical key string used for adjacency nodes: `"{type}-{number}"`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PartCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.type_prefix, self.number)
    }
}

impl std::str::FromStr for PartCode {
    type Err = BomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Wire shape of a part code. `partNumber` is read leniently (string or
/// number) so documents written by older tooling still load.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartCodeRepr {
    type_prefix: String,
    part_number: Value,
}

impl TryFrom<PartCodeRepr> for PartCode {
    type Error = BomError;

    fn try_from(repr: PartCodeRepr) -> Result<Self, Self::Error> {
        let part_number = scalar_text(&repr.part_number).unwrap_or_default();
        PartCode::new(&repr.type_prefix, &part_number)
    }
}

impl From<PartCode> for PartCodeRepr {
    fn from(code: PartCode) -> Self {
        Self {
            type_prefix: code.type_prefix.to_string(),
            part_number: Value::String(code.part_number()),
        }
    }
}

/// Resolve a raw part reference into a canonical [`PartCode`].
///
/// Explicit fields win. Missing fields are filled from the first present
/// composite code field, then (for the type prefix) from `parentKey`.
pub fn normalize_part(raw: &Value) -> Result<PartCode, BomError> {
    let fields = match raw {
        Value::Object(fields) => fields,
        Value::String(code) => return PartCode::parse(code),
        other => {
            return Err(BomError::InvalidPartReference(format!(
                "expected an object or code string, got {}",
                json_type_name(other)
            )));
        }
    };

    let mut type_prefix = first_text(fields, &TYPE_PREFIX_FIELDS);
    let mut part_number = first_text(fields, &PART_NUMBER_FIELDS);

    if (type_prefix.is_none() || part_number.is_none())
        && let Some((code_type, code_number)) =
            first_text(fields, &CODE_FIELDS).and_then(|code| split_code(&code))
    {
        type_prefix.get_or_insert(code_type);
        part_number.get_or_insert(code_number);
    }

    if type_prefix.is_none()
        && let Some((key_type, key_number)) =
            first_text(fields, &[PARENT_KEY_FIELD]).and_then(|code| split_code(&code))
    {
        type_prefix = Some(key_type);
        part_number.get_or_insert(key_number);
    }

    let type_prefix = type_prefix.ok_or_else(|| {
        BomError::InvalidPartReference("missing typePrefix and no usable part code".to_string())
    })?;
    let part_number = part_number.ok_or_else(|| {
        BomError::InvalidPartReference("missing partNumber and no usable part code".to_string())
    })?;
    PartCode::new(&type_prefix, &part_number)
}

/// Coerce a raw quantity into a strictly positive integer.
pub fn normalize_quantity(raw: &Value) -> Result<u32, BomError> {
    let invalid = || {
        BomError::InvalidQuantity(format!(
            "quantity must be a positive integer, got {}",
            compact(raw)
        ))
    };

    let value = match raw {
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    if !value.is_finite() || value.fract() != 0.0 || value < 1.0 || value > f64::from(u32::MAX) {
        return Err(invalid());
    }
    Ok(value as u32)
}

fn normalize_type_prefix(raw: &str) -> Result<char, BomError> {
    let upper = raw.trim().to_uppercase();
    let mut chars = upper.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Ok(c),
        _ => Err(BomError::InvalidPartReference(format!(
            "typePrefix must be a single letter A-Z, got `{}`",
            raw.trim()
        ))),
    }
}

/// Keep the last three digits of whatever was supplied.
fn normalize_part_number(raw: &str) -> Result<u16, BomError> {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(BomError::InvalidPartReference(format!(
            "partNumber has no digits: `{raw}`"
        )));
    }
    let tail: String = digits[digits.len().saturating_sub(3)..].iter().collect();
    tail.parse::<u16>()
        .map_err(|e| BomError::InvalidPartReference(format!("partNumber `{raw}`: {e}")))
}

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z])[-_]?(\d{1,3})$").expect("part code regex compiles"))
}

fn split_code(raw: &str) -> Option<(String, String)> {
    let code = raw.trim().to_uppercase();
    let caps = code_re().captures(&code)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn first_text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find_map(scalar_text)
}

/// Strings and numbers count as present when non-empty; everything else is
/// treated as absent.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code(t: &str, n: &str) -> PartCode {
        PartCode::new(t, n).expect("fixture code should be valid")
    }

    #[test]
    fn equivalent_shapes_normalize_to_same_code() {
        let expected = code("A", "001");
        let shapes = [
            json!({ "typePrefix": "A", "partNumber": "1" }),
            json!({ "code": "A-001" }),
            json!({ "code": "A1" }),
            json!({ "partCode": "a_01" }),
            json!({ "id": "A001" }),
            json!({ "key": " a-1 " }),
            json!({ "type_prefix": "a", "part_number": 1 }),
            json!({ "parentKey": "A-001" }),
            json!("A-001"),
        ];
        for shape in shapes {
            let got = normalize_part(&shape)
                .unwrap_or_else(|e| panic!("{shape} should normalize: {e}"));
            assert_eq!(got, expected, "shape {shape}");
        }
    }

    #[test]
    fn explicit_fields_take_precedence_over_code() {
        let got = normalize_part(&json!({ "typePrefix": "S", "code": "A-004" }))
            .expect("partial explicit fields should resolve");
        assert_eq!(got, code("S", "004"));

        let got = normalize_part(&json!({ "typePrefix": "P", "partNumber": "9", "code": "A-004" }))
            .expect("explicit fields should resolve");
        assert_eq!(got, code("P", "009"));
    }

    #[test]
    fn parent_key_only_fills_type_when_still_missing() {
        let got = normalize_part(&json!({ "partNumber": "12", "parentKey": "H-900" }))
            .expect("parentKey fallback should resolve");
        assert_eq!(got, code("H", "012"));
    }

    #[test]
    fn part_number_keeps_last_three_digits() {
        assert_eq!(code("P", "PN-12345").part_number(), "345");
        assert_eq!(code("P", "7").part_number(), "007");
        assert_eq!(code("P", "7").key(), "P-007");
    }

    #[test]
    fn rejects_malformed_references() {
        let bad = [
            json!({ "typePrefix": "AB", "partNumber": "1" }),
            json!({ "typePrefix": "1", "partNumber": "1" }),
            json!({ "typePrefix": "A", "partNumber": "none" }),
            json!({ "code": "AB-001" }),
            json!({ "code": "A-0001" }),
            json!({}),
            json!(null),
            json!(42),
            json!("not a code"),
        ];
        for raw in bad {
            let err = normalize_part(&raw).expect_err("malformed reference must fail");
            assert!(
                matches!(err, BomError::InvalidPartReference(_)),
                "{raw} gave {err:?}"
            );
        }
    }

    #[test]
    fn quantity_must_be_positive_integer() {
        assert_eq!(normalize_quantity(&json!(3)).expect("int"), 3);
        assert_eq!(normalize_quantity(&json!(2.0)).expect("integral float"), 2);
        assert_eq!(normalize_quantity(&json!(" 4 ")).expect("numeric string"), 4);

        for raw in [
            json!(0),
            json!(-1),
            json!(1.5),
            json!("abc"),
            json!(""),
            json!(true),
            json!(null),
            json!(5_000_000_000u64),
        ] {
            let err = normalize_quantity(&raw).expect_err("bad quantity must fail");
            assert!(matches!(err, BomError::InvalidQuantity(_)), "{raw}");
        }
    }

    #[test]
    fn serde_uses_camel_case_and_padded_number() {
        let value = serde_json::to_value(code("B", "2")).expect("serialize");
        assert_eq!(value, json!({ "typePrefix": "B", "partNumber": "002" }));

        let back: PartCode = serde_json::from_value(json!({ "typePrefix": "b", "partNumber": 2 }))
            .expect("lenient deserialize");
        assert_eq!(back, code("B", "002"));
    }
}
