//! Structural JSON-to-record mapping driven by a parameter shape.
//!
//! Decoding is lenient: unknown JSON fields are ignored, missing or `null`
//! fields take their type's zero value, and scalars are coerced across kinds
//! where the conversion is lossless (`30` into text, `"30"` into integer).
//! Structurally incompatible values (an array where a scalar is declared) fail
//! with [`HarnessError::TypeMismatch`] carrying a `$.field[index]` path.

use std::sync::Arc;

use fnh_abi::{FieldDecl, FieldType};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value as JsonValue};

use crate::error::HarnessError;
use crate::namespace::TypeCatalog;
use crate::value::{Record, Value};

/// Field layout of an entry operation's parameter type.
///
/// Nested `object` fields are looked up in the catalog of the artifact the
/// shape came from.
#[derive(Clone, Debug)]
pub struct ParameterShape {
    type_name: String,
    fields: Vec<FieldDecl>,
    catalog: Arc<TypeCatalog>,
}

impl ParameterShape {
    /// Shape of `type_name` as declared in `catalog`.
    pub fn of(catalog: Arc<TypeCatalog>, type_name: &str) -> Option<Self> {
        let fields = catalog.get(type_name)?.fields().to_vec();
        Some(Self {
            type_name: type_name.to_owned(),
            fields,
            catalog,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    fn nested(&self, type_name: &str) -> Option<&[FieldDecl]> {
        self.catalog.get(type_name).map(|ty| ty.fields())
    }
}

/// Decode `json_text` into an instance of the shape's type.
pub fn decode(json_text: &str, shape: &ParameterShape) -> Result<Record, HarnessError> {
    let root: JsonValue = serde_json::from_str(json_text)
        .map_err(|source| HarnessError::MalformedPayload { source })?;
    match &root {
        JsonValue::Object(map) => {
            decode_record(map, shape.type_name(), shape.fields(), shape, "$")
        }
        other => Err(mismatch(
            "$",
            format!("object {}", shape.type_name()),
            other,
        )),
    }
}

fn decode_record(
    map: &Map<String, JsonValue>,
    type_name: &str,
    fields: &[FieldDecl],
    shape: &ParameterShape,
    path: &str,
) -> Result<Record, HarnessError> {
    let mut out = IndexMap::with_capacity(fields.len());
    for field in fields {
        let value = match map.get(&field.name) {
            None | Some(JsonValue::Null) => Value::default_for(&field.ty),
            Some(raw) => decode_value(raw, &field.ty, shape, &format!("{path}.{}", field.name))?,
        };
        out.insert(field.name.clone(), value);
    }
    Ok(Record::new(type_name, out))
}

fn decode_value(
    raw: &JsonValue,
    ty: &FieldType,
    shape: &ParameterShape,
    path: &str,
) -> Result<Value, HarnessError> {
    match ty {
        FieldType::Text => match raw {
            JsonValue::String(text) => Ok(Value::Text(text.clone())),
            JsonValue::Number(number) => Ok(Value::Text(number.to_string())),
            JsonValue::Bool(flag) => Ok(Value::Text(flag.to_string())),
            other => Err(mismatch(path, ty, other)),
        },
        FieldType::Integer => match raw {
            JsonValue::Number(number) => integer(number).map(Value::Int).ok_or_else(|| {
                HarnessError::TypeMismatch {
                    path: path.to_owned(),
                    expected: ty.to_string(),
                    found: "fractional or out-of-range number",
                }
            }),
            JsonValue::String(text) => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| mismatch(path, ty, raw)),
            other => Err(mismatch(path, ty, other)),
        },
        FieldType::Float => match raw {
            JsonValue::Number(number) => number
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| mismatch(path, ty, raw)),
            JsonValue::String(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Value::Float)
                .ok_or_else(|| mismatch(path, ty, raw)),
            other => Err(mismatch(path, ty, other)),
        },
        FieldType::Boolean => match raw {
            JsonValue::Bool(flag) => Ok(Value::Bool(*flag)),
            JsonValue::String(text) if text == "true" => Ok(Value::Bool(true)),
            JsonValue::String(text) if text == "false" => Ok(Value::Bool(false)),
            other => Err(mismatch(path, ty, other)),
        },
        FieldType::Object(name) => match raw {
            JsonValue::Object(map) => {
                let fields = shape.nested(name).ok_or_else(|| HarnessError::TypeMismatch {
                    path: path.to_owned(),
                    expected: ty.to_string(),
                    found: "undeclared type",
                })?;
                decode_record(map, name, fields, shape, path).map(Value::Record)
            }
            other => Err(mismatch(path, ty, other)),
        },
        FieldType::List(elem) => match raw {
            JsonValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let value = match item {
                        JsonValue::Null => Value::default_for(elem),
                        item => decode_value(item, elem, shape, &format!("{path}[{index}]"))?,
                    };
                    out.push(value);
                }
                Ok(Value::List(out))
            }
            other => Err(mismatch(path, ty, other)),
        },
    }
}

/// Integral value of `number`, accepting floats with no fractional part.
fn integer(number: &Number) -> Option<i64> {
    // i64::MAX is not representable as f64; the bound is exclusive
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    number.as_i64().or_else(|| {
        number
            .as_f64()
            .filter(|value| value.fract() == 0.0 && *value >= -LIMIT && *value < LIMIT)
            .map(|value| value as i64)
    })
}

fn mismatch(path: &str, expected: impl ToString, found: &JsonValue) -> HarnessError {
    HarnessError::TypeMismatch {
        path: path.to_owned(),
        expected: expected.to_string(),
        found: json_kind(found),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
