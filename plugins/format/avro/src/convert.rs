use std::collections::HashMap;

use apache_avro::schema::Name;
use apache_avro::types::Value;
use apache_avro::{Days, Decimal, Duration, Millis, Months, Schema};
use base64::Engine;
use serde_json::json;

use recscope_api::SerdeError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

// ═══════════════════════════════════════════════════════════════
//  Avro → JSON conversion
// ═══════════════════════════════════════════════════════════════

/// Render a decoded datum as JSON.
///
/// Unions are flattened to their branch value, bytes and fixed become
/// base64 strings, logical types keep their underlying number.
pub fn avro_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => json!(i),
        Value::Long(l) => json!(l),
        Value::Float(f) => json!(f),
        Value::Double(d) => json!(d),
        Value::Bytes(b) | Value::Fixed(_, b) => serde_json::Value::String(B64.encode(b)),
        Value::String(s) | Value::Enum(_, s) => serde_json::Value::String(s.clone()),
        Value::Union(_, inner) => avro_to_json(inner),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(avro_to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        Value::Record(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        Value::Date(d) => json!(d),
        Value::TimeMillis(t) => json!(t),
        Value::TimeMicros(t) => json!(t),
        Value::TimestampMillis(t) => json!(t),
        Value::TimestampMicros(t) => json!(t),
        Value::TimestampNanos(t) => json!(t),
        Value::LocalTimestampMillis(t) => json!(t),
        Value::LocalTimestampMicros(t) => json!(t),
        Value::LocalTimestampNanos(t) => json!(t),
        Value::Decimal(d) => {
            let bytes: Vec<u8> = d.try_into().unwrap_or_default();
            serde_json::Value::String(B64.encode(bytes))
        }
        Value::BigDecimal(d) => serde_json::Value::String(d.to_string()),
        Value::Uuid(u) => serde_json::Value::String(u.to_string()),
        Value::Duration(d) => json!({
            "months": u32::from(d.months()),
            "days": u32::from(d.days()),
            "millis": u32::from(d.millis()),
        }),
    }
}

// ═══════════════════════════════════════════════════════════════
//  JSON → Avro conversion
// ═══════════════════════════════════════════════════════════════

/// Named types reachable from a set of schemas, for resolving `Schema::Ref`.
#[derive(Debug, Default)]
pub struct NamedTypes {
    types: HashMap<Name, Schema>,
}

impl NamedTypes {
    pub fn collect<'s>(schemas: impl IntoIterator<Item = &'s Schema>) -> Self {
        let mut named = Self::default();
        for schema in schemas {
            named.visit(schema);
        }
        named
    }

    fn visit(&mut self, schema: &Schema) {
        match schema {
            Schema::Record(record) => {
                if self.types.contains_key(&record.name) {
                    return;
                }
                self.types.insert(record.name.clone(), schema.clone());
                for field in &record.fields {
                    self.visit(&field.schema);
                }
            }
            Schema::Enum(e) => {
                self.types.insert(e.name.clone(), schema.clone());
            }
            Schema::Fixed(f) => {
                self.types.insert(f.name.clone(), schema.clone());
            }
            Schema::Array(inner) => self.visit(&inner.items),
            Schema::Map(inner) => self.visit(&inner.types),
            Schema::Union(union) => {
                for variant in union.variants() {
                    self.visit(variant);
                }
            }
            _ => {}
        }
    }

    fn get(&self, name: &Name) -> Option<&Schema> {
        self.types.get(name)
    }
}

fn mismatch(val: &serde_json::Value, expected: &str) -> SerdeError {
    let mut shown = val.to_string();
    if shown.chars().count() > 64 {
        shown = shown.chars().take(64).chain("...".chars()).collect();
    }
    SerdeError::new(format!("avro: expected {expected}, got {shown}"))
}

fn int_value(val: &serde_json::Value) -> Result<i64, SerdeError> {
    val.as_i64().ok_or_else(|| mismatch(val, "an integer"))
}

fn u32_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<u32, SerdeError> {
    obj.get(key)
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SerdeError::new(format!("avro: duration field '{key}' must be an unsigned 32-bit integer")))
}

fn base64_value(val: &serde_json::Value) -> Result<Vec<u8>, SerdeError> {
    let s = val.as_str().ok_or_else(|| mismatch(val, "a base64 string"))?;
    B64.decode(s)
        .map_err(|e| SerdeError::new(format!("avro: invalid base64 for bytes: {e}")))
}

fn resolved(value: Value, schema: &Schema) -> Result<Value, SerdeError> {
    value
        .resolve(schema)
        .map_err(|e| SerdeError::new(format!("avro: {e}")))
}

/// Convert JSON into an Avro value shaped by `schema`.
///
/// Bytes, fixed and decimal values are expected as base64 strings, the
/// same shape [`avro_to_json`] produces. Union branches are tried in
/// declaration order; missing record fields fall back to their default.
pub fn json_to_avro(
    val: &serde_json::Value,
    schema: &Schema,
    named: &NamedTypes,
) -> Result<Value, SerdeError> {
    match schema {
        Schema::Null => match val {
            serde_json::Value::Null => Ok(Value::Null),
            other => Err(mismatch(other, "null")),
        },
        Schema::Boolean => val
            .as_bool()
            .map(Value::Boolean)
            .ok_or_else(|| mismatch(val, "a boolean")),
        Schema::Int => {
            let n = int_value(val)?;
            i32::try_from(n)
                .map(Value::Int)
                .map_err(|_| mismatch(val, "a 32-bit integer"))
        }
        Schema::Long => Ok(Value::Long(int_value(val)?)),
        Schema::Float => val
            .as_f64()
            .map(|f| Value::Float(f as f32))
            .ok_or_else(|| mismatch(val, "a number")),
        Schema::Double => val
            .as_f64()
            .map(Value::Double)
            .ok_or_else(|| mismatch(val, "a number")),
        Schema::String => val
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| mismatch(val, "a string")),
        Schema::Bytes => Ok(Value::Bytes(base64_value(val)?)),
        Schema::Fixed(fixed) => {
            let bytes = base64_value(val)?;
            if bytes.len() != fixed.size {
                return Err(SerdeError::new(format!(
                    "avro: fixed '{}' needs {} bytes, got {}",
                    fixed.name, fixed.size, bytes.len()
                )));
            }
            Ok(Value::Fixed(fixed.size, bytes))
        }
        Schema::Enum(e) => {
            let symbol = val.as_str().ok_or_else(|| mismatch(val, "an enum symbol"))?;
            let idx = e
                .symbols
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(|| SerdeError::new(format!("avro: '{symbol}' is not a symbol of enum '{}'", e.name)))?;
            Ok(Value::Enum(idx as u32, symbol.to_string()))
        }
        Schema::Array(inner) => {
            let items = val.as_array().ok_or_else(|| mismatch(val, "an array"))?;
            let converted: Result<Vec<Value>, SerdeError> = items
                .iter()
                .map(|item| json_to_avro(item, &inner.items, named))
                .collect();
            Ok(Value::Array(converted?))
        }
        Schema::Map(inner) => {
            let entries = val.as_object().ok_or_else(|| mismatch(val, "an object"))?;
            let mut map = HashMap::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(k.clone(), json_to_avro(v, &inner.types, named)?);
            }
            Ok(Value::Map(map))
        }
        Schema::Record(record) => {
            let obj = val.as_object().ok_or_else(|| mismatch(val, "an object"))?;
            let mut fields = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let field_val = match (obj.get(&field.name), &field.default) {
                    (Some(v), _) => v,
                    (None, Some(default)) => default,
                    (None, None) if matches!(field.schema, Schema::Union(_)) => &serde_json::Value::Null,
                    (None, None) => {
                        return Err(SerdeError::new(format!(
                            "avro: record '{}' is missing field '{}'",
                            record.name, field.name
                        )));
                    }
                };
                let converted = json_to_avro(field_val, &field.schema, named)
                    .map_err(|e| e.with_context(format!("field '{}'", field.name)))?;
                fields.push((field.name.clone(), converted));
            }
            Ok(Value::Record(fields))
        }
        Schema::Union(union) => {
            for (idx, variant) in union.variants().iter().enumerate() {
                if let Ok(v) = json_to_avro(val, variant, named) {
                    return Ok(Value::Union(idx as u32, Box::new(v)));
                }
            }
            Err(mismatch(val, "a value matching one of the union branches"))
        }
        Schema::Ref { name } => {
            let target = named
                .get(name)
                .ok_or_else(|| SerdeError::new(format!("avro: unresolved named type '{name}'")))?;
            json_to_avro(val, target, named)
        }
        Schema::Decimal(_) => Ok(Value::Decimal(Decimal::from(base64_value(val)?))),
        Schema::Duration => {
            let obj = val.as_object().ok_or_else(|| mismatch(val, "a duration object"))?;
            Ok(Value::Duration(Duration::new(
                Months::new(u32_field(obj, "months")?),
                Days::new(u32_field(obj, "days")?),
                Millis::new(u32_field(obj, "millis")?),
            )))
        }
        Schema::Uuid => {
            let s = val.as_str().ok_or_else(|| mismatch(val, "a UUID string"))?;
            resolved(Value::String(s.to_string()), schema)
        }
        Schema::Date | Schema::TimeMillis => {
            let n = int_value(val)?;
            let n = i32::try_from(n).map_err(|_| mismatch(val, "a 32-bit integer"))?;
            resolved(Value::Int(n), schema)
        }
        Schema::TimeMicros
        | Schema::TimestampMillis
        | Schema::TimestampMicros
        | Schema::TimestampNanos
        | Schema::LocalTimestampMillis
        | Schema::LocalTimestampMicros
        | Schema::LocalTimestampNanos => resolved(Value::Long(int_value(val)?), schema),
        Schema::BigDecimal => Err(SerdeError::new("avro: big-decimal values cannot be serialized from JSON")),
    }
}
