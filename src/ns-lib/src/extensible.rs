use crate::{NsError, NsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A single value held by an [`Extensible`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Map(Extensible),
    Array(Vec<ExtValue>),
}

impl ExtValue {
    fn type_name(&self) -> &'static str {
        match self {
            ExtValue::Bool(_) => "bool",
            ExtValue::Int(_) => "int",
            ExtValue::UInt(_) => "uint",
            ExtValue::Float(_) => "float",
            ExtValue::String(_) => "string",
            ExtValue::Map(_) => "map",
            ExtValue::Array(_) => "array",
        }
    }

    pub fn to_bool(&self) -> NsResult<bool> {
        match self {
            ExtValue::Bool(b) => Ok(*b),
            ExtValue::Int(v) => Ok(*v != 0),
            ExtValue::UInt(v) => Ok(*v != 0),
            ExtValue::Float(v) => Ok(*v != 0.0),
            ExtValue::String(s) => {
                let lower = s.trim().to_ascii_lowercase();
                match lower.as_str() {
                    "true" | "yes" => Ok(true),
                    "false" | "no" | "" => Ok(false),
                    _ => lower
                        .parse::<f64>()
                        .map(|v| v != 0.0)
                        .map_err(|_| cast_err(self, "bool")),
                }
            }
            _ => Err(cast_err(self, "bool")),
        }
    }

    pub fn to_long(&self) -> NsResult<i64> {
        match self {
            ExtValue::Bool(b) => Ok(*b as i64),
            ExtValue::Int(v) => Ok(*v),
            ExtValue::UInt(v) => i64::try_from(*v).map_err(|_| cast_err(self, "long")),
            ExtValue::Float(v) => Ok(v.trunc() as i64),
            ExtValue::String(s) => s.trim().parse::<i64>().map_err(|_| cast_err(self, "long")),
            _ => Err(cast_err(self, "long")),
        }
    }

    pub fn to_unsigned(&self) -> NsResult<u64> {
        match self {
            ExtValue::Bool(b) => Ok(*b as u64),
            ExtValue::Int(v) => u64::try_from(*v).map_err(|_| cast_err(self, "unsigned")),
            ExtValue::UInt(v) => Ok(*v),
            ExtValue::Float(v) if *v >= 0.0 => Ok(v.trunc() as u64),
            ExtValue::String(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| cast_err(self, "unsigned")),
            _ => Err(cast_err(self, "unsigned")),
        }
    }

    pub fn to_double(&self) -> NsResult<f64> {
        match self {
            ExtValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            ExtValue::Int(v) => Ok(*v as f64),
            ExtValue::UInt(v) => Ok(*v as f64),
            ExtValue::Float(v) => Ok(*v),
            ExtValue::String(s) => s.trim().parse::<f64>().map_err(|_| cast_err(self, "double")),
            _ => Err(cast_err(self, "double")),
        }
    }

    pub fn to_string_value(&self) -> NsResult<String> {
        match self {
            ExtValue::Bool(b) => Ok(b.to_string()),
            ExtValue::Int(v) => Ok(v.to_string()),
            ExtValue::UInt(v) => Ok(v.to_string()),
            ExtValue::Float(v) => Ok(v.to_string()),
            ExtValue::String(s) => Ok(s.clone()),
            _ => Err(cast_err(self, "string")),
        }
    }
}

fn cast_err(value: &ExtValue, target: &str) -> NsError {
    NsError::InvalidValue(format!(
        "can not convert {} value {:?} to {}",
        value.type_name(),
        value,
        target
    ))
}

impl From<bool> for ExtValue {
    fn from(v: bool) -> Self {
        ExtValue::Bool(v)
    }
}

impl From<i32> for ExtValue {
    fn from(v: i32) -> Self {
        ExtValue::Int(v as i64)
    }
}

impl From<i64> for ExtValue {
    fn from(v: i64) -> Self {
        ExtValue::Int(v)
    }
}

impl From<u32> for ExtValue {
    fn from(v: u32) -> Self {
        ExtValue::UInt(v as u64)
    }
}

impl From<u64> for ExtValue {
    fn from(v: u64) -> Self {
        ExtValue::UInt(v)
    }
}

impl From<f64> for ExtValue {
    fn from(v: f64) -> Self {
        ExtValue::Float(v)
    }
}

impl From<&str> for ExtValue {
    fn from(v: &str) -> Self {
        ExtValue::String(v.to_string())
    }
}

impl From<String> for ExtValue {
    fn from(v: String) -> Self {
        ExtValue::String(v)
    }
}

impl From<Extensible> for ExtValue {
    fn from(v: Extensible) -> Self {
        ExtValue::Map(v)
    }
}

impl From<Vec<ExtValue>> for ExtValue {
    fn from(v: Vec<ExtValue>) -> Self {
        ExtValue::Array(v)
    }
}

impl From<&ExtValue> for Value {
    fn from(v: &ExtValue) -> Self {
        match v {
            ExtValue::Bool(b) => Value::Bool(*b),
            ExtValue::Int(i) => Value::Number(Number::from(*i)),
            ExtValue::UInt(u) => Value::Number(Number::from(*u)),
            ExtValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ExtValue::String(s) => Value::String(s.clone()),
            ExtValue::Map(m) => Value::from(m),
            ExtValue::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
        }
    }
}

impl TryFrom<Value> for ExtValue {
    type Error = NsError;

    fn try_from(value: Value) -> NsResult<Self> {
        match value {
            Value::Bool(b) => Ok(ExtValue::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ExtValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(ExtValue::UInt(u))
                } else {
                    n.as_f64()
                        .map(ExtValue::Float)
                        .ok_or_else(|| NsError::InvalidValue(format!("bad number {}", n)))
                }
            }
            Value::String(s) => Ok(ExtValue::String(s)),
            Value::Array(items) => items
                .into_iter()
                .map(ExtValue::try_from)
                .collect::<NsResult<Vec<_>>>()
                .map(ExtValue::Array),
            Value::Object(_) => Extensible::try_from(value).map(ExtValue::Map),
            Value::Null => Err(NsError::InvalidValue(
                "null can not be stored in an extensible".to_string(),
            )),
        }
    }
}

/// String-keyed dictionary of tagged values attached to most catalog
/// records (entries, replicas, pools, chunks, identities).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct Extensible {
    dict: BTreeMap<String, ExtValue>,
}

impl Extensible {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.dict.contains_key(key)
    }

    pub fn get(&self, key: &str) -> NsResult<&ExtValue> {
        self.dict
            .get(key)
            .ok_or_else(|| NsError::InvalidValue(format!("key {} not found", key)))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ExtValue>) {
        self.dict.insert(key.into(), value.into());
    }

    pub fn erase(&mut self, key: &str) -> Option<ExtValue> {
        self.dict.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.dict.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn clear(&mut self) {
        self.dict.clear();
    }

    /// Copies every field of `other` into self, overwriting duplicates.
    pub fn copy_from(&mut self, other: &Extensible) {
        for (k, v) in other.dict.iter() {
            self.dict.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtValue)> {
        self.dict.iter()
    }

    pub fn get_bool(&self, key: &str) -> NsResult<bool> {
        self.get(key)?.to_bool()
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> NsResult<bool> {
        match self.dict.get(key) {
            Some(v) => v.to_bool(),
            None => Ok(default),
        }
    }

    pub fn get_long(&self, key: &str) -> NsResult<i64> {
        self.get(key)?.to_long()
    }

    pub fn get_long_or(&self, key: &str, default: i64) -> NsResult<i64> {
        match self.dict.get(key) {
            Some(v) => v.to_long(),
            None => Ok(default),
        }
    }

    pub fn get_unsigned(&self, key: &str) -> NsResult<u64> {
        self.get(key)?.to_unsigned()
    }

    pub fn get_unsigned_or(&self, key: &str, default: u64) -> NsResult<u64> {
        match self.dict.get(key) {
            Some(v) => v.to_unsigned(),
            None => Ok(default),
        }
    }

    pub fn get_double(&self, key: &str) -> NsResult<f64> {
        self.get(key)?.to_double()
    }

    pub fn get_double_or(&self, key: &str, default: f64) -> NsResult<f64> {
        match self.dict.get(key) {
            Some(v) => v.to_double(),
            None => Ok(default),
        }
    }

    pub fn get_string(&self, key: &str) -> NsResult<String> {
        self.get(key)?.to_string_value()
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> NsResult<String> {
        match self.dict.get(key) {
            Some(v) => v.to_string_value(),
            None => Ok(default.to_string()),
        }
    }

    pub fn get_extensible(&self, key: &str) -> NsResult<Extensible> {
        match self.get(key)? {
            ExtValue::Map(m) => Ok(m.clone()),
            other => Err(cast_err(other, "map")),
        }
    }

    pub fn get_extensible_or(&self, key: &str, default: Extensible) -> NsResult<Extensible> {
        if self.has_field(key) {
            self.get_extensible(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_vector(&self, key: &str) -> NsResult<Vec<ExtValue>> {
        match self.get(key)? {
            ExtValue::Array(items) => Ok(items.clone()),
            other => Err(cast_err(other, "array")),
        }
    }

    pub fn get_vector_or(&self, key: &str, default: Vec<ExtValue>) -> NsResult<Vec<ExtValue>> {
        if self.has_field(key) {
            self.get_vector(key)
        } else {
            Ok(default)
        }
    }

    /// Serializes to a JSON object.
    pub fn serialize(&self) -> String {
        Value::from(self).to_string()
    }

    /// Replaces the content with the JSON object in `serial`. An empty
    /// string leaves the dictionary empty.
    pub fn deserialize(&mut self, serial: &str) -> NsResult<()> {
        self.dict.clear();
        if serial.trim().is_empty() {
            return Ok(());
        }
        let value: Value = serde_json::from_str(serial)
            .map_err(|e| NsError::InvalidValue(format!("invalid json {}: {}", serial, e)))?;
        *self = Extensible::try_from(value)?;
        Ok(())
    }

    pub fn from_json_str(serial: &str) -> NsResult<Self> {
        let mut out = Extensible::new();
        out.deserialize(serial)?;
        Ok(out)
    }
}

impl From<&Extensible> for Value {
    fn from(ext: &Extensible) -> Self {
        let mut map = Map::new();
        for (k, v) in ext.dict.iter() {
            map.insert(k.clone(), Value::from(v));
        }
        Value::Object(map)
    }
}

impl From<Extensible> for Value {
    fn from(ext: Extensible) -> Self {
        Value::from(&ext)
    }
}

impl TryFrom<Value> for Extensible {
    type Error = NsError;

    fn try_from(value: Value) -> NsResult<Self> {
        let Value::Object(map) = value else {
            return Err(NsError::InvalidValue(
                "extensible must be a json object".to_string(),
            ));
        };
        let mut dict = BTreeMap::new();
        for (k, v) in map {
            // Nulls carry no information; drop them instead of failing.
            if v.is_null() {
                continue;
            }
            dict.insert(k, ExtValue::try_from(v)?);
        }
        Ok(Extensible { dict })
    }
}
