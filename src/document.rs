// src/document.rs

use serde_json::Value;
use std::ops::{Deref, DerefMut};

/// A query/update/selector/reply body. The pack's nearest analogue to
/// BSON is a `serde_json::Value` with order-preserving objects (the
/// `indexmap`/`preserve_order` feature pairing the teacher already
/// depends on), so that's what this wraps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document(Value);

impl Document {
    pub fn new(value: Value) -> Self {
        Document(value)
    }

    pub fn empty() -> Self {
        Document(Value::Object(Default::default()))
    }

    pub fn into_inner(self) -> Value {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Byte size, used for the `BSONObjMaxUserSize`-equivalent guard on
    /// update documents.
    pub fn approx_size(&self) -> usize {
        serde_json::to_vec(&self.0).map(|v| v.len()).unwrap_or(0)
    }
}

impl Deref for Document {
    type Target = Value;
    fn deref(&self) -> &Value {
        &self.0
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Value {
        &mut self.0
    }
}

impl From<Value> for Document {
    fn from(v: Value) -> Self {
        Document(v)
    }
}

impl serde::Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}
