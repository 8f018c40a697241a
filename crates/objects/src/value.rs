//! Tagged field values and server-interpreted field operations.
//!
//! A [`FieldValue`] is what one key of a [`crate::DomainObject`] holds. Most
//! variants are plain data; [`FieldValue::Reference`] and
//! [`FieldValue::Attachment`] point into an [`crate::ObjectGraph`] and are only
//! resolvable by the [`crate::Encoder`], which decides whether the target must
//! be saved first.
//!
//! Decoding (`from_wire`) is the inverse for server payloads, which never
//! contain graph references or pending operations.

use std::collections::BTreeMap;

use base64::Engine as _;
use serde_json::{Map, Value};

use crate::{
    ClassName, FileKey, GeoPoint, ObjectId, ObjectKey, Pointer, RemoteFile, StoreError, Timestamp,
};

/// One field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit JSON `null`.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Integer(i64),
    /// Floating-point scalar. Must be finite to be encodable.
    Float(f64),
    /// String scalar.
    String(String),
    /// Point in time, encoded as `{"__type":"Date","iso":..}`.
    Date(Timestamp),
    /// Raw bytes, encoded as `{"__type":"Bytes","base64":..}`.
    Bytes(Vec<u8>),
    /// Geographic coordinate.
    GeoPoint(GeoPoint),
    /// Ordered list of values.
    Array(Vec<FieldValue>),
    /// Schema-less nested mapping.
    Map(BTreeMap<String, FieldValue>),
    /// Reference to another object held in the same graph, saved or not.
    Reference(ObjectKey),
    /// Reference to a saved remote object that is not held locally.
    Pointer(Pointer),
    /// Binary attachment held in the same graph, uploaded or not.
    Attachment(FileKey),
    /// Attachment that already lives in remote storage.
    File(RemoteFile),
    /// Relation column marker reported by the server.
    Relation(ClassName),
    /// Pending delta instruction; the server computes the resulting value.
    Operation(FieldOperation),
}

/// A server-interpreted delta instruction sent in place of a resolved value.
///
/// Operations are not retry-safe in general: re-sending an `Increment` after an
/// ambiguous failure may apply it twice.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperation {
    /// Atomically add `amount` to a numeric field.
    Increment(i64),
    /// Append values not already present in an array field.
    AddUnique(Vec<FieldValue>),
    /// Append values to an array field.
    Add(Vec<FieldValue>),
    /// Remove every occurrence of the values from an array field.
    Remove(Vec<FieldValue>),
    /// Add objects (references or pointers) to a relation field.
    AddRelation(Vec<FieldValue>),
    /// Remove objects (references or pointers) from a relation field.
    RemoveRelation(Vec<FieldValue>),
    /// Remove the field from the object.
    Delete,
}

impl FieldOperation {
    /// The `__op` tag used on the wire.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Increment(_) => "Increment",
            Self::AddUnique(_) => "AddUnique",
            Self::Add(_) => "Add",
            Self::Remove(_) => "Remove",
            Self::AddRelation(_) => "AddRelation",
            Self::RemoveRelation(_) => "RemoveRelation",
            Self::Delete => "Delete",
        }
    }

    /// Combines `next` into `self` when both can be expressed as one operation.
    ///
    /// Only consecutive increments merge; anything else returns `next` unchanged
    /// so the caller replaces the pending operation.
    pub(crate) fn merge(self, next: FieldOperation) -> FieldOperation {
        match (self, next) {
            (Self::Increment(a), Self::Increment(b)) => Self::Increment(a.saturating_add(b)),
            (_, next) => next,
        }
    }
}

impl FieldValue {
    /// Decodes a value from a server payload.
    ///
    /// Tagged objects (`__type`) become their typed variants; included full
    /// objects (`__type: "Object"`) collapse to a [`Pointer`]. A pending
    /// operation (`__op`) is never valid in a server payload.
    pub fn from_wire(value: &Value) -> Result<Self, StoreError> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Array(
                items
                    .iter()
                    .map(Self::from_wire)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Object(map) => decode_object(map)?,
        })
    }
}

fn decode_object(map: &Map<String, Value>) -> Result<FieldValue, StoreError> {
    if map.contains_key("__op") {
        return Err(StoreError::protocol(
            "field operation found in a server payload",
        ));
    }
    let Some(tag) = map.get("__type").and_then(Value::as_str) else {
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.clone(), FieldValue::from_wire(value)?);
        }
        return Ok(FieldValue::Map(out));
    };

    match tag {
        "Pointer" | "Object" => {
            let class_name = str_field(map, "className").and_then(ClassName::new);
            let object_id = str_field(map, "objectId").and_then(ObjectId::new);
            match (class_name, object_id) {
                (Some(class_name), Some(object_id)) => {
                    Ok(FieldValue::Pointer(Pointer::new(class_name, object_id)))
                }
                _ => Err(StoreError::protocol(format!(
                    "{tag} value without className/objectId"
                ))),
            }
        }
        "File" => {
            let url = str_field(map, "url")
                .ok_or_else(|| StoreError::protocol("File value without url"))?;
            let name = str_field(map, "name").unwrap_or_default();
            Ok(FieldValue::File(RemoteFile {
                name: name.to_owned(),
                url: url.to_owned(),
            }))
        }
        "Date" => str_field(map, "iso")
            .and_then(Timestamp::parse)
            .map(FieldValue::Date)
            .ok_or_else(|| StoreError::protocol("Date value without a valid iso string")),
        "Bytes" => {
            let encoded = str_field(map, "base64")
                .ok_or_else(|| StoreError::protocol("Bytes value without base64"))?;
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map(FieldValue::Bytes)
                .map_err(|e| StoreError::protocol(format!("invalid base64 bytes: {e}")))
        }
        "GeoPoint" => {
            let lat = map.get("latitude").and_then(Value::as_f64);
            let lng = map.get("longitude").and_then(Value::as_f64);
            lat.zip(lng)
                .and_then(|(lat, lng)| GeoPoint::new(lat, lng))
                .map(FieldValue::GeoPoint)
                .ok_or_else(|| StoreError::protocol("GeoPoint value out of range"))
        }
        "Relation" => str_field(map, "className")
            .and_then(ClassName::new)
            .map(FieldValue::Relation)
            .ok_or_else(|| StoreError::protocol("Relation value without className")),
        other => Err(StoreError::protocol(format!("unsupported __type {other:?}"))),
    }
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(v: Timestamp) -> Self {
        Self::Date(v)
    }
}

impl From<GeoPoint> for FieldValue {
    fn from(v: GeoPoint) -> Self {
        Self::GeoPoint(v)
    }
}

impl From<Pointer> for FieldValue {
    fn from(v: Pointer) -> Self {
        Self::Pointer(v)
    }
}

impl From<ObjectKey> for FieldValue {
    fn from(v: ObjectKey) -> Self {
        Self::Reference(v)
    }
}

impl From<FileKey> for FieldValue {
    fn from(v: FileKey) -> Self {
        Self::Attachment(v)
    }
}

impl From<FieldOperation> for FieldValue {
    fn from(v: FieldOperation) -> Self {
        Self::Operation(v)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_tagged_shapes() {
        let pointer = FieldValue::from_wire(
            &json!({"__type": "Pointer", "className": "Post", "objectId": "p1"}),
        )
        .unwrap();
        assert!(matches!(pointer, FieldValue::Pointer(p) if p.object_id.as_str() == "p1"));

        let date = FieldValue::from_wire(
            &json!({"__type": "Date", "iso": "2024-01-02T03:04:05.000Z"}),
        )
        .unwrap();
        assert!(matches!(date, FieldValue::Date(_)));

        let bytes =
            FieldValue::from_wire(&json!({"__type": "Bytes", "base64": "aGk="})).unwrap();
        assert_eq!(bytes, FieldValue::Bytes(b"hi".to_vec()));
    }

    #[test]
    fn untagged_objects_decode_as_maps() {
        let value = FieldValue::from_wire(&json!({"a": 1, "b": [true, null]})).unwrap();
        let FieldValue::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map["a"], FieldValue::Integer(1));
        assert_eq!(
            map["b"],
            FieldValue::Array(vec![FieldValue::Bool(true), FieldValue::Null])
        );
    }

    #[test]
    fn operations_are_rejected_in_server_payloads() {
        let err = FieldValue::from_wire(&json!({"__op": "Increment", "amount": 1})).unwrap_err();
        assert!(matches!(err, StoreError::Protocol { .. }));
    }

    #[test]
    fn consecutive_increments_merge() {
        let merged = FieldOperation::Increment(2).merge(FieldOperation::Increment(3));
        assert_eq!(merged, FieldOperation::Increment(5));
        let replaced = FieldOperation::Increment(2).merge(FieldOperation::Delete);
        assert_eq!(replaced, FieldOperation::Delete);
    }
}
