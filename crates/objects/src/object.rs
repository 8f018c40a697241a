//! The dynamic field bag every stored object is mapped onto.
//!
//! A [`DomainObject`] is identity (class name plus optional server id and
//! timestamps) and a schema-less mapping from field name to [`FieldValue`].
//! Concrete application types opt in through [`ObjectCodec`], an explicit
//! (de)serialisation contract; there is no reflection.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::{ClassName, FieldOperation, FieldValue, ObjectId, Pointer, StoreError, Timestamp};

/// Wire keys carrying identity or server-owned metadata rather than data.
pub const RESERVED_KEYS: [&str; 4] = ["objectId", "createdAt", "updatedAt", "className"];

/// A typed application object expressed as a field bag.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainObject {
    class_name: ClassName,
    object_id: Option<ObjectId>,
    created_at: Option<Timestamp>,
    updated_at: Option<Timestamp>,
    fields: BTreeMap<String, FieldValue>,
    dirty: BTreeSet<String>,
}

impl DomainObject {
    /// Creates an unsaved, empty object of the given class.
    pub fn new(class_name: ClassName) -> Self {
        Self {
            class_name,
            object_id: None,
            created_at: None,
            updated_at: None,
            fields: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Creates a clean handle to an object that already exists remotely.
    pub fn with_id(class_name: ClassName, object_id: ObjectId) -> Self {
        let mut object = Self::new(class_name);
        object.object_id = Some(object_id);
        object
    }

    /// Decodes a full server representation, which must carry `className`.
    pub fn from_json(value: &Value) -> Result<Self, StoreError> {
        let map = value
            .as_object()
            .ok_or_else(|| StoreError::protocol("object payload is not a JSON object"))?;
        let class_name = map
            .get("className")
            .and_then(Value::as_str)
            .and_then(ClassName::new)
            .ok_or_else(|| StoreError::protocol("object payload without className"))?;
        let mut object = Self::new(class_name);
        object.merge_server_data(map)?;
        Ok(object)
    }

    // -- identity ----------------------------------------------------------

    /// Class of this object.
    pub fn class_name(&self) -> &ClassName {
        &self.class_name
    }

    /// Server-assigned id, absent until the first save.
    pub fn object_id(&self) -> Option<&ObjectId> {
        self.object_id.as_ref()
    }

    /// Assigns an id on the client, for stores that accept custom object ids.
    pub fn set_object_id(&mut self, object_id: ObjectId) {
        self.object_id = Some(object_id);
    }

    /// Creation time reported by the server.
    pub fn created_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    /// Last update time reported by the server.
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    /// `true` when the object has never been saved.
    pub fn is_new(&self) -> bool {
        self.object_id.is_none()
    }

    /// A pointer to this object, available once it has an id.
    pub fn pointer(&self) -> Option<Pointer> {
        self.object_id
            .clone()
            .map(|id| Pointer::new(self.class_name.clone(), id))
    }

    // -- fields ------------------------------------------------------------

    /// Reads a field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Iterates all fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sets a field to a plain value and marks it changed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        self.fields.insert(key.clone(), value.into());
        self.dirty.insert(key);
    }

    /// Queues a field operation. Consecutive increments on one key merge.
    pub fn apply(&mut self, key: impl Into<String>, op: FieldOperation) {
        let key = key.into();
        let op = match self.fields.remove(&key) {
            Some(FieldValue::Operation(previous)) => previous.merge(op),
            _ => op,
        };
        self.fields.insert(key.clone(), FieldValue::Operation(op));
        self.dirty.insert(key);
    }

    /// Queues an atomic increment.
    pub fn increment(&mut self, key: impl Into<String>, amount: i64) {
        self.apply(key, FieldOperation::Increment(amount));
    }

    /// Queues removal of the field on the server.
    pub fn unset(&mut self, key: impl Into<String>) {
        self.apply(key, FieldOperation::Delete);
    }

    /// `true` when any field has changed since the last save or fetch.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// `true` when `key` has changed since the last save or fetch.
    pub fn is_dirty_key(&self, key: &str) -> bool {
        self.dirty.contains(key)
    }

    /// Changed keys in order.
    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    // -- server results ----------------------------------------------------

    /// Records that `sent_keys` reached the server.
    ///
    /// Sent keys stop being dirty. Sent operations are dropped because the
    /// resulting value is computed remotely; a value the server echoes back is
    /// restored by a following [`DomainObject::merge_server_data`].
    pub fn mark_sent<'a>(&mut self, sent_keys: impl IntoIterator<Item = &'a str>) {
        for key in sent_keys {
            self.dirty.remove(key);
            if matches!(self.fields.get(key), Some(FieldValue::Operation(_))) {
                self.fields.remove(key);
            }
        }
    }

    /// Merges a server response (create, update, or fetch body) into the object.
    ///
    /// Identity and timestamps are taken from the reserved keys; every other
    /// key overwrites the local field and clears its dirty mark.
    pub fn merge_server_data(&mut self, data: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(id) = data.get("objectId").and_then(Value::as_str) {
            self.object_id = ObjectId::new(id);
        }
        if let Some(created) = data.get("createdAt") {
            let ts = parse_timestamp(created)?;
            self.created_at = Some(ts);
            if self.updated_at.is_none() {
                self.updated_at = Some(ts);
            }
        }
        if let Some(updated) = data.get("updatedAt") {
            self.updated_at = Some(parse_timestamp(updated)?);
        }
        for (key, value) in data {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.fields.insert(key.clone(), FieldValue::from_wire(value)?);
            self.dirty.remove(key);
        }
        Ok(())
    }

    // -- typed contract ----------------------------------------------------

    /// Builds an unsaved object from a typed value.
    pub fn from_codec<T: ObjectCodec>(value: &T) -> Result<Self, StoreError> {
        let class_name = ClassName::new(T::CLASS_NAME)
            .ok_or_else(|| StoreError::encoding("codec declares an empty class name"))?;
        let mut object = Self::new(class_name);
        value.write_fields(&mut object);
        Ok(object)
    }

    /// Reads a typed value back out of this object.
    pub fn decode_as<T: ObjectCodec>(&self) -> Result<T, StoreError> {
        if self.class_name.as_str() != T::CLASS_NAME {
            return Err(StoreError::protocol(format!(
                "expected class {}, found {}",
                T::CLASS_NAME,
                self.class_name
            )));
        }
        T::read_fields(self)
    }
}

fn parse_timestamp(value: &Value) -> Result<Timestamp, StoreError> {
    let iso = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("iso").and_then(Value::as_str),
        _ => None,
    };
    iso.and_then(Timestamp::parse)
        .ok_or_else(|| StoreError::protocol(format!("invalid timestamp {value}")))
}

/// Explicit mapping between a concrete application type and a [`DomainObject`].
pub trait ObjectCodec: Sized {
    /// Remote class this type is stored as.
    const CLASS_NAME: &'static str;

    /// Writes this value's fields into `object`.
    fn write_fields(&self, object: &mut DomainObject);

    /// Reconstructs a value from a decoded object.
    fn read_fields(object: &DomainObject) -> Result<Self, StoreError>;
}
