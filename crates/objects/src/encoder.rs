//! Dependency-ordered encoding of an object graph into save steps.
//!
//! Encoding a root walks its fields depth-first. Every unsaved object or
//! un-uploaded attachment reachable from it becomes a [`SaveStep`] placed
//! before any step whose body refers to it. Objects already saved collapse to
//! pointer tokens; objects saved earlier in the same operation are written as
//! [`WireValue::PendingObject`] placeholders and resolved against the
//! [`SavedSet`] just before their command is sent.
//!
//! Cycle handling: an object is visited at most once per pass, keyed by its
//! graph slot. When an unsaved object refers back to an ancestor that is still
//! being encoded, that field cannot be expressed yet; it is left out of the
//! inner object's body and reported as a [`DeferredField`], to be sent as a
//! patch once every object in the cycle has an id.

use std::collections::{BTreeMap, HashMap, HashSet};

use base64::Engine as _;
use serde_json::{json, Map, Number, Value};

use crate::object::RESERVED_KEYS;
use crate::{
    DomainObject, FieldOperation, FieldValue, FileKey, ObjectGraph, ObjectKey, Pointer,
    RemoteFile, StoreError,
};

// ---------------------------------------------------------------------------
// Policies and outputs
// ---------------------------------------------------------------------------

/// Which implicit fields an encoded body omits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipPolicy {
    /// Object rendered inside another body: every data field, no identity or
    /// timestamps or class tag.
    Embedded,
    /// Object sent to its own save endpoint: changed fields only; identity and
    /// timestamps are server-owned and never sent.
    SaveEndpoint,
    /// As [`SkipPolicy::SaveEndpoint`], but a create carries the
    /// client-assigned `objectId`.
    CustomObjectId,
}

impl SkipPolicy {
    fn includes_field(self, object: &DomainObject, key: &str) -> bool {
        if RESERVED_KEYS.contains(&key) {
            return false;
        }
        match self {
            Self::Embedded => true,
            Self::SaveEndpoint | Self::CustomObjectId => object.is_dirty_key(key),
        }
    }

    /// Policy for dependencies discovered while encoding under `self`.
    fn for_children(self) -> Self {
        match self {
            Self::CustomObjectId => Self::CustomObjectId,
            Self::Embedded | Self::SaveEndpoint => Self::SaveEndpoint,
        }
    }

    /// `true` when `object` exists remotely under this policy.
    ///
    /// With custom ids an object carries its id before the first save, so a
    /// dirty object without a creation time still counts as new.
    pub fn is_persisted(self, object: &DomainObject) -> bool {
        match self {
            Self::CustomObjectId => {
                object.object_id().is_some()
                    && (object.created_at().is_some() || !object.is_dirty())
            }
            Self::Embedded | Self::SaveEndpoint => object.object_id().is_some(),
        }
    }
}

/// A wire value that may still name objects saved earlier in the operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Fully resolved JSON.
    Json(Value),
    /// Pointer to an object whose save step runs earlier.
    PendingObject(ObjectKey),
    /// File token for an attachment whose upload step runs earlier.
    PendingFile(FileKey),
    /// Array containing placeholders.
    Array(Vec<WireValue>),
    /// Map containing placeholders.
    Map(BTreeMap<String, WireValue>),
}

/// Encoded body of one object, keyed by field name.
pub type WireBody = BTreeMap<String, WireValue>;

impl WireValue {
    /// Substitutes placeholders with pointer and file tokens from `saved`.
    pub fn resolve(&self, saved: &SavedSet) -> Result<Value, StoreError> {
        Ok(match self {
            Self::Json(value) => value.clone(),
            Self::PendingObject(key) => saved
                .pointer(*key)
                .map(Pointer::to_wire)
                .ok_or_else(|| StoreError::child_resolution(format!("{key} was not saved")))?,
            Self::PendingFile(key) => saved
                .file(*key)
                .map(RemoteFile::to_wire)
                .ok_or_else(|| StoreError::child_resolution(format!("{key} was not uploaded")))?,
            Self::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(saved))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Map(entries) => Value::Object(resolve_entries(entries, saved)?),
        })
    }

    fn pending_objects(&self, out: &mut Vec<ObjectKey>) {
        match self {
            Self::PendingObject(key) => out.push(*key),
            Self::Array(items) => items.iter().for_each(|i| i.pending_objects(out)),
            Self::Map(entries) => entries.values().for_each(|v| v.pending_objects(out)),
            Self::Json(_) | Self::PendingFile(_) => {}
        }
    }
}

/// Resolves a whole body into a JSON object.
pub fn resolve_body(body: &WireBody, saved: &SavedSet) -> Result<Value, StoreError> {
    resolve_entries(body, saved).map(Value::Object)
}

fn resolve_entries(
    entries: &BTreeMap<String, WireValue>,
    saved: &SavedSet,
) -> Result<Map<String, Value>, StoreError> {
    let mut out = Map::new();
    for (key, value) in entries {
        out.insert(key.clone(), value.resolve(saved)?);
    }
    Ok(out)
}

/// Objects referenced by placeholder anywhere in `body`.
pub fn pending_references(body: &WireBody) -> Vec<ObjectKey> {
    let mut out = Vec::new();
    body.values().for_each(|v| v.pending_objects(&mut out));
    out
}

/// One command that must run before the root's own save.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStep {
    /// Create or update a dependency object.
    Object {
        /// Slot of the object being saved.
        key: ObjectKey,
        /// Its encoded body.
        body: WireBody,
    },
    /// Upload an attachment's bytes.
    Upload {
        /// Slot of the attachment.
        key: FileKey,
    },
}

/// A field left out of its owner's body because it closes a cycle of unsaved
/// objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredField {
    /// Object whose field was deferred.
    pub owner: ObjectKey,
    /// Name of the deferred field.
    pub field: String,
}

/// Output of encoding one root.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// The root that was encoded.
    pub root: ObjectKey,
    /// The root's own body.
    pub body: WireBody,
    /// Dependency steps in execution order.
    pub children: Vec<SaveStep>,
    /// Cycle back-edges to patch after everything is saved.
    pub deferred: Vec<DeferredField>,
}

// ---------------------------------------------------------------------------
// Saved set
// ---------------------------------------------------------------------------

/// What one save operation already knows about: objects and files that have
/// been saved (with their remote identity) and those scheduled by an earlier
/// encode call in the same operation.
///
/// Owned by a single operation; concurrent operations each use their own.
#[derive(Debug, Clone, Default)]
pub struct SavedSet {
    objects: HashMap<ObjectKey, Pointer>,
    files: HashMap<FileKey, RemoteFile>,
    scheduled_objects: HashSet<ObjectKey>,
    scheduled_files: HashSet<FileKey>,
}

impl SavedSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `key` now exists remotely as `pointer`.
    pub fn record_object(&mut self, key: ObjectKey, pointer: Pointer) {
        self.scheduled_objects.remove(&key);
        self.objects.insert(key, pointer);
    }

    /// Records that attachment `key` was uploaded.
    pub fn record_file(&mut self, key: FileKey, remote: RemoteFile) {
        self.scheduled_files.remove(&key);
        self.files.insert(key, remote);
    }

    /// Pointer of a saved object.
    pub fn pointer(&self, key: ObjectKey) -> Option<&Pointer> {
        self.objects.get(&key)
    }

    /// Remote location of an uploaded attachment.
    pub fn file(&self, key: FileKey) -> Option<&RemoteFile> {
        self.files.get(&key)
    }

    /// `true` when an earlier encode call scheduled `key` as a dependency.
    pub fn is_scheduled(&self, key: ObjectKey) -> bool {
        self.scheduled_objects.contains(&key)
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Stateless encoder over one graph.
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'g> {
    graph: &'g ObjectGraph,
    policy: SkipPolicy,
}

impl<'g> Encoder<'g> {
    /// An encoder applying `policy` to the roots it encodes.
    pub fn new(graph: &'g ObjectGraph, policy: SkipPolicy) -> Self {
        Self { graph, policy }
    }

    /// The root policy.
    pub fn policy(&self) -> SkipPolicy {
        self.policy
    }

    /// Encodes `root` and its unsaved dependencies.
    ///
    /// On success the dependencies are marked scheduled in `saved`, so a later
    /// call in the same operation refers to them instead of saving them again.
    /// On failure `saved` is untouched.
    pub fn encode(&self, root: ObjectKey, saved: &mut SavedSet) -> Result<Encoded, StoreError> {
        let mut pass = Pass::new(self.graph, saved, self.policy.for_children());
        pass.in_progress.insert(root);
        let body = pass.object_body(root, self.policy)?;
        pass.in_progress.remove(&root);

        let Pass {
            scheduled_objects,
            scheduled_files,
            children,
            deferred,
            ..
        } = pass;
        saved.scheduled_objects.extend(scheduled_objects);
        saved.scheduled_files.extend(scheduled_files);

        tracing::debug!(
            %root,
            children = children.len(),
            deferred = deferred.len(),
            "encoded save graph"
        );
        Ok(Encoded {
            root,
            body,
            children,
            deferred,
        })
    }

    /// Encodes selected fields of `owner` once every object they name is saved.
    ///
    /// Used to send deferred cycle fields. Fails if a field still depends on
    /// an unsaved object.
    pub fn encode_fields(
        &self,
        owner: ObjectKey,
        fields: &[String],
        saved: &SavedSet,
    ) -> Result<WireBody, StoreError> {
        let object = self.graph.get(owner).ok_or_else(|| missing_object(owner))?;
        let mut pass = Pass::new(self.graph, saved, self.policy.for_children());
        let mut body = WireBody::new();
        for field in fields {
            let Some(value) = object.get(field) else {
                continue;
            };
            match pass.encode_value(owner, field, value, true)? {
                Some(wire) if pass.children.is_empty() => {
                    body.insert(field.clone(), wire);
                }
                _ => {
                    return Err(StoreError::child_resolution(format!(
                        "{owner}.{field} still depends on an unsaved object"
                    )))
                }
            }
        }
        Ok(body)
    }
}

/// Mutable state of one encode call.
struct Pass<'a> {
    graph: &'a ObjectGraph,
    saved: &'a SavedSet,
    child_policy: SkipPolicy,
    in_progress: HashSet<ObjectKey>,
    scheduled_objects: HashSet<ObjectKey>,
    scheduled_files: HashSet<FileKey>,
    children: Vec<SaveStep>,
    deferred: Vec<DeferredField>,
}

impl<'a> Pass<'a> {
    fn new(graph: &'a ObjectGraph, saved: &'a SavedSet, child_policy: SkipPolicy) -> Self {
        Self {
            graph,
            saved,
            child_policy,
            in_progress: HashSet::new(),
            scheduled_objects: HashSet::new(),
            scheduled_files: HashSet::new(),
            children: Vec::new(),
            deferred: Vec::new(),
        }
    }

    fn object_body(&mut self, key: ObjectKey, policy: SkipPolicy) -> Result<WireBody, StoreError> {
        let graph = self.graph;
        let object = graph.get(key).ok_or_else(|| missing_object(key))?;
        let mut body = WireBody::new();
        for (field, value) in object.fields() {
            if !policy.includes_field(object, field) {
                continue;
            }
            match self.encode_value(key, field, value, true)? {
                Some(wire) => {
                    body.insert(field.to_owned(), wire);
                }
                None => self.deferred.push(DeferredField {
                    owner: key,
                    field: field.to_owned(),
                }),
            }
        }
        if policy == SkipPolicy::CustomObjectId && !policy.is_persisted(object) {
            let id = object.object_id().ok_or_else(|| {
                StoreError::encoding(format!("{key} has no objectId but custom ids are required"))
            })?;
            body.insert(
                "objectId".to_owned(),
                WireValue::Json(Value::String(id.as_str().to_owned())),
            );
        }
        Ok(body)
    }

    /// `Ok(None)` means the value depends on an unsaved object that is still
    /// being encoded higher up the stack.
    fn encode_value(
        &mut self,
        owner: ObjectKey,
        field: &str,
        value: &FieldValue,
        top_level: bool,
    ) -> Result<Option<WireValue>, StoreError> {
        let json = match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
                StoreError::encoding(format!("{owner}.{field} holds a non-finite number"))
            })?,
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Date(ts) => json!({"__type": "Date", "iso": ts.to_iso()}),
            FieldValue::Bytes(bytes) => json!({
                "__type": "Bytes",
                "base64": base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
            FieldValue::GeoPoint(point) => point.to_wire(),
            FieldValue::Pointer(pointer) => pointer.to_wire(),
            FieldValue::File(remote) => remote.to_wire(),
            FieldValue::Relation(class_name) => {
                json!({"__type": "Relation", "className": class_name.as_str()})
            }
            FieldValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.encode_value(owner, field, item, false)? {
                        Some(wire) => out.push(wire),
                        None => return Ok(None),
                    }
                }
                return Ok(Some(WireValue::Array(out)));
            }
            FieldValue::Map(entries) => {
                let mut out = BTreeMap::new();
                for (key, item) in entries {
                    match self.encode_value(owner, field, item, false)? {
                        Some(wire) => {
                            out.insert(key.clone(), wire);
                        }
                        None => return Ok(None),
                    }
                }
                return Ok(Some(WireValue::Map(out)));
            }
            FieldValue::Reference(child) => return self.reference(owner, field, *child),
            FieldValue::Attachment(file) => return self.attachment(owner, field, *file).map(Some),
            FieldValue::Operation(op) => {
                if !top_level {
                    return Err(StoreError::encoding(format!(
                        "{owner}.{field} nests a field operation inside a collection"
                    )));
                }
                return self.operation(owner, field, op);
            }
        };
        Ok(Some(WireValue::Json(json)))
    }

    fn operation(
        &mut self,
        owner: ObjectKey,
        field: &str,
        op: &FieldOperation,
    ) -> Result<Option<WireValue>, StoreError> {
        let name = WireValue::Json(Value::String(op.op_name().to_owned()));
        let (objects, relation) = match op {
            FieldOperation::Increment(amount) => {
                return Ok(Some(WireValue::Json(
                    json!({"__op": "Increment", "amount": amount}),
                )))
            }
            FieldOperation::Delete => return Ok(Some(WireValue::Json(json!({"__op": "Delete"})))),
            FieldOperation::Add(values)
            | FieldOperation::AddUnique(values)
            | FieldOperation::Remove(values) => (values, false),
            FieldOperation::AddRelation(values) | FieldOperation::RemoveRelation(values) => {
                (values, true)
            }
        };

        let mut items = Vec::with_capacity(objects.len());
        for value in objects {
            if relation && !matches!(value, FieldValue::Reference(_) | FieldValue::Pointer(_)) {
                return Err(StoreError::encoding(format!(
                    "{owner}.{field}: relation operations accept only object references"
                )));
            }
            match self.encode_value(owner, field, value, false)? {
                Some(wire) => items.push(wire),
                None => return Ok(None),
            }
        }
        let mut entries = BTreeMap::new();
        entries.insert("__op".to_owned(), name);
        entries.insert("objects".to_owned(), WireValue::Array(items));
        Ok(Some(WireValue::Map(entries)))
    }

    fn reference(
        &mut self,
        owner: ObjectKey,
        field: &str,
        child: ObjectKey,
    ) -> Result<Option<WireValue>, StoreError> {
        let (graph, saved) = (self.graph, self.saved);
        if let Some(pointer) = saved.pointer(child) {
            return Ok(Some(WireValue::Json(pointer.to_wire())));
        }
        let object = graph.get(child).ok_or_else(|| {
            StoreError::child_resolution(format!("{owner}.{field} refers to missing {child}"))
        })?;
        if let Some(pointer) = object.pointer() {
            if !object.is_dirty() {
                return Ok(Some(WireValue::Json(pointer.to_wire())));
            }
        }
        if saved.is_scheduled(child) || self.scheduled_objects.contains(&child) {
            return Ok(Some(WireValue::PendingObject(child)));
        }
        if self.in_progress.contains(&child) {
            // Back edge to an ancestor on the stack.
            return Ok(object.pointer().map(|p| WireValue::Json(p.to_wire())));
        }

        self.in_progress.insert(child);
        let body = self
            .object_body(child, self.child_policy)
            .map_err(|err| dependency_error(child, err))?;
        self.in_progress.remove(&child);
        self.scheduled_objects.insert(child);
        self.children.push(SaveStep::Object { key: child, body });
        Ok(Some(WireValue::PendingObject(child)))
    }

    fn attachment(
        &mut self,
        owner: ObjectKey,
        field: &str,
        key: FileKey,
    ) -> Result<WireValue, StoreError> {
        let (graph, saved) = (self.graph, self.saved);
        if let Some(remote) = saved.file(key) {
            return Ok(WireValue::Json(remote.to_wire()));
        }
        let file = graph.file(key).ok_or_else(|| {
            StoreError::child_resolution(format!("{owner}.{field} refers to missing {key}"))
        })?;
        if let Some(remote) = file.remote() {
            return Ok(WireValue::Json(remote.to_wire()));
        }
        if saved.scheduled_files.contains(&key) || self.scheduled_files.contains(&key) {
            return Ok(WireValue::PendingFile(key));
        }
        if file.data().is_none() {
            return Err(StoreError::child_resolution(format!(
                "{owner}.{field}: {key} has neither a url nor data to upload"
            )));
        }
        self.scheduled_files.insert(key);
        self.children.push(SaveStep::Upload { key });
        Ok(WireValue::PendingFile(key))
    }
}

fn missing_object(key: ObjectKey) -> StoreError {
    StoreError::child_resolution(format!("{key} is not in the graph"))
}

fn dependency_error(child: ObjectKey, err: StoreError) -> StoreError {
    match err {
        StoreError::Encoding { message } => {
            StoreError::child_resolution(format!("{child} cannot be saved: {message}"))
        }
        other => other,
    }
}
