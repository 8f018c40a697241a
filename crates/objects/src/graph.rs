//! Arena holding an interlinked set of objects and attachments.
//!
//! Objects refer to each other through [`ObjectKey`] slots rather than shared
//! pointers, so cyclic graphs need no reference counting and identity of an
//! unsaved object is simply its slot.

use crate::{DomainObject, RemoteFile};

/// Stable slot of an object inside one [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(usize);

impl ObjectKey {
    /// Returns the slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Stable slot of an attachment inside one [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileKey(usize);

impl FileKey {
    /// Returns the slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// An embedded binary attachment, local until uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    name: String,
    content_type: Option<String>,
    data: Option<Vec<u8>>,
    remote: Option<RemoteFile>,
}

impl FileAttachment {
    /// A local attachment with bytes to upload.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: Some(data),
            remote: None,
        }
    }

    /// An attachment that already lives in remote storage.
    pub fn uploaded(remote: RemoteFile) -> Self {
        Self {
            name: remote.name.clone(),
            content_type: None,
            data: None,
            remote: Some(remote),
        }
    }

    /// Sets the MIME type sent with the upload.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Local file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type, if set.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Bytes waiting to be uploaded.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Remote location, once uploaded.
    pub fn remote(&self) -> Option<&RemoteFile> {
        self.remote.as_ref()
    }

    /// Records a completed upload and releases the local bytes.
    pub fn mark_uploaded(&mut self, remote: RemoteFile) {
        self.remote = Some(remote);
        self.data = None;
    }
}

/// Owner of every object and attachment taking part in a save.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: Vec<DomainObject>,
    files: Vec<FileAttachment>,
}

impl ObjectGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object and returns its slot.
    pub fn insert(&mut self, object: DomainObject) -> ObjectKey {
        self.objects.push(object);
        ObjectKey(self.objects.len() - 1)
    }

    /// Adds an attachment and returns its slot.
    pub fn attach(&mut self, file: FileAttachment) -> FileKey {
        self.files.push(file);
        FileKey(self.files.len() - 1)
    }

    /// Looks up an object.
    pub fn get(&self, key: ObjectKey) -> Option<&DomainObject> {
        self.objects.get(key.0)
    }

    /// Looks up an object for mutation.
    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut DomainObject> {
        self.objects.get_mut(key.0)
    }

    /// Looks up an attachment.
    pub fn file(&self, key: FileKey) -> Option<&FileAttachment> {
        self.files.get(key.0)
    }

    /// Looks up an attachment for mutation.
    pub fn file_mut(&mut self, key: FileKey) -> Option<&mut FileAttachment> {
        self.files.get_mut(key.0)
    }

    /// Number of objects held.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// `true` when no objects are held.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates objects with their slots.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectKey, &DomainObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjectKey(i), o))
    }
}
