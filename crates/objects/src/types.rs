//! Shared value types for the object domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! structure: a [`Pointer`] pairs a class with an id, a [`GeoPoint`] has range
//! invariants, and each knows its own tagged wire shape.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{ClassName, ObjectId};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 string such as `"2024-05-01T10:00:00.000Z"`.
    pub fn parse(iso: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(iso)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Millisecond-precision ISO form used on the wire.
    pub fn to_iso(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso())
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// A lightweight reference to a saved remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    /// Class of the referenced object.
    pub class_name: ClassName,
    /// Server-assigned id of the referenced object.
    pub object_id: ObjectId,
}

impl Pointer {
    /// Creates a pointer from its parts.
    pub fn new(class_name: ClassName, object_id: ObjectId) -> Self {
        Self {
            class_name,
            object_id,
        }
    }

    /// Renders `{"__type":"Pointer","className":..,"objectId":..}`.
    pub fn to_wire(&self) -> Value {
        json!({
            "__type": "Pointer",
            "className": self.class_name.as_str(),
            "objectId": self.object_id.as_str(),
        })
    }
}

/// A binary attachment that already lives in remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Server-side name (usually prefixed with a unique token by the server).
    pub name: String,
    /// Location the file can be downloaded from.
    pub url: String,
}

impl RemoteFile {
    /// Renders `{"__type":"File","name":..,"url":..}`.
    pub fn to_wire(&self) -> Value {
        json!({
            "__type": "File",
            "name": self.name,
            "url": self.url,
        })
    }
}

// ---------------------------------------------------------------------------
// Geo
// ---------------------------------------------------------------------------

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Creates a [`GeoPoint`], returning `None` when either coordinate is out
    /// of range (`[-90, 90]` latitude, `[-180, 180]` longitude) or not finite.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lng_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        if lat_ok && lng_ok {
            Some(Self {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }

    /// Latitude in degrees.
    pub fn latitude(self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(self) -> f64 {
        self.longitude
    }

    /// Renders `{"__type":"GeoPoint","latitude":..,"longitude":..}`.
    pub fn to_wire(self) -> Value {
        json!({
            "__type": "GeoPoint",
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }
}
