use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ValidationError;

pub const MAX_ID_LENGTH: usize = 256;
pub const MAX_NAME_LENGTH: usize = 256;
pub const MAX_ADDRESS_LENGTH: usize = 512;
pub const MAX_NOTES_LENGTH: usize = 16 * 1024;

pub const VISIT_DATE_FORMAT: &str = "%b %-d, %Y";
pub const VISIT_TIME_FORMAT: &str = "%-I:%M %p";

/// Opaque place identifier, immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(String);

impl PlaceId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if id.len() > MAX_ID_LENGTH {
            return Err(ValidationError::TooLong {
                field: "id",
                len: id.len(),
                max: MAX_ID_LENGTH,
            });
        }
        Ok(Self(id))
    }

    /// Random token for places entered by hand rather than picked from a lookup.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix timestamp in milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }
}

/// A single visit. The display strings are derived once from the timestamp
/// and cached; changing the time means building a new `Visit`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    timestamp: NaiveDateTime,
    date: String,
    time: String,
}

impl Visit {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            date: timestamp.format(VISIT_DATE_FORMAT).to_string(),
            time: timestamp.format(VISIT_TIME_FORMAT).to_string(),
            timestamp,
        }
    }

    pub fn now() -> Self {
        Self::new(Local::now().naive_local())
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    /// Text shown as the "last visit" line of a place row.
    pub fn summary(&self) -> String {
        format!("{} at {}", self.date, self.time)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub visits: Vec<Visit>,
    pub position: u32,
    /// Cached photo, PNG bytes hex-encoded.
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub photo_attribution: Option<String>,
}

impl Place {
    pub fn new(
        id: PlaceId,
        name: impl Into<String>,
        address: impl Into<String>,
        position: u32,
    ) -> Result<Self, ValidationError> {
        let place = Self {
            id,
            name: name.into(),
            address: address.into(),
            notes: String::new(),
            visits: Vec::new(),
            position,
            photo: None,
            photo_attribution: None,
        };
        place.validate()?;
        Ok(place)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        PlaceFields::check(&self.name, &self.address, &self.notes)
    }

    pub fn last_visit(&self) -> Option<&Visit> {
        self.visits.last()
    }

    pub fn apply_fields(&mut self, fields: PlaceFields) {
        self.name = fields.name;
        self.address = fields.address;
        self.notes = fields.notes;
    }
}

// Photo payloads can be hundreds of kilobytes; keep them out of logs.
impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Place")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("notes_len", &self.notes.len())
            .field("visits", &self.visits.len())
            .field("position", &self.position)
            .field("photo_bytes", &self.photo.as_ref().map(String::len))
            .field("photo_attribution", &self.photo_attribution)
            .finish()
    }
}

/// User-editable text fields of a place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceFields {
    pub name: String,
    pub address: String,
    pub notes: String,
}

impl PlaceFields {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            notes: notes.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::check(&self.name, &self.address, &self.notes)
    }

    fn check(name: &str, address: &str, notes: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        for (field, value, max) in [
            ("name", name, MAX_NAME_LENGTH),
            ("address", address, MAX_ADDRESS_LENGTH),
            ("notes", notes, MAX_NOTES_LENGTH),
        ] {
            if value.len() > max {
                return Err(ValidationError::TooLong {
                    field,
                    len: value.len(),
                    max,
                });
            }
        }
        Ok(())
    }
}
