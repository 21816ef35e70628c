use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{btree_map, BTreeMap},
    fmt::{self, Display},
    str::FromStr,
};

use crate::error::Error;

/// The role a participant plays on the map.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Looks for vendors nearby.
    Customer,
    /// Roams around and is looked for by customers.
    Vendor,
}

impl Role {
    /// Returns the role as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
        }
    }

    /// The role this role is paired with: customers see vendors and vice
    /// versa.
    pub fn opposite(&self) -> Role {
        match self {
            Role::Customer => Role::Vendor,
            Role::Vendor => Role::Customer,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "vendor" => Ok(Role::Vendor),
            _ => Err(Error::InvalidRole(s.to_string())),
        }
    }
}

/// Whether a participant is currently sharing their location.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    /// Returns the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// A point on the map in WGS84 degrees.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<(f64, f64)> for Location {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// A participant's remote-visible presence entry, stored at
/// `users/<identifier>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// The display name shown on the participant's marker.
    pub name: String,
    pub role: Role,
    pub status: Status,
    /// The last accepted position. Absent until the first fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PresenceRecord {
    /// Returns the location if the record is active and located, which is
    /// what it takes to show up on the map.
    pub fn visible_location(&self) -> Option<Location> {
        match self.status {
            Status::Active => self.location,
            Status::Inactive => None,
        }
    }
}

/// The payload used to create a new presence record.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPresence {
    pub name: String,
    pub role: Role,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl NewPresence {
    /// A freshly verified participant, active from the start.
    pub fn active<N: Into<String>>(name: N, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            status: Status::Active,
            created_at: Utc::now(),
        }
    }
}

impl From<NewPresence> for PresenceRecord {
    fn from(new: NewPresence) -> Self {
        Self {
            name: new.name,
            role: new.role,
            status: new.status,
            location: None,
            created_at: Some(new.created_at),
        }
    }
}

/// A partial update of a presence record. Unset fields are left untouched.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct PresenceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl PresenceUpdate {
    /// Publishes a new position and marks the record active.
    pub fn located(location: Location) -> Self {
        Self {
            location: Some(location),
            status: Some(Status::Active),
        }
    }

    /// Marks the record inactive, keeping its last location.
    pub fn deactivate() -> Self {
        Self {
            location: None,
            status: Some(Status::Inactive),
        }
    }

    /// Applies the update to an existing record.
    pub fn apply_to(&self, record: &mut PresenceRecord) {
        if let Some(location) = self.location {
            record.location = Some(location);
        }
        if let Some(status) = self.status {
            record.status = status;
        }
    }
}

/// The response of the database when a record is pushed onto a collection.
#[derive(Deserialize, Debug)]
pub(crate) struct PushResponse {
    pub name: String,
}

/// The full `users` collection at one point in time, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceSnapshot {
    records: BTreeMap<String, PresenceRecord>,
}

impl PresenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a raw collection value. Records that don't decode are skipped
    /// so one malformed participant can't hide everybody else.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let mut records = BTreeMap::new();
        if let serde_json::Value::Object(map) = value {
            for (id, raw) in map {
                match PresenceRecord::deserialize(raw) {
                    Ok(record) => {
                        records.insert(id.clone(), record);
                    }
                    Err(e) => tracing::warn!(id = %id, error = %e, "skipping undecodable presence record"),
                }
            }
        }
        Self { records }
    }

    pub fn get(&self, id: &str) -> Option<&PresenceRecord> {
        self.records.get(id)
    }

    pub fn insert<S: Into<String>>(&mut self, id: S, record: PresenceRecord) {
        self.records.insert(id.into(), record);
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PresenceRecord> {
        self.records.get_mut(id)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PresenceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a PresenceSnapshot {
    type Item = (&'a String, &'a PresenceRecord);
    type IntoIter = btree_map::Iter<'a, String, PresenceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<(String, PresenceRecord)> for PresenceSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, PresenceRecord)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'de> Deserialize<'de> for PresenceSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // An empty collection comes back as `null`.
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .map(PresenceSnapshot::from_value)
            .unwrap_or_default())
    }
}
