//! Turns the presence collection into the markers a participant sees.
//!
//! Customers see active vendors and vendors see active customers. The local
//! participant's own record is reflected into the list of their own role so
//! they can see themselves.
use crate::{
    identity::User,
    presence::{Location, PresenceSnapshot, Role},
    travel,
};

/// A point on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// The key of the presence record behind this marker.
    pub identifier: String,
    pub position: Location,
    pub label: String,
}

impl Marker {
    /// Distance in kilometers from `from` to this marker.
    pub fn distance_km(&self, from: Location) -> f64 {
        travel::distance_km(from, self.position)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSet {
    pub vendors: Vec<Marker>,
    pub customers: Vec<Marker>,
}

impl MarkerSet {
    /// The list for markers of `role`.
    pub fn for_role(&self, role: Role) -> &[Marker] {
        match role {
            Role::Vendor => &self.vendors,
            Role::Customer => &self.customers,
        }
    }

    fn for_role_mut(&mut self, role: Role) -> &mut Vec<Marker> {
        match role {
            Role::Vendor => &mut self.vendors,
            Role::Customer => &mut self.customers,
        }
    }

    pub fn len(&self) -> usize {
        self.vendors.len() + self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks a marker up by record key in either list.
    pub fn find(&self, identifier: &str) -> Option<&Marker> {
        self.vendors
            .iter()
            .chain(&self.customers)
            .find(|marker| marker.identifier == identifier)
    }

    /// Markers of `role` ordered by distance from `from`, nearest first.
    pub fn nearest(&self, role: Role, from: Location) -> Vec<(&Marker, f64)> {
        let mut markers: Vec<_> = self
            .for_role(role)
            .iter()
            .map(|marker| (marker, marker.distance_km(from)))
            .collect();
        markers.sort_by(|(_, a), (_, b)| a.total_cmp(b));
        markers
    }
}

/// Projects a presence snapshot into markers for `user`.
///
/// Only active records with a location become markers. Records of the
/// opposite role go into that role's list; the user's own record goes into
/// their own role's list. Markers keep the snapshot's order.
pub fn project(snapshot: &PresenceSnapshot, user: &User) -> MarkerSet {
    let mut markers = MarkerSet::default();

    for (identifier, record) in snapshot {
        let Some(position) = record.visible_location() else {
            continue;
        };
        let marker = Marker {
            identifier: identifier.clone(),
            position,
            label: record.name.clone(),
        };

        if *identifier == user.identifier {
            markers.for_role_mut(user.role).push(marker);
        } else if record.role == user.role.opposite() {
            markers.for_role_mut(record.role).push(marker);
        }
    }

    markers
}
