//! Distance and travel time estimates between two locations.
use std::{
    fmt::{self, Display},
    str::FromStr,
    time::Duration,
};

use crate::presence::Location;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// How someone gets to a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TravelMode {
    Foot,
    Bike,
    Motorcycle,
    Car,
}

impl TravelMode {
    pub const ALL: [TravelMode; 4] = [
        TravelMode::Foot,
        TravelMode::Bike,
        TravelMode::Motorcycle,
        TravelMode::Car,
    ];

    /// Average speed in km/h.
    pub fn speed_kmh(&self) -> f64 {
        match self {
            TravelMode::Foot => 5.0,
            TravelMode::Bike => 20.0,
            TravelMode::Motorcycle => 45.0,
            TravelMode::Car => 60.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Foot => "foot",
            TravelMode::Bike => "bike",
            TravelMode::Motorcycle => "motorcycle",
            TravelMode::Car => "car",
        }
    }
}

impl Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "foot" => Ok(TravelMode::Foot),
            "bike" => Ok(TravelMode::Bike),
            "motorcycle" => Ok(TravelMode::Motorcycle),
            "car" => Ok(TravelMode::Car),
            _ => Err(format!("unknown travel mode: {s}")),
        }
    }
}

/// Great-circle (haversine) distance between two locations, in kilometers.
pub fn distance_km(from: Location, to: Location) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lng = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Time to cover `distance_km` at the mode's average speed, rounded to
/// whole minutes. Distances too large to represent saturate at
/// [`Duration::MAX`].
pub fn estimate(distance_km: f64, mode: TravelMode) -> Duration {
    let minutes = (distance_km.max(0.0) / mode.speed_kmh() * 60.0).round();
    Duration::try_from_secs_f64(minutes * 60.0).unwrap_or(Duration::MAX)
}

/// Like [`estimate`], in whole minutes.
pub fn estimate_minutes(distance_km: f64, mode: TravelMode) -> u64 {
    estimate(distance_km, mode).as_secs() / 60
}
