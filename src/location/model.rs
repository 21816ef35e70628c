use std::time::Duration;
use thiserror::Error;

use crate::presence::Location;

/// A single fix reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters, if the device reports one.
    pub accuracy: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy = Some(meters);
        self
    }

    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }
}

impl From<Position> for Location {
    fn from(position: Position) -> Self {
        position.location()
    }
}

/// Why the device couldn't produce a fix.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Position unavailable")]
    PositionUnavailable,
    #[error("Timed out waiting for a position")]
    Timeout,
}

/// Options passed to the position source when a watch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Oldest cached fix the source may hand out.
    pub maximum_age: Duration,
    /// How long the source may take for one fix before reporting a timeout.
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
        }
    }
}
