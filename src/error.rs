//! Error type definitions.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

use crate::verification::ValidationErrors;

/// A `Result` alias where the `Err` case is `vendor_presence::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for the presence client and the map session.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Missing database URL")]
    MissingDatabaseUrl,
    #[error("Invalid auth token (make sure there are no invalid characters)")]
    InvalidAuthToken,
    #[error("Failed to setup HTTP client: {0}")]
    HttpClientSetup(reqwest::Error),
    #[error("Failed to deserialize response: {0}")]
    Deserialize(reqwest::Error),
    #[error("Http error: {0}")]
    Http(reqwest::Error),
    #[error(transparent)]
    Database(DatabaseError),
    #[error(transparent)]
    InvalidParams(#[from] serde_qs::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(url::ParseError),
    #[error("The database did not return a key for the new record")]
    MissingKey,
    #[error("Error in presence stream: {0}")]
    Stream(reqwest::Error),
    #[error("Invalid presence event: {0}")]
    InvalidEvent(String),
    #[error("Presence subscription was cancelled by the database: {0}")]
    SubscriptionCancelled(String),
    #[error("Invalid role: {0}")]
    InvalidRole(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Failed to access identity storage: {0}")]
    IdentityStorage(#[from] std::io::Error),
    #[error("The map session has ended")]
    SessionEnded,
    #[error(transparent)]
    Validation(ValidationErrors),
}

/// An error returned by the realtime database.
#[derive(Deserialize, Debug)]
pub struct DatabaseError {
    #[serde(skip)]
    pub status: u16,
    #[serde(skip)]
    pub method: http::Method,
    #[serde(skip)]
    pub path: String,
    #[serde(rename = "error")]
    pub message: Option<String>,
}

impl DatabaseError {
    pub(crate) fn new(
        status: u16,
        method: http::Method,
        path: String,
        message: Option<String>,
    ) -> Self {
        Self {
            status,
            method,
            path,
            message,
        }
    }
}

impl std::error::Error for DatabaseError {}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = self.message.as_ref() {
            write!(
                f,
                "Received {} on {} {}: {}",
                self.status, self.method, self.path, msg
            )
        } else {
            write!(
                f,
                "Received {} on {} {}",
                self.status, self.method, self.path
            )
        }
    }
}
