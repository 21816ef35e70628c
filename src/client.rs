//! The top-level client for the realtime database.
use std::env;

use crate::{
    error::{Error, Result},
    http, presence,
};

/// Environment variable holding the database URL.
pub static DATABASE_URL_ENV: &str = "PRESENCE_DATABASE_URL";
/// Environment variable holding the database auth token.
pub static AUTH_TOKEN_ENV: &str = "PRESENCE_AUTH_TOKEN";

/// The client is the entrypoint for everything that talks to the realtime
/// database.
///
/// You can create it using [`Client::builder`] or [`Client::new`].
///
/// # Examples
/// ```no_run
/// use vendor_presence::{Client, Error};
///
/// fn main() -> Result<(), Error> {
///     // Create a new client and read the database URL and (optional) auth
///     // token from PRESENCE_DATABASE_URL and PRESENCE_AUTH_TOKEN.
///     let client = Client::new()?;
///
///     // Set all available options. Unset options fall back to environment
///     // variables.
///     let client = Client::builder()
///         .with_url("https://bakso-map.example.com")
///         .with_auth_token("my-token")
///         .build()?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    presence: presence::Client,
}

impl Client {
    /// Creates a new client. If you want to configure it, use [`Client::builder`].
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a new client using a builder.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Get the url (cloned).
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Presence records of all participants.
    pub fn presence(&self) -> &presence::Client {
        &self.presence
    }

    /// Takes the presence client out, e.g. to hand it to a map session as its
    /// [`presence::PresenceStore`].
    pub fn into_presence(self) -> presence::Client {
        self.presence
    }

    /// Get client version.
    pub fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

/// This builder is used to create a new client.
pub struct Builder {
    env_fallback: bool,
    url: Option<String>,
    auth_token: Option<String>,
}

impl Builder {
    /// Create a new builder.
    fn new() -> Self {
        Self {
            env_fallback: true,
            url: None,
            auth_token: None,
        }
    }

    /// Don't fall back to environment variables.
    pub fn no_env(mut self) -> Self {
        self.env_fallback = false;
        self
    }

    /// Set the database URL. If this is not set, the URL will be read from
    /// the environment variable `PRESENCE_DATABASE_URL`.
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add an auth token to the client. If this is not set, the token will be
    /// read from the environment variable `PRESENCE_AUTH_TOKEN`. Databases
    /// with open rules don't need one.
    pub fn with_auth_token<S: Into<String>>(mut self, token: S) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        let env_fallback = self.env_fallback;

        let mut url = self.url.unwrap_or_default();
        if url.is_empty() && env_fallback {
            url = env::var(DATABASE_URL_ENV).unwrap_or_default();
        }
        if url.is_empty() {
            return Err(Error::MissingDatabaseUrl);
        }

        let mut auth_token = self.auth_token.unwrap_or_default();
        if auth_token.is_empty() && env_fallback {
            auth_token = env::var(AUTH_TOKEN_ENV).unwrap_or_default();
        }

        let http_client = http::Client::new(&url, Some(auth_token))?;

        Ok(Client {
            url,
            presence: presence::Client::new(http_client),
        })
    }
}
