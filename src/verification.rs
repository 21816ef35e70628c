//! The verification form: who is joining the map, and as what.
//!
//! A valid submission creates the participant's presence record, stores the
//! local identity and sends the user to the map.
//!
//! # Examples
//! ```no_run
//! use vendor_presence::{
//!     identity::FileIdentityStore,
//!     presence::Role,
//!     verification::VerificationForm,
//!     Client, Error,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new()?;
//!     let identity = FileIdentityStore::new("storage.json");
//!
//!     let form = VerificationForm::new("Pak Joko", Some(Role::Vendor), true);
//!     let submission = form.submit(client.presence(), &identity).await?;
//!     println!("joined as {}", submission.user.identifier);
//!
//!     Ok(())
//! }
//! ```
use std::fmt::{self, Display};
use thiserror::Error;
use tracing::instrument;

use crate::{
    effects::{Effect, Route, Toast},
    error::{Error, Result},
    identity::{IdentityStore, User},
    presence::{NewPresence, PresenceStore, PresenceUpdate, Role},
};

/// The longest accepted display name, in characters.
pub const MAX_NAME_LENGTH: usize = 60;

/// The fields of the verification form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Role,
    Terms,
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name => write!(f, "name"),
            Field::Role => write!(f, "role"),
            Field::Terms => write!(f, "terms"),
        }
    }
}

/// One problem with one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: &'static str,
}

/// Every problem found in a form. Never empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid verification form: {}", summary(.0))]
pub struct ValidationErrors(Vec<FieldError>);

fn summary(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// The message for a field, if it has a problem.
    pub fn get(&self, field: Field) -> Option<&'static str> {
        self.0.iter().find(|e| e.field == field).map(|e| e.message)
    }
}

/// The raw form input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationForm {
    pub name: String,
    pub role: Option<Role>,
    /// Whether the user agreed to share their location.
    pub terms: bool,
}

/// What a successful submission produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub user: User,
    pub effects: Vec<Effect>,
}

impl VerificationForm {
    pub fn new<N: Into<String>>(name: N, role: Option<Role>, terms: bool) -> Self {
        Self {
            name: name.into(),
            role,
            terms,
        }
    }

    /// Checks every field and returns the accepted name and role.
    ///
    /// # Errors
    /// With one entry per invalid field.
    pub fn validate(&self) -> std::result::Result<(String, Role), ValidationErrors> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push(FieldError {
                field: Field::Name,
                message: "Name is required",
            });
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.push(FieldError {
                field: Field::Name,
                message: "Max 60 characters",
            });
        }

        if self.role.is_none() {
            errors.push(FieldError {
                field: Field::Role,
                message: "Role is required",
            });
        }

        if !self.terms {
            errors.push(FieldError {
                field: Field::Terms,
                message: "You must accept the terms and conditions",
            });
        }

        match self.role {
            Some(role) if errors.is_empty() => Ok((name.to_string(), role)),
            _ => Err(ValidationErrors(errors)),
        }
    }

    /// Validates the form, creates an active presence record and stores the
    /// identity. Nothing is written if validation fails.
    ///
    /// # Errors
    /// [`Error::Validation`] for invalid input, or the store's error if the
    /// record or the identity can't be written. In the latter case show
    /// [`Toast::submit_failed`]. A record whose identity couldn't be stored
    /// is deactivated again.
    #[instrument(skip(self, store, identity), fields(role = ?self.role))]
    pub async fn submit<S, I>(&self, store: &S, identity: &I) -> Result<Submission>
    where
        S: PresenceStore + ?Sized,
        I: IdentityStore + ?Sized,
    {
        let (name, role) = self.validate().map_err(Error::Validation)?;

        let identifier = store
            .create(&NewPresence::active(name.clone(), role))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to create presence record");
                e
            })?;

        let user = User::new(name, role, identifier);
        if let Err(e) = identity.save(&user) {
            // Nobody on this device can reach the record any more
            tracing::error!(
                identifier = %user.identifier,
                error = %e,
                "failed to store identity, deactivating the new record"
            );
            if let Err(e) = store
                .update(&user.identifier, &PresenceUpdate::deactivate())
                .await
            {
                tracing::error!(
                    identifier = %user.identifier,
                    error = %e,
                    "failed to deactivate orphaned presence record"
                );
            }
            return Err(e);
        }
        tracing::info!(identifier = %user.identifier, "participant verified");

        Ok(Submission {
            effects: vec![
                Effect::Notify(Toast::welcome(&user.name)),
                Effect::Navigate(Route::Map),
            ],
            user,
        })
    }
}
