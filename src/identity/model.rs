use serde::{Deserialize, Serialize};

use crate::presence::Role;

/// The local participant, as captured by the verification form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub role: Role,
    /// The key of the user's presence record.
    pub identifier: String,
}

impl User {
    pub fn new<N, I>(name: N, role: Role, identifier: I) -> Self
    where
        N: Into<String>,
        I: Into<String>,
    {
        Self {
            name: name.into(),
            role,
            identifier: identifier.into(),
        }
    }
}
