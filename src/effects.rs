//! Side effects the embedding UI carries out: navigation and toasts.
use std::fmt::{self, Display};

use crate::presence::Role;

/// The screens of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The live map session.
    Map,
    /// The identity capture form.
    Verification,
}

impl Route {
    /// Returns the route's path.
    pub fn path(&self) -> &'static str {
        match self {
            Route::Map => "/",
            Route::Verification => "/verification",
        }
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Info,
    Error,
}

/// A transient notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    pub fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }

    /// Shown after a successful verification.
    pub fn welcome(name: &str) -> Self {
        Self::success(format!("Welcome, {name}!"))
    }

    /// Shown when the verification write fails.
    pub fn submit_failed() -> Self {
        Self::error("Failed to submit. Please try again.")
    }

    /// Shown once automatic GPS retries are used up.
    pub fn gps_unavailable() -> Self {
        Self::error("Failed to get location because GPS is unavailable. Please try again later.")
    }

    /// Shown after leaving the map.
    pub fn exited(role: Role) -> Self {
        match role {
            Role::Vendor => Self::info("You have deactivated your vendor status"),
            Role::Customer => Self::info("You have stopped tracking vendors"),
        }
    }
}

/// Something the session asks the UI to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Navigate(Route),
    Notify(Toast),
}
