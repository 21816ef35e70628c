//! The confirmation drawer shown over the map.
use crate::presence::Role;

/// Which drawer, if any, is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawerState {
    #[default]
    Closed,
    /// Asks the user to confirm leaving the map.
    Exit,
    /// Location permission was denied.
    PermissionRetry,
    /// The position stayed unavailable after every automatic retry.
    GpsRetry,
}

/// Something that moves the drawer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawerEvent {
    /// The user tapped cancel or the backdrop.
    Dismiss,
    /// The user tapped exit.
    RequestExit,
    PermissionDenied,
    GpsExhausted,
    PositionAccepted,
}

/// What confirming the open drawer asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Leave the map: deactivate presence, forget the identity, navigate away.
    Exit,
    /// Clear the location error flags and close. The user starts the watch
    /// again on their own.
    Acknowledge,
    Nothing,
}

/// Title and body of an open drawer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawerContent {
    pub title: &'static str,
    pub body: String,
}

impl DrawerState {
    pub fn is_open(&self) -> bool {
        !matches!(self, DrawerState::Closed)
    }

    /// The state after `event`. Every event applies from every state.
    pub fn next(self, event: DrawerEvent) -> DrawerState {
        match event {
            DrawerEvent::Dismiss | DrawerEvent::PositionAccepted => DrawerState::Closed,
            DrawerEvent::RequestExit => DrawerState::Exit,
            DrawerEvent::PermissionDenied => DrawerState::PermissionRetry,
            DrawerEvent::GpsExhausted => DrawerState::GpsRetry,
        }
    }

    pub fn confirm(&self) -> ConfirmAction {
        match self {
            DrawerState::Closed => ConfirmAction::Nothing,
            DrawerState::Exit => ConfirmAction::Exit,
            DrawerState::PermissionRetry | DrawerState::GpsRetry => ConfirmAction::Acknowledge,
        }
    }

    /// What an open drawer shows to a participant of `role`.
    pub fn content(&self, role: Role) -> Option<DrawerContent> {
        match self {
            DrawerState::Closed => None,
            DrawerState::Exit => Some(DrawerContent {
                title: "Leave the map?",
                body: format!(
                    "By closing this page you will stop tracking {}.",
                    plural(role.opposite())
                ),
            }),
            DrawerState::PermissionRetry => Some(DrawerContent {
                title: "Location access denied",
                body: "Please enable location services in your browser settings and try again."
                    .to_string(),
            }),
            DrawerState::GpsRetry => Some(DrawerContent {
                title: "Weak GPS signal",
                body: "Please make sure you are somewhere with good GPS reception and try again."
                    .to_string(),
            }),
        }
    }
}

fn plural(role: Role) -> &'static str {
    match role {
        Role::Customer => "customers",
        Role::Vendor => "vendors",
    }
}
