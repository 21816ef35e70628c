//! The live map session.
//!
//! A session owns the local participant's identity, a [`LocationWatcher`] and
//! a subscription to the presence collection. It runs as a single task that
//! handles one input at a time, publishes a [`MapView`] after every input and
//! sends [`Effect`]s for the UI to carry out.
//!
//! Talking to the store never holds up that task. The subscription is opened
//! in the background and reopened whenever it drops, and positions are
//! written by a separate writer that only keeps the latest one.
//!
//! # Examples
//! ```no_run
//! use std::sync::Arc;
//! use vendor_presence::{
//!     effects::Effect,
//!     identity::FileIdentityStore,
//!     location::ChannelPositionSource,
//!     session::{Command, MapSession, Mount},
//!     Client, Error,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let store = Arc::new(Client::new()?.into_presence());
//!     let identity = Arc::new(FileIdentityStore::new("storage.json"));
//!     let source = Arc::new(ChannelPositionSource::new());
//!
//!     let session = match MapSession::builder().mount(store, identity, source)? {
//!         Mount::Ready(session) => session,
//!         Mount::Redirect(route) => {
//!             println!("go to {route}");
//!             return Ok(());
//!         }
//!     };
//!
//!     let mut handle = session.spawn();
//!     handle.send(Command::OpenExit).await?;
//!     handle.send(Command::Confirm).await?;
//!     while let Some(effect) = handle.next_effect().await {
//!         if let Effect::Navigate(route) = effect {
//!             println!("go to {route}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
use futures::future;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::instrument;

use crate::{
    drawer::{ConfirmAction, DrawerContent, DrawerEvent, DrawerState},
    effects::{Effect, Route, Toast},
    error::{Error, Result},
    identity::{IdentityStore, User},
    location::{
        LocationEvent, LocationWatcher, PositionSource, Reaction, RetryPolicy, WatchOptions,
    },
    markers::{project, MarkerSet},
    presence::{
        relay::{LocationWriter, Subscription},
        Location, PresenceSnapshot, PresenceStore, PresenceUpdate,
    },
};

/// Where the map is centered before the first fix.
pub const DEFAULT_CENTER: Location = Location {
    latitude: -6.2306454,
    longitude: 106.818162,
};

const COMMAND_BUFFER: usize = 16;

/// What the user can ask of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start watching the position again after it was stopped.
    RequestLocation,
    /// Open the exit drawer.
    OpenExit,
    /// Close whatever drawer is open.
    Dismiss,
    /// Confirm the open drawer.
    Confirm,
}

/// Everything needed to render the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    pub user: User,
    /// The latest accepted fix.
    pub position: Option<Location>,
    pub markers: MarkerSet,
    pub drawer: DrawerState,
    /// True until the first snapshot, fix or position error arrives.
    pub loading: bool,
    pub permission_denied: bool,
    pub gps_error: bool,
}

impl MapView {
    fn new(user: User) -> Self {
        Self {
            user,
            position: None,
            markers: MarkerSet::default(),
            drawer: DrawerState::Closed,
            loading: true,
            permission_denied: false,
            gps_error: false,
        }
    }

    /// Where to center the map.
    pub fn center(&self) -> Location {
        self.position.unwrap_or(DEFAULT_CENTER)
    }

    /// What the open drawer shows, if one is open.
    pub fn drawer_content(&self) -> Option<DrawerContent> {
        self.drawer.content(self.user.role)
    }
}

/// The outcome of mounting the map.
#[derive(Debug)]
pub enum Mount {
    Ready(MapSession),
    /// Nobody is verified on this device. Nothing was started.
    Redirect(Route),
}

/// Builder for [`MapSession`].
#[derive(Debug, Default)]
#[must_use]
pub struct Builder {
    watch_options: WatchOptions,
    retry_policy: RetryPolicy,
}

impl Builder {
    pub fn with_watch_options(mut self, options: WatchOptions) -> Self {
        self.watch_options = options;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Reads the stored identity and prepares a session for it.
    ///
    /// # Errors
    /// If the identity store can't be read.
    pub fn mount(
        self,
        store: Arc<dyn PresenceStore>,
        identity: Arc<dyn IdentityStore>,
        source: Arc<dyn PositionSource>,
    ) -> Result<Mount> {
        let Some(user) = identity.load()? else {
            tracing::debug!("no stored identity, redirecting to verification");
            return Ok(Mount::Redirect(Route::Verification));
        };

        Ok(Mount::Ready(MapSession {
            view: MapView::new(user),
            store,
            identity,
            watcher: LocationWatcher::new(source, self.watch_options, self.retry_policy),
            writer: None,
            outbox: Vec::new(),
            ended: false,
        }))
    }
}

enum Input {
    Location(LocationEvent),
    Snapshot(Option<PresenceSnapshot>),
    Command(Option<Command>),
}

/// A mounted map session. Nothing runs until it is spawned.
pub struct MapSession {
    view: MapView,
    store: Arc<dyn PresenceStore>,
    identity: Arc<dyn IdentityStore>,
    watcher: LocationWatcher,
    writer: Option<LocationWriter>,
    outbox: Vec<Effect>,
    ended: bool,
}

impl std::fmt::Debug for MapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSession")
            .field("view", &self.view)
            .field("watcher", &self.watcher)
            .field("ended", &self.ended)
            .finish()
    }
}

impl MapSession {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Mounts a session with the default watch options and retry policy.
    ///
    /// # Errors
    /// If the identity store can't be read.
    pub fn mount(
        store: Arc<dyn PresenceStore>,
        identity: Arc<dyn IdentityStore>,
        source: Arc<dyn PositionSource>,
    ) -> Result<Mount> {
        Self::builder().mount(store, identity, source)
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    /// Starts the session on the current tokio runtime.
    ///
    /// The session stops after an exit is confirmed or once the returned
    /// handle is dropped.
    pub fn spawn(self) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(self.view.clone());

        let task = tokio::spawn(self.run(commands_rx, effects_tx, view_tx));

        SessionHandle {
            commands: commands_tx,
            effects: effects_rx,
            view: view_rx,
            task,
        }
    }

    #[instrument(skip_all, fields(identifier = %self.view.user.identifier, role = %self.view.user.role))]
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        effects: mpsc::UnboundedSender<Effect>,
        view: watch::Sender<MapView>,
    ) {
        self.watcher.start();
        self.writer = Some(LocationWriter::spawn(
            self.store.clone(),
            self.view.user.identifier.clone(),
        ));
        let mut snapshots = Some(Subscription::spawn(self.store.clone()));

        while !self.ended {
            let input = tokio::select! {
                event = next_location(&mut self.watcher) => Input::Location(event),
                item = next_snapshot(&mut snapshots) => Input::Snapshot(item),
                command = commands.recv() => Input::Command(command),
            };

            match input {
                Input::Location(event) => self.on_location(event),
                Input::Snapshot(Some(snapshot)) => self.on_snapshot(snapshot),
                Input::Snapshot(None) => {
                    tracing::warn!("presence subscription closed for good");
                    snapshots = None;
                }
                Input::Command(Some(command)) => self.on_command(command).await,
                Input::Command(None) => {
                    tracing::debug!("session handle dropped");
                    break;
                }
            }

            for effect in self.outbox.drain(..) {
                // The UI may have stopped listening; the session carries on
                let _ = effects.send(effect);
            }
            view.send_if_modified(|published| {
                if *published == self.view {
                    false
                } else {
                    *published = self.view.clone();
                    true
                }
            });
        }

        self.watcher.stop();
        self.writer = None;
        tracing::debug!("map session stopped");
    }

    fn on_location(&mut self, event: LocationEvent) {
        self.view.loading = false;

        match event {
            LocationEvent::Fix(position) => {
                let location = position.location();
                tracing::debug!(
                    latitude = location.latitude,
                    longitude = location.longitude,
                    accuracy = ?position.accuracy,
                    "accepted position"
                );
                self.view.position = Some(location);
                self.view.gps_error = false;
                self.view.drawer = self.view.drawer.next(DrawerEvent::PositionAccepted);

                if let Some(writer) = &self.writer {
                    writer.push(location);
                }
            }
            LocationEvent::Failed { reaction, .. } => match reaction {
                Reaction::OpenPermissionDrawer => {
                    self.view.permission_denied = true;
                    self.view.drawer = self.view.drawer.next(DrawerEvent::PermissionDenied);
                }
                Reaction::ScheduleRetry { .. } => {
                    self.view.gps_error = true;
                }
                Reaction::GiveUp => {
                    self.view.gps_error = true;
                    self.view.drawer = self.view.drawer.next(DrawerEvent::GpsExhausted);
                    self.outbox.push(Effect::Notify(Toast::gps_unavailable()));
                }
                Reaction::Ignore => {}
            },
        }
    }

    fn on_snapshot(&mut self, snapshot: PresenceSnapshot) {
        self.view.markers = project(&snapshot, &self.view.user);
        self.view.loading = false;
        tracing::debug!(
            records = snapshot.len(),
            vendors = self.view.markers.vendors.len(),
            customers = self.view.markers.customers.len(),
            "projected presence snapshot"
        );
    }

    async fn on_command(&mut self, command: Command) {
        tracing::debug!(?command, drawer = ?self.view.drawer, "handling command");
        match command {
            Command::RequestLocation => {
                self.view.permission_denied = false;
                self.watcher.start();
            }
            Command::OpenExit => {
                self.view.drawer = self.view.drawer.next(DrawerEvent::RequestExit);
            }
            Command::Dismiss => {
                self.view.drawer = self.view.drawer.next(DrawerEvent::Dismiss);
            }
            Command::Confirm => match self.view.drawer.confirm() {
                ConfirmAction::Exit => self.exit().await,
                ConfirmAction::Acknowledge => {
                    self.view.permission_denied = false;
                    self.view.gps_error = false;
                    self.view.drawer = self.view.drawer.next(DrawerEvent::Dismiss);
                }
                ConfirmAction::Nothing => {}
            },
        }
    }

    /// Deactivates the presence record, forgets the identity and leaves the
    /// map. A failed write doesn't stop the rest.
    async fn exit(&mut self) {
        self.watcher.stop();
        // A location write landing after this one would mark us active again
        self.writer = None;

        let user = &self.view.user;
        match self
            .store
            .update(&user.identifier, &PresenceUpdate::deactivate())
            .await
        {
            Ok(()) => self.outbox.push(Effect::Notify(Toast::exited(user.role))),
            Err(e) => tracing::error!(error = %e, "failed to deactivate presence"),
        }
        if let Err(e) = self.identity.clear() {
            tracing::error!(error = %e, "failed to clear identity");
        }

        self.view.drawer = self.view.drawer.next(DrawerEvent::Dismiss);
        self.outbox.push(Effect::Navigate(Route::Verification));
        self.ended = true;
        tracing::info!("left the map");
    }
}

async fn next_location(watcher: &mut LocationWatcher) -> LocationEvent {
    match watcher.next().await {
        Some(event) => event,
        None => future::pending().await,
    }
}

async fn next_snapshot(snapshots: &mut Option<Subscription>) -> Option<PresenceSnapshot> {
    match snapshots {
        Some(snapshots) => snapshots.next().await,
        None => future::pending().await,
    }
}

/// The UI's side of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    effects: mpsc::UnboundedReceiver<Effect>,
    view: watch::Receiver<MapView>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Sends a command to the session.
    ///
    /// # Errors
    /// [`Error::SessionEnded`] if the session has stopped.
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::SessionEnded)
    }

    /// The latest published view.
    pub fn view(&self) -> MapView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified whenever the view changes.
    pub fn watch_view(&self) -> watch::Receiver<MapView> {
        self.view.clone()
    }

    /// Waits for the next view change and returns the new view.
    ///
    /// # Errors
    /// [`Error::SessionEnded`] if the session stopped without changing it.
    pub async fn changed(&mut self) -> Result<MapView> {
        self.view.changed().await.map_err(|_| Error::SessionEnded)?;
        Ok(self.view.borrow_and_update().clone())
    }

    /// Waits for the next effect. Returns `None` once the session has
    /// stopped and every effect was taken.
    pub async fn next_effect(&mut self) -> Option<Effect> {
        self.effects.recv().await
    }

    /// Takes an effect if one is waiting.
    pub fn try_next_effect(&mut self) -> Option<Effect> {
        self.effects.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the session and waits for it to wind down.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "map session task failed");
        }
    }
}
