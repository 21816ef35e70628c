use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use test_context::{test_context, AsyncTestContext};
use tokio::time::{sleep, Instant};
use vendor_presence::{
    drawer::DrawerState,
    effects::{Effect, Route, Toast},
    identity::{IdentityStore, MemoryIdentityStore, User},
    location::{ChannelPositionSource, Position, PositionError},
    presence::{
        Location, MemoryPresenceStore, PresenceRecord, PresenceSnapshot, PresenceUpdate, Role,
        Status,
    },
    session::{Command, MapSession, MapView, Mount, SessionHandle},
};

struct Context {
    user: User,
    store: Arc<MemoryPresenceStore>,
    identity: Arc<MemoryIdentityStore>,
    source: Arc<ChannelPositionSource>,
}

fn record(name: &str, role: Role, status: Status, location: Option<(f64, f64)>) -> PresenceRecord {
    PresenceRecord {
        name: name.to_string(),
        role,
        status,
        location: location.map(Location::from),
        created_at: None,
    }
}

fn presence() -> PresenceSnapshot {
    [
        ("-N1", record("Bakso Pak Min", Role::Vendor, Status::Active, Some((-6.20, 106.81)))),
        ("-N2", record("Es Doger", Role::Vendor, Status::Inactive, Some((-6.21, 106.82)))),
        ("-N4", record("Sari", Role::Customer, Status::Active, None)),
    ]
    .into_iter()
    .map(|(id, record)| (id.to_string(), record))
    .collect()
}

#[async_trait]
impl AsyncTestContext for Context {
    async fn setup() -> Context {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let user = User::new("Sari", Role::Customer, "-N4");
        Context {
            identity: Arc::new(MemoryIdentityStore::with_user(user.clone())),
            store: Arc::new(MemoryPresenceStore::with_snapshot(presence())),
            source: Arc::new(ChannelPositionSource::new()),
            user,
        }
    }
}

impl Context {
    /// Spawns a session and waits until it has seen the first snapshot,
    /// by which time the position watch is open.
    async fn spawn(&self) -> SessionHandle {
        let mount = MapSession::mount(
            self.store.clone(),
            self.identity.clone(),
            self.source.clone(),
        )
        .unwrap();
        let mut handle = match mount {
            Mount::Ready(session) => session.spawn(),
            Mount::Redirect(route) => panic!("unexpected redirect to {route}"),
        };

        wait_until(&mut handle, |view| !view.loading).await;
        assert_eq!(self.source.open_watches(), 1);
        handle
    }

    async fn wait_for_watches(&self, count: usize) {
        while self.source.watch_count() < count {
            sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Waits until the published view satisfies `done`. Several inputs may be
/// handled between two looks at the view.
async fn wait_until(handle: &mut SessionHandle, done: impl Fn(&MapView) -> bool) -> MapView {
    loop {
        let view = handle.view();
        if done(&view) {
            return view;
        }
        handle.changed().await.unwrap();
    }
}

#[test_context(Context)]
#[tokio::test]
async fn test_mount_without_identity_redirects(ctx: &mut Context) {
    ctx.identity.clear().unwrap();

    let mount = MapSession::mount(ctx.store.clone(), ctx.identity.clone(), ctx.source.clone())
        .unwrap();
    assert!(matches!(mount, Mount::Redirect(Route::Verification)));
    assert_eq!(ctx.source.watch_count(), 0);
}

#[test_context(Context)]
#[tokio::test]
async fn test_first_snapshot_projects_markers(ctx: &mut Context) {
    let handle = ctx.spawn().await;

    let view = handle.view();
    assert_eq!(view.user, ctx.user);
    assert_eq!(view.position, None);
    assert_eq!(view.center(), Location::new(-6.2306454, 106.818162));
    assert_eq!(view.markers.vendors.len(), 1);
    assert_eq!(view.markers.vendors[0].label, "Bakso Pak Min");
    // Not located yet, so not on the map
    assert!(view.markers.customers.is_empty());
}

#[test_context(Context)]
#[tokio::test]
async fn test_fix_is_published_and_written(ctx: &mut Context) {
    let mut handle = ctx.spawn().await;

    ctx.source.feed(Ok(Position::new(-6.23, 106.80).with_accuracy(12.0)));
    let view = wait_until(&mut handle, |view| view.position.is_some()).await;
    assert_eq!(view.position, Some(Location::new(-6.23, 106.80)));
    assert_eq!(view.center(), Location::new(-6.23, 106.80));

    // The write comes back through the subscription as our own marker
    let view = wait_until(&mut handle, |view| !view.markers.customers.is_empty()).await;
    assert_eq!(view.markers.customers.len(), 1);
    assert_eq!(view.markers.customers[0].identifier, "-N4");
    assert_eq!(
        ctx.store.updates(),
        vec![(
            "-N4".to_string(),
            PresenceUpdate::located(Location::new(-6.23, 106.80))
        )]
    );
}

#[test_context(Context)]
#[tokio::test]
async fn test_deactivated_vendor_disappears(ctx: &mut Context) {
    let mut handle = ctx.spawn().await;
    assert!(handle.view().markers.find("-N1").is_some());

    let mut snapshot = presence();
    snapshot.get_mut("-N1").unwrap().status = Status::Inactive;
    ctx.store.replace(snapshot);

    let view = wait_until(&mut handle, |view| view.markers.find("-N1").is_none()).await;
    assert!(view.markers.find("-N1").is_none());
    assert!(view.markers.vendors.is_empty());
}

#[test_context(Context)]
#[tokio::test(start_paused = true)]
async fn test_permission_denied_opens_drawer_without_retry(ctx: &mut Context) {
    let mut handle = ctx.spawn().await;

    ctx.source.feed(Err(PositionError::PermissionDenied));
    let view = wait_until(&mut handle, |view| view.permission_denied).await;
    assert!(view.permission_denied);
    assert_eq!(view.drawer, DrawerState::PermissionRetry);
    assert_eq!(
        view.drawer_content().unwrap().title,
        "Location access denied"
    );

    sleep(Duration::from_secs(60)).await;
    assert_eq!(ctx.source.watch_count(), 1);
    assert_eq!(ctx.source.open_watches(), 0);
    assert_eq!(handle.try_next_effect(), None);

    handle.send(Command::Confirm).await.unwrap();
    let view = wait_until(&mut handle, |view| !view.permission_denied).await;
    assert_eq!(view.drawer, DrawerState::Closed);

    // Only the user restarts the watch
    handle.send(Command::RequestLocation).await.unwrap();
    ctx.wait_for_watches(2).await;
    ctx.source.feed(Ok(Position::new(-6.23, 106.80)));
    let view = wait_until(&mut handle, |view| view.position.is_some()).await;
    assert_eq!(view.position, Some(Location::new(-6.23, 106.80)));
}

#[test_context(Context)]
#[tokio::test(start_paused = true)]
async fn test_unavailable_position_retries_three_times(ctx: &mut Context) {
    let mut handle = ctx.spawn().await;

    let started = Instant::now();
    ctx.source.feed(Err(PositionError::PositionUnavailable));
    let view = wait_until(&mut handle, |view| view.gps_error).await;
    assert!(view.gps_error);
    assert_eq!(view.drawer, DrawerState::Closed);

    for watches in 2..=4 {
        ctx.wait_for_watches(watches).await;
        ctx.source.feed(Err(PositionError::PositionUnavailable));
    }
    assert!(started.elapsed() >= Duration::from_secs(15));

    assert_eq!(
        handle.next_effect().await,
        Some(Effect::Notify(Toast::gps_unavailable()))
    );
    let view = handle.view();
    assert!(view.gps_error);
    assert_eq!(view.drawer, DrawerState::GpsRetry);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(ctx.source.watch_count(), 4);
    assert_eq!(ctx.source.open_watches(), 0);
    assert_eq!(handle.try_next_effect(), None);
}

#[test_context(Context)]
#[tokio::test(start_paused = true)]
async fn test_fix_cancels_pending_retry(ctx: &mut Context) {
    let mut handle = ctx.spawn().await;

    ctx.source.feed(Err(PositionError::PositionUnavailable));
    wait_until(&mut handle, |view| view.gps_error).await;

    ctx.source.feed(Ok(Position::new(-6.23, 106.80)));
    let view = wait_until(&mut handle, |view| view.position.is_some()).await;
    assert!(!view.gps_error);
    assert_eq!(view.position, Some(Location::new(-6.23, 106.80)));

    sleep(Duration::from_secs(30)).await;
    assert_eq!(ctx.source.watch_count(), 1);
    assert_eq!(handle.try_next_effect(), None);
}

#[test_context(Context)]
#[tokio::test]
async fn test_confirmed_exit_deactivates_and_redirects(ctx: &mut Context) {
    let mut handle = ctx.spawn().await;

    handle.send(Command::OpenExit).await.unwrap();
    let view = wait_until(&mut handle, |view| view.drawer.is_open()).await;
    assert_eq!(view.drawer, DrawerState::Exit);
    assert!(view
        .drawer_content()
        .unwrap()
        .body
        .contains("tracking vendors"));

    handle.send(Command::Confirm).await.unwrap();
    assert_eq!(
        handle.next_effect().await,
        Some(Effect::Notify(Toast::exited(Role::Customer)))
    );
    assert_eq!(
        handle.next_effect().await,
        Some(Effect::Navigate(Route::Verification))
    );
    assert_eq!(handle.next_effect().await, None);

    assert_eq!(
        ctx.store.snapshot().get("-N4").unwrap().status,
        Status::Inactive
    );
    assert_eq!(ctx.identity.load().unwrap(), None);
    assert_eq!(ctx.source.open_watches(), 0);
    assert!(handle.send(Command::Confirm).await.is_err());
}

#[test_context(Context)]
#[tokio::test]
async fn test_dismissed_exit_keeps_session(ctx: &mut Context) {
    let mut handle = ctx.spawn().await;

    handle.send(Command::OpenExit).await.unwrap();
    wait_until(&mut handle, |view| view.drawer == DrawerState::Exit).await;
    handle.send(Command::Dismiss).await.unwrap();
    wait_until(&mut handle, |view| view.drawer == DrawerState::Closed).await;

    assert_eq!(ctx.identity.load().unwrap(), Some(ctx.user.clone()));
    assert!(ctx.store.updates().is_empty());
    assert!(!handle.is_finished());

    handle.shutdown().await;
    assert_eq!(ctx.source.open_watches(), 0);
}
