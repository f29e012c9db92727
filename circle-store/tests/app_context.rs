//! End-to-end tests of the specialized stores wired through `AppContext`.

use std::sync::{Arc, Mutex};

use circle_core::{
    AccountId, BackendError, CircleError, DebugValue, LimitedWorld, StatusIndicator, StoreError,
    UserStatus,
};
use circle_store::{
    keys, status_alert_variant, AccountScope, AlertVariant, AppContext, EnsureOptions,
    EntryState, SetOptions, WorldsStore,
};
use circle_test_utils::fixtures::{
    make_account, make_avatar, make_friend, make_online_friend, make_status, make_user,
    make_world,
};
use circle_test_utils::generators::arb_status_indicator;
use circle_test_utils::{ManualClock, MockBackend};
use proptest::prelude::*;

fn account(id: &str) -> AccountId {
    AccountId::from(id)
}

fn context(backend: MockBackend, active: Option<&str>) -> (AppContext, Arc<MockBackend>) {
    let backend = Arc::new(backend);
    let ctx = AppContext::builder(backend.clone())
        .clock(Arc::new(ManualClock::at_epoch()))
        .active_account(active.map(account))
        .build()
        .unwrap();
    (ctx, backend)
}

fn world_ids(worlds: &Option<Vec<LimitedWorld>>) -> Vec<String> {
    worlds
        .iter()
        .flatten()
        .map(|world| world.id.clone())
        .collect()
}

#[test]
fn test_registry_hands_out_the_context_stores() {
    let (ctx, _backend) = context(MockBackend::new(), None);

    let worlds: Arc<WorldsStore> = ctx.registry().get_singleton(keys::WORLDS).unwrap();
    assert!(Arc::ptr_eq(&worlds, &ctx.worlds()));

    let scope: Arc<AccountScope> = ctx.registry().get_singleton(keys::ACCOUNT_SCOPE).unwrap();
    assert!(Arc::ptr_eq(&scope, &ctx.scope()));

    let again = ctx
        .registry()
        .register_singleton(keys::WORLDS, || -> WorldsStore { unreachable!() })
        .unwrap();
    assert!(Arc::ptr_eq(&again, &worlds));

    let mismatch = ctx
        .registry()
        .register_singleton(keys::WORLDS, || 0u8)
        .unwrap_err();
    assert_eq!(
        mismatch,
        CircleError::Store(StoreError::RegistryTypeMismatch {
            key: keys::WORLDS.to_string()
        })
    );
}

#[tokio::test]
async fn test_worlds_follow_account_switches() {
    let backend = MockBackend::new();
    backend.set_worlds(&account("usr_a"), vec![make_world("wrld_a", "A")]);
    backend.set_worlds(&account("usr_b"), vec![make_world("wrld_b", "B")]);
    let (ctx, backend) = context(backend, Some("usr_a"));
    let worlds = ctx.worlds();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = worlds.subscribe(move |value| sink.lock().unwrap().push(world_ids(value)));

    worlds.ensure().await.unwrap();
    ctx.scope().set_active(Some(account("usr_b")));
    worlds.ensure().await.unwrap();
    ctx.scope().set_active(Some(account("usr_a")));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            vec![],
            vec!["wrld_a".to_string()],
            vec![],
            vec!["wrld_b".to_string()],
            vec!["wrld_a".to_string()],
        ]
    );
    // Switching back served the cached partition.
    assert_eq!(backend.calls("uploaded_worlds"), 2);
}

#[tokio::test]
async fn test_scoped_store_without_account_fails_fast() {
    let (ctx, backend) = context(MockBackend::new(), None);

    let err = ctx.avatars().ensure().await.unwrap_err();
    assert!(matches!(
        err,
        CircleError::Store(StoreError::NoActiveAccount { .. })
    ));
    assert_eq!(backend.calls("uploaded_avatars"), 0);
    assert_eq!(ctx.avatars().state(None), EntryState::Empty);
}

#[tokio::test]
async fn test_world_helpers_edit_loaded_listing() {
    let backend = MockBackend::new();
    backend.set_worlds(&account("usr_a"), vec![make_world("wrld_1", "One")]);
    let (ctx, _backend) = context(backend, Some("usr_a"));
    let worlds = ctx.worlds();

    assert!(!worlds.upsert_world(make_world("wrld_0", "Early")));
    worlds.ensure().await.unwrap();

    assert!(worlds.upsert_world(make_world("wrld_2", "Two")));
    assert!(worlds.upsert_world(make_world("wrld_1", "One renamed")));
    let listing = worlds.snapshot(None).unwrap();
    assert_eq!(listing[0].id, "wrld_2");
    assert_eq!(listing[1].name, "One renamed");

    assert!(worlds.remove_world("wrld_2"));
    assert!(!worlds.remove_world("wrld_2"));
    assert_eq!(worlds.snapshot(None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_discovery_and_adoption() {
    let backend = MockBackend::new().with_session(make_user("usr_a", "Alice"));
    let (ctx, _backend) = context(backend, None);
    let user = ctx.user();

    let discovered = user.ensure().await.unwrap();
    assert_eq!(discovered.id, account("usr_a"));
    assert_eq!(ctx.scope().active(), None);

    user.adopt_session(discovered);
    assert_eq!(ctx.scope().active(), Some(account("usr_a")));
    assert_eq!(user.user_id(), Some(account("usr_a")));
}

#[tokio::test]
async fn test_update_status_writes_through() {
    let backend = MockBackend::new().with_user(make_user("usr_a", "Alice"));
    let (ctx, backend) = context(backend, Some("usr_a"));
    let user = ctx.user();

    let updated = user.update_status(UserStatus::Busy, "working").await.unwrap();
    assert_eq!(updated.status, UserStatus::Busy);
    assert_eq!(user.snapshot(None).unwrap().status_description, "working");

    backend.fail("update_status", BackendError::network("offline"));
    assert!(user.update_status(UserStatus::JoinMe, "").await.is_err());
    assert_eq!(user.snapshot(None).unwrap().status, UserStatus::Busy);
}

#[tokio::test]
async fn test_friend_helpers() {
    let backend = MockBackend::new();
    backend.set_friends(
        &account("usr_a"),
        vec![
            make_online_friend("usr_f1", "One", "wrld_1:123"),
            make_friend("usr_f2", "Two"),
        ],
    );
    let (ctx, _backend) = context(backend, Some("usr_a"));
    let user = ctx.user();

    assert!(!user.set_friend_offline("usr_f1"));
    user.ensure_friends().await.unwrap();
    assert_eq!(user.online_friends().len(), 1);

    assert!(user.update_friend_location("usr_f2", "wrld_2:7", Some("android".to_string())));
    assert!(user.set_friend_offline("usr_f1"));
    let online = user.online_friends();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].id, "usr_f2");
    assert_eq!(online[0].platform, "android");

    assert!(!user.upsert_friend(make_friend("usr_a", "Me")));
    assert!(user.upsert_friend(make_friend("usr_f3", "Three")));
    assert!(user.remove_friend("usr_f1"));
    let ids: Vec<String> = user
        .friends_snapshot(None)
        .unwrap()
        .into_iter()
        .map(|friend| friend.id)
        .collect();
    assert_eq!(ids, vec!["usr_f3", "usr_f2"]);
}

#[tokio::test]
async fn test_switching_and_removing_accounts() {
    let backend = MockBackend::new();
    backend.set_accounts(vec![
        make_account("usr_a", "Alice", true),
        make_account("usr_b", "Bob", false),
    ]);
    let (ctx, backend) = context(backend, Some("usr_a"));
    let accounts = ctx.accounts();
    accounts.ensure().await.unwrap();

    let switches = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&switches);
    let _sub = accounts.subscribe(move |_| *counter.lock().unwrap() += 1);

    assert!(accounts.switch_account(account("usr_b")));
    assert_eq!(accounts.last_active().unwrap().user_id, account("usr_b"));
    assert_eq!(ctx.scope().active(), Some(account("usr_b")));
    // Replay plus the flag update; the scope change itself is not re-emitted.
    assert_eq!(*switches.lock().unwrap(), 2);

    backend.fail("remove_account", BackendError::http(500, "nope"));
    assert!(accounts.remove_account(&account("usr_b")).await.is_err());
    assert_eq!(accounts.snapshot(None).unwrap().len(), 2);

    backend.clear_failure("remove_account");
    accounts.remove_account(&account("usr_b")).await.unwrap();
    assert_eq!(accounts.snapshot(None).unwrap().len(), 1);
    assert_eq!(ctx.scope().active(), None);
}

#[tokio::test]
async fn test_developer_mode_persists_through_backend() {
    let (ctx, backend) = context(MockBackend::new(), None);
    let developer_mode = ctx.developer_mode();

    assert!(!developer_mode.ensure().await.unwrap());
    developer_mode.set_enabled(true).await.unwrap();
    assert!(developer_mode.is_enabled());
    assert!(backend.stored_developer_mode());

    backend.fail("set_developer_mode", BackendError::network("offline"));
    assert!(developer_mode.set_enabled(false).await.is_err());
    assert!(developer_mode.is_enabled());
}

#[tokio::test]
async fn test_status_alert_lifecycle() {
    let (ctx, backend) = context(MockBackend::new(), Some("usr_a"));
    let status = ctx.status();
    let alerts = ctx.alerts();

    backend.set_status(make_status(StatusIndicator::Minor, "Minor Service Outage"));
    status.poll_once().await.unwrap();
    let id = status.alert_id().unwrap();
    let alert = alerts.get_alert(id).unwrap();
    assert_eq!(alert.variant, AlertVariant::Warning);
    assert!(!alert.dismissable);

    backend.set_status(make_status(StatusIndicator::Major, "Partial System Outage"));
    status.poll_once().await.unwrap();
    assert_eq!(status.alert_id(), Some(id));
    assert_eq!(alerts.alert_count(), 1);
    assert_eq!(alerts.get_alert(id).unwrap().variant, AlertVariant::Error);

    backend.fail("status", BackendError::network("offline"));
    assert!(status.poll_once().await.is_err());
    assert_eq!(alerts.alert_count(), 1);

    backend.clear_failure("status");
    backend.set_status(make_status(StatusIndicator::None, "All Systems Operational"));
    status.poll_once().await.unwrap();
    assert_eq!(status.alert_id(), None);
    assert!(!alerts.has_alerts());
}

#[tokio::test]
async fn test_status_alert_recreated_after_manual_removal() {
    let (ctx, backend) = context(MockBackend::new(), None);
    let status = ctx.status();
    let alerts = ctx.alerts();

    backend.set_status(make_status(StatusIndicator::Critical, "Major Outage"));
    status.poll_once().await.unwrap();
    alerts.clear_all();

    status.poll_once().await.unwrap();
    assert_eq!(alerts.alert_count(), 1);
    assert_eq!(alerts.current_alert().unwrap().variant, AlertVariant::Critical);
}

#[tokio::test]
async fn test_inspector_lists_and_edits_stores() {
    let backend = MockBackend::new();
    backend.set_worlds(&account("usr_a"), vec![make_world("wrld_1", "One")]);
    let (ctx, _backend) = context(backend, Some("usr_a"));
    let inspector = ctx.inspector();

    assert_eq!(
        inspector.store_names(),
        vec![
            "current_user",
            "friends",
            "worlds",
            "avatars",
            "accounts",
            "developer_mode",
            "status",
        ]
    );

    ctx.worlds().ensure().await.unwrap();
    let report = inspector.report();
    let worlds_report = report.iter().find(|r| r.name == "worlds").unwrap();
    assert_eq!(worlds_report.records.len(), 1);
    assert!(worlds_report.records[0].is_active_scope);

    let mut edited = DebugValue::capture(&ctx.worlds().snapshot(None).unwrap());
    if let DebugValue::List(items) = &mut edited {
        items.clear();
    }
    inspector.edit("worlds", None, edited).unwrap();
    assert_eq!(ctx.worlds().snapshot(None), Some(vec![]));

    let err = inspector
        .edit("developer_mode", None, DebugValue::String("yes".to_string()))
        .unwrap_err();
    assert!(matches!(err, CircleError::Store(StoreError::Decode { .. })));
}

#[tokio::test]
async fn test_status_edit_from_inspector_syncs_alert() {
    let (ctx, _backend) = context(MockBackend::new(), None);
    let status = make_status(StatusIndicator::Major, "Edited");

    ctx.inspector()
        .edit("status", None, DebugValue::capture(&status))
        .unwrap();

    assert_eq!(ctx.alerts().alert_count(), 1);
    assert_eq!(ctx.status().snapshot(None), Some(status));
    ctx.inspector().clear("status", None).unwrap();
    assert_eq!(ctx.status().snapshot(None), None);
    assert_eq!(ctx.alerts().alert_count(), 0);
    assert_eq!(ctx.status().alert_id(), None);
}

#[tokio::test]
async fn test_clearing_status_removes_alert_but_failed_poll_keeps_it() {
    let backend = MockBackend::new();
    backend.set_status(make_status(StatusIndicator::Minor, "Degraded"));
    let (ctx, backend) = context(backend, None);
    let status = ctx.status();

    status.poll_once().await.unwrap();
    assert_eq!(ctx.alerts().alert_count(), 1);

    backend.fail("status", BackendError::network("offline"));
    assert!(status.poll_once().await.is_err());
    assert_eq!(ctx.alerts().alert_count(), 1);

    status.clear(None);
    assert_eq!(ctx.alerts().alert_count(), 0);
}

#[tokio::test]
async fn test_avatars_load_for_background_account() {
    let backend = MockBackend::new();
    backend.set_avatars(&account("usr_b"), vec![make_avatar("avtr_1", "One")]);
    let (ctx, backend) = context(backend, Some("usr_a"));
    let avatars = ctx.avatars();

    let loaded = avatars
        .ensure_with(EnsureOptions::new().for_scope(Some(account("usr_b"))))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(avatars.snapshot(None), None);
    assert!(!avatars.upsert_avatar(make_avatar("avtr_2", "Two")));

    ctx.scope().set_active(Some(account("usr_b")));
    assert!(avatars.upsert_avatar(make_avatar("avtr_2", "Two")));
    assert!(avatars.remove_avatar("avtr_1"));
    let ids: Vec<String> = avatars
        .snapshot(None)
        .unwrap()
        .into_iter()
        .map(|avatar| avatar.id)
        .collect();
    assert_eq!(ids, vec!["avtr_2"]);
    assert_eq!(backend.calls("uploaded_avatars"), 1);
}

#[tokio::test]
async fn test_friends_cache_lifecycle() {
    let backend = MockBackend::new();
    backend.set_friends(&account("usr_a"), vec![make_friend("usr_f1", "One")]);
    let (ctx, backend) = context(backend, Some("usr_a"));
    let user = ctx.user();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = user.subscribe_friends(move |friends| {
        sink.lock().unwrap().push(friends.as_ref().map(Vec::len))
    });

    assert_eq!(user.friends_state(None), EntryState::Empty);
    user.ensure_friends().await.unwrap();
    assert_eq!(user.friends_state(None), EntryState::Fresh);

    user.mark_friends_stale(None);
    assert_eq!(user.friends_state(None), EntryState::Stale);
    backend.set_friends(
        &account("usr_a"),
        vec![make_friend("usr_f1", "One"), make_friend("usr_f2", "Two")],
    );
    assert_eq!(user.refresh_friends().await.unwrap().len(), 2);
    assert_eq!(backend.calls("friends"), 2);

    let records = user.friends_debug_records();
    assert_eq!(records[0].scope_id, Some(account("usr_a")));
    assert!(records[0].is_active_scope);
    assert!(!records[0].stale);

    user.clear_friends(None);
    assert_eq!(user.friends_state(None), EntryState::Empty);

    let other = user
        .ensure_friends_with(EnsureOptions::new().for_scope(Some(account("usr_b"))))
        .await
        .unwrap();
    assert!(other.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![None, Some(1), Some(2), None]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_status_alert_tracks_latest_indicator(
        indicators in prop::collection::vec(arb_status_indicator(), 1..8),
    ) {
        let (ctx, _backend) = context(MockBackend::new(), None);
        for indicator in &indicators {
            ctx.status().set(Some(make_status(*indicator, "Status")), SetOptions::new());
        }

        let last = indicators[indicators.len() - 1];
        let expected = status_alert_variant(last);
        prop_assert_eq!(ctx.alerts().alert_count(), usize::from(expected.is_some()));
        prop_assert_eq!(ctx.alerts().current_alert().map(|alert| alert.variant), expected);
    }
}
