//! Pipeline events applied to the friends cache and the signed-in user.

use std::sync::Arc;

use circle_core::{AccountId, LimitedUserFriend, UserStatus};
use circle_store::pipeline::{apply, apply_message};
use circle_store::{AppContext, PipelineEvent, SetOptions, UserStore};
use circle_test_utils::fixtures::{make_friend, make_online_friend, make_user};
use circle_test_utils::{ManualClock, MockBackend};
use serde_json::json;

fn account(id: &str) -> AccountId {
    AccountId::from(id)
}

fn user_store(friends: Vec<LimitedUserFriend>) -> Arc<UserStore> {
    let ctx = AppContext::builder(Arc::new(MockBackend::new()))
        .clock(Arc::new(ManualClock::at_epoch()))
        .active_account(Some(account("usr_me")))
        .build()
        .unwrap();
    let user = ctx.user();
    user.set_friends(Some(friends), SetOptions::new());
    user
}

fn message(kind: &str, content: serde_json::Value) -> String {
    json!({ "type": kind, "content": content }).to_string()
}

fn nested_message(kind: &str, content: serde_json::Value) -> String {
    json!({ "type": kind, "content": content.to_string() }).to_string()
}

fn friend(store: &UserStore, id: &str) -> Option<LimitedUserFriend> {
    store
        .friends_snapshot(None)
        .unwrap_or_default()
        .into_iter()
        .find(|friend| friend.id == id)
}

#[test]
fn test_friend_add_inserts_at_front() {
    let store = user_store(vec![make_friend("usr_f1", "One")]);
    let added = make_friend("usr_f2", "Two");

    let changed = apply_message(
        &store,
        &nested_message("friend-add", json!({ "userId": "usr_f2", "user": added })),
    )
    .unwrap();

    assert!(changed);
    let ids: Vec<String> = store
        .friends_snapshot(None)
        .unwrap()
        .into_iter()
        .map(|friend| friend.id)
        .collect();
    assert_eq!(ids, vec!["usr_f2", "usr_f1"]);
}

#[test]
fn test_friend_add_for_self_is_ignored() {
    let store = user_store(Vec::new());
    let me = make_friend("usr_me", "Me");

    let changed = apply_message(
        &store,
        &message("friend-add", json!({ "userId": "usr_me", "user": me })),
    )
    .unwrap();

    assert!(!changed);
    assert_eq!(store.friends_snapshot(None), Some(Vec::new()));
}

#[test]
fn test_friend_delete_removes_entry() {
    let store = user_store(vec![make_friend("usr_f1", "One"), make_friend("usr_f2", "Two")]);

    assert!(apply_message(&store, &message("friend-delete", json!({ "userId": "usr_f1" }))).unwrap());
    assert!(friend(&store, "usr_f1").is_none());
    assert!(friend(&store, "usr_f2").is_some());

    assert!(!apply_message(&store, &message("friend-delete", json!({ "userId": "usr_f1" }))).unwrap());
}

#[test]
fn test_friend_update_replaces_entry() {
    let store = user_store(vec![make_friend("usr_f1", "One")]);
    let renamed = LimitedUserFriend {
        status_description: "afk".to_string(),
        ..make_friend("usr_f1", "Uno")
    };

    apply_message(
        &store,
        &message("friend-update", json!({ "userId": "usr_f1", "user": renamed })),
    )
    .unwrap();

    let updated = friend(&store, "usr_f1").unwrap();
    assert_eq!(updated.display_name, "Uno");
    assert_eq!(updated.status_description, "afk");
    assert_eq!(store.friends_snapshot(None).unwrap().len(), 1);
}

#[test]
fn test_friend_online_sets_location_and_platform() {
    let store = user_store(vec![make_friend("usr_f1", "One")]);
    let user = LimitedUserFriend {
        status: UserStatus::Active,
        ..make_friend("usr_f1", "One")
    };

    apply_message(
        &store,
        &nested_message(
            "friend-online",
            json!({
                "userId": "usr_f1",
                "platform": "android",
                "location": "wrld_1:123",
                "user": user,
            }),
        ),
    )
    .unwrap();

    let online = friend(&store, "usr_f1").unwrap();
    assert_eq!(online.location.as_deref(), Some("wrld_1:123"));
    assert_eq!(online.platform, "android");
    assert_eq!(store.online_friends().len(), 1);
}

#[test]
fn test_friend_active_upserts_with_lowercase_id_field() {
    let store = user_store(Vec::new());
    let user = LimitedUserFriend {
        location: Some("private".to_string()),
        ..make_friend("usr_f1", "One")
    };

    let changed = apply_message(
        &store,
        &message("friend-active", json!({ "userid": "usr_f1", "user": user })),
    )
    .unwrap();

    assert!(changed);
    assert_eq!(friend(&store, "usr_f1").unwrap().location.as_deref(), Some("private"));
}

#[test]
fn test_friend_offline_clears_location_and_platform() {
    let store = user_store(vec![make_online_friend("usr_f1", "One", "wrld_1:123")]);

    apply_message(&store, &message("friend-offline", json!({ "userId": "usr_f1" }))).unwrap();

    let offline = friend(&store, "usr_f1").unwrap();
    assert_eq!(
        offline.location.as_deref(),
        Some(LimitedUserFriend::OFFLINE_LOCATION)
    );
    assert!(offline.platform.is_empty());
    assert!(store.online_friends().is_empty());
}

#[test]
fn test_friend_location_moves_known_friend() {
    let store = user_store(vec![make_online_friend("usr_f1", "One", "wrld_1:123")]);

    apply_message(
        &store,
        &message(
            "friend-location",
            json!({ "userId": "usr_f1", "location": "wrld_2:456" }),
        ),
    )
    .unwrap();

    let moved = friend(&store, "usr_f1").unwrap();
    assert_eq!(moved.location.as_deref(), Some("wrld_2:456"));
    assert_eq!(moved.platform, "standalonewindows");

    let unknown = apply_message(
        &store,
        &message(
            "friend-location",
            json!({ "userId": "usr_zz", "location": "wrld_2:456" }),
        ),
    )
    .unwrap();
    assert!(!unknown);
}

#[test]
fn test_user_update_patches_cached_user() {
    let store = user_store(Vec::new());
    store.adopt_session(make_user("usr_me", "Me"));

    let changed = apply_message(
        &store,
        &nested_message(
            "user-update",
            json!({
                "userId": "usr_me",
                "user": {
                    "id": "usr_me",
                    "displayName": "New Me",
                    "username": "newme",
                    "status": "busy",
                    "statusDescription": "working",
                    "tags": ["system_trust_known"],
                },
            }),
        ),
    )
    .unwrap();

    assert!(changed);
    let user = store.snapshot(None).unwrap();
    assert_eq!(user.display_name, "New Me");
    assert_eq!(user.status, UserStatus::Busy);
    assert_eq!(user.status_description, "working");
    assert_eq!(user.tags, vec!["system_trust_known"]);
}

#[test]
fn test_user_update_without_cached_user_changes_nothing() {
    let store = user_store(Vec::new());
    let event = PipelineEvent::from_json(&message(
        "user-update",
        json!({ "userId": "usr_me", "user": { "id": "usr_me", "displayName": "Me" } }),
    ))
    .unwrap();

    assert!(!apply(&store, event));
    assert!(store.snapshot(None).is_none());
}

#[test]
fn test_unknown_events_change_nothing() {
    let store = user_store(vec![make_friend("usr_f1", "One")]);

    assert!(!apply_message(&store, &message("notification", json!({ "id": "not_1" }))).unwrap());
    assert!(!apply(&store, PipelineEvent::Unknown));
    assert_eq!(store.friends_snapshot(None).unwrap().len(), 1);
}
