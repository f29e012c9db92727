//! Push events from the remote pipeline, applied to the user store.
//!
//! The transport is out of scope here: callers hand over the raw text of
//! each message and this module decodes the envelope and patches the
//! friends list or the signed-in user in place. Some events ship their
//! `content` as a JSON string that itself holds JSON; both shapes decode.

use circle_core::{AccountId, BackendError, CircleResult, LimitedUserFriend, UserStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::stores::UserStore;

/// Payload that may arrive either as structured JSON or as a string
/// containing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Nested<T>(pub T);

impl<T> Nested<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize> Serialize for Nested<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Nested<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decode_nested(value).map(Nested).map_err(serde::de::Error::custom)
    }
}

fn decode_nested<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    let raw = match value {
        Value::String(raw) => raw,
        other => return serde_json::from_value(other),
    };
    // A plain string payload is tried as-is before unwrapping it.
    match serde_json::from_value(Value::String(raw.clone())) {
        Ok(decoded) => Ok(decoded),
        Err(err) => match serde_json::from_str::<Value>(&raw) {
            Ok(inner) => serde_json::from_value(inner),
            Err(_) => Err(err),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendContent {
    pub user_id: String,
    pub user: LimitedUserFriend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendIdContent {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendOnlineContent {
    pub user_id: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub user: LimitedUserFriend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendActiveContent {
    // The remote spells this one in lowercase.
    #[serde(rename = "userid", alias = "userId")]
    pub user_id: String,
    pub user: LimitedUserFriend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendLocationContent {
    pub user_id: String,
    pub location: String,
    #[serde(default)]
    pub user: Option<LimitedUserFriend>,
}

/// Profile fields the pipeline pushes for the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: AccountId,
    pub display_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub status_description: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub current_avatar: Option<String>,
    #[serde(default)]
    pub current_avatar_thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub profile_pic_override: Option<String>,
    #[serde(default)]
    pub user_icon: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateContent {
    pub user_id: AccountId,
    pub user: UserSummary,
}

/// One message from the pipeline, tagged by `type` with its payload in
/// `content`. Event types this client does not cache decode as `Unknown`
/// through [`PipelineEvent::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum PipelineEvent {
    FriendAdd(Nested<FriendContent>),
    FriendDelete(Nested<FriendIdContent>),
    FriendUpdate(Nested<FriendContent>),
    FriendOnline(Nested<FriendOnlineContent>),
    FriendActive(Nested<FriendActiveContent>),
    FriendOffline(Nested<FriendIdContent>),
    FriendLocation(Nested<FriendLocationContent>),
    UserUpdate(Nested<UserUpdateContent>),
    #[serde(skip)]
    Unknown,
}

impl PipelineEvent {
    const HANDLED: [&'static str; 8] = [
        "friend-add",
        "friend-delete",
        "friend-update",
        "friend-online",
        "friend-active",
        "friend-offline",
        "friend-location",
        "user-update",
    ];

    /// Decode one message as received from the transport.
    pub fn from_json(text: &str) -> CircleResult<Self> {
        trace!(len = text.len(), "Pipeline message received");
        let value: Value = serde_json::from_str(text).map_err(invalid)?;
        let handled = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| Self::HANDLED.contains(&kind));
        if !handled {
            return Ok(Self::Unknown);
        }
        serde_json::from_value(value).map_err(invalid)
    }
}

fn invalid(err: serde_json::Error) -> circle_core::CircleError {
    BackendError::parse(format!("Invalid pipeline message: {err}")).into()
}

/// Decode `text` and apply it to `store`. Returns whether a cached value
/// changed.
pub fn apply_message(store: &UserStore, text: &str) -> CircleResult<bool> {
    Ok(apply(store, PipelineEvent::from_json(text)?))
}

/// Apply one event to the active account's caches. Returns whether a cached
/// value changed; events for friends not in the list change nothing.
pub fn apply(store: &UserStore, event: PipelineEvent) -> bool {
    match event {
        PipelineEvent::FriendAdd(content) => {
            let content = content.into_inner();
            info!(friend_id = %content.user_id, "Friend added");
            store.upsert_friend(content.user)
        }
        PipelineEvent::FriendDelete(content) => store.remove_friend(&content.into_inner().user_id),
        PipelineEvent::FriendUpdate(content) => {
            let content = content.into_inner();
            debug!(friend_id = %content.user_id, "Friend updated");
            store.upsert_friend(content.user)
        }
        PipelineEvent::FriendOnline(content) => {
            let content = content.into_inner();
            info!(friend_id = %content.user_id, "Friend online");
            let mut changed = store.upsert_friend(content.user);
            if let Some(location) = content.location {
                changed |= store.update_friend_location(&content.user_id, location, content.platform);
            }
            changed
        }
        PipelineEvent::FriendActive(content) => {
            let content = content.into_inner();
            debug!(friend_id = %content.user_id, "Friend active");
            store.upsert_friend(content.user)
        }
        PipelineEvent::FriendOffline(content) => {
            let content = content.into_inner();
            info!(friend_id = %content.user_id, "Friend offline");
            store.set_friend_offline(&content.user_id)
        }
        PipelineEvent::FriendLocation(content) => {
            let content = content.into_inner();
            debug!(friend_id = %content.user_id, location = %content.location, "Friend location");
            let platform = content.user.as_ref().map(|friend| friend.platform.clone());
            let mut changed = false;
            if let Some(user) = content.user {
                changed |= store.upsert_friend(user);
            }
            changed | store.update_friend_location(&content.user_id, content.location, platform)
        }
        PipelineEvent::UserUpdate(content) => apply_user_update(store, content.into_inner()),
        PipelineEvent::Unknown => {
            trace!("Ignoring pipeline event");
            false
        }
    }
}

fn apply_user_update(store: &UserStore, content: UserUpdateContent) -> bool {
    debug!(account = %content.user_id, "Current user updated");
    let summary = content.user;
    let scope = Some(content.user_id);
    store.resource_store().update(Some(&scope), |user| {
        if user.id != summary.id {
            return false;
        }
        user.display_name = summary.display_name;
        user.username = summary.username;
        user.status = summary.status;
        user.status_description = summary.status_description;
        user.bio = summary.bio;
        user.current_avatar = summary.current_avatar;
        user.current_avatar_thumbnail_image_url = summary.current_avatar_thumbnail_image_url;
        user.profile_pic_override = summary.profile_pic_override;
        user.user_icon = summary.user_icon;
        user.tags = summary.tags;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_content_decodes_from_string_or_object() {
        let inline = r#"{"type":"friend-delete","content":{"userId":"usr_f1"}}"#;
        let nested = r#"{"type":"friend-delete","content":"{\"userId\":\"usr_f1\"}"}"#;

        let expected = PipelineEvent::FriendDelete(Nested(FriendIdContent {
            user_id: "usr_f1".to_string(),
        }));
        assert_eq!(PipelineEvent::from_json(inline).unwrap(), expected);
        assert_eq!(PipelineEvent::from_json(nested).unwrap(), expected);
    }

    #[test]
    fn test_plain_string_payload_is_not_unwrapped() {
        let decoded: Nested<String> = serde_json::from_str(r#""not json""#).unwrap();
        assert_eq!(decoded.into_inner(), "not json");
    }

    #[test]
    fn test_friend_active_accepts_lowercase_user_id() {
        let text = r#"{"type":"friend-active","content":{"userid":"usr_f1","user":{"id":"usr_f1","displayName":"One"}}}"#;
        let PipelineEvent::FriendActive(content) = PipelineEvent::from_json(text).unwrap() else {
            panic!("expected friend-active");
        };
        assert_eq!(content.into_inner().user_id, "usr_f1");
    }

    #[test]
    fn test_unhandled_event_types_decode_as_unknown() {
        let text = r#"{"type":"notification","content":{"id":"not_1"}}"#;
        assert_eq!(PipelineEvent::from_json(text).unwrap(), PipelineEvent::Unknown);
    }

    #[test]
    fn test_malformed_message_is_a_parse_error() {
        let err = PipelineEvent::from_json(r#"{"type":"friend-delete","content":"{"}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid pipeline message"));
    }
}
