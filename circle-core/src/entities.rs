//! Remote resource types cached by the client.
//!
//! These mirror the remote API's JSON shapes, trimmed to the fields the
//! client reads. Unknown fields are ignored on decode.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AccountId;

/// Presence status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Online and active
    Active,
    /// Online and auto-accepting invitations
    #[serde(rename = "join me")]
    JoinMe,
    /// Online but hiding location, requires invitation
    #[serde(rename = "ask me")]
    AskMe,
    /// Busy
    Busy,
    #[default]
    Offline,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::JoinMe => write!(f, "join me"),
            UserStatus::AskMe => write!(f, "ask me"),
            UserStatus::Busy => write!(f, "busy"),
            UserStatus::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeveloperType {
    #[default]
    None,
    Trusted,
    Internal,
    Moderator,
}

/// Release status of avatars and worlds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    #[default]
    Public,
    Private,
    Hidden,
    All,
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: AccountId,
    #[serde(default)]
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub status_description: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub developer_type: DeveloperType,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub current_avatar: Option<String>,
    #[serde(default)]
    pub current_avatar_thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub profile_pic_override: Option<String>,
    #[serde(default)]
    pub user_icon: Option<String>,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub last_login: Option<String>,
}

/// A friend as returned by the friends listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitedUserFriend {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub status_description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub last_platform: Option<String>,
    #[serde(default)]
    pub current_avatar_thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub profile_pic_override: Option<String>,
    #[serde(default)]
    pub user_icon: Option<String>,
    #[serde(default)]
    pub developer_type: DeveloperType,
    #[serde(default)]
    pub is_friend: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LimitedUserFriend {
    /// Location value the remote API reports for signed-out users.
    pub const OFFLINE_LOCATION: &'static str = "offline";

    /// Whether the friend is currently in-game or on the website.
    pub fn is_online(&self) -> bool {
        match self.location.as_deref() {
            None | Some("") => false,
            Some(location) => location != Self::OFFLINE_LOCATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitedWorld {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub release_status: ReleaseStatus,
    #[serde(default)]
    pub visits: Option<i32>,
    #[serde(default)]
    pub favorites: Option<i32>,
    #[serde(default)]
    pub occupants: Option<i32>,
    #[serde(default)]
    pub capacity: Option<i32>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitedAvatar {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub release_status: ReleaseStatus,
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An account remembered by the desktop shell for quick switching.
///
/// Session cookies stay with the shell; the client only sees identity and
/// display data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub user_id: AccountId,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub avatar_fallback_url: Option<String>,
    pub last_login: String,
    #[serde(default)]
    pub last_active: bool,
}
